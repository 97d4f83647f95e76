// lib/src/services/pharmacy.rs
// Counter sales. A sale decrements stock, records the payment and freezes a
// line per product in a single transaction; a shortfall on any line aborts
// the whole sale with stock and ledger untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{Payment, PaymentItem, PaymentKind, PaymentMethod, PaymentStatus, Principal, Role};

use crate::scope::ensure_role;
use crate::store::MemoryStore;

#[derive(Debug, Clone, Deserialize)]
pub struct SaleLineInput {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordSaleInput {
    pub items: Vec<SaleLineInput>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Walk-in sales have no patient on file.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sale {
    #[serde(flatten)]
    pub payment: Payment,
    pub items: Vec<PaymentItem>,
}

#[derive(Debug, Clone)]
pub struct PharmacyService {
    store: Arc<MemoryStore>,
}

impl PharmacyService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        PharmacyService { store }
    }

    /// Rings up a sale. The total is computed from current catalog prices
    /// and each line keeps the unit price it was sold at.
    ///
    /// # Errors
    ///
    /// `Validation` when the cart is empty, a product is unknown, a quantity
    /// is zero, or stock runs short (named per product). Any error leaves
    /// every product's stock as it was.
    pub async fn record_sale(
        &self,
        input: RecordSaleInput,
        principal: &Principal,
    ) -> CareResult<Sale> {
        ensure_role(principal, &[Role::Pharmacy, Role::Administrator])?;
        if input.items.is_empty() {
            return Err(CareError::validation("At least one item is required"));
        }
        let created_by = principal.id;
        let sale = self.store.write(move |tables| {
            if let Some(patient_id) = input.patient_id {
                tables.require_patient(patient_id)?;
            }

            let mut total: i64 = 0;
            for line in &input.items {
                let product = tables
                    .pharmacy_products
                    .get(&line.product_id)
                    .ok_or_else(|| {
                        CareError::validation("One or more products could not be found")
                    })?;
                total += product.price * i64::from(line.quantity);
            }

            let payment = Payment::new(
                input.patient_id,
                total,
                input.method,
                PaymentStatus::Paid,
                PaymentKind::Pharmacy,
                input.reference.clone(),
                None,
                created_by,
            )?;

            let mut items = Vec::with_capacity(input.items.len());
            for line in &input.items {
                let product = tables.product_mut(line.product_id)?;
                product.take_stock(line.quantity)?;
                let item =
                    PaymentItem::new(payment.id, line.product_id, line.quantity, product.price);
                items.push(item);
            }
            for item in &items {
                tables.payment_items.insert(item.id, item.clone());
            }
            tables.payments.insert(payment.id, payment.clone());
            Ok(Sale { payment, items })
        })?;
        info!(
            payment = %sale.payment.id,
            amount = sale.payment.amount,
            lines = sale.items.len(),
            "pharmacy sale recorded"
        );
        Ok(sale)
    }

    /// Past sales with their lines, newest first.
    pub async fn list_sales(&self, principal: &Principal) -> CareResult<Vec<Sale>> {
        ensure_role(principal, &[Role::Pharmacy, Role::Administrator])?;
        self.store.read(|tables| {
            let mut sales: Vec<Sale> = tables
                .payments
                .values()
                .filter(|p| p.kind == PaymentKind::Pharmacy)
                .map(|payment| Sale {
                    payment: payment.clone(),
                    items: tables
                        .payment_items
                        .values()
                        .filter(|item| item.payment_id == payment.id)
                        .cloned()
                        .collect(),
                })
                .collect();
            sales.sort_by(|a, b| b.payment.created_at.cmp(&a.payment.created_at));
            Ok(sales)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;

    #[tokio::test]
    async fn should_decrement_stock_and_freeze_lines() {
        let cx = TestContext::new();
        let sale = cx
            .services
            .pharmacy
            .record_sale(
                RecordSaleInput {
                    items: vec![
                        SaleLineInput {
                            product_id: cx.paracetamol_id,
                            quantity: 2,
                        },
                        SaleLineInput {
                            product_id: cx.amoxicillin_id,
                            quantity: 1,
                        },
                    ],
                    method: PaymentMethod::Cash,
                    reference: None,
                    patient_id: None,
                },
                &cx.pharmacist,
            )
            .await
            .unwrap();

        // Seeded at 500 and 1500 a unit.
        assert_eq!(sale.payment.amount, 2 * 500 + 1_500);
        assert_eq!(sale.payment.status, PaymentStatus::Paid);
        assert_eq!(sale.items.len(), 2);
        assert!(sale
            .items
            .iter()
            .all(|item| item.total_price == item.unit_price * i64::from(item.quantity)));

        let stock = cx
            .store
            .read(|tables| Ok(tables.require_product(cx.paracetamol_id)?.stock))
            .unwrap();
        assert_eq!(stock, 98);
    }

    #[tokio::test]
    async fn should_roll_back_whole_sale_on_stock_shortfall() {
        let cx = TestContext::new();
        let err = cx
            .services
            .pharmacy
            .record_sale(
                RecordSaleInput {
                    items: vec![
                        SaleLineInput {
                            product_id: cx.paracetamol_id,
                            quantity: 10,
                        },
                        SaleLineInput {
                            product_id: cx.amoxicillin_id,
                            quantity: 1_000,
                        },
                    ],
                    method: PaymentMethod::Cash,
                    reference: None,
                    patient_id: None,
                },
                &cx.pharmacist,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
        assert!(err.to_string().contains("Insufficient stock"));

        let (stock, payments, items) = cx
            .store
            .read(|tables| {
                Ok((
                    tables.require_product(cx.paracetamol_id)?.stock,
                    tables
                        .payments
                        .values()
                        .filter(|p| p.kind == PaymentKind::Pharmacy)
                        .count(),
                    tables.payment_items.len(),
                ))
            })
            .unwrap();
        assert_eq!(stock, 100);
        assert_eq!(payments, 0);
        assert_eq!(items, 0);
    }

    #[tokio::test]
    async fn should_reject_unknown_product_and_empty_cart() {
        let cx = TestContext::new();
        let err = cx
            .services
            .pharmacy
            .record_sale(
                RecordSaleInput {
                    items: vec![],
                    method: PaymentMethod::Cash,
                    reference: None,
                    patient_id: None,
                },
                &cx.pharmacist,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));

        let err = cx
            .services
            .pharmacy
            .record_sale(
                RecordSaleInput {
                    items: vec![SaleLineInput {
                        product_id: Uuid::new_v4(),
                        quantity: 1,
                    }],
                    method: PaymentMethod::Cash,
                    reference: None,
                    patient_id: None,
                },
                &cx.pharmacist,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not be found"));
    }

    #[tokio::test]
    async fn should_keep_sales_out_of_reception_reach() {
        let cx = TestContext::new();
        let err = cx
            .services
            .pharmacy
            .list_sales(&cx.reception)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }
}
