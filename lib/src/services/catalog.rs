// lib/src/services/catalog.rs
// Reference data: the lab/imaging exam catalogs and the pharmacy shelf.
// Exam prices here are only quotes; orders freeze their own copy at
// creation time.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{AncillaryKind, CatalogExam, PharmacyProduct, Principal, Role};

use crate::scope::ensure_role;
use crate::store::MemoryStore;

#[derive(Debug, Clone)]
pub struct CatalogService {
    store: Arc<MemoryStore>,
}

impl CatalogService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        CatalogService { store }
    }

    pub async fn create_exam(
        &self,
        kind: AncillaryKind,
        name: String,
        price: i64,
        principal: &Principal,
    ) -> CareResult<CatalogExam> {
        ensure_role(principal, &[Role::Administrator])?;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(CareError::validation("Exam name must not be blank"));
        }
        if price < 0 {
            return Err(CareError::validation("Exam price must not be negative"));
        }
        let exam = self.store.write(move |tables| {
            let exam = CatalogExam::new(name, price);
            tables.exams_mut(kind).insert(exam.id, exam.clone());
            Ok(exam)
        })?;
        info!(exam = %exam.id, kind = kind.as_str(), name = %exam.name, "exam added to catalog");
        Ok(exam)
    }

    /// Reprices an exam for future orders only.
    pub async fn update_exam_price(
        &self,
        kind: AncillaryKind,
        exam_id: Uuid,
        price: i64,
        principal: &Principal,
    ) -> CareResult<CatalogExam> {
        ensure_role(principal, &[Role::Administrator])?;
        if price < 0 {
            return Err(CareError::validation("Exam price must not be negative"));
        }
        let exam = self.store.write(move |tables| {
            let exam = tables.exam_mut(kind, exam_id)?;
            exam.price = price;
            exam.updated_at = Utc::now();
            Ok(exam.clone())
        })?;
        info!(exam = %exam.id, price, "exam repriced");
        Ok(exam)
    }

    /// Deactivated exams stay listed for history but cannot be ordered.
    pub async fn set_exam_active(
        &self,
        kind: AncillaryKind,
        exam_id: Uuid,
        active: bool,
        principal: &Principal,
    ) -> CareResult<CatalogExam> {
        ensure_role(principal, &[Role::Administrator])?;
        let exam = self.store.write(move |tables| {
            let exam = tables.exam_mut(kind, exam_id)?;
            exam.is_active = active;
            exam.updated_at = Utc::now();
            Ok(exam.clone())
        })?;
        info!(exam = %exam.id, active, "exam availability changed");
        Ok(exam)
    }

    pub async fn list_exams(
        &self,
        kind: AncillaryKind,
        active_only: bool,
    ) -> CareResult<Vec<CatalogExam>> {
        self.store.read(move |tables| {
            let mut exams: Vec<CatalogExam> = tables
                .exams(kind)
                .values()
                .filter(|e| !active_only || e.is_active)
                .cloned()
                .collect();
            exams.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(exams)
        })
    }

    pub async fn create_product(
        &self,
        name: String,
        price: i64,
        stock: u32,
        principal: &Principal,
    ) -> CareResult<PharmacyProduct> {
        ensure_role(principal, &[Role::Administrator, Role::Pharmacy])?;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(CareError::validation("Product name must not be blank"));
        }
        if price < 0 {
            return Err(CareError::validation("Product price must not be negative"));
        }
        let product = self.store.write(move |tables| {
            let product = PharmacyProduct::new(name, price, stock);
            tables
                .pharmacy_products
                .insert(product.id, product.clone());
            Ok(product)
        })?;
        info!(product = %product.id, name = %product.name, "product added to shelf");
        Ok(product)
    }

    pub async fn restock_product(
        &self,
        product_id: Uuid,
        quantity: u32,
        principal: &Principal,
    ) -> CareResult<PharmacyProduct> {
        ensure_role(principal, &[Role::Administrator, Role::Pharmacy])?;
        if quantity == 0 {
            return Err(CareError::validation(
                "Restock quantity must be at least 1",
            ));
        }
        let product = self.store.write(move |tables| {
            let product = tables.product_mut(product_id)?;
            product.stock += quantity;
            product.updated_at = Utc::now();
            Ok(product.clone())
        })?;
        info!(product = %product.id, stock = product.stock, "product restocked");
        Ok(product)
    }

    pub async fn list_products(&self) -> CareResult<Vec<PharmacyProduct>> {
        self.store.read(|tables| {
            let mut products: Vec<PharmacyProduct> =
                tables.pharmacy_products.values().cloned().collect();
            products.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(products)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;

    #[tokio::test]
    async fn should_keep_inactive_exams_out_of_order_forms() {
        let cx = TestContext::new();
        cx.services
            .catalog
            .set_exam_active(AncillaryKind::Lab, cx.cbc_exam_id, false, &cx.admin)
            .await
            .unwrap();

        let orderable = cx
            .services
            .catalog
            .list_exams(AncillaryKind::Lab, true)
            .await
            .unwrap();
        assert!(orderable.iter().all(|e| e.id != cx.cbc_exam_id));
        let all = cx
            .services
            .catalog
            .list_exams(AncillaryKind::Lab, false)
            .await
            .unwrap();
        assert!(all.iter().any(|e| e.id == cx.cbc_exam_id));
    }

    #[tokio::test]
    async fn should_reject_negative_prices() {
        let cx = TestContext::new();
        let err = cx
            .services
            .catalog
            .create_exam(AncillaryKind::Imaging, "CT scan".into(), -1, &cx.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
        let err = cx
            .services
            .catalog
            .update_exam_price(AncillaryKind::Lab, cx.cbc_exam_id, -5, &cx.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[tokio::test]
    async fn should_restock_shelf() {
        let cx = TestContext::new();
        let before = cx
            .store
            .read(|tables| Ok(tables.require_product(cx.paracetamol_id)?.stock))
            .unwrap();
        let after = cx
            .services
            .catalog
            .restock_product(cx.paracetamol_id, 25, &cx.pharmacist)
            .await
            .unwrap();
        assert_eq!(after.stock, before + 25);

        let err = cx
            .services
            .catalog
            .restock_product(cx.paracetamol_id, 0, &cx.pharmacist)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }
}
