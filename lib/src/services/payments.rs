// lib/src/services/payments.rs
// The ledger. Every clinical step downstream of the desk is gated on rows
// written here reaching `paid`.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    AncillaryKind, Payment, PaymentKind, PaymentMethod, PaymentStatus, Principal, Role,
};

use crate::scope::ensure_role;
use crate::store::MemoryStore;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentInput {
    pub patient_id: Option<Uuid>,
    pub amount: i64,
    pub method: PaymentMethod,
    pub kind: PaymentKind,
    pub reference: Option<String>,
    /// Lab/imaging request this payment settles, for desk payments raised
    /// against an existing order.
    pub related_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub kind: Option<PaymentKind>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlePaymentInput {
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentLedger {
    store: Arc<MemoryStore>,
}

impl PaymentLedger {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        PaymentLedger { store }
    }

    /// Records a desk payment. Desk payments are settled on the spot, so the
    /// row is created as `paid`; pending rows only ever come from ancillary
    /// request creation.
    ///
    /// # Errors
    ///
    /// `Validation` for a negative amount, a mobile-money payment without a
    /// reference, or a `related_id` on a non-ancillary kind; `NotFound` when
    /// the patient or the related request does not resolve.
    pub async fn create_payment(
        &self,
        input: CreatePaymentInput,
        principal: &Principal,
    ) -> CareResult<Payment> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let created_by = principal.id;
        let payment = self.store.write(move |tables| {
            if let Some(patient_id) = input.patient_id {
                tables.require_patient(patient_id)?;
            }

            let related_kind = match (input.related_id, input.kind) {
                (None, _) => None,
                (Some(_), PaymentKind::Lab) => Some(AncillaryKind::Lab),
                (Some(_), PaymentKind::Imaging) => Some(AncillaryKind::Imaging),
                (Some(_), other) => {
                    return Err(CareError::validation(format!(
                        "A {} payment may not reference a lab or imaging request",
                        other.as_str()
                    )));
                }
            };
            if let (Some(related_id), Some(kind)) = (input.related_id, related_kind) {
                tables.require_request(kind, related_id)?;
            }

            let payment = Payment::new(
                input.patient_id,
                input.amount,
                input.method,
                PaymentStatus::Paid,
                input.kind,
                input.reference,
                input.related_id,
                created_by,
            )?;
            tables.payments.insert(payment.id, payment.clone());

            // Back-link the gated request so the fulfillment queue sees the
            // settled payment immediately.
            if let (Some(related_id), Some(kind)) = (input.related_id, related_kind) {
                let request = tables.request_mut(kind, related_id)?;
                if request.payment_id.is_some() && request.payment_id != Some(payment.id) {
                    warn!(
                        request = %related_id,
                        "request already had a gating payment; relinking to the new one"
                    );
                }
                request.payment_id = Some(payment.id);
                request.updated_at = Utc::now();
            }
            Ok(payment)
        })?;
        info!(payment = %payment.id, amount = payment.amount, kind = payment.kind.as_str(), "payment recorded");
        Ok(payment)
    }

    /// Advances a payment to `paid`. Re-settling a paid row refreshes the
    /// method and reference; a cancelled row stays dead.
    pub async fn settle_payment(
        &self,
        payment_id: Uuid,
        input: SettlePaymentInput,
        principal: &Principal,
    ) -> CareResult<Payment> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let payment = self.store.write(move |tables| {
            let payment = tables.payment_mut(payment_id)?;
            payment.mark_paid(input.method, input.reference)?;
            Ok(payment.clone())
        })?;
        info!(payment = %payment.id, "payment settled");
        Ok(payment)
    }

    /// Cancels a payment, terminally. Requires an explicit confirmation flag
    /// so a stray call cannot void a ledger row.
    pub async fn cancel_payment(
        &self,
        payment_id: Uuid,
        confirm: bool,
        principal: &Principal,
    ) -> CareResult<Payment> {
        ensure_role(principal, &[Role::Administrator])?;
        if !confirm {
            return Err(CareError::validation(
                "Cancellation must be confirmed explicitly",
            ));
        }
        let payment = self.store.write(move |tables| {
            let payment = tables.payment_mut(payment_id)?;
            payment.mark_cancelled()?;
            Ok(payment.clone())
        })?;
        warn!(payment = %payment.id, "payment cancelled");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: Uuid, principal: &Principal) -> CareResult<Payment> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        self.store.read(|tables| tables.require_payment(payment_id))
    }

    pub async fn list_payments(
        &self,
        filter: PaymentFilter,
        principal: &Principal,
    ) -> CareResult<Vec<Payment>> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        self.store.read(move |tables| {
            let mut payments: Vec<Payment> = tables
                .payments
                .values()
                .filter(|p| filter.status.map_or(true, |s| p.status == s))
                .filter(|p| filter.kind.map_or(true, |k| p.kind == k))
                .filter(|p| filter.patient_id.map_or(true, |id| p.patient_id == Some(id)))
                .cloned()
                .collect();
            payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(payments)
        })
    }
}
