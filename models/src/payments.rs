// models/src/payments.rs
// The ledger record that gates every downstream clinical action. Status only
// moves forward: pending -> paid, any -> cancelled. Cancelled is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }

    /// Mobile-money settlements must carry the operator transaction
    /// reference; cash needs none.
    pub fn require_reference(&self, reference: Option<&str>) -> CareResult<()> {
        if *self == PaymentMethod::MobileMoney
            && reference.map(str::trim).filter(|r| !r.is_empty()).is_none()
        {
            return Err(CareError::validation(
                "A transaction reference is required for mobile money payments",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// What the money was collected for. Lab/imaging payments are created
/// automatically alongside their request; the rest come from the desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Consultation,
    Lab,
    Imaging,
    Pharmacy,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Consultation => "consultation",
            PaymentKind::Lab => "lab",
            PaymentKind::Imaging => "imaging",
            PaymentKind::Pharmacy => "pharmacy",
        }
    }
}

/// A ledger entry. Amounts are integer minor units (francs), never floats.
/// `related_id` weakly references the lab/imaging request this payment gates;
/// lookup only, the request owns its own lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub amount: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub reference: Option<String>,
    pub related_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Builds a validated ledger entry in the given initial status.
    ///
    /// # Errors
    ///
    /// `CareError::Validation` when the amount is negative or a mobile-money
    /// payment lacks its reference.
    pub fn new(
        patient_id: Option<Uuid>,
        amount: i64,
        method: PaymentMethod,
        status: PaymentStatus,
        kind: PaymentKind,
        reference: Option<String>,
        related_id: Option<Uuid>,
        created_by: Uuid,
    ) -> CareResult<Self> {
        if amount < 0 {
            return Err(CareError::validation("Payment amount must not be negative"));
        }
        method.require_reference(reference.as_deref())?;
        let now = Utc::now();
        Ok(Payment {
            id: Uuid::new_v4(),
            patient_id,
            amount,
            method,
            status,
            kind,
            reference,
            related_id,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }

    /// Settlement transition. Re-settling an already paid entry is allowed
    /// and refreshes method/reference (legacy records predate the gate);
    /// a cancelled entry can never be revived.
    pub fn mark_paid(&mut self, method: PaymentMethod, reference: Option<String>) -> CareResult<()> {
        if self.status == PaymentStatus::Cancelled {
            return Err(CareError::conflict("Payment is cancelled"));
        }
        method.require_reference(reference.as_deref())?;
        self.method = method;
        if reference.is_some() {
            self.reference = reference;
        }
        self.status = PaymentStatus::Paid;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cancellation transition. Terminal.
    pub fn mark_cancelled(&mut self) -> CareResult<()> {
        if self.status == PaymentStatus::Cancelled {
            return Err(CareError::conflict("Payment is already cancelled"));
        }
        self.status = PaymentStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// One line of a pharmacy sale, priced at sale time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentItem {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
}

impl PaymentItem {
    pub fn new(payment_id: Uuid, product_id: Uuid, quantity: u32, unit_price: i64) -> Self {
        PaymentItem {
            id: Uuid::new_v4(),
            payment_id,
            product_id,
            quantity,
            unit_price,
            total_price: unit_price * i64::from(quantity),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_payment() -> Payment {
        Payment::new(
            Some(Uuid::new_v4()),
            15_000,
            PaymentMethod::Cash,
            PaymentStatus::Pending,
            PaymentKind::Lab,
            None,
            None,
            Uuid::new_v4(),
        )
        .unwrap()
    }

    #[test]
    fn should_reject_negative_amount() {
        let err = Payment::new(
            None,
            -1,
            PaymentMethod::Cash,
            PaymentStatus::Paid,
            PaymentKind::Consultation,
            None,
            None,
            Uuid::new_v4(),
        )
        .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[test]
    fn should_allow_zero_amount() {
        assert!(
            Payment::new(
                None,
                0,
                PaymentMethod::Cash,
                PaymentStatus::Paid,
                PaymentKind::Consultation,
                None,
                None,
                Uuid::new_v4(),
            )
            .is_ok()
        );
    }

    #[test]
    fn should_require_reference_for_mobile_money() {
        let err = Payment::new(
            None,
            5_000,
            PaymentMethod::MobileMoney,
            PaymentStatus::Paid,
            PaymentKind::Consultation,
            None,
            None,
            Uuid::new_v4(),
        )
        .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[test]
    fn should_settle_pending_payment() {
        let mut payment = pending_payment();
        payment
            .mark_paid(PaymentMethod::MobileMoney, Some("TX-123".into()))
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.reference.as_deref(), Some("TX-123"));
    }

    #[test]
    fn should_resettle_paid_payment_idempotently() {
        let mut payment = pending_payment();
        payment.mark_paid(PaymentMethod::Cash, None).unwrap();
        payment.mark_paid(PaymentMethod::Cash, Some("DESK-9".into())).unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.reference.as_deref(), Some("DESK-9"));
    }

    #[test]
    fn should_not_revive_cancelled_payment() {
        let mut payment = pending_payment();
        payment.mark_cancelled().unwrap();
        assert!(matches!(
            payment.mark_paid(PaymentMethod::Cash, None),
            Err(CareError::Conflict(_))
        ));
        assert!(matches!(payment.mark_cancelled(), Err(CareError::Conflict(_))));
    }

    #[test]
    fn should_price_sale_line_from_quantity() {
        let line = PaymentItem::new(Uuid::new_v4(), Uuid::new_v4(), 3, 1_500);
        assert_eq!(line.total_price, 4_500);
    }
}
