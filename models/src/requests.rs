// models/src/requests.rs
// Lab and imaging orders. Both kinds run the same workflow over separate
// tables; the struct carries its kind so logs and references stay honest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};
use crate::payments::{PaymentKind, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncillaryKind {
    Lab,
    Imaging,
}

impl AncillaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AncillaryKind::Lab => "lab",
            AncillaryKind::Imaging => "imaging",
        }
    }

    /// Prefix for the gating payment's human-facing reference.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            AncillaryKind::Lab => "LAB",
            AncillaryKind::Imaging => "IMG",
        }
    }

    pub fn payment_kind(&self) -> PaymentKind {
        match self {
            AncillaryKind::Lab => PaymentKind::Lab,
            AncillaryKind::Imaging => PaymentKind::Imaging,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    SentToDoctor,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::SentToDoctor => "sent_to_doctor",
        }
    }
}

/// An ancillary order. `total_amount` is frozen at creation from the catalog
/// prices of the selected exams; later catalog edits never touch it.
/// `results` is only ever written on the imaging path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncillaryRequest {
    pub id: Uuid,
    pub kind: AncillaryKind,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub status: RequestStatus,
    pub total_amount: i64,
    pub payment_id: Option<Uuid>,
    pub results: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AncillaryRequest {
    pub fn new(
        kind: AncillaryKind,
        patient_id: Uuid,
        doctor_id: Uuid,
        consultation_id: Option<Uuid>,
        total_amount: i64,
    ) -> Self {
        let now = Utc::now();
        AncillaryRequest {
            id: Uuid::new_v4(),
            kind,
            patient_id,
            doctor_id,
            consultation_id,
            technician_id: None,
            status: RequestStatus::Pending,
            total_amount,
            payment_id: None,
            results: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal transition: the order leaves the fulfillment queue and
    /// becomes visible to the ordering doctor.
    pub fn send_to_doctor(&mut self) -> CareResult<()> {
        if self.status == RequestStatus::SentToDoctor {
            return Err(CareError::conflict("Request was already sent to the doctor"));
        }
        self.status = RequestStatus::SentToDoctor;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Per-exam line of a request, with the price frozen at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestExam {
    pub id: Uuid,
    pub request_id: Uuid,
    pub exam_id: Uuid,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

impl RequestExam {
    pub fn new(request_id: Uuid, exam_id: Uuid, price: i64) -> Self {
        RequestExam {
            id: Uuid::new_v4(),
            request_id,
            exam_id,
            price,
            created_at: Utc::now(),
        }
    }
}

/// The one authoritative projection of "where is this order really" that
/// joins the request's own status with its gating payment's. Evaluated in
/// the query layer only; handlers never re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    AwaitingPayment,
    PaymentCancelled,
    InProgress,
    SentToDoctor,
}

impl EffectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveStatus::AwaitingPayment => "awaiting_payment",
            EffectiveStatus::PaymentCancelled => "payment_cancelled",
            EffectiveStatus::InProgress => "in_progress",
            EffectiveStatus::SentToDoctor => "sent_to_doctor",
        }
    }
}

/// `payment` is `None` for legacy orders created before gating payments
/// existed; those count as unpaid.
pub fn effective_status(
    request: RequestStatus,
    payment: Option<PaymentStatus>,
) -> EffectiveStatus {
    match (request, payment) {
        (RequestStatus::SentToDoctor, _) => EffectiveStatus::SentToDoctor,
        (RequestStatus::Pending, Some(PaymentStatus::Paid)) => EffectiveStatus::InProgress,
        (RequestStatus::Pending, Some(PaymentStatus::Cancelled)) => {
            EffectiveStatus::PaymentCancelled
        }
        (RequestStatus::Pending, Some(PaymentStatus::Pending) | None) => {
            EffectiveStatus::AwaitingPayment
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_project_unpaid_pending_as_awaiting_payment() {
        assert_eq!(
            effective_status(RequestStatus::Pending, Some(PaymentStatus::Pending)),
            EffectiveStatus::AwaitingPayment
        );
        assert_eq!(
            effective_status(RequestStatus::Pending, None),
            EffectiveStatus::AwaitingPayment
        );
    }

    #[test]
    fn should_project_paid_pending_as_in_progress() {
        assert_eq!(
            effective_status(RequestStatus::Pending, Some(PaymentStatus::Paid)),
            EffectiveStatus::InProgress
        );
    }

    #[test]
    fn should_let_delivery_win_over_payment_state() {
        // Once sent, the order is with the doctor no matter what the ledger
        // later does to the payment row.
        assert_eq!(
            effective_status(RequestStatus::SentToDoctor, Some(PaymentStatus::Cancelled)),
            EffectiveStatus::SentToDoctor
        );
    }

    #[test]
    fn should_flag_cancelled_payment() {
        assert_eq!(
            effective_status(RequestStatus::Pending, Some(PaymentStatus::Cancelled)),
            EffectiveStatus::PaymentCancelled
        );
    }

    #[test]
    fn should_not_send_twice() {
        let mut request = AncillaryRequest::new(
            AncillaryKind::Imaging,
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            12_000,
        );
        request.send_to_doctor().unwrap();
        assert!(request.send_to_doctor().is_err());
    }
}
