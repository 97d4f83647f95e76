// models/src/prescriptions.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Draft,
    SentToPharmacy,
    Completed,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Draft => "draft",
            PrescriptionStatus::SentToPharmacy => "sent_to_pharmacy",
            PrescriptionStatus::Completed => "completed",
        }
    }
}

/// Medication line as submitted by the doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrescriptionItem {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: u32,
    pub instructions: Option<String>,
}

impl NewPrescriptionItem {
    /// Every line must be dispensable on its own: drug, dose, schedule,
    /// duration and a positive quantity.
    pub fn validate(&self) -> CareResult<()> {
        let mut missing = Vec::new();
        if self.medication.trim().is_empty() {
            missing.push("medication");
        }
        if self.dosage.trim().is_empty() {
            missing.push("dosage");
        }
        if self.frequency.trim().is_empty() {
            missing.push("frequency");
        }
        if self.duration.trim().is_empty() {
            missing.push("duration");
        }
        if self.quantity == 0 {
            missing.push("quantity");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CareError::validation(format!(
                "Each prescription item requires medication, dosage, frequency, duration and a positive quantity (missing: {})",
                missing.join(", ")
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub status: PrescriptionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    pub fn draft(
        patient_id: Uuid,
        doctor_id: Uuid,
        consultation_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Prescription {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            consultation_id,
            status: PrescriptionStatus::Draft,
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// draft -> sent_to_pharmacy.
    pub fn send_to_pharmacy(&mut self) -> CareResult<()> {
        if self.status != PrescriptionStatus::Draft {
            return Err(CareError::conflict(format!(
                "Prescription is {}, only a draft can be sent to the pharmacy",
                self.status.as_str()
            )));
        }
        self.status = PrescriptionStatus::SentToPharmacy;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// sent_to_pharmacy -> completed, once dispensed.
    pub fn complete(&mut self) -> CareResult<()> {
        if self.status != PrescriptionStatus::SentToPharmacy {
            return Err(CareError::conflict(format!(
                "Prescription is {}, only a sent prescription can be completed",
                self.status.as_str()
            )));
        }
        self.status = PrescriptionStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: u32,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PrescriptionItem {
    pub fn from_new(prescription_id: Uuid, item: NewPrescriptionItem) -> Self {
        PrescriptionItem {
            id: Uuid::new_v4(),
            prescription_id,
            medication: item.medication,
            dosage: item.dosage,
            frequency: item.frequency,
            duration: item.duration,
            quantity: item.quantity,
            instructions: item.instructions,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> NewPrescriptionItem {
        NewPrescriptionItem {
            medication: "Amoxicillin 500mg".into(),
            dosage: "1 capsule".into(),
            frequency: "3x daily".into(),
            duration: "7 days".into(),
            quantity: 21,
            instructions: None,
        }
    }

    #[test]
    fn should_name_missing_item_fields() {
        let mut bad = item();
        bad.dosage = "".into();
        bad.quantity = 0;
        let err = bad.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dosage"));
        assert!(msg.contains("quantity"));
    }

    #[test]
    fn should_send_draft_only_once() {
        let mut p = Prescription::draft(Uuid::new_v4(), Uuid::new_v4(), None, None);
        p.send_to_pharmacy().unwrap();
        assert!(matches!(p.send_to_pharmacy(), Err(CareError::Conflict(_))));
    }
}
