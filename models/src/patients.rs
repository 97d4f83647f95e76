// models/src/patients.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
}

/// Demographics captured at the registration desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
}

impl NewPatient {
    /// Field checks applied before any write.
    pub fn validate(&self) -> CareResult<()> {
        let first = self.first_name.trim();
        let last = self.last_name.trim();
        if first.len() < 2 || first.len() > 50 {
            return Err(CareError::validation(
                "First name must be between 2 and 50 characters",
            ));
        }
        if last.len() < 2 || last.len() > 50 {
            return Err(CareError::validation(
                "Last name must be between 2 and 50 characters",
            ));
        }
        if self.date_of_birth >= Utc::now().date_naive() {
            return Err(CareError::validation("Date of birth must be in the past"));
        }
        if self.phone.trim().is_empty() {
            return Err(CareError::validation("Phone number is required"));
        }
        Ok(())
    }
}

/// A registered patient. `hospital_number` is the human-facing token printed
/// on paperwork; `id` is the storage identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub hospital_number: String, // e.g. "HSP-2026-00042"
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub bed_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Validates the payload and materializes the stored record.
    pub fn from_new(new_patient: NewPatient, hospital_number: String) -> CareResult<Self> {
        new_patient.validate()?;
        let now = Utc::now();
        Ok(Patient {
            id: Uuid::new_v4(),
            hospital_number,
            first_name: new_patient.first_name.trim().to_string(),
            last_name: new_patient.last_name.trim().to_string(),
            date_of_birth: new_patient.date_of_birth,
            gender: new_patient.gender,
            phone: new_patient.phone.trim().to_string(),
            email: new_patient.email,
            address: new_patient.address,
            emergency_contact: new_patient.emergency_contact,
            bed_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewPatient {
        NewPatient {
            first_name: "Moussa".into(),
            last_name: "Ndiaye".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1988, 4, 12).unwrap(),
            gender: Gender::M,
            phone: "771234567".into(),
            email: None,
            address: Some("Médina, Dakar".into()),
            emergency_contact: None,
        }
    }

    #[test]
    fn should_accept_valid_registration() {
        let patient = Patient::from_new(sample(), "HSP-2026-00001".into()).unwrap();
        assert_eq!(patient.hospital_number, "HSP-2026-00001");
        assert!(patient.bed_id.is_none());
    }

    #[test]
    fn should_reject_single_letter_name() {
        let mut p = sample();
        p.first_name = "M".into();
        assert!(matches!(p.validate(), Err(CareError::Validation(_))));
    }

    #[test]
    fn should_reject_future_date_of_birth() {
        let mut p = sample();
        p.date_of_birth = Utc::now().date_naive() + chrono::Duration::days(1);
        assert!(p.validate().is_err());
    }

    #[test]
    fn should_reject_blank_phone() {
        let mut p = sample();
        p.phone = "   ".into();
        assert!(p.validate().is_err());
    }
}
