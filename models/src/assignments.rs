// models/src/assignments.rs
// Binds a patient to a doctor for one care episode. At most one assignment
// per patient may be in {assigned, in_consultation} at any time; the store
// enforces that at creation under its transaction lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    InConsultation,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InConsultation => "in_consultation",
            AssignmentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorAssignment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub payment_id: Uuid,
    pub status: AssignmentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorAssignment {
    pub fn new(patient_id: Uuid, doctor_id: Uuid, payment_id: Uuid, created_by: Uuid) -> Self {
        let now = Utc::now();
        DoctorAssignment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            payment_id,
            status: AssignmentStatus::Assigned,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// An assignment still occupying the patient's single active slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            AssignmentStatus::Assigned | AssignmentStatus::InConsultation
        )
    }

    /// Driven by the first consultation upsert on the episode's dossier.
    /// Calling it again while already in consultation is a no-op.
    pub fn begin_consultation(&mut self) -> CareResult<()> {
        match self.status {
            AssignmentStatus::Assigned => {
                self.status = AssignmentStatus::InConsultation;
                self.updated_at = Utc::now();
                Ok(())
            }
            AssignmentStatus::InConsultation => Ok(()),
            AssignmentStatus::Completed => Err(CareError::conflict(
                "Assignment is already completed",
            )),
        }
    }

    /// Driven by dossier completion.
    pub fn complete(&mut self) -> CareResult<()> {
        if self.status == AssignmentStatus::Completed {
            return Err(CareError::conflict("Assignment is already completed"));
        }
        self.status = AssignmentStatus::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> DoctorAssignment {
        DoctorAssignment::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn should_start_in_assigned_state() {
        let a = assignment();
        assert_eq!(a.status, AssignmentStatus::Assigned);
        assert!(a.is_active());
    }

    #[test]
    fn should_advance_through_consultation_to_completed() {
        let mut a = assignment();
        a.begin_consultation().unwrap();
        assert_eq!(a.status, AssignmentStatus::InConsultation);
        a.begin_consultation().unwrap(); // repeated upsert, still in consultation
        a.complete().unwrap();
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert!(!a.is_active());
    }

    #[test]
    fn should_reject_consultation_on_completed_assignment() {
        let mut a = assignment();
        a.complete().unwrap();
        assert!(matches!(a.begin_consultation(), Err(CareError::Conflict(_))));
        assert!(matches!(a.complete(), Err(CareError::Conflict(_))));
    }
}
