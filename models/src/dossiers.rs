// models/src/dossiers.rs
// The doctor-owned working record of one care episode. Transitions are
// strictly ordered and unidirectional: active -> completed -> archived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DossierStatus {
    Active,
    Completed,
    Archived,
}

impl DossierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DossierStatus::Active => "active",
            DossierStatus::Completed => "completed",
            DossierStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationDossier {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub assignment_id: Uuid, // weak back-reference, lookup only
    pub consultation_id: Option<Uuid>,
    pub status: DossierStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_by: Option<Uuid>,
    pub archive_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsultationDossier {
    pub fn open(patient_id: Uuid, doctor_id: Uuid, assignment_id: Uuid) -> Self {
        let now = Utc::now();
        ConsultationDossier {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            assignment_id,
            consultation_id: None,
            status: DossierStatus::Active,
            completed_at: None,
            archived_at: None,
            archived_by: None,
            archive_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Gate applied by every operation that attaches new clinical work
    /// (requests, prescriptions, consultation edits) to this dossier.
    pub fn ensure_writable(&self) -> CareResult<()> {
        if self.status == DossierStatus::Archived {
            return Err(CareError::conflict("dossier archived"));
        }
        Ok(())
    }

    /// active -> completed, stamping `completed_at`.
    pub fn complete(&mut self) -> CareResult<()> {
        if self.status != DossierStatus::Active {
            return Err(CareError::conflict(format!(
                "Dossier is {}, only an active dossier can be completed",
                self.status.as_str()
            )));
        }
        self.status = DossierStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// completed -> archived. An active dossier must complete first.
    pub fn archive(&mut self, archived_by: Uuid, reason: Option<String>) -> CareResult<()> {
        if self.status != DossierStatus::Completed {
            return Err(CareError::conflict(format!(
                "Dossier is {}, only a completed dossier can be archived",
                self.status.as_str()
            )));
        }
        self.status = DossierStatus::Archived;
        self.archived_at = Some(Utc::now());
        self.archived_by = Some(archived_by);
        self.archive_reason = reason;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dossier() -> ConsultationDossier {
        ConsultationDossier::open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn should_walk_the_full_lifecycle_in_order() {
        let mut d = dossier();
        assert!(d.ensure_writable().is_ok());
        d.complete().unwrap();
        assert!(d.completed_at.is_some());
        let archivist = Uuid::new_v4();
        d.archive(archivist, Some("no further visits".into())).unwrap();
        assert_eq!(d.status, DossierStatus::Archived);
        assert_eq!(d.archived_by, Some(archivist));
        assert!(d.archived_at.is_some());
    }

    #[test]
    fn should_not_archive_active_dossier_directly() {
        let mut d = dossier();
        assert!(matches!(
            d.archive(Uuid::new_v4(), None),
            Err(CareError::Conflict(_))
        ));
    }

    #[test]
    fn should_not_complete_twice() {
        let mut d = dossier();
        d.complete().unwrap();
        assert!(matches!(d.complete(), Err(CareError::Conflict(_))));
    }

    #[test]
    fn should_refuse_new_work_once_archived() {
        let mut d = dossier();
        d.complete().unwrap();
        d.archive(Uuid::new_v4(), None).unwrap();
        let err = d.ensure_writable().unwrap_err();
        assert_eq!(err.to_string(), "Conflict: dossier archived");
    }
}
