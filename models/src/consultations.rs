// models/src/consultations.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Waiting,
    InProgress,
    Completed,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Waiting => "waiting",
            ConsultationStatus::InProgress => "in_progress",
            ConsultationStatus::Completed => "completed",
        }
    }
}

/// The fields a doctor may write during authoring. All optional; an upsert
/// merges what is present and leaves the rest untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsultationDraft {
    pub symptoms: Option<String>,
    pub vitals: Option<Value>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
}

impl ConsultationDraft {
    pub fn is_empty(&self) -> bool {
        self.symptoms.is_none()
            && self.vitals.is_none()
            && self.diagnosis.is_none()
            && self.notes.is_none()
    }
}

/// At most one consultation exists per dossier; repeated creates merge into
/// the existing row instead of inserting a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub symptoms: Option<String>,
    pub vitals: Option<Value>, // free-form measurements, e.g. {"bp": "120/80"}
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub status: ConsultationStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consultation {
    pub fn begin(patient_id: Uuid, doctor_id: Uuid, draft: ConsultationDraft) -> Self {
        let now = Utc::now();
        Consultation {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            symptoms: draft.symptoms,
            vitals: draft.vitals,
            diagnosis: draft.diagnosis,
            notes: draft.notes,
            status: ConsultationStatus::InProgress,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Partial-update semantics: only fields present in the draft change.
    pub fn apply(&mut self, draft: ConsultationDraft) {
        if let Some(symptoms) = draft.symptoms {
            self.symptoms = Some(symptoms);
        }
        if let Some(vitals) = draft.vitals {
            self.vitals = Some(vitals);
        }
        if let Some(diagnosis) = draft.diagnosis {
            self.diagnosis = Some(diagnosis);
        }
        if let Some(notes) = draft.notes {
            self.notes = Some(notes);
        }
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) -> CareResult<()> {
        if self.status == ConsultationStatus::Completed {
            return Err(CareError::conflict("Consultation is already completed"));
        }
        self.status = ConsultationStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }
}
