// models/src/lab_results.rs
// Result sheet for a lab request: draft -> validated -> sent, in that order.
// The most recent row per request is the authoritative one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabResultStatus {
    Draft,
    Validated,
    Sent,
}

impl LabResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabResultStatus::Draft => "draft",
            LabResultStatus::Validated => "validated",
            LabResultStatus::Sent => "sent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub id: Uuid,
    pub lab_request_id: Uuid,
    pub status: LabResultStatus,
    pub results: Value, // structured values keyed by exam/parameter
    pub technician_notes: Option<String>,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LabResult {
    pub fn draft(lab_request_id: Uuid, results: Value, notes: Option<String>) -> Self {
        let now = Utc::now();
        LabResult {
            id: Uuid::new_v4(),
            lab_request_id,
            status: LabResultStatus::Draft,
            results,
            technician_notes: notes,
            validated_by: None,
            validated_at: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rewrites the sheet and drops it back to draft, clearing any earlier
    /// validation stamps. Sent results are immutable.
    pub fn redraft(&mut self, results: Value, notes: Option<String>) -> CareResult<()> {
        if self.status == LabResultStatus::Sent {
            return Err(CareError::conflict(
                "Result was already sent and can no longer be edited",
            ));
        }
        self.results = results;
        if notes.is_some() {
            self.technician_notes = notes;
        }
        self.status = LabResultStatus::Draft;
        self.validated_by = None;
        self.validated_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// draft -> validated, stamping who validated and when.
    pub fn validate(&mut self, validated_by: Uuid) -> CareResult<()> {
        if self.status != LabResultStatus::Draft {
            return Err(CareError::conflict(format!(
                "Result is {}, only a draft can be validated",
                self.status.as_str()
            )));
        }
        self.status = LabResultStatus::Validated;
        self.validated_by = Some(validated_by);
        self.validated_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// validated -> sent. The caller flips the parent request in the same
    /// transaction.
    pub fn send(&mut self) -> CareResult<()> {
        if self.status != LabResultStatus::Validated {
            return Err(CareError::conflict(format!(
                "Result is {}, only a validated result can be sent",
                self.status.as_str()
            )));
        }
        self.status = LabResultStatus::Sent;
        self.sent_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }
}
