// lib/src/services/consultations.rs
// Consultation authoring. A dossier carries at most one consultation; the
// upsert either begins it or merges the draft into the existing row, and the
// first upsert is what moves the assignment into `in_consultation`.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{Consultation, ConsultationDraft, Principal, Role};

use crate::scope::ensure_role;
use crate::services::assignments::mark_assignment_in_consultation;
use crate::services::dossiers::complete_dossier_for_consultation;
use crate::store::MemoryStore;

#[derive(Debug, Clone)]
pub struct ConsultationService {
    store: Arc<MemoryStore>,
}

impl ConsultationService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        ConsultationService { store }
    }

    /// Creates or updates the dossier's consultation. Present draft fields
    /// overwrite, absent ones are left alone, so partial saves from the
    /// consultation form never wipe earlier notes.
    ///
    /// # Errors
    ///
    /// `Forbidden` when the caller is not the dossier's doctor, `Conflict`
    /// when the dossier is archived, `Validation` for an empty draft.
    pub async fn upsert_consultation(
        &self,
        dossier_id: Uuid,
        draft: ConsultationDraft,
        principal: &Principal,
    ) -> CareResult<Consultation> {
        ensure_role(principal, &[Role::Doctor])?;
        if draft.is_empty() {
            return Err(CareError::validation(
                "At least one consultation field must be provided",
            ));
        }
        let doctor_id = principal.id;
        let consultation = self.store.write(move |tables| {
            let dossier = tables.require_dossier(dossier_id)?;
            if dossier.doctor_id != doctor_id {
                return Err(CareError::forbidden(
                    "Only the assigned doctor may write this consultation",
                ));
            }
            dossier.ensure_writable()?;

            match dossier.consultation_id {
                Some(consultation_id) => {
                    let consultation = tables.consultation_mut(consultation_id)?;
                    consultation.apply(draft);
                    Ok(consultation.clone())
                }
                None => {
                    let consultation =
                        Consultation::begin(dossier.patient_id, dossier.doctor_id, draft);
                    tables
                        .consultations
                        .insert(consultation.id, consultation.clone());
                    {
                        let dossier = tables.dossier_mut(dossier_id)?;
                        dossier.consultation_id = Some(consultation.id);
                        dossier.updated_at = consultation.created_at;
                    }
                    mark_assignment_in_consultation(tables, dossier.assignment_id)?;
                    Ok(consultation)
                }
            }
        })?;
        info!(
            consultation = %consultation.id,
            dossier = %dossier_id,
            "consultation saved"
        );
        Ok(consultation)
    }

    /// Finishes the consultation and cascades: the linked active dossier
    /// completes, which in turn closes the assignment.
    pub async fn complete_consultation(
        &self,
        consultation_id: Uuid,
        principal: &Principal,
    ) -> CareResult<Consultation> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let principal = *principal;
        let (consultation, dossier_id) = self.store.write(move |tables| {
            let consultation = tables.require_consultation(consultation_id)?;
            if principal.role == Role::Doctor && consultation.doctor_id != principal.id {
                return Err(CareError::forbidden(
                    "Only the consulting doctor may complete this consultation",
                ));
            }
            tables.consultation_mut(consultation_id)?.complete()?;
            let dossier_id = complete_dossier_for_consultation(tables, consultation_id)?;
            tables.require_consultation(consultation_id).map(|c| (c, dossier_id))
        })?;
        match dossier_id {
            Some(dossier_id) => info!(
                consultation = %consultation.id,
                dossier = %dossier_id,
                "consultation completed, dossier closed"
            ),
            None => info!(consultation = %consultation.id, "consultation completed"),
        }
        Ok(consultation)
    }

    pub async fn get_consultation(
        &self,
        consultation_id: Uuid,
        principal: &Principal,
    ) -> CareResult<Consultation> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let principal = *principal;
        self.store.read(move |tables| {
            let consultation = tables.require_consultation(consultation_id)?;
            if principal.role == Role::Doctor && consultation.doctor_id != principal.id {
                return Err(CareError::forbidden(
                    "Only the consulting doctor may view this consultation",
                ));
            }
            Ok(consultation)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;
    use models::{AssignmentStatus, ConsultationStatus, DossierStatus};
    use serde_json::json;

    fn draft(symptoms: &str) -> ConsultationDraft {
        ConsultationDraft {
            symptoms: Some(symptoms.to_string()),
            vitals: None,
            diagnosis: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn should_begin_consultation_and_move_assignment() {
        let cx = TestContext::new();
        let (assignment, dossier) = cx.assigned_episode().await;
        let consultation = cx
            .services
            .consultations
            .upsert_consultation(dossier.id, draft("fever, headache"), &cx.doctor)
            .await
            .unwrap();
        assert_eq!(consultation.status, ConsultationStatus::InProgress);

        let (assignment, dossier) = cx
            .store
            .read(|tables| {
                Ok((
                    tables.require_assignment(assignment.id)?,
                    tables.require_dossier(dossier.id)?,
                ))
            })
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::InConsultation);
        assert_eq!(dossier.consultation_id, Some(consultation.id));
    }

    #[tokio::test]
    async fn should_merge_repeated_upserts_into_one_row() {
        let cx = TestContext::new();
        let (_, dossier) = cx.assigned_episode().await;
        let first = cx
            .services
            .consultations
            .upsert_consultation(dossier.id, draft("fever"), &cx.doctor)
            .await
            .unwrap();
        let second = cx
            .services
            .consultations
            .upsert_consultation(
                dossier.id,
                ConsultationDraft {
                    symptoms: None,
                    vitals: Some(json!({"temp_c": 38.5})),
                    diagnosis: Some("malaria suspected".to_string()),
                    notes: None,
                },
                &cx.doctor,
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.symptoms.as_deref(), Some("fever"));
        assert_eq!(second.diagnosis.as_deref(), Some("malaria suspected"));
        let count = cx
            .store
            .read(|tables| Ok(tables.consultations.len()))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn should_reject_upsert_on_archived_dossier() {
        let cx = TestContext::new();
        let (_, dossier) = cx.assigned_episode().await;
        cx.services
            .dossiers
            .complete_dossier(dossier.id, &cx.doctor)
            .await
            .unwrap();
        cx.services
            .dossiers
            .archive_dossier(dossier.id, None, &cx.doctor)
            .await
            .unwrap();

        let err = cx
            .services
            .consultations
            .upsert_consultation(dossier.id, draft("late note"), &cx.doctor)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Conflict: dossier archived");
    }

    #[tokio::test]
    async fn should_cascade_completion_to_dossier_and_assignment() {
        let cx = TestContext::new();
        let (assignment, dossier) = cx.assigned_episode().await;
        let consultation = cx
            .services
            .consultations
            .upsert_consultation(dossier.id, draft("fever"), &cx.doctor)
            .await
            .unwrap();
        let completed = cx
            .services
            .consultations
            .complete_consultation(consultation.id, &cx.doctor)
            .await
            .unwrap();
        assert_eq!(completed.status, ConsultationStatus::Completed);

        let (assignment, dossier) = cx
            .store
            .read(|tables| {
                Ok((
                    tables.require_assignment(assignment.id)?,
                    tables.require_dossier(dossier.id)?,
                ))
            })
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Completed);
        assert_eq!(dossier.status, DossierStatus::Completed);
    }

    #[tokio::test]
    async fn should_reject_empty_draft() {
        let cx = TestContext::new();
        let (_, dossier) = cx.assigned_episode().await;
        let err = cx
            .services
            .consultations
            .upsert_consultation(dossier.id, ConsultationDraft::default(), &cx.doctor)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }
}
