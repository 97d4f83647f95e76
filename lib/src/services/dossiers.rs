// lib/src/services/dossiers.rs
// The dossier is the episode folder. Completing it closes the assignment and
// any consultation still open inside it; archiving freezes it against every
// further write.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    AncillaryKind, Consultation, ConsultationDossier, ConsultationStatus, DossierStatus,
    Prescription, Principal, Role,
};

use crate::scope::{ensure_role, RequestView};
use crate::services::assignments::complete_assignment_for_dossier;
use crate::store::{MemoryStore, Tables};

/// Everything a doctor sees when opening an episode folder.
#[derive(Debug, Clone, Serialize)]
pub struct DossierDetail {
    pub dossier: ConsultationDossier,
    pub consultation: Option<Consultation>,
    pub lab_requests: Vec<RequestView>,
    pub imaging_requests: Vec<RequestView>,
    pub prescriptions: Vec<Prescription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DossierFilter {
    pub status: Option<DossierStatus>,
    pub patient_id: Option<Uuid>,
}

/// Completes the dossier and closes out the rest of the episode in the same
/// snapshot: the assignment ends, and an in-progress consultation is marked
/// completed so no orphan remains open.
pub(crate) fn complete_dossier_records(tables: &mut Tables, dossier_id: Uuid) -> CareResult<ConsultationDossier> {
    let (assignment_id, consultation_id) = {
        let dossier = tables.dossier_mut(dossier_id)?;
        dossier.complete()?;
        (dossier.assignment_id, dossier.consultation_id)
    };
    complete_assignment_for_dossier(tables, assignment_id)?;
    if let Some(consultation_id) = consultation_id {
        let consultation = tables.consultation_mut(consultation_id)?;
        if consultation.status != ConsultationStatus::Completed {
            consultation.complete()?;
        }
    }
    tables.require_dossier(dossier_id)
}

/// Cascade hook for consultation completion. Finds the active dossier the
/// consultation is linked to, if any, and completes it.
pub(crate) fn complete_dossier_for_consultation(
    tables: &mut Tables,
    consultation_id: Uuid,
) -> CareResult<Option<Uuid>> {
    let target = tables
        .dossiers
        .values()
        .find(|d| d.consultation_id == Some(consultation_id) && d.status == DossierStatus::Active)
        .map(|d| d.id);
    match target {
        Some(dossier_id) => {
            complete_dossier_records(tables, dossier_id)?;
            Ok(Some(dossier_id))
        }
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct DossierService {
    store: Arc<MemoryStore>,
}

impl DossierService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        DossierService { store }
    }

    fn ensure_owner(dossier: &ConsultationDossier, principal: &Principal) -> CareResult<()> {
        if principal.is_administrator() || dossier.doctor_id == principal.id {
            return Ok(());
        }
        Err(CareError::forbidden(
            "Only the assigned doctor may act on this dossier",
        ))
    }

    /// Closes the episode. The assignment completes with the dossier, and a
    /// consultation still in progress is completed alongside.
    pub async fn complete_dossier(
        &self,
        dossier_id: Uuid,
        principal: &Principal,
    ) -> CareResult<ConsultationDossier> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let principal = *principal;
        let dossier = self.store.write(move |tables| {
            let dossier = tables.require_dossier(dossier_id)?;
            Self::ensure_owner(&dossier, &principal)?;
            complete_dossier_records(tables, dossier_id)
        })?;
        info!(dossier = %dossier.id, patient = %dossier.patient_id, "dossier completed");
        Ok(dossier)
    }

    /// Freezes a completed episode. Archived dossiers reject consultation
    /// edits, new ancillary requests and new prescriptions.
    pub async fn archive_dossier(
        &self,
        dossier_id: Uuid,
        reason: Option<String>,
        principal: &Principal,
    ) -> CareResult<ConsultationDossier> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let principal = *principal;
        let dossier = self.store.write(move |tables| {
            let dossier = tables.require_dossier(dossier_id)?;
            Self::ensure_owner(&dossier, &principal)?;
            let dossier = tables.dossier_mut(dossier_id)?;
            dossier.archive(principal.id, reason)?;
            Ok(dossier.clone())
        })?;
        info!(dossier = %dossier.id, "dossier archived");
        Ok(dossier)
    }

    /// The full episode folder: dossier, its consultation, the episode's lab
    /// and imaging orders with their payment standing, and prescriptions.
    pub async fn dossier_detail(
        &self,
        dossier_id: Uuid,
        principal: &Principal,
    ) -> CareResult<DossierDetail> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let principal = *principal;
        self.store.read(move |tables| {
            let dossier = tables.require_dossier(dossier_id)?;
            Self::ensure_owner(&dossier, &principal)?;

            let consultation = dossier
                .consultation_id
                .and_then(|id| tables.consultations.get(&id))
                .cloned();
            let episode_requests = |kind: AncillaryKind| -> Vec<RequestView> {
                let mut views: Vec<RequestView> = tables
                    .requests(kind)
                    .values()
                    .filter(|r| {
                        r.patient_id == dossier.patient_id && r.doctor_id == dossier.doctor_id
                    })
                    .map(|r| RequestView::project(tables, r.clone()))
                    .collect();
                views.sort_by(|a, b| b.request.created_at.cmp(&a.request.created_at));
                views
            };
            let mut prescriptions: Vec<Prescription> = tables
                .prescriptions
                .values()
                .filter(|p| {
                    p.patient_id == dossier.patient_id && p.doctor_id == dossier.doctor_id
                })
                .cloned()
                .collect();
            prescriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            Ok(DossierDetail {
                lab_requests: episode_requests(AncillaryKind::Lab),
                imaging_requests: episode_requests(AncillaryKind::Imaging),
                consultation,
                prescriptions,
                dossier,
            })
        })
    }

    /// Doctors see their own dossiers, administrators see all of them.
    pub async fn list_dossiers(
        &self,
        filter: DossierFilter,
        principal: &Principal,
    ) -> CareResult<Vec<ConsultationDossier>> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let scope_doctor = (principal.role == Role::Doctor).then_some(principal.id);
        self.store.read(move |tables| {
            let mut dossiers: Vec<ConsultationDossier> = tables
                .dossiers
                .values()
                .filter(|d| scope_doctor.map_or(true, |id| d.doctor_id == id))
                .filter(|d| filter.status.map_or(true, |s| d.status == s))
                .filter(|d| filter.patient_id.map_or(true, |id| d.patient_id == id))
                .cloned()
                .collect();
            dossiers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(dossiers)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;
    use models::AssignmentStatus;

    #[tokio::test]
    async fn should_complete_assignment_with_dossier() {
        let cx = TestContext::new();
        let (assignment, dossier) = cx.assigned_episode().await;
        let completed = cx
            .services
            .dossiers
            .complete_dossier(dossier.id, &cx.doctor)
            .await
            .unwrap();
        assert_eq!(completed.status, DossierStatus::Completed);
        assert!(completed.completed_at.is_some());

        let assignment = cx
            .store
            .read(|tables| tables.require_assignment(assignment.id))
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Completed);
    }

    #[tokio::test]
    async fn should_forbid_foreign_doctor_from_completing() {
        let cx = TestContext::new();
        let (_, dossier) = cx.assigned_episode().await;
        let intruder_id = cx.add_doctor("other.doctor@hospital.test").await;
        let intruder = Principal {
            id: intruder_id,
            role: Role::Doctor,
        };
        let err = cx
            .services
            .dossiers
            .complete_dossier(dossier.id, &intruder)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }

    #[tokio::test]
    async fn should_archive_only_completed_dossiers() {
        let cx = TestContext::new();
        let (_, dossier) = cx.assigned_episode().await;
        let err = cx
            .services
            .dossiers
            .archive_dossier(dossier.id, None, &cx.doctor)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));

        cx.services
            .dossiers
            .complete_dossier(dossier.id, &cx.doctor)
            .await
            .unwrap();
        let archived = cx
            .services
            .dossiers
            .archive_dossier(dossier.id, Some("episode closed".into()), &cx.doctor)
            .await
            .unwrap();
        assert_eq!(archived.status, DossierStatus::Archived);
        assert_eq!(archived.archived_by, Some(cx.doctor.id));
        assert_eq!(archived.archive_reason.as_deref(), Some("episode closed"));
    }

    #[tokio::test]
    async fn should_scope_dossier_lists_to_owning_doctor() {
        let cx = TestContext::new();
        let (_, dossier) = cx.assigned_episode().await;

        let own = cx
            .services
            .dossiers
            .list_dossiers(DossierFilter::default(), &cx.doctor)
            .await
            .unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, dossier.id);

        let other_id = cx.add_doctor("quiet.doctor@hospital.test").await;
        let other = Principal {
            id: other_id,
            role: Role::Doctor,
        };
        let foreign = cx
            .services
            .dossiers
            .list_dossiers(DossierFilter::default(), &other)
            .await
            .unwrap();
        assert!(foreign.is_empty());

        let all = cx
            .services
            .dossiers
            .list_dossiers(DossierFilter::default(), &cx.admin)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }
}
