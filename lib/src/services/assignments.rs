// lib/src/services/assignments.rs
// Binds a patient to a doctor for one care episode. The creation procedure
// is the single place where the single-active-assignment invariant and the
// assignment/dossier pairing are enforced; registration reuses it inside its
// own transaction.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    ConsultationDossier, DoctorAssignment, PaymentKind, Principal, Role,
};

use crate::scope::ensure_role;
use crate::store::{MemoryStore, Tables};

/// Creates the assignment and its dossier as one unit, after checking every
/// precondition against the same table snapshot:
/// the doctor must be an available doctor account, the payment a settled
/// consultation payment, and the patient must not already hold an active
/// assignment.
pub(crate) fn create_assignment_records(
    tables: &mut Tables,
    patient_id: Uuid,
    doctor_id: Uuid,
    payment_id: Uuid,
    created_by: Uuid,
) -> CareResult<(DoctorAssignment, ConsultationDossier)> {
    tables.require_patient(patient_id)?;

    let doctor = tables.require_user(doctor_id)?;
    if doctor.role != Role::Doctor || !doctor.is_active_staff() {
        return Err(CareError::validation(format!(
            "User {} is not an available doctor",
            doctor_id
        )));
    }

    let payment = tables.require_payment(payment_id)?;
    if payment.kind != PaymentKind::Consultation || !payment.is_paid() {
        return Err(CareError::validation(
            "Payment must be a settled consultation payment",
        ));
    }

    if let Some(existing) = tables.active_assignment_for(patient_id) {
        return Err(CareError::conflict(format!(
            "Patient is already assigned to doctor {} (assignment {})",
            existing.doctor_id, existing.id
        )));
    }

    let assignment = DoctorAssignment::new(patient_id, doctor_id, payment_id, created_by);
    let dossier = ConsultationDossier::open(patient_id, doctor_id, assignment.id);
    tables.assignments.insert(assignment.id, assignment.clone());
    tables.dossiers.insert(dossier.id, dossier.clone());
    Ok((assignment, dossier))
}

/// Moves the episode's assignment into consultation when the doctor starts
/// authoring. A no-op when the assignment already progressed past `assigned`.
pub(crate) fn mark_assignment_in_consultation(
    tables: &mut Tables,
    assignment_id: Uuid,
) -> CareResult<()> {
    let assignment = tables.assignment_mut(assignment_id)?;
    if assignment.is_active() {
        assignment.begin_consultation()?;
    }
    Ok(())
}

/// Closes the episode's assignment when its dossier completes.
pub(crate) fn complete_assignment_for_dossier(
    tables: &mut Tables,
    assignment_id: Uuid,
) -> CareResult<()> {
    let assignment = tables.assignment_mut(assignment_id)?;
    if assignment.is_active() {
        assignment.complete()?;
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssignmentInput {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub payment_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct AssignmentManager {
    store: Arc<MemoryStore>,
}

impl AssignmentManager {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        AssignmentManager { store }
    }

    /// Assigns a patient to a doctor, opening the episode's dossier in the
    /// same transaction.
    ///
    /// # Errors
    ///
    /// `Conflict` when the patient already has an assignment in
    /// {assigned, in_consultation}; `Validation` when the doctor or payment
    /// do not qualify; `NotFound` when a referenced row is absent.
    pub async fn create_assignment(
        &self,
        input: CreateAssignmentInput,
        principal: &Principal,
    ) -> CareResult<(DoctorAssignment, ConsultationDossier)> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let created_by = principal.id;
        let (assignment, dossier) = self.store.write(move |tables| {
            create_assignment_records(
                tables,
                input.patient_id,
                input.doctor_id,
                input.payment_id,
                created_by,
            )
        })?;
        info!(
            assignment = %assignment.id,
            dossier = %dossier.id,
            patient = %assignment.patient_id,
            doctor = %assignment.doctor_id,
            "patient assigned, dossier opened"
        );
        Ok((assignment, dossier))
    }

    /// The patient's currently active assignment, if any.
    pub async fn active_assignment(
        &self,
        patient_id: Uuid,
    ) -> CareResult<Option<DoctorAssignment>> {
        self.store
            .read(move |tables| Ok(tables.active_assignment_for(patient_id)))
    }

    pub async fn list_assignments(
        &self,
        principal: &Principal,
    ) -> CareResult<Vec<DoctorAssignment>> {
        let scope_doctor = match principal.role {
            Role::Administrator | Role::Reception => None,
            Role::Doctor => Some(principal.id),
            _ => {
                return Err(CareError::forbidden(format!(
                    "Role {} may not list assignments",
                    principal.role
                )));
            }
        };
        self.store.read(move |tables| {
            let mut assignments: Vec<DoctorAssignment> = tables
                .assignments
                .values()
                .filter(|a| scope_doctor.map_or(true, |id| a.doctor_id == id))
                .cloned()
                .collect();
            assignments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(assignments)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;
    use models::{AssignmentStatus, DossierStatus};

    #[tokio::test]
    async fn should_open_dossier_with_assignment() {
        let cx = TestContext::new();
        let payment = cx.paid_consultation_payment().await;
        let (assignment, dossier) = cx
            .services
            .assignments
            .create_assignment(
                CreateAssignmentInput {
                    patient_id: cx.patient_id,
                    doctor_id: cx.doctor.id,
                    payment_id: payment.id,
                },
                &cx.reception,
            )
            .await
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Assigned);
        assert_eq!(dossier.status, DossierStatus::Active);
        assert_eq!(dossier.assignment_id, assignment.id);
        assert_eq!(dossier.patient_id, cx.patient_id);
    }

    #[tokio::test]
    async fn should_reject_second_active_assignment_for_same_patient() {
        let cx = TestContext::new();
        let payment = cx.paid_consultation_payment().await;
        cx.services
            .assignments
            .create_assignment(
                CreateAssignmentInput {
                    patient_id: cx.patient_id,
                    doctor_id: cx.doctor.id,
                    payment_id: payment.id,
                },
                &cx.reception,
            )
            .await
            .unwrap();

        let second_doctor = cx.add_doctor("second.doctor@hospital.test").await;
        let second_payment = cx.paid_consultation_payment().await;
        let err = cx
            .services
            .assignments
            .create_assignment(
                CreateAssignmentInput {
                    patient_id: cx.patient_id,
                    doctor_id: second_doctor,
                    payment_id: second_payment.id,
                },
                &cx.reception,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));
        assert!(err.to_string().contains("already assigned"));
    }

    #[tokio::test]
    async fn should_reject_unpaid_consultation_payment() {
        let cx = TestContext::new();
        let pending = cx.pending_consultation_payment().await;
        let err = cx
            .services
            .assignments
            .create_assignment(
                CreateAssignmentInput {
                    patient_id: cx.patient_id,
                    doctor_id: cx.doctor.id,
                    payment_id: pending.id,
                },
                &cx.reception,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[tokio::test]
    async fn should_reject_non_doctor_assignee() {
        let cx = TestContext::new();
        let payment = cx.paid_consultation_payment().await;
        let err = cx
            .services
            .assignments
            .create_assignment(
                CreateAssignmentInput {
                    patient_id: cx.patient_id,
                    doctor_id: cx.technician.id,
                    payment_id: payment.id,
                },
                &cx.reception,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[tokio::test]
    async fn should_allow_new_assignment_after_completion() {
        let cx = TestContext::new();
        let payment = cx.paid_consultation_payment().await;
        let (assignment, dossier) = cx
            .services
            .assignments
            .create_assignment(
                CreateAssignmentInput {
                    patient_id: cx.patient_id,
                    doctor_id: cx.doctor.id,
                    payment_id: payment.id,
                },
                &cx.reception,
            )
            .await
            .unwrap();
        cx.services
            .dossiers
            .complete_dossier(dossier.id, &cx.doctor)
            .await
            .unwrap();

        let current = cx
            .services
            .assignments
            .active_assignment(cx.patient_id)
            .await
            .unwrap();
        assert!(current.is_none(), "completed assignment {} still active", assignment.id);

        let next_payment = cx.paid_consultation_payment().await;
        assert!(
            cx.services
                .assignments
                .create_assignment(
                    CreateAssignmentInput {
                        patient_id: cx.patient_id,
                        doctor_id: cx.doctor.id,
                        payment_id: next_payment.id,
                    },
                    &cx.reception,
                )
                .await
                .is_ok()
        );
    }
}
