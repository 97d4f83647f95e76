// lib/src/services/prescriptions.rs
// Doctor-authored prescriptions flowing to the pharmacy. Creation is gated
// on the episode's dossier not being archived, mirroring the gate on
// ancillary orders.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    NewPrescriptionItem, Prescription, PrescriptionItem, PrescriptionStatus, Principal, Role,
};

use crate::scope::ensure_role;
use crate::store::MemoryStore;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrescriptionInput {
    pub patient_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub items: Vec<NewPrescriptionItem>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionWithItems {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub items: Vec<PrescriptionItem>,
}

#[derive(Debug, Clone)]
pub struct PrescriptionService {
    store: Arc<MemoryStore>,
}

impl PrescriptionService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        PrescriptionService { store }
    }

    /// Drafts a prescription with its lines in one transaction.
    ///
    /// # Errors
    ///
    /// `Validation` when the item list is empty or any line is incomplete,
    /// `Forbidden` when the referenced consultation belongs to another
    /// doctor, `Conflict` when the episode's dossier is archived.
    pub async fn create_prescription(
        &self,
        input: CreatePrescriptionInput,
        principal: &Principal,
    ) -> CareResult<PrescriptionWithItems> {
        ensure_role(principal, &[Role::Doctor])?;
        if input.items.is_empty() {
            return Err(CareError::validation(
                "A prescription requires at least one item",
            ));
        }
        for item in &input.items {
            item.validate()?;
        }
        let doctor_id = principal.id;
        let created = self.store.write(move |tables| {
            tables.require_patient(input.patient_id)?;
            if let Some(consultation_id) = input.consultation_id {
                let consultation = tables.require_consultation(consultation_id)?;
                if consultation.doctor_id != doctor_id {
                    return Err(CareError::forbidden(
                        "Consultation belongs to another doctor",
                    ));
                }
            }

            let dossier = match input.consultation_id {
                Some(consultation_id) => tables.dossier_for_consultation(consultation_id),
                None => tables.latest_dossier_for(input.patient_id, doctor_id),
            };
            if let Some(dossier) = dossier {
                dossier.ensure_writable()?;
            }

            let prescription = Prescription::draft(
                input.patient_id,
                doctor_id,
                input.consultation_id,
                input.notes.clone(),
            );
            let items: Vec<PrescriptionItem> = input
                .items
                .iter()
                .cloned()
                .map(|item| PrescriptionItem::from_new(prescription.id, item))
                .collect();
            for item in &items {
                tables.prescription_items.insert(item.id, item.clone());
            }
            tables
                .prescriptions
                .insert(prescription.id, prescription.clone());
            Ok(PrescriptionWithItems {
                prescription,
                items,
            })
        })?;
        info!(
            prescription = %created.prescription.id,
            patient = %created.prescription.patient_id,
            lines = created.items.len(),
            "prescription drafted"
        );
        Ok(created)
    }

    /// Releases a draft to the pharmacy. Owner doctor only.
    pub async fn send_prescription(
        &self,
        prescription_id: Uuid,
        principal: &Principal,
    ) -> CareResult<Prescription> {
        ensure_role(principal, &[Role::Doctor])?;
        let doctor_id = principal.id;
        let prescription = self.store.write(move |tables| {
            let prescription = tables.require_prescription(prescription_id)?;
            if prescription.doctor_id != doctor_id {
                return Err(CareError::forbidden(
                    "Only the prescribing doctor may send this prescription",
                ));
            }
            let prescription = tables.prescription_mut(prescription_id)?;
            prescription.send_to_pharmacy()?;
            Ok(prescription.clone())
        })?;
        info!(prescription = %prescription.id, "prescription sent to pharmacy");
        Ok(prescription)
    }

    /// Marks a sent prescription as dispensed.
    pub async fn complete_prescription(
        &self,
        prescription_id: Uuid,
        principal: &Principal,
    ) -> CareResult<Prescription> {
        ensure_role(principal, &[Role::Pharmacy, Role::Administrator])?;
        let prescription = self.store.write(move |tables| {
            let prescription = tables.prescription_mut(prescription_id)?;
            prescription.complete()?;
            Ok(prescription.clone())
        })?;
        info!(prescription = %prescription.id, "prescription dispensed");
        Ok(prescription)
    }

    /// Doctors see their own, the pharmacy sees what was sent to it,
    /// administrators see everything.
    pub async fn list_prescriptions(
        &self,
        principal: &Principal,
    ) -> CareResult<Vec<PrescriptionWithItems>> {
        ensure_role(
            principal,
            &[Role::Administrator, Role::Doctor, Role::Pharmacy],
        )?;
        let principal = *principal;
        self.store.read(move |tables| {
            let visible = |p: &Prescription| match principal.role {
                Role::Administrator => true,
                Role::Doctor => p.doctor_id == principal.id,
                Role::Pharmacy => p.status != PrescriptionStatus::Draft,
                _ => false,
            };
            let mut rows: Vec<PrescriptionWithItems> = tables
                .prescriptions
                .values()
                .filter(|p| visible(p))
                .map(|p| PrescriptionWithItems {
                    prescription: p.clone(),
                    items: tables.items_of_prescription(p.id),
                })
                .collect();
            rows.sort_by(|a, b| b.prescription.created_at.cmp(&a.prescription.created_at));
            Ok(rows)
        })
    }
}
