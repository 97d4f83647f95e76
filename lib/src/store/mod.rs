// lib/src/store/mod.rs
// Relational-style tables for the care core, plus the lookup helpers the
// services share. The tables themselves are dumb maps; every invariant is
// enforced by a named procedure at its call site.

pub mod memory;

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    AncillaryKind, AncillaryRequest, Bed, CatalogExam, Consultation, ConsultationDossier,
    ConsultationPrice, DoctorAssignment, LabResult, Patient, Payment, PaymentItem,
    PaymentStatus, PharmacyProduct, Prescription, PrescriptionItem, RequestExam, User,
};

pub use memory::MemoryStore;

/// Every entity table, keyed by id. Lab and imaging keep separate request,
/// join and catalog tables even though they share one workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub users: BTreeMap<Uuid, User>,
    pub patients: BTreeMap<Uuid, Patient>,
    pub beds: BTreeMap<Uuid, Bed>,
    pub payments: BTreeMap<Uuid, Payment>,
    pub payment_items: BTreeMap<Uuid, PaymentItem>,
    pub assignments: BTreeMap<Uuid, DoctorAssignment>,
    pub dossiers: BTreeMap<Uuid, ConsultationDossier>,
    pub consultations: BTreeMap<Uuid, Consultation>,
    pub lab_exams: BTreeMap<Uuid, CatalogExam>,
    pub imaging_exams: BTreeMap<Uuid, CatalogExam>,
    pub lab_requests: BTreeMap<Uuid, AncillaryRequest>,
    pub imaging_requests: BTreeMap<Uuid, AncillaryRequest>,
    pub lab_request_exams: BTreeMap<Uuid, RequestExam>,
    pub imaging_request_exams: BTreeMap<Uuid, RequestExam>,
    pub lab_results: BTreeMap<Uuid, LabResult>,
    pub prescriptions: BTreeMap<Uuid, Prescription>,
    pub prescription_items: BTreeMap<Uuid, PrescriptionItem>,
    pub consultation_prices: BTreeMap<Uuid, ConsultationPrice>,
    pub pharmacy_products: BTreeMap<Uuid, PharmacyProduct>,
}

impl Tables {
    // ---- required lookups, cloning out of the table ----

    pub fn require_user(&self, id: Uuid) -> CareResult<User> {
        self.users
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("User {}", id)))
    }

    pub fn require_patient(&self, id: Uuid) -> CareResult<Patient> {
        self.patients
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Patient {}", id)))
    }

    pub fn require_payment(&self, id: Uuid) -> CareResult<Payment> {
        self.payments
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Payment {}", id)))
    }

    pub fn require_bed(&self, id: Uuid) -> CareResult<Bed> {
        self.beds
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Bed {}", id)))
    }

    pub fn require_dossier(&self, id: Uuid) -> CareResult<ConsultationDossier> {
        self.dossiers
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Dossier {}", id)))
    }

    pub fn require_assignment(&self, id: Uuid) -> CareResult<DoctorAssignment> {
        self.assignments
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Assignment {}", id)))
    }

    pub fn require_consultation(&self, id: Uuid) -> CareResult<Consultation> {
        self.consultations
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Consultation {}", id)))
    }

    pub fn require_product(&self, id: Uuid) -> CareResult<PharmacyProduct> {
        self.pharmacy_products
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Product {}", id)))
    }

    pub fn require_prescription(&self, id: Uuid) -> CareResult<Prescription> {
        self.prescriptions
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Prescription {}", id)))
    }

    pub fn require_result(&self, id: Uuid) -> CareResult<LabResult> {
        self.lab_results
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("Lab result {}", id)))
    }

    pub fn require_request(&self, kind: AncillaryKind, id: Uuid) -> CareResult<AncillaryRequest> {
        self.requests(kind)
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("{} request {}", kind.as_str(), id)))
    }

    pub fn require_exam(&self, kind: AncillaryKind, id: Uuid) -> CareResult<CatalogExam> {
        self.exams(kind)
            .get(&id)
            .cloned()
            .ok_or_else(|| CareError::not_found(format!("{} exam {}", kind.as_str(), id)))
    }

    // ---- in-place mutation handles ----

    pub fn user_mut(&mut self, id: Uuid) -> CareResult<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("User {}", id)))
    }

    pub fn patient_mut(&mut self, id: Uuid) -> CareResult<&mut Patient> {
        self.patients
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Patient {}", id)))
    }

    pub fn payment_mut(&mut self, id: Uuid) -> CareResult<&mut Payment> {
        self.payments
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Payment {}", id)))
    }

    pub fn bed_mut(&mut self, id: Uuid) -> CareResult<&mut Bed> {
        self.beds
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Bed {}", id)))
    }

    pub fn dossier_mut(&mut self, id: Uuid) -> CareResult<&mut ConsultationDossier> {
        self.dossiers
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Dossier {}", id)))
    }

    pub fn consultation_mut(&mut self, id: Uuid) -> CareResult<&mut Consultation> {
        self.consultations
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Consultation {}", id)))
    }

    pub fn assignment_mut(&mut self, id: Uuid) -> CareResult<&mut DoctorAssignment> {
        self.assignments
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Assignment {}", id)))
    }

    pub fn product_mut(&mut self, id: Uuid) -> CareResult<&mut PharmacyProduct> {
        self.pharmacy_products
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Product {}", id)))
    }

    pub fn result_mut(&mut self, id: Uuid) -> CareResult<&mut LabResult> {
        self.lab_results
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Lab result {}", id)))
    }

    pub fn prescription_mut(&mut self, id: Uuid) -> CareResult<&mut Prescription> {
        self.prescriptions
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Prescription {}", id)))
    }

    pub fn price_mut(&mut self, id: Uuid) -> CareResult<&mut ConsultationPrice> {
        self.consultation_prices
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("Consultation price {}", id)))
    }

    pub fn request_mut(
        &mut self,
        kind: AncillaryKind,
        id: Uuid,
    ) -> CareResult<&mut AncillaryRequest> {
        self.requests_mut(kind)
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("{} request {}", kind.as_str(), id)))
    }

    pub fn exam_mut(&mut self, kind: AncillaryKind, id: Uuid) -> CareResult<&mut CatalogExam> {
        self.exams_mut(kind)
            .get_mut(&id)
            .ok_or_else(|| CareError::not_found(format!("{} exam {}", kind.as_str(), id)))
    }

    // ---- kind dispatch ----

    pub fn requests(&self, kind: AncillaryKind) -> &BTreeMap<Uuid, AncillaryRequest> {
        match kind {
            AncillaryKind::Lab => &self.lab_requests,
            AncillaryKind::Imaging => &self.imaging_requests,
        }
    }

    pub fn requests_mut(&mut self, kind: AncillaryKind) -> &mut BTreeMap<Uuid, AncillaryRequest> {
        match kind {
            AncillaryKind::Lab => &mut self.lab_requests,
            AncillaryKind::Imaging => &mut self.imaging_requests,
        }
    }

    pub fn exams(&self, kind: AncillaryKind) -> &BTreeMap<Uuid, CatalogExam> {
        match kind {
            AncillaryKind::Lab => &self.lab_exams,
            AncillaryKind::Imaging => &self.imaging_exams,
        }
    }

    pub fn exams_mut(&mut self, kind: AncillaryKind) -> &mut BTreeMap<Uuid, CatalogExam> {
        match kind {
            AncillaryKind::Lab => &mut self.lab_exams,
            AncillaryKind::Imaging => &mut self.imaging_exams,
        }
    }

    pub fn request_exams(&self, kind: AncillaryKind) -> &BTreeMap<Uuid, RequestExam> {
        match kind {
            AncillaryKind::Lab => &self.lab_request_exams,
            AncillaryKind::Imaging => &self.imaging_request_exams,
        }
    }

    pub fn request_exams_mut(&mut self, kind: AncillaryKind) -> &mut BTreeMap<Uuid, RequestExam> {
        match kind {
            AncillaryKind::Lab => &mut self.lab_request_exams,
            AncillaryKind::Imaging => &mut self.imaging_request_exams,
        }
    }

    // ---- joins and derived lookups ----

    /// The patient's one assignment in {assigned, in_consultation}, if any.
    pub fn active_assignment_for(&self, patient_id: Uuid) -> Option<DoctorAssignment> {
        self.assignments
            .values()
            .find(|a| a.patient_id == patient_id && a.is_active())
            .cloned()
    }

    pub fn active_price(&self) -> Option<ConsultationPrice> {
        self.consultation_prices
            .values()
            .find(|p| p.is_active)
            .cloned()
    }

    pub fn dossier_for_consultation(&self, consultation_id: Uuid) -> Option<ConsultationDossier> {
        self.dossiers
            .values()
            .find(|d| d.consultation_id == Some(consultation_id))
            .cloned()
    }

    /// Most recently opened dossier binding this patient to this doctor.
    pub fn latest_dossier_for(&self, patient_id: Uuid, doctor_id: Uuid) -> Option<ConsultationDossier> {
        self.dossiers
            .values()
            .filter(|d| d.patient_id == patient_id && d.doctor_id == doctor_id)
            .max_by_key(|d| (d.created_at, d.id))
            .cloned()
    }

    /// The authoritative result sheet for a lab request: most recent by
    /// creation order.
    pub fn latest_result_for(&self, lab_request_id: Uuid) -> Option<LabResult> {
        self.lab_results
            .values()
            .filter(|r| r.lab_request_id == lab_request_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /// Status of a request's gating payment; `None` when the request predates
    /// gating payments or the row is gone.
    pub fn payment_status_of(&self, request: &AncillaryRequest) -> Option<PaymentStatus> {
        request
            .payment_id
            .and_then(|id| self.payments.get(&id))
            .map(|p| p.status)
    }

    pub fn exams_of_request(&self, kind: AncillaryKind, request_id: Uuid) -> Vec<RequestExam> {
        self.request_exams(kind)
            .values()
            .filter(|line| line.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn items_of_prescription(&self, prescription_id: Uuid) -> Vec<PrescriptionItem> {
        self.prescription_items
            .values()
            .filter(|item| item.prescription_id == prescription_id)
            .cloned()
            .collect()
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<User> {
        let needle = email.trim().to_lowercase();
        self.users.values().find(|u| u.email == needle).cloned()
    }

    /// Next human-facing patient token, e.g. `HSP-2026-00042`. Sequences are
    /// scoped per calendar year.
    pub fn next_hospital_number(&self) -> String {
        let year = Utc::now().year();
        let prefix = format!("HSP-{}-", year);
        let max_sequence = self
            .patients
            .values()
            .filter_map(|p| p.hospital_number.strip_prefix(&prefix))
            .filter_map(|rest| rest.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("{}{:05}", prefix, max_sequence + 1)
    }

    /// Bed numbers are unique hospital-wide; duplicates surface as the
    /// storage-level constraint error.
    pub fn insert_bed(&mut self, bed: Bed) -> CareResult<Bed> {
        if self.beds.values().any(|b| b.number == bed.number) {
            return Err(CareError::constraint(format!(
                "Bed number '{}' already exists",
                bed.number
            )));
        }
        self.beds.insert(bed.id, bed.clone());
        Ok(bed)
    }
}
