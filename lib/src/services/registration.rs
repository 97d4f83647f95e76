// lib/src/services/registration.rs
// Front-desk intake. One transaction takes a walk-in from nothing to a
// registered patient with a hospital number, a settled consultation payment,
// and optionally a bed and a doctor already assigned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    ConsultationDossier, DoctorAssignment, NewPatient, Patient, Payment, PaymentKind,
    PaymentMethod, PaymentStatus, Principal, Role,
};

use crate::scope::ensure_role;
use crate::services::assignments::create_assignment_records;
use crate::store::MemoryStore;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPatientInput {
    #[serde(flatten)]
    pub patient: NewPatient,
    /// Consultation fee; falls back to the active configured price.
    pub amount: Option<i64>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub bed_id: Option<Uuid>,
    /// Assign straight away when the desk already knows the doctor.
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredPatient {
    pub patient: Patient,
    pub payment: Payment,
    pub assignment: Option<DoctorAssignment>,
    pub dossier: Option<ConsultationDossier>,
}

#[derive(Debug, Clone)]
pub struct RegistrationService {
    store: Arc<MemoryStore>,
}

impl RegistrationService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        RegistrationService { store }
    }

    /// Registers a walk-in. The consultation payment is taken at the desk,
    /// so it is recorded `paid`; when no amount is quoted the active
    /// configured price applies. With a `doctor_id` the episode starts
    /// immediately under the same transaction and invariants as a standalone
    /// assignment.
    ///
    /// # Errors
    ///
    /// `Conflict` for a duplicate phone number or an occupied bed,
    /// `Validation` for payload problems or a missing price, `NotFound` for
    /// unknown bed or doctor ids.
    pub async fn register_patient(
        &self,
        input: RegisterPatientInput,
        principal: &Principal,
    ) -> CareResult<RegisteredPatient> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let created_by = principal.id;
        let registered = self.store.write(move |tables| {
            let phone = input.patient.phone.trim();
            if tables.patients.values().any(|p| p.phone == phone) {
                return Err(CareError::conflict(format!(
                    "A patient with phone '{}' is already registered",
                    phone
                )));
            }

            let hospital_number = tables.next_hospital_number();
            let mut patient = Patient::from_new(input.patient.clone(), hospital_number)?;

            let amount = match input.amount {
                Some(amount) => amount,
                None => tables.active_price().map(|p| p.price).ok_or_else(|| {
                    CareError::validation(
                        "No consultation price is configured, an explicit amount is required",
                    )
                })?,
            };
            let payment = Payment::new(
                Some(patient.id),
                amount,
                input.method.unwrap_or(PaymentMethod::Cash),
                PaymentStatus::Paid,
                PaymentKind::Consultation,
                input.reference.clone(),
                None,
                created_by,
            )?;

            if let Some(bed_id) = input.bed_id {
                let bed = tables.bed_mut(bed_id)?;
                bed.occupy(patient.id)?;
                patient.bed_id = Some(bed_id);
            }

            tables.patients.insert(patient.id, patient.clone());
            tables.payments.insert(payment.id, payment.clone());

            let (assignment, dossier) = match input.doctor_id {
                Some(doctor_id) => {
                    let (assignment, dossier) = create_assignment_records(
                        tables, patient.id, doctor_id, payment.id, created_by,
                    )?;
                    (Some(assignment), Some(dossier))
                }
                None => (None, None),
            };

            Ok(RegisteredPatient {
                patient,
                payment,
                assignment,
                dossier,
            })
        })?;
        info!(
            patient = %registered.patient.id,
            hospital_number = %registered.patient.hospital_number,
            assigned = registered.assignment.is_some(),
            "patient registered"
        );
        Ok(registered)
    }

    pub async fn get_patient(&self, patient_id: Uuid, principal: &Principal) -> CareResult<Patient> {
        ensure_role(
            principal,
            &[
                Role::Administrator,
                Role::Reception,
                Role::Doctor,
                Role::LabTechnician,
                Role::Pharmacy,
            ],
        )?;
        self.store.read(move |tables| tables.require_patient(patient_id))
    }

    /// Substring search over name, phone and hospital number. Newest first.
    pub async fn list_patients(
        &self,
        query: Option<String>,
        principal: &Principal,
    ) -> CareResult<Vec<Patient>> {
        ensure_role(
            principal,
            &[Role::Administrator, Role::Reception, Role::Doctor],
        )?;
        let needle = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        self.store.read(move |tables| {
            let mut patients: Vec<Patient> = tables
                .patients
                .values()
                .filter(|p| match needle.as_deref() {
                    None => true,
                    Some(needle) => {
                        let name = format!("{} {}", p.first_name, p.last_name).to_lowercase();
                        name.contains(needle)
                            || p.phone.contains(needle)
                            || p.hospital_number.to_lowercase().contains(needle)
                    }
                })
                .cloned()
                .collect();
            patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(patients)
        })
    }
}
