// lib/src/services/ancillary.rs
// Lab and imaging orders. One service drives both kinds; the few places the
// paths diverge (structured lab results with validation versus free-text
// imaging findings) branch on `AncillaryKind`. Everything downstream of
// creation is gated on the order's payment being settled.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{
    AncillaryKind, AncillaryRequest, LabResult, Patient, Payment, PaymentMethod, PaymentStatus,
    Principal, RequestExam, RequestStatus, Role,
};

use crate::scope::{ensure_role, scoped_requests, RequestFilter, RequestView};
use crate::store::{MemoryStore, Tables};

/// Every write on an order past creation goes through this gate.
pub(crate) fn ensure_gating_payment_paid(
    tables: &Tables,
    request: &AncillaryRequest,
) -> CareResult<()> {
    match tables.payment_status_of(request) {
        Some(PaymentStatus::Paid) => Ok(()),
        Some(status) => Err(CareError::conflict(format!(
            "Payment for this request is {}, it must be settled first",
            status.as_str()
        ))),
        None => Err(CareError::conflict(
            "Request has no payment on file, it must be settled first",
        )),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequestInput {
    pub patient_id: Uuid,
    /// Ignored for doctor callers, who always order under their own name.
    pub doctor_id: Option<Uuid>,
    pub consultation_id: Option<Uuid>,
    pub exam_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequestInput {
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// Optionally hand the order to a technician in the same settlement.
    pub technician_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedRequest {
    pub request: AncillaryRequest,
    pub payment: Payment,
    pub exams: Vec<RequestExam>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub view: RequestView,
    pub patient: Patient,
    pub exams: Vec<RequestExam>,
    pub latest_result: Option<LabResult>,
}

/// A finished order in the doctor's inbox. Lab orders carry the sent result
/// row, imaging orders carry their findings on the request itself.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredOrder {
    pub request: AncillaryRequest,
    pub result: Option<LabResult>,
}

#[derive(Debug, Clone)]
pub struct AncillaryService {
    store: Arc<MemoryStore>,
}

impl AncillaryService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        AncillaryService { store }
    }

    /// Places an order and raises its gating payment in one transaction. The
    /// payment starts `pending`; nothing else can happen to the order until
    /// the desk settles it. Exam prices are copied onto the order lines and
    /// summed into a frozen total.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty or inactive exam selection, `Conflict` when
    /// the episode's dossier is archived, `NotFound` for missing rows.
    pub async fn create_request(
        &self,
        kind: AncillaryKind,
        input: CreateRequestInput,
        principal: &Principal,
    ) -> CareResult<CreatedRequest> {
        ensure_role(principal, &[Role::Doctor, Role::Administrator])?;
        let doctor_id = match principal.role {
            Role::Doctor => principal.id,
            _ => input.doctor_id.ok_or_else(|| {
                CareError::validation("A doctor must be specified for the request")
            })?,
        };
        let created_by = principal.id;
        let created = self.store.write(move |tables| {
            let mut exam_ids = input.exam_ids.clone();
            let mut seen = BTreeSet::new();
            exam_ids.retain(|id| seen.insert(*id));
            if exam_ids.is_empty() {
                return Err(CareError::validation("At least one exam must be selected"));
            }

            tables.require_patient(input.patient_id)?;
            let doctor = tables.require_user(doctor_id)?;
            if doctor.role != Role::Doctor || !doctor.is_active_staff() {
                return Err(CareError::validation(format!(
                    "User {} is not an available doctor",
                    doctor_id
                )));
            }

            // Orders belong to an episode; a frozen episode takes no new ones.
            let dossier = match input.consultation_id {
                Some(consultation_id) => tables.dossier_for_consultation(consultation_id),
                None => tables.latest_dossier_for(input.patient_id, doctor_id),
            };
            if let Some(dossier) = dossier {
                dossier.ensure_writable()?;
            }

            let mut lines = Vec::with_capacity(exam_ids.len());
            let mut total: i64 = 0;
            for exam_id in &exam_ids {
                let exam = tables
                    .exams(kind)
                    .get(exam_id)
                    .filter(|e| e.is_active)
                    .cloned()
                    .ok_or_else(|| {
                        CareError::validation("One or more selected exams are invalid or inactive")
                    })?;
                total += exam.price;
                lines.push(exam);
            }

            let mut request = AncillaryRequest::new(
                kind,
                input.patient_id,
                doctor_id,
                input.consultation_id,
                total,
            );
            let reference = format!(
                "{}-{}",
                kind.reference_prefix(),
                Utc::now().timestamp_millis()
            );
            let payment = Payment::new(
                Some(input.patient_id),
                total,
                PaymentMethod::Cash,
                PaymentStatus::Pending,
                kind.payment_kind(),
                Some(reference),
                Some(request.id),
                created_by,
            )?;
            request.payment_id = Some(payment.id);

            let exams: Vec<RequestExam> = lines
                .iter()
                .map(|exam| RequestExam::new(request.id, exam.id, exam.price))
                .collect();
            for line in &exams {
                tables.request_exams_mut(kind).insert(line.id, line.clone());
            }
            tables.payments.insert(payment.id, payment.clone());
            tables.requests_mut(kind).insert(request.id, request.clone());
            Ok(CreatedRequest {
                request,
                payment,
                exams,
            })
        })?;
        info!(
            request = %created.request.id,
            kind = kind.as_str(),
            total = created.request.total_amount,
            "request placed, awaiting payment"
        );
        Ok(created)
    }

    /// Settles the order's gating payment at the desk. Orders from before
    /// gating payments existed have none; settling such an order creates the
    /// payment row already paid.
    pub async fn settle_request_payment(
        &self,
        kind: AncillaryKind,
        request_id: Uuid,
        input: SettleRequestInput,
        principal: &Principal,
    ) -> CareResult<(AncillaryRequest, Payment)> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let settled_by = principal.id;
        let (request, payment) = self.store.write(move |tables| {
            let request = tables.require_request(kind, request_id)?;
            let payment = match request.payment_id {
                Some(payment_id) => {
                    let payment = tables.payment_mut(payment_id)?;
                    payment.mark_paid(input.method, input.reference.clone())?;
                    payment.clone()
                }
                None => {
                    let payment = Payment::new(
                        Some(request.patient_id),
                        request.total_amount,
                        input.method,
                        PaymentStatus::Paid,
                        kind.payment_kind(),
                        input.reference.clone(),
                        Some(request.id),
                        settled_by,
                    )?;
                    tables.payments.insert(payment.id, payment.clone());
                    let request = tables.request_mut(kind, request_id)?;
                    request.payment_id = Some(payment.id);
                    request.updated_at = Utc::now();
                    payment
                }
            };

            if let Some(technician_id) = input.technician_id {
                match tables.users.get(&technician_id) {
                    Some(user) if user.role == Role::LabTechnician && user.is_active_staff() => {
                        let request = tables.request_mut(kind, request_id)?;
                        request.technician_id = Some(technician_id);
                        request.updated_at = Utc::now();
                    }
                    _ => warn!(
                        request = %request_id,
                        technician = %technician_id,
                        "settlement named an invalid technician, leaving the order unassigned"
                    ),
                }
            }
            tables
                .require_request(kind, request_id)
                .map(|request| (request, payment))
        })?;
        info!(request = %request.id, payment = %payment.id, "request payment settled");
        Ok((request, payment))
    }

    /// Hands the order to a technician. Unpaid orders hold at the desk.
    pub async fn assign_technician(
        &self,
        kind: AncillaryKind,
        request_id: Uuid,
        technician_id: Uuid,
        principal: &Principal,
    ) -> CareResult<AncillaryRequest> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let request = self.store.write(move |tables| {
            let request = tables.require_request(kind, request_id)?;
            ensure_gating_payment_paid(tables, &request)?;
            let technician = tables.require_user(technician_id)?;
            if technician.role != Role::LabTechnician || !technician.is_active_staff() {
                return Err(CareError::validation(format!(
                    "User {} is not an available technician",
                    technician_id
                )));
            }
            let request = tables.request_mut(kind, request_id)?;
            request.technician_id = Some(technician_id);
            request.updated_at = Utc::now();
            Ok(request.clone())
        })?;
        info!(request = %request.id, technician = %technician_id, "request assigned to technician");
        Ok(request)
    }

    /// Saves the technician's structured findings for a lab order. Repeated
    /// saves rework the latest row back to `draft`; a sent row is immutable
    /// and the rework is refused. An unassigned order is claimed by the
    /// technician who first writes to it.
    pub async fn upsert_result(
        &self,
        request_id: Uuid,
        results: Value,
        notes: Option<String>,
        principal: &Principal,
    ) -> CareResult<LabResult> {
        ensure_role(principal, &[Role::LabTechnician, Role::Administrator])?;
        let principal = *principal;
        let result = self.store.write(move |tables| {
            let request = tables.require_request(AncillaryKind::Lab, request_id)?;
            ensure_gating_payment_paid(tables, &request)?;
            if principal.role == Role::LabTechnician {
                match request.technician_id {
                    Some(assigned) if assigned != principal.id => {
                        return Err(CareError::forbidden(
                            "Request is assigned to a different technician",
                        ));
                    }
                    Some(_) => {}
                    None => {
                        let request = tables.request_mut(AncillaryKind::Lab, request_id)?;
                        request.technician_id = Some(principal.id);
                        request.updated_at = Utc::now();
                    }
                }
            }

            match tables.latest_result_for(request_id) {
                Some(existing) => {
                    let result = tables.result_mut(existing.id)?;
                    result.redraft(results, notes)?;
                    Ok(result.clone())
                }
                None => {
                    let result = LabResult::draft(request_id, results, notes);
                    tables.lab_results.insert(result.id, result.clone());
                    Ok(result)
                }
            }
        })?;
        info!(result = %result.id, request = %request_id, "lab result drafted");
        Ok(result)
    }

    /// Marks a draft result as checked. Validation is the only road to
    /// sending.
    pub async fn validate_result(
        &self,
        result_id: Uuid,
        principal: &Principal,
    ) -> CareResult<LabResult> {
        ensure_role(principal, &[Role::LabTechnician, Role::Administrator])?;
        let validated_by = principal.id;
        let result = self.store.write(move |tables| {
            let result = tables.require_result(result_id)?;
            let request = tables.require_request(AncillaryKind::Lab, result.lab_request_id)?;
            ensure_gating_payment_paid(tables, &request)?;
            let result = tables.result_mut(result_id)?;
            result.validate(validated_by)?;
            Ok(result.clone())
        })?;
        info!(result = %result.id, "lab result validated");
        Ok(result)
    }

    /// Releases a validated result to the ordering doctor and flips the
    /// parent order to `sent_to_doctor`.
    pub async fn send_result(
        &self,
        result_id: Uuid,
        principal: &Principal,
    ) -> CareResult<LabResult> {
        ensure_role(principal, &[Role::LabTechnician, Role::Administrator])?;
        let result = self.store.write(move |tables| {
            let result = tables.require_result(result_id)?;
            let request = tables.require_request(AncillaryKind::Lab, result.lab_request_id)?;
            ensure_gating_payment_paid(tables, &request)?;
            let result = tables.result_mut(result_id)?;
            result.send()?;
            let result = result.clone();
            let request = tables.request_mut(AncillaryKind::Lab, result.lab_request_id)?;
            if request.status == RequestStatus::Pending {
                request.send_to_doctor()?;
            }
            Ok(result)
        })?;
        info!(result = %result.id, request = %result.lab_request_id, "lab result sent to doctor");
        Ok(result)
    }

    /// Writes the radiologist's findings and delivers the imaging order in
    /// one step. A delivered order refuses a second completion.
    pub async fn complete_imaging_request(
        &self,
        request_id: Uuid,
        findings: String,
        principal: &Principal,
    ) -> CareResult<AncillaryRequest> {
        ensure_role(principal, &[Role::LabTechnician, Role::Administrator])?;
        let findings = findings.trim().to_string();
        if findings.is_empty() {
            return Err(CareError::validation("Imaging findings must not be empty"));
        }
        let principal = *principal;
        let request = self.store.write(move |tables| {
            let request = tables.require_request(AncillaryKind::Imaging, request_id)?;
            ensure_gating_payment_paid(tables, &request)?;
            if principal.role == Role::LabTechnician {
                if let Some(assigned) = request.technician_id {
                    if assigned != principal.id {
                        return Err(CareError::forbidden(
                            "Request is assigned to a different technician",
                        ));
                    }
                }
            }
            let request = tables.request_mut(AncillaryKind::Imaging, request_id)?;
            request.send_to_doctor()?;
            if request.technician_id.is_none() && principal.role == Role::LabTechnician {
                request.technician_id = Some(principal.id);
            }
            request.results = Some(findings);
            request.updated_at = Utc::now();
            Ok(request.clone())
        })?;
        info!(request = %request.id, "imaging request completed");
        Ok(request)
    }

    /// Role-scoped listing with the composite payment-aware status projected
    /// onto every row.
    pub async fn list_requests(
        &self,
        kind: AncillaryKind,
        filter: RequestFilter,
        principal: &Principal,
    ) -> CareResult<Vec<RequestView>> {
        let principal = *principal;
        self.store
            .read(move |tables| scoped_requests(tables, kind, &principal, filter))
    }

    /// The ordering doctor's inbox of finished orders.
    pub async fn list_delivered(
        &self,
        kind: AncillaryKind,
        principal: &Principal,
    ) -> CareResult<Vec<DeliveredOrder>> {
        ensure_role(principal, &[Role::Doctor])?;
        let doctor_id = principal.id;
        self.store.read(move |tables| {
            let mut delivered: Vec<DeliveredOrder> = tables
                .requests(kind)
                .values()
                .filter(|r| r.doctor_id == doctor_id && r.status == RequestStatus::SentToDoctor)
                .filter_map(|r| match kind {
                    AncillaryKind::Lab => tables
                        .latest_result_for(r.id)
                        .filter(|result| result.sent_at.is_some())
                        .map(|result| DeliveredOrder {
                            request: r.clone(),
                            result: Some(result),
                        }),
                    AncillaryKind::Imaging => r
                        .results
                        .as_deref()
                        .filter(|text| !text.trim().is_empty())
                        .map(|_| DeliveredOrder {
                            request: r.clone(),
                            result: None,
                        }),
                })
                .collect();
            delivered.sort_by(|a, b| b.request.updated_at.cmp(&a.request.updated_at));
            Ok(delivered)
        })
    }

    /// Full order detail. Technicians cannot see an order until its payment
    /// settles; to them an unpaid order simply does not exist.
    pub async fn get_request(
        &self,
        kind: AncillaryKind,
        request_id: Uuid,
        principal: &Principal,
    ) -> CareResult<RequestDetail> {
        ensure_role(
            principal,
            &[
                Role::Administrator,
                Role::Reception,
                Role::Doctor,
                Role::LabTechnician,
            ],
        )?;
        let principal = *principal;
        self.store.read(move |tables| {
            let request = tables.require_request(kind, request_id)?;
            match principal.role {
                Role::Doctor if request.doctor_id != principal.id => {
                    return Err(CareError::forbidden(
                        "Only the ordering doctor may view this request",
                    ));
                }
                Role::LabTechnician
                    if tables.payment_status_of(&request) != Some(PaymentStatus::Paid) =>
                {
                    return Err(CareError::not_found(format!(
                        "{} request {}",
                        kind.as_str(),
                        request_id
                    )));
                }
                _ => {}
            }

            let patient = tables.require_patient(request.patient_id)?;
            let exams = tables.exams_of_request(kind, request_id);
            let latest_result = match kind {
                AncillaryKind::Lab => tables.latest_result_for(request_id),
                AncillaryKind::Imaging => None,
            };
            Ok(RequestDetail {
                view: RequestView::project(tables, request),
                patient,
                exams,
                latest_result,
            })
        })
    }
}
