// rest_api/src/lib.rs
// HTTP surface over the care orchestration core. Every handler resolves the
// calling staff member from a bearer token, delegates to one service call and
// wraps the outcome in the common response envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use anyhow::Context;
use anyhow::Error as AnyhowError;

use lib::services::ancillary::{CreateRequestInput, SettleRequestInput};
use lib::services::assignments::CreateAssignmentInput;
use lib::services::dossiers::DossierFilter;
use lib::services::payments::{CreatePaymentInput, PaymentFilter, SettlePaymentInput};
use lib::services::pharmacy::RecordSaleInput;
use lib::services::prescriptions::CreatePrescriptionInput;
use lib::services::registration::RegisterPatientInput;
use lib::{ensure_role, CareServices, MemoryStore, RequestFilter};
use models::{AncillaryKind, CareError, ConsultationDraft, Login, NewUser, Role, User};

pub mod auth;
pub mod config;

use crate::auth::{AuthKeys, AuthPrincipal};
use crate::config::RestApiConfig;

// Define the REST API error enum
#[derive(Debug, Error)]
pub enum RestApiError {
    #[error(transparent)]
    Care(#[from] CareError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("General error: {0}")]
    GeneralError(String),
}

// Implement IntoResponse for RestApiError to convert it into an HTTP response
impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            RestApiError::Care(e) => {
                let status = match e.kind() {
                    "validation" => StatusCode::BAD_REQUEST,
                    "auth" => StatusCode::UNAUTHORIZED,
                    "forbidden" => StatusCode::FORBIDDEN,
                    "not_found" => StatusCode::NOT_FOUND,
                    "conflict" | "constraint" => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Internal error surfaced to a client: {}", e);
                }
                (status, e.to_string())
            }
            RestApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            RestApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            RestApiError::GeneralError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "status": "error",
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

// Shared state for the Axum application
#[derive(Clone)]
pub struct AppState {
    pub(crate) services: Arc<CareServices>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) auth: Arc<AuthKeys>,
    pub(crate) shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, auth: AuthKeys) -> Self {
        AppState {
            services: Arc::new(CareServices::new(Arc::clone(&store))),
            store,
            auth: Arc::new(auth),
            shutdown_tx: Arc::new(Mutex::new(None)),
        }
    }
}

/// A staff account as it leaves the process: the stored record minus the
/// password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub is_active: bool,
    pub is_suspended: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        UserView {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            phone: user.phone,
            is_active: user.is_active,
            is_suspended: user.is_suspended,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorView {
    #[serde(flatten)]
    doctor: UserView,
    active_assignments: usize,
}

#[derive(Debug, Deserialize)]
struct SetUserActiveRequest {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct PatientSearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelPaymentRequest {
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Deserialize)]
struct SetPriceRequest {
    price: i64,
}

#[derive(Debug, Deserialize)]
struct PriceHistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ArchiveDossierRequest {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssignTechnicianRequest {
    technician_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct UpsertResultRequest {
    request_id: Uuid,
    results: Value,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompleteImagingRequest {
    findings: String,
}

#[derive(Debug, Deserialize)]
struct CreateBedRequest {
    number: String,
    ward: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OccupyBedRequest {
    patient_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct BedListQuery {
    #[serde(default)]
    available_only: bool,
}

#[derive(Debug, Deserialize)]
struct CreateExamRequest {
    name: String,
    price: i64,
}

#[derive(Debug, Deserialize)]
struct ExamPriceRequest {
    price: i64,
}

#[derive(Debug, Deserialize)]
struct ExamActiveRequest {
    active: bool,
}

#[derive(Debug, Deserialize)]
struct ExamListQuery {
    #[serde(default)]
    active_only: bool,
}

#[derive(Debug, Deserialize)]
struct CreateProductRequest {
    name: String,
    price: i64,
    #[serde(default)]
    stock: u32,
}

#[derive(Debug, Deserialize)]
struct RestockRequest {
    quantity: u32,
}

// Handler for the /api/v1/health endpoint
async fn health_check_handler() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "message": "REST API is healthy" })),
    )
}

// Handler for the /api/v1/version endpoint
async fn version_handler() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "version": env!("CARGO_PKG_VERSION"), "api_level": 1 })),
    )
}

// Handler for the /api/v1/shutdown endpoint. Flushes the store before the
// server starts draining, so nothing recorded this session is lost.
async fn shutdown_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    ensure_role(&principal, &[Role::Administrator])?;
    state.store.flush()?;
    let mut tx_guard = state.shutdown_tx.lock().await;
    if let Some(tx) = tx_guard.take() {
        let _ = tx.send(());
        Ok(Json(json!({
            "status": "success",
            "message": "Shutting down REST API server."
        })))
    } else {
        Err(RestApiError::GeneralError(
            "Shutdown signal already sent or not available.".to_string(),
        ))
    }
}

// Handler for the /api/v1/auth/login endpoint
async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<Login>,
) -> Result<Json<Value>, RestApiError> {
    let user = state.services.users.authenticate(payload).await?;
    let token = state.auth.issue(&user)?;
    Ok(Json(json!({
        "status": "success",
        "token": token,
        "user": UserView::from(user),
    })))
}

// Handler for the /api/v1/auth/me endpoint
async fn me_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let user = state.services.users.find_user(principal.id, &principal).await?;
    Ok(Json(json!({ "status": "success", "user": UserView::from(user) })))
}

async fn create_user_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<NewUser>,
) -> Result<Json<Value>, RestApiError> {
    let user = state.services.users.create_user(payload, &principal).await?;
    Ok(Json(json!({ "status": "success", "user": UserView::from(user) })))
}

async fn list_users_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let users = state.services.users.list_users(&principal).await?;
    let users: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(Json(json!({ "status": "success", "users": users })))
}

async fn get_user_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let user = state.services.users.find_user(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "user": UserView::from(user) })))
}

async fn set_user_active_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetUserActiveRequest>,
) -> Result<Json<Value>, RestApiError> {
    let user = state
        .services
        .users
        .set_user_active(id, payload.active, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "user": UserView::from(user) })))
}

// Handler for the /api/v1/doctors endpoint, the reception desk's pick list.
async fn list_doctors_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let doctors = state.services.users.list_doctors(&principal).await?;
    let doctors: Vec<DoctorView> = doctors
        .into_iter()
        .map(|summary| DoctorView {
            doctor: UserView::from(summary.doctor),
            active_assignments: summary.active_assignments,
        })
        .collect();
    Ok(Json(json!({ "status": "success", "doctors": doctors })))
}

// Handler for the /api/v1/patients endpoint. Registration settles the
// consultation fee and optionally assigns a doctor and bed in one shot.
async fn register_patient_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<RegisterPatientInput>,
) -> Result<Json<Value>, RestApiError> {
    let registered = state
        .services
        .registration
        .register_patient(payload, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "registration": registered })))
}

async fn list_patients_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, RestApiError> {
    let patients = state
        .services
        .registration
        .list_patients(query.q, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "patients": patients })))
}

async fn get_patient_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let patient = state.services.registration.get_patient(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "patient": patient })))
}

async fn active_assignment_handler(
    State(state): State<AppState>,
    AuthPrincipal(_principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let assignment = state.services.assignments.active_assignment(id).await?;
    Ok(Json(json!({ "status": "success", "assignment": assignment })))
}

async fn create_assignment_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<CreateAssignmentInput>,
) -> Result<Json<Value>, RestApiError> {
    let (assignment, dossier) = state
        .services
        .assignments
        .create_assignment(payload, &principal)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "assignment": assignment,
        "dossier": dossier,
    })))
}

async fn list_assignments_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let assignments = state.services.assignments.list_assignments(&principal).await?;
    Ok(Json(json!({ "status": "success", "assignments": assignments })))
}

// Handler for the /api/v1/payments endpoint
async fn create_payment_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<CreatePaymentInput>,
) -> Result<Json<Value>, RestApiError> {
    let payment = state.services.payments.create_payment(payload, &principal).await?;
    Ok(Json(json!({ "status": "success", "payment": payment })))
}

async fn list_payments_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Value>, RestApiError> {
    let payments = state.services.payments.list_payments(filter, &principal).await?;
    Ok(Json(json!({ "status": "success", "payments": payments })))
}

async fn get_payment_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let payment = state.services.payments.get_payment(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "payment": payment })))
}

async fn settle_payment_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<SettlePaymentInput>,
) -> Result<Json<Value>, RestApiError> {
    let payment = state
        .services
        .payments
        .settle_payment(id, payload, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "payment": payment })))
}

// Cancellation is terminal, so the caller has to say it twice.
async fn cancel_payment_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelPaymentRequest>,
) -> Result<Json<Value>, RestApiError> {
    let payment = state
        .services
        .payments
        .cancel_payment(id, payload.confirm, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "payment": payment })))
}

// Handlers for the /api/v1/pricing/consultation endpoint
async fn active_price_handler(
    State(state): State<AppState>,
    AuthPrincipal(_principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let price = state.services.pricing.active_price().await?;
    Ok(Json(json!({ "status": "success", "price": price })))
}

async fn set_price_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<SetPriceRequest>,
) -> Result<Json<Value>, RestApiError> {
    let price = state
        .services
        .pricing
        .set_active_price(payload.price, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "price": price })))
}

async fn deactivate_price_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let price = state.services.pricing.deactivate_price(&principal).await?;
    Ok(Json(json!({ "status": "success", "price": price })))
}

async fn price_history_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<PriceHistoryQuery>,
) -> Result<Json<Value>, RestApiError> {
    let history = state
        .services
        .pricing
        .price_history(query.limit, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "history": history })))
}

async fn list_dossiers_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(filter): Query<DossierFilter>,
) -> Result<Json<Value>, RestApiError> {
    let dossiers = state.services.dossiers.list_dossiers(filter, &principal).await?;
    Ok(Json(json!({ "status": "success", "dossiers": dossiers })))
}

// Handler for the /api/v1/dossiers/:id endpoint: the episode with its
// consultation, orders and prescriptions in one response.
async fn dossier_detail_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let detail = state.services.dossiers.dossier_detail(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "detail": detail })))
}

async fn complete_dossier_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let dossier = state.services.dossiers.complete_dossier(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "dossier": dossier })))
}

async fn archive_dossier_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<ArchiveDossierRequest>,
) -> Result<Json<Value>, RestApiError> {
    let dossier = state
        .services
        .dossiers
        .archive_dossier(id, payload.reason, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "dossier": dossier })))
}

// Handler for the /api/v1/dossiers/:id/consultation endpoint. First write
// opens the consultation, later writes merge into it.
async fn upsert_consultation_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(draft): Json<ConsultationDraft>,
) -> Result<Json<Value>, RestApiError> {
    let consultation = state
        .services
        .consultations
        .upsert_consultation(id, draft, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "consultation": consultation })))
}

async fn get_consultation_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let consultation = state
        .services
        .consultations
        .get_consultation(id, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "consultation": consultation })))
}

async fn complete_consultation_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let consultation = state
        .services
        .consultations
        .complete_consultation(id, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "consultation": consultation })))
}

// Handler for the /api/v1/requests/:kind endpoint. `kind` is `lab` or
// `imaging`; the order is created together with its pending gating payment.
async fn create_request_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(kind): Path<AncillaryKind>,
    Json(payload): Json<CreateRequestInput>,
) -> Result<Json<Value>, RestApiError> {
    let created = state
        .services
        .ancillary
        .create_request(kind, payload, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "order": created })))
}

async fn list_requests_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(kind): Path<AncillaryKind>,
    Query(filter): Query<RequestFilter>,
) -> Result<Json<Value>, RestApiError> {
    let requests = state
        .services
        .ancillary
        .list_requests(kind, filter, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "requests": requests })))
}

// Handler for the /api/v1/requests/:kind/delivered endpoint, the ordering
// doctor's inbox of finished work.
async fn list_delivered_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(kind): Path<AncillaryKind>,
) -> Result<Json<Value>, RestApiError> {
    let orders = state.services.ancillary.list_delivered(kind, &principal).await?;
    Ok(Json(json!({ "status": "success", "orders": orders })))
}

async fn get_request_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((kind, id)): Path<(AncillaryKind, Uuid)>,
) -> Result<Json<Value>, RestApiError> {
    let request = state.services.ancillary.get_request(kind, id, &principal).await?;
    Ok(Json(json!({ "status": "success", "request": request })))
}

async fn settle_request_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((kind, id)): Path<(AncillaryKind, Uuid)>,
    Json(payload): Json<SettleRequestInput>,
) -> Result<Json<Value>, RestApiError> {
    let (request, payment) = state
        .services
        .ancillary
        .settle_request_payment(kind, id, payload, &principal)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "request": request,
        "payment": payment,
    })))
}

async fn assign_technician_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((kind, id)): Path<(AncillaryKind, Uuid)>,
    Json(payload): Json<AssignTechnicianRequest>,
) -> Result<Json<Value>, RestApiError> {
    let request = state
        .services
        .ancillary
        .assign_technician(kind, id, payload.technician_id, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "request": request })))
}

// Handler for the /api/v1/lab/results endpoint. Posting against the same
// request while the result is still a draft redrafts it in place.
async fn upsert_result_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<UpsertResultRequest>,
) -> Result<Json<Value>, RestApiError> {
    let result = state
        .services
        .ancillary
        .upsert_result(payload.request_id, payload.results, payload.notes, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "result": result })))
}

async fn validate_result_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let result = state.services.ancillary.validate_result(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "result": result })))
}

async fn send_result_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let result = state.services.ancillary.send_result(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "result": result })))
}

// Handler for the /api/v1/imaging/:id/complete endpoint. Imaging has no
// draft/validate cycle; the findings text delivers the order in one step.
async fn complete_imaging_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteImagingRequest>,
) -> Result<Json<Value>, RestApiError> {
    let request = state
        .services
        .ancillary
        .complete_imaging_request(id, payload.findings, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "request": request })))
}

async fn create_prescription_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<CreatePrescriptionInput>,
) -> Result<Json<Value>, RestApiError> {
    let prescription = state
        .services
        .prescriptions
        .create_prescription(payload, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "prescription": prescription })))
}

async fn list_prescriptions_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let prescriptions = state.services.prescriptions.list_prescriptions(&principal).await?;
    Ok(Json(json!({ "status": "success", "prescriptions": prescriptions })))
}

async fn send_prescription_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let prescription = state
        .services
        .prescriptions
        .send_prescription(id, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "prescription": prescription })))
}

async fn complete_prescription_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let prescription = state
        .services
        .prescriptions
        .complete_prescription(id, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "prescription": prescription })))
}

async fn create_bed_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<CreateBedRequest>,
) -> Result<Json<Value>, RestApiError> {
    let bed = state
        .services
        .beds
        .create_bed(payload.number, payload.ward, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "bed": bed })))
}

async fn list_beds_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Query(query): Query<BedListQuery>,
) -> Result<Json<Value>, RestApiError> {
    let beds = state
        .services
        .beds
        .list_beds(query.available_only, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "beds": beds })))
}

async fn occupy_bed_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<OccupyBedRequest>,
) -> Result<Json<Value>, RestApiError> {
    let bed = state
        .services
        .beds
        .occupy_bed(id, payload.patient_id, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "bed": bed })))
}

async fn free_bed_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RestApiError> {
    let bed = state.services.beds.free_bed(id, &principal).await?;
    Ok(Json(json!({ "status": "success", "bed": bed })))
}

async fn create_exam_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(kind): Path<AncillaryKind>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<Json<Value>, RestApiError> {
    let exam = state
        .services
        .catalog
        .create_exam(kind, payload.name, payload.price, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "exam": exam })))
}

async fn list_exams_handler(
    State(state): State<AppState>,
    AuthPrincipal(_principal): AuthPrincipal,
    Path(kind): Path<AncillaryKind>,
    Query(query): Query<ExamListQuery>,
) -> Result<Json<Value>, RestApiError> {
    let exams = state.services.catalog.list_exams(kind, query.active_only).await?;
    Ok(Json(json!({ "status": "success", "exams": exams })))
}

async fn update_exam_price_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((kind, id)): Path<(AncillaryKind, Uuid)>,
    Json(payload): Json<ExamPriceRequest>,
) -> Result<Json<Value>, RestApiError> {
    let exam = state
        .services
        .catalog
        .update_exam_price(kind, id, payload.price, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "exam": exam })))
}

async fn set_exam_active_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((kind, id)): Path<(AncillaryKind, Uuid)>,
    Json(payload): Json<ExamActiveRequest>,
) -> Result<Json<Value>, RestApiError> {
    let exam = state
        .services
        .catalog
        .set_exam_active(kind, id, payload.active, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "exam": exam })))
}

async fn create_product_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<CreateProductRequest>,
) -> Result<Json<Value>, RestApiError> {
    let product = state
        .services
        .catalog
        .create_product(payload.name, payload.price, payload.stock, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "product": product })))
}

async fn list_products_handler(
    State(state): State<AppState>,
    AuthPrincipal(_principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let products = state.services.catalog.list_products().await?;
    Ok(Json(json!({ "status": "success", "products": products })))
}

async fn restock_product_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Path(id): Path<Uuid>,
    Json(payload): Json<RestockRequest>,
) -> Result<Json<Value>, RestApiError> {
    let product = state
        .services
        .catalog
        .restock_product(id, payload.quantity, &principal)
        .await?;
    Ok(Json(json!({ "status": "success", "product": product })))
}

// Handler for the /api/v1/pharmacy/sales endpoint: over-the-counter sale,
// paid on the spot, stock decremented atomically.
async fn record_sale_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(payload): Json<RecordSaleInput>,
) -> Result<Json<Value>, RestApiError> {
    let sale = state.services.pharmacy.record_sale(payload, &principal).await?;
    Ok(Json(json!({ "status": "success", "sale": sale })))
}

async fn list_sales_handler(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> Result<Json<Value>, RestApiError> {
    let sales = state.services.pharmacy.list_sales(&principal).await?;
    Ok(Json(json!({ "status": "success", "sales": sales })))
}

/// Builds the full route table over the shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/api/v1/health", get(health_check_handler))
        .route("/api/v1/version", get(version_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .route("/api/v1/auth/login", post(login_handler))
        .route("/api/v1/auth/me", get(me_handler))
        .route("/api/v1/users", post(create_user_handler).get(list_users_handler))
        .route("/api/v1/users/:id", get(get_user_handler))
        .route("/api/v1/users/:id/active", put(set_user_active_handler))
        .route("/api/v1/doctors", get(list_doctors_handler))
        .route(
            "/api/v1/patients",
            post(register_patient_handler).get(list_patients_handler),
        )
        .route("/api/v1/patients/:id", get(get_patient_handler))
        .route("/api/v1/patients/:id/assignment", get(active_assignment_handler))
        .route(
            "/api/v1/assignments",
            post(create_assignment_handler).get(list_assignments_handler),
        )
        .route(
            "/api/v1/payments",
            post(create_payment_handler).get(list_payments_handler),
        )
        .route("/api/v1/payments/:id", get(get_payment_handler))
        .route("/api/v1/payments/:id/settle", put(settle_payment_handler))
        .route("/api/v1/payments/:id/cancel", put(cancel_payment_handler))
        .route(
            "/api/v1/pricing/consultation",
            get(active_price_handler)
                .put(set_price_handler)
                .delete(deactivate_price_handler),
        )
        .route("/api/v1/pricing/consultation/history", get(price_history_handler))
        .route("/api/v1/dossiers", get(list_dossiers_handler))
        .route("/api/v1/dossiers/:id", get(dossier_detail_handler))
        .route("/api/v1/dossiers/:id/consultation", put(upsert_consultation_handler))
        .route("/api/v1/dossiers/:id/complete", put(complete_dossier_handler))
        .route("/api/v1/dossiers/:id/archive", put(archive_dossier_handler))
        .route("/api/v1/consultations/:id", get(get_consultation_handler))
        .route(
            "/api/v1/consultations/:id/complete",
            put(complete_consultation_handler),
        )
        .route(
            "/api/v1/requests/:kind",
            post(create_request_handler).get(list_requests_handler),
        )
        .route("/api/v1/requests/:kind/delivered", get(list_delivered_handler))
        .route("/api/v1/requests/:kind/:id", get(get_request_handler))
        .route("/api/v1/requests/:kind/:id/settle", put(settle_request_handler))
        .route(
            "/api/v1/requests/:kind/:id/technician",
            put(assign_technician_handler),
        )
        .route("/api/v1/lab/results", post(upsert_result_handler))
        .route("/api/v1/lab/results/:id/validate", put(validate_result_handler))
        .route("/api/v1/lab/results/:id/send", put(send_result_handler))
        .route("/api/v1/imaging/:id/complete", put(complete_imaging_handler))
        .route(
            "/api/v1/prescriptions",
            post(create_prescription_handler).get(list_prescriptions_handler),
        )
        .route("/api/v1/prescriptions/:id/send", put(send_prescription_handler))
        .route(
            "/api/v1/prescriptions/:id/complete",
            put(complete_prescription_handler),
        )
        .route("/api/v1/beds", post(create_bed_handler).get(list_beds_handler))
        .route("/api/v1/beds/:id/occupy", put(occupy_bed_handler))
        .route("/api/v1/beds/:id/free", put(free_bed_handler))
        .route(
            "/api/v1/exams/:kind",
            post(create_exam_handler).get(list_exams_handler),
        )
        .route("/api/v1/exams/:kind/:id/price", put(update_exam_price_handler))
        .route("/api/v1/exams/:kind/:id/active", put(set_exam_active_handler))
        .route(
            "/api/v1/pharmacy/products",
            post(create_product_handler).get(list_products_handler),
        )
        .route(
            "/api/v1/pharmacy/products/:id/restock",
            put(restock_product_handler),
        )
        .route(
            "/api/v1/pharmacy/sales",
            post(record_sale_handler).get(list_sales_handler),
        )
        .with_state(state)
        .layer(cors)
}

/// Seeds the first administrator account on an empty store so a fresh
/// deployment has a way in. Does nothing once any account exists.
fn bootstrap_admin(store: &MemoryStore, config: &RestApiConfig) -> Result<(), CareError> {
    store.write(|tables| {
        if !tables.users.is_empty() {
            return Ok(());
        }
        let admin = User::from_new_user(NewUser {
            first_name: "System".into(),
            last_name: "Administrator".into(),
            email: config.admin_email.clone(),
            password: config.admin_password.clone(),
            role: Role::Administrator,
            phone: None,
        })?;
        warn!(
            "No staff accounts found, seeded administrator '{}'. Change its password.",
            admin.email
        );
        tables.users.insert(admin.id, admin);
        Ok(())
    })
}

// Main function to start the REST API server
pub async fn start_server(
    config: RestApiConfig,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), AnyhowError> {
    let store = match &config.data_path {
        Some(path) => Arc::new(
            MemoryStore::open(path.clone())
                .with_context(|| format!("Failed to open store snapshot {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    bootstrap_admin(&store, &config).context("Failed to seed the first administrator")?;

    let auth = AuthKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_hours);
    let state = AppState::new(Arc::clone(&store), auth);

    let (tx, rx_internal) = oneshot::channel();
    *state.shutdown_tx.lock().await = Some(tx);

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    info!("REST API server listening on {}", addr);

    let combined_shutdown_signal = async {
        tokio::select! {
            _ = shutdown_rx => {
                info!("Received external shutdown signal");
            }
            _ = rx_internal => {
                info!("Received internal shutdown signal");
            }
        }
    };

    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to address: {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(combined_shutdown_signal)
        .await
        .context("REST API server failed to start or run")?;

    store
        .flush()
        .context("Failed to write the store snapshot on shutdown")?;
    info!("REST API server stopped");
    Ok(())
}
