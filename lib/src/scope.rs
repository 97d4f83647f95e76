// lib/src/scope.rs
// Capability scoping in one place. Every role-dependent listing derives a
// scope here and applies it uniformly, instead of re-branching on the role
// at each call site. The composite effective status is also projected here,
// once, in the query layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::requests::effective_status;
use models::{
    AncillaryKind, AncillaryRequest, EffectiveStatus, PaymentStatus, Principal, RequestStatus,
    Role, User,
};

use crate::store::Tables;

/// Refuses the operation unless the caller holds one of the listed roles.
pub fn ensure_role(principal: &Principal, allowed: &[Role]) -> CareResult<()> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(CareError::forbidden(format!(
            "Role {} may not perform this action",
            principal.role
        )))
    }
}

/// Caller-supplied listing filters, before scoping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

/// What one principal is allowed to see of the request tables. Built once
/// per query from the role, then applied row by row.
#[derive(Debug, Clone)]
pub struct RequestScope {
    status: Option<RequestStatus>,
    doctor_id: Option<Uuid>,
    patient_id: Option<Uuid>,
    date: Option<NaiveDate>,
    paid_only: bool,
}

impl RequestScope {
    /// Derives the scope for a principal:
    /// administrators and reception see everything the filter asks for;
    /// doctors see their own orders only; technicians see only orders whose
    /// gating payment is settled (their queue defaults to pending and date
    /// filters do not apply); pharmacy staff have no business here.
    pub fn for_principal(principal: &Principal, filter: RequestFilter) -> CareResult<Self> {
        match principal.role {
            Role::Administrator | Role::Reception => Ok(RequestScope {
                status: filter.status,
                doctor_id: None,
                patient_id: filter.patient_id,
                date: filter.date,
                paid_only: false,
            }),
            Role::Doctor => Ok(RequestScope {
                status: filter.status,
                doctor_id: Some(principal.id),
                patient_id: filter.patient_id,
                date: filter.date,
                paid_only: false,
            }),
            Role::LabTechnician => Ok(RequestScope {
                status: Some(filter.status.unwrap_or(RequestStatus::Pending)),
                doctor_id: None,
                patient_id: filter.patient_id,
                date: None,
                paid_only: true,
            }),
            Role::Pharmacy => Err(CareError::forbidden(
                "Role pharmacy may not list lab or imaging requests",
            )),
        }
    }

    fn matches(&self, tables: &Tables, request: &AncillaryRequest) -> bool {
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        if let Some(doctor_id) = self.doctor_id {
            if request.doctor_id != doctor_id {
                return false;
            }
        }
        if let Some(patient_id) = self.patient_id {
            if request.patient_id != patient_id {
                return false;
            }
        }
        if let Some(date) = self.date {
            if request.created_at.date_naive() != date {
                return false;
            }
        }
        if self.paid_only {
            return matches!(tables.payment_status_of(request), Some(PaymentStatus::Paid));
        }
        true
    }
}

/// A request joined with its gating payment, carrying the one authoritative
/// composite status.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: AncillaryRequest,
    pub payment_status: Option<PaymentStatus>,
    pub effective_status: EffectiveStatus,
}

impl RequestView {
    pub fn project(tables: &Tables, request: AncillaryRequest) -> Self {
        let payment_status = tables.payment_status_of(&request);
        let effective = effective_status(request.status, payment_status);
        RequestView {
            request,
            payment_status,
            effective_status: effective,
        }
    }
}

/// The one listing path over a request table: derive the scope, apply it,
/// project the composite status. Newest first.
pub fn scoped_requests(
    tables: &Tables,
    kind: AncillaryKind,
    principal: &Principal,
    filter: RequestFilter,
) -> CareResult<Vec<RequestView>> {
    let scope = RequestScope::for_principal(principal, filter)?;
    let mut views: Vec<RequestView> = tables
        .requests(kind)
        .values()
        .filter(|request| scope.matches(tables, request))
        .map(|request| RequestView::project(tables, request.clone()))
        .collect();
    views.sort_by(|a, b| b.request.created_at.cmp(&a.request.created_at));
    Ok(views)
}

/// Directory visibility: administrators see every account, reception sees
/// the active technician pool it dispatches to, nobody else sees anyone.
pub fn scoped_users(tables: &Tables, principal: &Principal) -> CareResult<Vec<User>> {
    match principal.role {
        Role::Administrator => Ok(tables.users.values().cloned().collect()),
        Role::Reception => Ok(tables
            .users
            .values()
            .filter(|u| u.role == Role::LabTechnician && u.is_active_staff())
            .cloned()
            .collect()),
        _ => Err(CareError::forbidden(format!(
            "Role {} may not list user accounts",
            principal.role
        ))),
    }
}
