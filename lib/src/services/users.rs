// lib/src/services/users.rs
// Staff accounts. Creation is administrator-only; authentication backs the
// login route and is the only place passwords are ever checked.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{Login, NewUser, Principal, Role, User};

use crate::scope::{ensure_role, scoped_users};
use crate::store::MemoryStore;

#[derive(Debug, Clone, Serialize)]
pub struct DoctorSummary {
    #[serde(flatten)]
    pub doctor: User,
    pub active_assignments: usize,
}

#[derive(Debug, Clone)]
pub struct UserDirectory {
    store: Arc<MemoryStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        UserDirectory { store }
    }

    /// Creates a staff account with a bcrypt-hashed password.
    ///
    /// # Errors
    ///
    /// `Conflict` on a duplicate email, `Validation` for payload problems,
    /// `Forbidden` for non-administrators.
    pub async fn create_user(&self, new_user: NewUser, principal: &Principal) -> CareResult<User> {
        ensure_role(principal, &[Role::Administrator])?;
        let user = self.store.write(move |tables| {
            let email = new_user.email.trim().to_lowercase();
            if tables.find_user_by_email(&email).is_some() {
                return Err(CareError::conflict(format!(
                    "A user with email '{}' already exists",
                    email
                )));
            }
            let user = User::from_new_user(new_user)?;
            tables.users.insert(user.id, user.clone());
            Ok(user)
        })?;
        info!(user = %user.id, role = %user.role, "staff account created");
        Ok(user)
    }

    /// Checks credentials and stamps the login time. The same message covers
    /// an unknown email and a wrong password.
    pub async fn authenticate(&self, login: Login) -> CareResult<User> {
        let user = self.store.write(move |tables| {
            let user = tables
                .find_user_by_email(&login.email)
                .ok_or_else(|| CareError::auth("Invalid email or password"))?;
            if !user.verify_password(&login.password)? {
                return Err(CareError::auth("Invalid email or password"));
            }
            if !user.is_active {
                return Err(CareError::forbidden("Account is deactivated"));
            }
            if user.is_suspended {
                return Err(CareError::forbidden("Account is suspended"));
            }
            let user = tables.user_mut(user.id)?;
            user.last_login = Some(chrono::Utc::now());
            Ok(user.clone())
        });
        if let Err(ref err) = user {
            warn!(error = %err, "login rejected");
        }
        user
    }

    /// Users may read themselves, administrators anyone.
    pub async fn find_user(&self, user_id: Uuid, principal: &Principal) -> CareResult<User> {
        if !principal.owns_or_admin(user_id) {
            return Err(CareError::forbidden("You may only view your own account"));
        }
        self.store.read(move |tables| tables.require_user(user_id))
    }

    /// Capability-scoped directory listing. Administrators see everyone;
    /// reception sees only the active technician accounts it dispatches to.
    pub async fn list_users(&self, principal: &Principal) -> CareResult<Vec<User>> {
        let principal = *principal;
        self.store
            .read(move |tables| scoped_users(tables, &principal))
    }

    /// The desk's doctor picker, with current workload attached.
    pub async fn list_doctors(&self, principal: &Principal) -> CareResult<Vec<DoctorSummary>> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        self.store.read(|tables| {
            let mut doctors: Vec<DoctorSummary> = tables
                .users
                .values()
                .filter(|u| u.role == Role::Doctor && u.is_active_staff())
                .map(|doctor| DoctorSummary {
                    active_assignments: tables
                        .assignments
                        .values()
                        .filter(|a| a.doctor_id == doctor.id && a.is_active())
                        .count(),
                    doctor: doctor.clone(),
                })
                .collect();
            doctors.sort_by(|a, b| a.doctor.last_name.cmp(&b.doctor.last_name));
            Ok(doctors)
        })
    }

    /// Turns an account on or off. Deactivated accounts fail authentication
    /// and stop counting as available staff.
    pub async fn set_user_active(
        &self,
        user_id: Uuid,
        active: bool,
        principal: &Principal,
    ) -> CareResult<User> {
        ensure_role(principal, &[Role::Administrator])?;
        let user = self.store.write(move |tables| {
            let user = tables.user_mut(user_id)?;
            user.is_active = active;
            user.updated_at = chrono::Utc::now();
            Ok(user.clone())
        })?;
        info!(user = %user.id, active, "account availability changed");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;

    fn new_nurse(email: &str) -> NewUser {
        NewUser {
            first_name: "Binta".into(),
            last_name: "Sow".into(),
            email: email.into(),
            password: "s3cret-pass".into(),
            role: Role::LabTechnician,
            phone: Some("771234567".into()),
        }
    }

    #[tokio::test]
    async fn should_create_account_once_per_email() {
        let cx = TestContext::new();
        let user = cx
            .services
            .users
            .create_user(new_nurse("binta.sow@hospital.test"), &cx.admin)
            .await
            .unwrap();
        assert_eq!(user.role, Role::LabTechnician);
        assert_ne!(user.password_hash, "s3cret-pass");

        let err = cx
            .services
            .users
            .create_user(new_nurse("Binta.Sow@hospital.test"), &cx.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));

        let err = cx
            .services
            .users
            .create_user(new_nurse("other@hospital.test"), &cx.reception)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }

    #[tokio::test]
    async fn should_authenticate_and_stamp_last_login() {
        let cx = TestContext::new();
        cx.services
            .users
            .create_user(new_nurse("login.test@hospital.test"), &cx.admin)
            .await
            .unwrap();

        let user = cx
            .services
            .users
            .authenticate(Login {
                email: "login.test@hospital.test".into(),
                password: "s3cret-pass".into(),
            })
            .await
            .unwrap();
        assert!(user.last_login.is_some());

        let err = cx
            .services
            .users
            .authenticate(Login {
                email: "login.test@hospital.test".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Auth(_)));
        let err = cx
            .services
            .users
            .authenticate(Login {
                email: "nobody@hospital.test".into(),
                password: "s3cret-pass".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Auth(_)));
    }

    #[tokio::test]
    async fn should_reject_deactivated_account_at_login() {
        let cx = TestContext::new();
        let user = cx
            .services
            .users
            .create_user(new_nurse("off.duty@hospital.test"), &cx.admin)
            .await
            .unwrap();
        cx.services
            .users
            .set_user_active(user.id, false, &cx.admin)
            .await
            .unwrap();

        let err = cx
            .services
            .users
            .authenticate(Login {
                email: "off.duty@hospital.test".into(),
                password: "s3cret-pass".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }

    #[tokio::test]
    async fn should_scope_directory_per_role() {
        let cx = TestContext::new();
        let everyone = cx.services.users.list_users(&cx.admin).await.unwrap();
        assert!(everyone.len() >= 5);

        let for_reception = cx.services.users.list_users(&cx.reception).await.unwrap();
        assert!(!for_reception.is_empty());
        assert!(for_reception
            .iter()
            .all(|u| u.role == Role::LabTechnician && u.is_active_staff()));

        let err = cx.services.users.list_users(&cx.doctor).await.unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }

    #[tokio::test]
    async fn should_count_active_assignments_in_doctor_picker() {
        let cx = TestContext::new();
        cx.assigned_episode().await;
        let doctors = cx.services.users.list_doctors(&cx.reception).await.unwrap();
        let busy = doctors
            .iter()
            .find(|d| d.doctor.id == cx.doctor.id)
            .unwrap();
        assert_eq!(busy.active_assignments, 1);
    }
}
