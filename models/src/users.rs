// models/src/users.rs
// Staff accounts. Plaintext passwords exist only in the NewUser/Login DTOs;
// the stored User carries a bcrypt hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use bcrypt::{DEFAULT_COST, hash, verify};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};
use crate::principal::{Principal, Role};

/// Registration payload received from the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String, // Plaintext password for input
    pub role: Role,
    pub phone: Option<String>,
}

/// A stored staff account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Bcrypt hash. Serialized so store snapshots restore working logins;
    /// the HTTP layer strips it before a user record leaves the process.
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub is_active: bool,
    pub is_suspended: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Hashes a plaintext password.
    pub fn hash_password(password: &str) -> CareResult<String> {
        Ok(hash(password, DEFAULT_COST)?)
    }

    /// Verifies a plaintext password against the stored hash.
    pub fn verify_password(&self, password: &str) -> CareResult<bool> {
        Ok(verify(password, &self.password_hash)?)
    }

    /// Builds a stored `User` from a registration payload, hashing the
    /// password.
    ///
    /// # Errors
    ///
    /// Returns `CareError::Validation` when the email or password fail the
    /// field checks, `CareError::Internal` when hashing itself fails.
    pub fn from_new_user(new_user: NewUser) -> CareResult<Self> {
        if new_user.first_name.trim().is_empty() || new_user.last_name.trim().is_empty() {
            return Err(CareError::validation("First and last name are required"));
        }
        if !new_user.email.contains('@') {
            return Err(CareError::validation(format!(
                "'{}' is not a valid email address",
                new_user.email
            )));
        }
        if new_user.password.len() < 6 {
            return Err(CareError::validation(
                "Password must be at least 6 characters long",
            ));
        }

        let now = Utc::now();
        let password_hash = Self::hash_password(&new_user.password)?;

        Ok(User {
            id: Uuid::new_v4(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email.trim().to_lowercase(),
            password_hash,
            role: new_user.role,
            phone: new_user.phone,
            is_active: true,
            is_suspended: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Active, non-suspended accounts are the only ones that may be assigned
    /// work or log in.
    pub fn is_active_staff(&self) -> bool {
        self.is_active && !self.is_suspended
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.role)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Login attempt payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String, // Plaintext password for the attempt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new_user() -> NewUser {
        NewUser {
            first_name: "Awa".into(),
            last_name: "Diallo".into(),
            email: "Awa.Diallo@hospital.test".into(),
            password: "s3cret-pass".into(),
            role: Role::Reception,
            phone: Some("770000000".into()),
        }
    }

    #[test]
    fn should_hash_password_and_normalize_email() {
        let user = User::from_new_user(sample_new_user()).unwrap();
        assert_ne!(user.password_hash, "s3cret-pass");
        assert_eq!(user.email, "awa.diallo@hospital.test");
        assert!(user.verify_password("s3cret-pass").unwrap());
        assert!(!user.verify_password("wrong").unwrap());
    }

    #[test]
    fn should_reject_short_password() {
        let mut new_user = sample_new_user();
        new_user.password = "abc".into();
        assert!(matches!(
            User::from_new_user(new_user),
            Err(CareError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_malformed_email() {
        let mut new_user = sample_new_user();
        new_user.email = "not-an-email".into();
        assert!(User::from_new_user(new_user).is_err());
    }

    #[test]
    fn should_treat_suspended_account_as_unavailable() {
        let mut user = User::from_new_user(sample_new_user()).unwrap();
        assert!(user.is_active_staff());
        user.is_suspended = true;
        assert!(!user.is_active_staff());
    }
}
