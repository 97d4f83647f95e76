// models/src/errors.rs

use std::io;
pub use thiserror::Error;
use anyhow::Error as AnyhowError;
use bcrypt::BcryptError;
use rmp_serde::decode::Error as RmpDecodeError;
use rmp_serde::encode::Error as RmpEncodeError;
use uuid::Error as UuidError;

/// The error taxonomy every fallible operation in the care core returns.
///
/// Each variant carries a human-readable message; `kind` exposes the stable
/// machine-readable tag callers and the HTTP layer dispatch on.
#[derive(Debug, Error)]
pub enum CareError {
    #[error("Validation failed: {0}")]
    Validation(String), // Malformed or out-of-range input; caller corrects and resubmits
    #[error("{0} not found")]
    NotFound(String), // Referenced entity absent
    #[error("Forbidden: {0}")]
    Forbidden(String), // Authenticated but not authorized for this entity/action
    #[error("Authentication error: {0}")]
    Auth(String), // Missing/invalid credentials
    #[error("Conflict: {0}")]
    Conflict(String), // State-machine or invariant violation
    #[error("Constraint violated: {0}")]
    Constraint(String), // Storage-level uniqueness violation
    #[error("Failed to acquire lock: {0}")]
    Lock(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("An internal error occurred: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("UUID parsing or generation error: {0}")]
    Uuid(#[from] UuidError),
}

impl CareError {
    /// Stable machine-readable tag for the error surface.
    pub fn kind(&self) -> &'static str {
        match self {
            CareError::Validation(_) => "validation",
            CareError::NotFound(_) => "not_found",
            CareError::Forbidden(_) => "forbidden",
            CareError::Auth(_) => "auth",
            CareError::Conflict(_) => "conflict",
            CareError::Constraint(_) => "constraint",
            CareError::Lock(_)
            | CareError::Serialization(_)
            | CareError::Deserialization(_)
            | CareError::Internal(_)
            | CareError::Io(_)
            | CareError::Uuid(_) => "internal",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CareError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CareError::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        CareError::Forbidden(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        CareError::Auth(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CareError::Conflict(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        CareError::Constraint(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CareError::Internal(msg.into())
    }
}

// JSON payloads (vitals, lab results) pass through serde_json.
impl From<serde_json::Error> for CareError {
    fn from(err: serde_json::Error) -> Self {
        CareError::Serialization(format!("JSON processing error: {}", err))
    }
}

impl From<RmpEncodeError> for CareError {
    fn from(err: RmpEncodeError) -> Self {
        CareError::Serialization(format!("MessagePack encode error: {}", err))
    }
}

impl From<RmpDecodeError> for CareError {
    fn from(err: RmpDecodeError) -> Self {
        CareError::Deserialization(format!("MessagePack decode error: {}", err))
    }
}

impl From<AnyhowError> for CareError {
    fn from(err: AnyhowError) -> Self {
        CareError::Internal(format!("Underlying operation failed: {}", err))
    }
}

// Password hashing failures are never a caller problem.
impl From<BcryptError> for CareError {
    fn from(err: BcryptError) -> Self {
        CareError::Internal(format!("Password hashing failed: {}", err))
    }
}

pub type CareResult<T> = Result<T, CareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_expose_stable_kind_tags() {
        assert_eq!(CareError::validation("x").kind(), "validation");
        assert_eq!(CareError::not_found("Patient").kind(), "not_found");
        assert_eq!(CareError::forbidden("x").kind(), "forbidden");
        assert_eq!(CareError::Auth("x".into()).kind(), "auth");
        assert_eq!(CareError::conflict("x").kind(), "conflict");
        assert_eq!(CareError::constraint("x").kind(), "constraint");
        assert_eq!(CareError::internal("x").kind(), "internal");
        assert_eq!(CareError::Lock("poisoned".into()).kind(), "internal");
    }

    #[test]
    fn should_render_not_found_with_entity_name() {
        let err = CareError::not_found("Dossier 42");
        assert_eq!(err.to_string(), "Dossier 42 not found");
    }
}
