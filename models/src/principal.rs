// models/src/principal.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CareError;

/// Staff roles recognized by the care core. Role checks are preconditions of
/// individual operations, not a blanket permission layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Reception,
    Doctor,
    LabTechnician,
    Pharmacy,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Reception => "reception",
            Role::Doctor => "doctor",
            Role::LabTechnician => "lab_technician",
            Role::Pharmacy => "pharmacy",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = CareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "administrator" | "admin" => Ok(Role::Administrator),
            "reception" => Ok(Role::Reception),
            "doctor" => Ok(Role::Doctor),
            "lab_technician" | "lab" => Ok(Role::LabTechnician),
            "pharmacy" => Ok(Role::Pharmacy),
            other => Err(CareError::validation(format!(
                "Unknown role '{}'. Expected one of: administrator, reception, doctor, lab_technician, pharmacy",
                other
            ))),
        }
    }
}

/// The authenticated caller every operation receives. Produced by the
/// transport layer after token verification; the core never sees credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Principal { id, role }
    }

    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }

    /// Administrators may act on anyone's records; everyone else only on
    /// records they own.
    pub fn owns_or_admin(&self, owner: Uuid) -> bool {
        self.is_administrator() || self.id == owner
    }
}
