// lib/src/lib.rs
// The orchestration core: transactional in-memory store, capability scoping
// and one service per care workflow. Domain entities live in the separate
// 'models' crate.

pub mod scope;
pub mod services;
pub mod store;

// Import directly from the 'models' crate for entity types.
pub use models::errors::{CareError, CareResult};

// Explicit re-exports
pub use crate::scope::{ensure_role, scoped_requests, scoped_users, RequestFilter, RequestView};
pub use crate::services::CareServices;
pub use crate::store::{MemoryStore, Tables};
