//! # Error Types
//!
//! The error taxonomy for registry operations. Configuration and structural
//! errors are recovered close to their source; only lock exhaustion and
//! unknown-entity errors propagate to callers.

use crate::model::RecordId;
use crate::tree::LocationId;

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The identity-field configuration is unusable (every configured field
    /// name is invalid, or the configuration source failed to load).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A location insertion would collide with an existing tree path.
    #[error("location path conflict at {path:?}")]
    StructuralConflict { path: String },

    /// Lock contention on an identity group persisted across every retry.
    /// The save was not applied; the caller should retry from scratch.
    #[error("identity group lock contention after {attempts} attempts")]
    ReconciliationRace { attempts: u32 },

    /// An operation referenced a record that is not in the store.
    #[error("unknown record {0}")]
    UnknownRecord(RecordId),

    /// An operation referenced a location that is not in the tree.
    #[error("unknown location {0}")]
    UnknownLocation(LocationId),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
