//! # Data Model
//!
//! Core data structures for verbal-autopsy records. A record carries a large
//! flat set of survey-answer fields, opaque to the registry except for the
//! configured identity subset, plus the duplicate-reconciliation state
//! maintained at save time.

use crate::tree::LocationId;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// A point in time as UTC epoch seconds.
pub type Timestamp = i64;

/// The survey field holding the death date, as stored by ingestion.
/// The value is a plain string; unknown dates are stored as "dk".
pub const DEATH_DATE_FIELD: &str = "Id10023";

/// Current time as epoch seconds.
pub fn now() -> Timestamp {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Compact identifier for records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u32);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A single verbal-autopsy survey response.
///
/// `duplicate` and `unique_identifier_hash` are owned by the reconciliation
/// engine; callers populate the survey fields and location and let the
/// registry maintain the rest at save time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaRecord {
    /// Unique identifier for this record; `RecordId(0)` means not yet
    /// assigned and the store allocates one on insert.
    pub id: RecordId,
    /// External stable submission identifier used to decide create-vs-update
    /// during ingestion. Empty when the source has none.
    pub instance_id: String,
    /// The facility this record is anchored to, if resolved.
    pub location: Option<LocationId>,
    /// Survey-answer fields keyed by question id.
    pub fields: HashMap<String, String>,
    /// Set when this record shares an identity hash with an older record.
    pub duplicate: bool,
    /// MD5 hash over the configured identity fields; empty when duplicate
    /// detection is disabled.
    pub unique_identifier_hash: String,
    /// Creation time; zero means not yet stamped.
    pub created: Timestamp,
    pub updated: Timestamp,
    /// Soft-delete marker set by external data-cleanup workflows.
    pub deleted_at: Option<Timestamp>,
}

impl VaRecord {
    /// Create an empty record. The store assigns the id and the registry
    /// stamps `created` on first save.
    pub fn new() -> Self {
        Self {
            id: RecordId(0),
            instance_id: String::new(),
            location: None,
            fields: HashMap::new(),
            duplicate: false,
            unique_identifier_hash: String::new(),
            created: 0,
            updated: 0,
            deleted_at: None,
        }
    }

    /// Get a survey field value by question id.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set a survey field value.
    pub fn set_field(&mut self, name: &str, value: &str) {
        self.fields.insert(name.to_string(), value.to_string());
    }

    /// The stored death-date string, empty when absent.
    pub fn death_date(&self) -> &str {
        self.field(DEATH_DATE_FIELD).unwrap_or("")
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The oldest-wins ordering key: creation time with the record id as the
    /// stable tie-break.
    pub fn created_key(&self) -> (Timestamp, RecordId) {
        (self.created, self.id)
    }
}

impl Default for VaRecord {
    fn default() -> Self {
        Self::new()
    }
}
