//! # Identity Hasher
//!
//! Computes the content hash that groups records describing the same
//! underlying death report. The configured identity-field list is passed in
//! explicitly on every call; field order is part of the contract, since
//! reordering the configuration changes every hash and breaks group
//! continuity.

use crate::error::{RegistryError, Result};
use crate::model::VaRecord;
use crate::schema::FieldSchema;
use md5::{Digest, Md5};
use std::fmt::Write;
use tracing::warn;

/// Stringification of a field the record does not carry at all. A field that
/// is present but empty contributes the empty string instead.
pub const MISSING_VALUE: &str = "unknown";

/// Parse a comma-separated identity-field list as supplied by the
/// configuration collaborator, trimming whitespace and dropping empties.
pub fn parse_identity_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate configured identity-field names against the survey schema.
///
/// Unknown names are dropped with a warning and hashing proceeds with the
/// remainder. An empty input is the feature-disabled state and is fine; a
/// non-empty input whose every name is invalid degrades to disabled, which
/// must be surfaced to the operator rather than swallowed.
pub fn validate_identity_fields(fields: &[String], schema: &FieldSchema) -> Result<Vec<String>> {
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    let mut validated = Vec::with_capacity(fields.len());
    for name in fields {
        if schema.contains(name) {
            validated.push(name.clone());
        } else {
            warn!(field = %name, "identity field not in survey schema, dropping");
        }
    }
    if validated.is_empty() {
        return Err(RegistryError::Configuration(format!(
            "no configured identity field matches the survey schema: {:?}",
            fields
        )));
    }
    Ok(validated)
}

/// Compute the identity hash for a record.
///
/// Returns `None` when `fields` is empty: duplicate detection is disabled
/// and hashing an empty concatenation would spuriously collide all records.
/// Otherwise the hash is the lowercase-hex MD5 of the record's values for
/// the configured fields, concatenated in configuration order.
pub fn compute_identity_hash(record: &VaRecord, fields: &[String]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let mut joined = String::new();
    for name in fields {
        joined.push_str(record.field(name).unwrap_or(MISSING_VALUE));
    }
    let digest = Md5::digest(joined.as_bytes());
    let mut hex = String::with_capacity(32);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    Some(hex)
}
