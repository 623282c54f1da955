//! # Duplicate Reconciliation Engine
//!
//! Maintains the group invariant around every record save: among all records
//! sharing a non-empty identity hash, exactly one is non-duplicate, and it is
//! the earliest-created member. Planning is separated from application so the
//! old-group/new-group transition is an explicit, independently testable step
//! rather than a hidden save hook, and so nothing is persisted until the
//! whole transition is decided.

use crate::error::{RegistryError, Result};
use crate::identity::compute_identity_hash;
use crate::model::{RecordId, VaRecord};
use crate::store::RecordStore;
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::debug;

/// The decided outcome of reconciling one save. Applied atomically by the
/// persistence layer: flag writes to other group members plus the saved
/// record's own hash and flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciliationPlan {
    /// Whether an identity field changed (always true for creates with the
    /// feature enabled). When false the save leaves hash and flag untouched.
    pub identity_changed: bool,
    /// Hash to write to the saved record; `None` when detection is disabled.
    pub hash: Option<String>,
    /// Duplicate flag to write to the saved record.
    pub duplicate: bool,
    /// Oldest remaining member of the group the record is leaving, to be
    /// made canonical.
    pub promote: Option<RecordId>,
    /// Formerly-canonical member of the group the record is joining, to be
    /// demoted because the saved record is older.
    pub demote: Option<RecordId>,
}

impl ReconciliationPlan {
    fn unchanged(previous: &VaRecord) -> Self {
        Self {
            identity_changed: false,
            hash: if previous.unique_identifier_hash.is_empty() {
                None
            } else {
                Some(previous.unique_identifier_hash.clone())
            },
            duplicate: previous.duplicate,
            promote: None,
            demote: None,
        }
    }

    /// Write the decided hash and flag onto the record being saved.
    pub fn apply_to(&self, record: &mut VaRecord) {
        record.unique_identifier_hash = self.hash.clone().unwrap_or_default();
        record.duplicate = self.duplicate;
    }
}

/// True when any configured identity field differs between the proposed
/// record and its stored snapshot.
pub fn identity_changed(record: &VaRecord, previous: &VaRecord, fields: &[String]) -> bool {
    fields
        .iter()
        .any(|name| record.field(name) != previous.field(name))
}

/// Decide the outcome of creating `record`.
///
/// A new record can never be older than anything already persisted, so if
/// the group it hashes into is non-empty the record is a duplicate.
pub fn plan_create(store: &RecordStore, record: &VaRecord, fields: &[String]) -> ReconciliationPlan {
    let Some(hash) = compute_identity_hash(record, fields) else {
        return ReconciliationPlan::default();
    };
    let duplicate = !store.group_members(&hash).is_empty();
    debug!(hash = %hash, duplicate, "planned create reconciliation");
    ReconciliationPlan {
        identity_changed: true,
        hash: Some(hash),
        duplicate,
        promote: None,
        demote: None,
    }
}

/// Decide the outcome of updating `record`, given its stored snapshot.
///
/// When an identity field changed, the record leaves its old group (the
/// oldest remaining member is promoted to canonical) and joins the group of
/// its new hash: canonical if the group is empty or everything in it is
/// younger (in which case the incumbent is demoted), duplicate otherwise.
pub fn plan_update(
    store: &RecordStore,
    record: &VaRecord,
    previous: &VaRecord,
    fields: &[String],
) -> ReconciliationPlan {
    if !identity_changed(record, previous, fields) {
        return ReconciliationPlan::unchanged(previous);
    }
    let Some(hash) = compute_identity_hash(record, fields) else {
        return ReconciliationPlan::default();
    };

    // Leaving the old group: the oldest member left behind becomes canonical.
    let promote = store
        .oldest_in_group(&previous.unique_identifier_hash, Some(record.id))
        .map(|oldest| oldest.id);

    // Joining the new group.
    let (duplicate, demote) = match store.oldest_in_group(&hash, Some(record.id)) {
        None => (false, None),
        Some(oldest) if oldest.created_key() < record.created_key() => (true, None),
        Some(oldest) => (false, Some(oldest.id)),
    };

    debug!(
        old_hash = %previous.unique_identifier_hash,
        new_hash = %hash,
        duplicate,
        promoted = ?promote,
        demoted = ?demote,
        "planned update reconciliation"
    );
    ReconciliationPlan {
        identity_changed: true,
        hash: Some(hash),
        duplicate,
        promote,
        demote,
    }
}

/// Serializes reconciliations per identity group.
///
/// Guards are striped: each hash maps to one of a fixed set of mutexes, so
/// saves touching disjoint groups proceed in parallel while two saves in the
/// same group serialize their read-then-write window. Acquisition is
/// bounded; exhaustion surfaces as a retryable `ReconciliationRace`.
#[derive(Debug)]
pub struct GroupLockTable {
    stripes: Box<[Mutex<()>]>,
    max_attempts: u32,
    timeout: Duration,
}

/// Held stripe guards; dropping releases the group locks.
#[derive(Debug)]
pub struct GroupGuards<'a> {
    #[allow(dead_code)]
    guards: Vec<MutexGuard<'a, ()>>,
}

impl GroupLockTable {
    pub fn new(stripes: usize, max_attempts: u32, timeout: Duration) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            max_attempts: max_attempts.max(1),
            timeout,
        }
    }

    fn stripe_for(&self, hash: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hash.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    /// Lock the stripes covering the given identity hashes, in index order
    /// to avoid deadlock. Empty hashes (detection disabled) need no lock.
    pub fn lock_groups(&self, hashes: &[&str]) -> Result<GroupGuards<'_>> {
        let mut indices: Vec<usize> = hashes
            .iter()
            .filter(|hash| !hash.is_empty())
            .map(|hash| self.stripe_for(hash))
            .collect();
        indices.sort_unstable();
        indices.dedup();

        for _ in 0..self.max_attempts {
            let mut guards = Vec::with_capacity(indices.len());
            let mut acquired_all = true;
            for &index in &indices {
                match self.stripes[index].try_lock_for(self.timeout) {
                    Some(guard) => guards.push(guard),
                    None => {
                        acquired_all = false;
                        break;
                    }
                }
            }
            if acquired_all {
                return Ok(GroupGuards { guards });
            }
            // Drop partial acquisitions before retrying.
            drop(guards);
        }
        Err(RegistryError::ReconciliationRace {
            attempts: self.max_attempts,
        })
    }

    /// Lock every stripe, serializing against all in-flight saves. Used by
    /// the bulk marking job, which rewrites every group.
    pub fn lock_all(&self) -> GroupGuards<'_> {
        let guards = self.stripes.iter().map(|stripe| stripe.lock()).collect();
        GroupGuards { guards }
    }
}
