//! # Bulk Duplicate Marking
//!
//! Idempotent batch recomputation of duplicate flags across the whole store,
//! used after enabling detection or after a bulk import that bypassed
//! per-record reconciliation. Hashes must be regenerated under the current
//! identity-field configuration before grouping; stale hashes from a prior
//! configuration silently produce wrong groupings, so callers run
//! `regenerate_hashes` first (the registry facade always does).

use crate::identity::compute_identity_hash;
use crate::model::RecordId;
use crate::store::RecordStore;
use rayon::prelude::*;
use tracing::debug;

/// Outcome counters for the bulk marking job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkSummary {
    /// Identity groups with more than one member.
    pub duplicate_groups: usize,
    /// Records whose duplicate flag changed in this run.
    pub newly_marked: usize,
    /// Records flagged duplicate after the run.
    pub total_duplicates: usize,
}

/// Recompute every active record's identity hash under `fields`. Returns the
/// number of records whose hash changed. Hash computation is parallel over a
/// snapshot; index updates apply sequentially.
pub fn regenerate_hashes(store: &mut RecordStore, fields: &[String]) -> usize {
    let snapshot: Vec<_> = store.active_records().collect();
    let rehashed: Vec<(RecordId, Option<String>)> = snapshot
        .par_iter()
        .map(|record| (record.id, compute_identity_hash(record, fields)))
        .collect();

    let mut changed = 0;
    for (id, hash) in rehashed {
        let current = store
            .get(id)
            .map(|record| record.unique_identifier_hash.clone())
            .unwrap_or_default();
        if hash.as_deref().unwrap_or("") != current {
            store.set_hash(id, hash).expect("record came from snapshot");
            changed += 1;
        }
    }
    debug!(changed, "regenerated identity hashes");
    changed
}

/// Group records by identity hash and enforce oldest-wins flags: the
/// earliest member of each group is canonical, the rest are duplicates.
/// Hashless records and singleton groups end non-duplicate. Idempotent.
pub fn mark_duplicates(store: &mut RecordStore) -> MarkSummary {
    let mut summary = MarkSummary::default();

    for hash in store.group_hashes() {
        let members: Vec<(RecordId, bool)> = store
            .group_members(&hash)
            .iter()
            .map(|record| (record.id, record.duplicate))
            .collect();
        if members.len() > 1 {
            summary.duplicate_groups += 1;
        }
        for (position, (id, was_duplicate)) in members.iter().enumerate() {
            let duplicate = position > 0;
            if duplicate != *was_duplicate {
                store
                    .set_duplicate(*id, duplicate)
                    .expect("record came from group index");
                summary.newly_marked += 1;
            }
            if duplicate {
                summary.total_duplicates += 1;
            }
        }
    }
    debug!(
        groups = summary.duplicate_groups,
        newly_marked = summary.newly_marked,
        "marked duplicates"
    );
    summary
}
