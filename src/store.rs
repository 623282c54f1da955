//! # Store Module
//!
//! In-memory record storage with the indexes the reconciliation engine and
//! the query resolver need: identity-hash groups in creation order and an
//! instance-id index for ingestion's create-vs-update decision. Stands in
//! for the relational store behind the same contract.

use crate::error::{RegistryError, Result};
use crate::model::{RecordId, Timestamp, VaRecord};
use hashbrown::HashMap;
use std::collections::BTreeSet;

/// Counters describing the current store contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMetrics {
    pub records: usize,
    pub identity_groups: usize,
    pub duplicates: usize,
}

/// Main storage for records and their identity-group index.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    /// All records indexed by ID
    records: HashMap<RecordId, VaRecord>,
    /// Identity groups: hash -> members ordered by (created, id).
    /// Only non-empty hashes are indexed.
    by_hash: HashMap<String, BTreeSet<(Timestamp, RecordId)>>,
    /// Submission instance id -> record, for ingestion upserts.
    by_instance: HashMap<String, RecordId>,
    /// Next available record ID
    next_record_id: u32,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            by_hash: HashMap::new(),
            by_instance: HashMap::new(),
            next_record_id: 1,
        }
    }

    /// Insert a record, assigning an id if it has none. Returns the id.
    pub fn insert(&mut self, mut record: VaRecord) -> RecordId {
        if record.id.0 == 0 {
            record.id = RecordId(self.next_record_id);
            self.next_record_id += 1;
        } else {
            self.next_record_id = self.next_record_id.max(record.id.0 + 1);
        }
        let id = record.id;
        self.index(&record);
        self.records.insert(id, record);
        id
    }

    /// Replace an existing record wholesale, refreshing its index entries.
    pub fn replace(&mut self, record: VaRecord) -> Result<()> {
        let old = self
            .records
            .get(&record.id)
            .ok_or(RegistryError::UnknownRecord(record.id))?
            .clone();
        self.unindex(&old);
        self.index(&record);
        self.records.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Option<&VaRecord> {
        self.records.get(&id)
    }

    /// Flip a record's duplicate flag in place.
    pub fn set_duplicate(&mut self, id: RecordId, duplicate: bool) -> Result<()> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::UnknownRecord(id))?;
        record.duplicate = duplicate;
        Ok(())
    }

    /// Rewrite a record's identity hash, moving it between groups.
    pub fn set_hash(&mut self, id: RecordId, hash: Option<String>) -> Result<()> {
        let record = self
            .records
            .get(&id)
            .ok_or(RegistryError::UnknownRecord(id))?;
        let key = record.created_key();
        let old_hash = record.unique_identifier_hash.clone();
        self.remove_group_entry(&old_hash, key);

        let record = self.records.get_mut(&id).expect("checked above");
        record.unique_identifier_hash = hash.unwrap_or_default();
        let new_hash = record.unique_identifier_hash.clone();
        let deleted = record.is_deleted();
        if !new_hash.is_empty() && !deleted {
            self.by_hash.entry(new_hash).or_default().insert(key);
        }
        Ok(())
    }

    /// Mark a record soft-deleted. Deleted records drop out of group and
    /// query results but keep their row.
    pub fn mark_deleted(&mut self, id: RecordId, at: Timestamp) -> Result<()> {
        let record = self
            .records
            .get(&id)
            .ok_or(RegistryError::UnknownRecord(id))?
            .clone();
        self.unindex(&record);
        let record = self.records.get_mut(&id).expect("checked above");
        record.deleted_at = Some(at);
        Ok(())
    }

    /// Members of an identity group in (created, id) order, excluding
    /// soft-deleted records. The empty hash is never a group.
    pub fn group_members(&self, hash: &str) -> Vec<&VaRecord> {
        if hash.is_empty() {
            return Vec::new();
        }
        self.by_hash
            .get(hash)
            .map(|keys| {
                keys.iter()
                    .filter_map(|(_, id)| self.records.get(id))
                    .filter(|record| !record.is_deleted())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Oldest member of a group, optionally excluding one record.
    pub fn oldest_in_group(&self, hash: &str, exclude: Option<RecordId>) -> Option<&VaRecord> {
        self.group_members(hash)
            .into_iter()
            .find(|record| Some(record.id) != exclude)
    }

    /// All identity hashes currently indexed.
    pub fn group_hashes(&self) -> Vec<String> {
        self.by_hash.keys().cloned().collect()
    }

    pub fn find_by_instance(&self, instance_id: &str) -> Option<RecordId> {
        if instance_id.is_empty() {
            return None;
        }
        self.by_instance.get(instance_id).copied()
    }

    /// All records, including soft-deleted ones.
    pub fn iter(&self) -> impl Iterator<Item = &VaRecord> {
        self.records.values()
    }

    /// Records visible to queries: not soft-deleted.
    pub fn active_records(&self) -> impl Iterator<Item = &VaRecord> {
        self.records.values().filter(|record| !record.is_deleted())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            records: self.records.len(),
            identity_groups: self.by_hash.len(),
            duplicates: self
                .records
                .values()
                .filter(|record| record.duplicate)
                .count(),
        }
    }

    fn index(&mut self, record: &VaRecord) {
        if !record.unique_identifier_hash.is_empty() && !record.is_deleted() {
            self.by_hash
                .entry(record.unique_identifier_hash.clone())
                .or_default()
                .insert(record.created_key());
        }
        if !record.instance_id.is_empty() {
            self.by_instance
                .insert(record.instance_id.clone(), record.id);
        }
    }

    fn unindex(&mut self, record: &VaRecord) {
        let hash = record.unique_identifier_hash.clone();
        self.remove_group_entry(&hash, record.created_key());
        if !record.instance_id.is_empty() {
            if let Some(indexed) = self.by_instance.get(&record.instance_id) {
                if *indexed == record.id {
                    self.by_instance.remove(&record.instance_id);
                }
            }
        }
    }

    fn remove_group_entry(&mut self, hash: &str, key: (Timestamp, RecordId)) {
        if hash.is_empty() {
            return;
        }
        if let Some(group) = self.by_hash.get_mut(hash) {
            group.remove(&key);
            if group.is_empty() {
                self.by_hash.remove(hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_hash(created: Timestamp, hash: &str) -> VaRecord {
        let mut record = VaRecord::new();
        record.created = created;
        record.unique_identifier_hash = hash.to_string();
        record
    }

    #[test]
    fn test_insert_assigns_ids() {
        let mut store = RecordStore::new();
        let first = store.insert(VaRecord::new());
        let second = store.insert(VaRecord::new());
        assert_eq!(first, RecordId(1));
        assert_eq!(second, RecordId(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_group_members_ordered_by_creation() {
        let mut store = RecordStore::new();
        store.insert(record_with_hash(200, "h1"));
        store.insert(record_with_hash(100, "h1"));
        store.insert(record_with_hash(150, "h2"));

        let group: Vec<Timestamp> = store
            .group_members("h1")
            .iter()
            .map(|record| record.created)
            .collect();
        assert_eq!(group, vec![100, 200]);
        assert_eq!(store.group_members("h2").len(), 1);
        assert!(store.group_members("").is_empty());
    }

    #[test]
    fn test_group_tie_break_by_id() {
        let mut store = RecordStore::new();
        let a = store.insert(record_with_hash(100, "h"));
        let b = store.insert(record_with_hash(100, "h"));

        let ids: Vec<RecordId> = store.group_members("h").iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_oldest_in_group_with_exclusion() {
        let mut store = RecordStore::new();
        let first = store.insert(record_with_hash(100, "h"));
        let second = store.insert(record_with_hash(200, "h"));

        assert_eq!(store.oldest_in_group("h", None).unwrap().id, first);
        assert_eq!(store.oldest_in_group("h", Some(first)).unwrap().id, second);
        assert!(store.oldest_in_group("h", Some(first)).unwrap().id != first);
    }

    #[test]
    fn test_set_hash_moves_between_groups() {
        let mut store = RecordStore::new();
        let id = store.insert(record_with_hash(100, "old"));
        store.set_hash(id, Some("new".to_string())).unwrap();

        assert!(store.group_members("old").is_empty());
        assert_eq!(store.group_members("new").len(), 1);
        assert_eq!(store.get(id).unwrap().unique_identifier_hash, "new");

        store.set_hash(id, None).unwrap();
        assert!(store.group_members("new").is_empty());
        assert_eq!(store.get(id).unwrap().unique_identifier_hash, "");
    }

    #[test]
    fn test_soft_deleted_records_leave_groups() {
        let mut store = RecordStore::new();
        let first = store.insert(record_with_hash(100, "h"));
        store.insert(record_with_hash(200, "h"));

        store.mark_deleted(first, 300).unwrap();
        let group = store.group_members("h");
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].created, 200);
        assert_eq!(store.active_records().count(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_instance_index() {
        let mut store = RecordStore::new();
        let mut record = VaRecord::new();
        record.instance_id = "uuid:abc".to_string();
        let id = store.insert(record);

        assert_eq!(store.find_by_instance("uuid:abc"), Some(id));
        assert_eq!(store.find_by_instance(""), None);
        assert_eq!(store.find_by_instance("uuid:missing"), None);
    }

    #[test]
    fn test_metrics() {
        let mut store = RecordStore::new();
        store.insert(record_with_hash(100, "h1"));
        let mut dup = record_with_hash(200, "h1");
        dup.duplicate = true;
        store.insert(dup);

        let metrics = store.metrics();
        assert_eq!(metrics.records, 2);
        assert_eq!(metrics.identity_groups, 1);
        assert_eq!(metrics.duplicates, 1);
    }
}
