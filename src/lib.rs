//! # VA Registry
//!
//! A verbal-autopsy record registry: duplicate detection with oldest-wins
//! canonical designation, and location-scoped access control over a
//! materialized-path administrative hierarchy.
//!
//! This library is the data-management core behind a VA reporting system.
//! Ingestion hands it proposed records; the registry assigns identity
//! hashes, reconciles duplicate groups transactionally around every save,
//! and answers per-user scoped queries for reporting and export.

pub mod config;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod model;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod tree;

// Re-export main types for convenience
pub use config::{ConfigOverrides, ReconcileConfig, RegistryConfig};
pub use error::{RegistryError, Result};
pub use jobs::MarkSummary;
pub use model::{RecordId, Timestamp, VaRecord};
pub use query::{AccessScope, ScopedQuery, UserAccess};
pub use reconcile::ReconciliationPlan;
pub use schema::FieldSchema;
pub use store::{RecordStore, StoreMetrics};
pub use tree::{LocationId, LocationKind, LocationNode, LocationTree};

use identity::compute_identity_hash;
use model::now;
use parking_lot::RwLock;
use reconcile::GroupLockTable;
use std::time::Duration;
use tracing::warn;

/// How a record's location was resolved. A fallback is a data-quality
/// signal for downstream review, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationResolution {
    pub location: LocationId,
    /// True when the record was anchored to the Unknown sentinel because no
    /// facility matched.
    pub fallback: bool,
}

/// Main API for the registry.
///
/// Saves may run concurrently from multiple threads; reconciliations
/// touching the same identity group serialize on the group lock table while
/// disjoint groups proceed in parallel.
pub struct VaRegistry {
    store: RwLock<RecordStore>,
    tree: RwLock<LocationTree>,
    config: RegistryConfig,
    /// Identity fields surviving schema validation, in configuration order.
    identity_fields: Vec<String>,
    locks: GroupLockTable,
}

impl VaRegistry {
    /// Create a registry, validating the identity-field configuration
    /// against the default WHO survey schema.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        Self::with_schema(config, &FieldSchema::who_default())
    }

    /// Create a registry with a custom survey schema.
    pub fn with_schema(config: RegistryConfig, survey_schema: &FieldSchema) -> Result<Self> {
        let identity_fields =
            identity::validate_identity_fields(&config.identity_fields, survey_schema)?;
        let locks = GroupLockTable::new(
            config.reconcile.lock_stripes,
            config.reconcile.max_lock_attempts,
            Duration::from_millis(config.reconcile.lock_timeout_ms),
        );
        Ok(Self {
            store: RwLock::new(RecordStore::new()),
            tree: RwLock::new(LocationTree::new()),
            config,
            identity_fields,
            locks,
        })
    }

    /// The validated identity fields in effect.
    pub fn identity_fields(&self) -> &[String] {
        &self.identity_fields
    }

    /// Create a record: compute its identity hash, decide its duplicate flag
    /// against the group it hashes into, and persist it. The read-then-write
    /// window is serialized per identity group.
    pub fn create_record(&self, mut record: VaRecord) -> Result<RecordId> {
        if record.created == 0 {
            record.created = now();
        }
        record.updated = record.updated.max(record.created);

        let hash = compute_identity_hash(&record, &self.identity_fields);
        let _guards = self
            .locks
            .lock_groups(&[hash.as_deref().unwrap_or("")])?;

        let plan = {
            let store = self.store.read();
            reconcile::plan_create(&store, &record, &self.identity_fields)
        };
        plan.apply_to(&mut record);
        Ok(self.store.write().insert(record))
    }

    /// Update an existing record. When an identity field changed, the old
    /// group gets a new canonical member and the new group is reconciled
    /// against the record's age; otherwise hash and flag are left untouched.
    /// Nothing is persisted until the whole transition is decided.
    pub fn update_record(&self, mut record: VaRecord) -> Result<ReconciliationPlan> {
        record.updated = now();

        for _ in 0..self.config.reconcile.max_lock_attempts {
            let previous = self
                .store
                .read()
                .get(record.id)
                .cloned()
                .ok_or(RegistryError::UnknownRecord(record.id))?;
            // Creation time is immutable once persisted.
            record.created = previous.created;

            let new_hash = compute_identity_hash(&record, &self.identity_fields);
            let _guards = self.locks.lock_groups(&[
                previous.unique_identifier_hash.as_str(),
                new_hash.as_deref().unwrap_or(""),
            ])?;

            // The snapshot may have moved groups while we waited for the
            // locks; if so, start over so we hold the right guards.
            let plan = {
                let store = self.store.read();
                let current = store
                    .get(record.id)
                    .ok_or(RegistryError::UnknownRecord(record.id))?;
                if current.unique_identifier_hash != previous.unique_identifier_hash {
                    None
                } else {
                    Some(reconcile::plan_update(
                        &store,
                        &record,
                        &previous,
                        &self.identity_fields,
                    ))
                }
            };
            let Some(plan) = plan else {
                continue;
            };

            plan.apply_to(&mut record);
            let mut store = self.store.write();
            if let Some(id) = plan.promote {
                store.set_duplicate(id, false)?;
            }
            if let Some(id) = plan.demote {
                store.set_duplicate(id, true)?;
            }
            store.replace(record)?;
            return Ok(plan);
        }
        Err(RegistryError::ReconciliationRace {
            attempts: self.config.reconcile.max_lock_attempts,
        })
    }

    /// The ingestion seam: create or update keyed by the submission instance
    /// id. Returns the record id and whether a new record was created.
    pub fn upsert_by_instance_id(&self, mut record: VaRecord) -> Result<(RecordId, bool)> {
        let existing = self.store.read().find_by_instance(&record.instance_id);
        match existing {
            Some(id) => {
                record.id = id;
                self.update_record(record)?;
                Ok((id, false))
            }
            None => Ok((self.create_record(record)?, true)),
        }
    }

    pub fn get_record(&self, id: RecordId) -> Option<VaRecord> {
        self.store.read().get(id).cloned()
    }

    /// Soft-delete a record on behalf of data-cleanup workflows. The record
    /// leaves its identity group and all query results but keeps its row.
    pub fn soft_delete_record(&self, id: RecordId) -> Result<()> {
        self.store.write().mark_deleted(id, now())
    }

    /// Anchor a record to the facility with the given name, falling back to
    /// the Unknown sentinel when no active facility matches.
    pub fn assign_location(
        &self,
        record: &mut VaRecord,
        facility_name: &str,
    ) -> Result<LocationResolution> {
        let matched = {
            let tree = self.tree.read();
            tree.get_by_name(facility_name)
                .filter(|node| node.active)
                .map(|node| node.id)
        };
        match matched {
            Some(location) => {
                record.location = Some(location);
                Ok(LocationResolution {
                    location,
                    fallback: false,
                })
            }
            None => {
                warn!(facility = %facility_name, "no matching facility, anchoring to sentinel");
                let location = self
                    .tree
                    .write()
                    .resolve_or_create_unknown(&self.config.unknown_location_name)?;
                record.location = Some(location);
                Ok(LocationResolution {
                    location,
                    fallback: true,
                })
            }
        }
    }

    /// Resolve a user's restrictions into an access scope.
    pub fn scope_for(&self, user: &UserAccess) -> AccessScope {
        AccessScope::for_user(&self.tree.read(), user)
    }

    /// A lazy query over the user's visible records, composable with further
    /// filters before execution via [`Self::with_store`].
    pub fn scoped_query(&self, user: &UserAccess) -> ScopedQuery {
        ScopedQuery::new(self.scope_for(user))
    }

    /// Convenience: materialize the user's visible records within optional
    /// death-date bounds.
    pub fn scoped_records(
        &self,
        user: &UserAccess,
        date_lower_bound: Option<&str>,
        date_upper_bound: Option<&str>,
    ) -> Vec<VaRecord> {
        let mut query = self.scoped_query(user);
        if let Some(bound) = date_lower_bound {
            query = query.date_lower_bound(bound);
        }
        if let Some(bound) = date_upper_bound {
            query = query.date_upper_bound(bound);
        }
        let store = self.store.read();
        query.run(&store).cloned().collect()
    }

    /// Run a closure against the record store under the read lock, e.g. to
    /// execute a composed [`ScopedQuery`] lazily.
    pub fn with_store<R>(&self, f: impl FnOnce(&RecordStore) -> R) -> R {
        f(&self.store.read())
    }

    /// Read access to the location tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&LocationTree) -> R) -> R {
        f(&self.tree.read())
    }

    /// Mutate the location tree on behalf of the location-loading
    /// collaborator, which runs with exclusive access during refreshes.
    pub fn edit_tree<R>(&self, f: impl FnOnce(&mut LocationTree) -> R) -> R {
        f(&mut self.tree.write())
    }

    /// Regenerate every record's identity hash under the current
    /// configuration. Exclusive with in-flight saves.
    pub fn regenerate_identifier_hashes(&self) -> Result<usize> {
        self.require_detection_enabled()?;
        let _all = self.locks.lock_all();
        let mut store = self.store.write();
        Ok(jobs::regenerate_hashes(&mut store, &self.identity_fields))
    }

    /// The bulk duplicate-marking job: regenerate hashes, then enforce
    /// oldest-wins flags across every identity group. Idempotent; exclusive
    /// with in-flight saves for its whole duration.
    pub fn mark_all_duplicates(&self) -> Result<MarkSummary> {
        self.require_detection_enabled()?;
        let _all = self.locks.lock_all();
        let mut store = self.store.write();
        jobs::regenerate_hashes(&mut store, &self.identity_fields);
        Ok(jobs::mark_duplicates(&mut store))
    }

    pub fn record_count(&self) -> usize {
        self.store.read().len()
    }

    pub fn metrics(&self) -> StoreMetrics {
        self.store.read().metrics()
    }

    fn require_detection_enabled(&self) -> Result<()> {
        if self.identity_fields.is_empty() {
            return Err(RegistryError::Configuration(
                "identity-field configuration is empty; set identity_fields to run duplicate detection".to_string(),
            ));
        }
        Ok(())
    }
}
