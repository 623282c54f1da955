//! # Access-Scoped Queries
//!
//! Resolves a user's location restrictions into the exact record subset they
//! may see. The scope is the union, over every restricted node, of that node
//! and all its descendants, computed from the tree's path index up front so
//! record filtering is a single membership test rather than a per-record
//! tree walk.

use crate::model::VaRecord;
use crate::store::RecordStore;
use crate::tree::{LocationId, LocationTree};
use hashbrown::HashSet;

/// A user's location restrictions, as assigned by user management. An empty
/// set means unrestricted (national) access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAccess {
    pub location_restrictions: Vec<LocationId>,
}

impl UserAccess {
    /// Unrestricted access.
    pub fn national() -> Self {
        Self::default()
    }

    pub fn restricted_to(locations: impl IntoIterator<Item = LocationId>) -> Self {
        Self {
            location_restrictions: locations.into_iter().collect(),
        }
    }
}

/// The resolved set of locations a user may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Unrestricted,
    Locations(HashSet<LocationId>),
}

impl AccessScope {
    /// Resolve a restriction set against the tree. Restrictions naming
    /// nodes that no longer exist contribute nothing rather than erroring.
    pub fn for_restrictions(tree: &LocationTree, restrictions: &[LocationId]) -> Self {
        if restrictions.is_empty() {
            return AccessScope::Unrestricted;
        }
        let mut union = HashSet::new();
        for &id in restrictions {
            union.extend(tree.self_and_descendant_ids(id));
        }
        AccessScope::Locations(union)
    }

    pub fn for_user(tree: &LocationTree, user: &UserAccess) -> Self {
        Self::for_restrictions(tree, &user.location_restrictions)
    }

    /// Whether a record at `location` is visible under this scope. Records
    /// with no resolved location are visible only to unrestricted users.
    pub fn permits(&self, location: Option<LocationId>) -> bool {
        match self {
            AccessScope::Unrestricted => true,
            AccessScope::Locations(union) => {
                location.map_or(false, |id| union.contains(&id))
            }
        }
    }
}

/// A lazy, re-iterable description of a record query. Filters compose before
/// execution; `run` borrows the store and yields a fresh iterator each call.
#[derive(Debug, Clone)]
pub struct ScopedQuery {
    scope: AccessScope,
    /// Death-date bounds compared against the stored string, per the
    /// ingestion collaborator's convention (no date parsing here).
    date_lower: Option<String>,
    date_upper: Option<String>,
    duplicate: Option<bool>,
    location: Option<LocationId>,
}

impl ScopedQuery {
    pub fn new(scope: AccessScope) -> Self {
        Self {
            scope,
            date_lower: None,
            date_upper: None,
            duplicate: None,
            location: None,
        }
    }

    /// Keep records whose stored death date is >= `bound` (lexicographic).
    pub fn date_lower_bound(mut self, bound: &str) -> Self {
        self.date_lower = Some(bound.to_string());
        self
    }

    /// Keep records whose stored death date is <= `bound` (lexicographic).
    pub fn date_upper_bound(mut self, bound: &str) -> Self {
        self.date_upper = Some(bound.to_string());
        self
    }

    /// Keep only duplicates (`true`) or only canonical records (`false`).
    pub fn duplicates(mut self, duplicate: bool) -> Self {
        self.duplicate = Some(duplicate);
        self
    }

    /// Keep records at exactly one location (within the scope).
    pub fn at_location(mut self, location: LocationId) -> Self {
        self.location = Some(location);
        self
    }

    pub fn matches(&self, record: &VaRecord) -> bool {
        if record.is_deleted() {
            return false;
        }
        if !self.scope.permits(record.location) {
            return false;
        }
        if let Some(expected) = self.duplicate {
            if record.duplicate != expected {
                return false;
            }
        }
        if let Some(location) = self.location {
            if record.location != Some(location) {
                return false;
            }
        }
        if let Some(lower) = &self.date_lower {
            if record.death_date() < lower.as_str() {
                return false;
            }
        }
        if let Some(upper) = &self.date_upper {
            if record.death_date() > upper.as_str() {
                return false;
            }
        }
        true
    }

    /// Execute against a store. Re-iterable: each call walks the store anew.
    pub fn run<'a>(&'a self, store: &'a RecordStore) -> impl Iterator<Item = &'a VaRecord> + 'a {
        store.iter().filter(move |record| self.matches(record))
    }
}
