//! # Location Tree
//!
//! The administrative hierarchy (country, province, district, facility) as a
//! materialized-path tree. Each node's position is encoded as a string of
//! fixed-width segments, so descendant lookup is a single ordered range scan
//! over the path index rather than a recursive walk.

use crate::error::{RegistryError, Result};
use crate::model::{now, Timestamp};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Characters per path segment. One segment per tree level, base-36 encoded,
/// giving 36^4 siblings per parent.
pub const SEGMENT_LEN: usize = 4;

const SEGMENT_SPACE: u32 = 36 * 36 * 36 * 36;

/// Compact identifier for location nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub u32);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The administrative level of a node. Facilities are always leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationKind {
    Country,
    Province,
    District,
    Facility,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LocationKind::Country => "country",
            LocationKind::Province => "province",
            LocationKind::District => "district",
            LocationKind::Facility => "facility",
        };
        write!(f, "{}", label)
    }
}

/// A node in the administrative hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationNode {
    pub id: LocationId,
    pub name: String,
    pub kind: LocationKind,
    pub active: bool,
    /// Materialized path: one fixed-width segment per ancestor level,
    /// globally unique, a strict extension of the parent's path.
    pub path: String,
    pub created: Timestamp,
    pub updated: Timestamp,
}

impl LocationNode {
    /// Depth in the tree; roots are depth 1.
    pub fn depth(&self) -> usize {
        self.path.len() / SEGMENT_LEN
    }
}

/// The location hierarchy with its path index.
///
/// Mutated only by the location-loading collaborator; the query resolver
/// reads it. Nodes are never removed while records reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationTree {
    nodes: HashMap<LocationId, LocationNode>,
    /// Path index; ordered so a prefix range scan enumerates a subtree.
    by_path: BTreeMap<String, LocationId>,
    next_id: u32,
}

impl Default for LocationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationTree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            by_path: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, id: LocationId) -> Option<&LocationNode> {
        self.nodes.get(&id)
    }

    /// First node with the given name, in path order.
    pub fn get_by_name(&self, name: &str) -> Option<&LocationNode> {
        self.by_path
            .values()
            .filter_map(|id| self.nodes.get(id))
            .find(|node| node.name == name)
    }

    /// Add a top-level node.
    pub fn add_root(&mut self, name: &str, kind: LocationKind) -> Result<LocationId> {
        let segment = self.next_segment("")?;
        self.insert_at(segment, name, kind)
    }

    /// Add a child under `parent`, allocating the next free path segment.
    pub fn add_child(
        &mut self,
        parent: LocationId,
        name: &str,
        kind: LocationKind,
    ) -> Result<LocationId> {
        let parent_path = self
            .nodes
            .get(&parent)
            .ok_or(RegistryError::UnknownLocation(parent))?
            .path
            .clone();
        let path = self.next_segment(&parent_path)?;
        self.insert_at(path, name, kind)
    }

    /// Insert a fully-specified node, e.g. when restoring a persisted tree.
    /// Fails if the path is already taken or is not segment-aligned.
    pub fn insert_node(&mut self, node: LocationNode) -> Result<()> {
        if node.path.is_empty() || node.path.len() % SEGMENT_LEN != 0 {
            return Err(RegistryError::StructuralConflict {
                path: node.path.clone(),
            });
        }
        if self.by_path.contains_key(&node.path) {
            return Err(RegistryError::StructuralConflict {
                path: node.path.clone(),
            });
        }
        self.next_id = self.next_id.max(node.id.0 + 1);
        self.by_path.insert(node.path.clone(), node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// All nodes whose path strictly extends `id`'s path, at every depth.
    /// One range scan over the path index.
    pub fn get_descendants(&self, id: LocationId) -> Vec<&LocationNode> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let prefix = node.path.as_str();
        self.by_path
            .range::<str, _>((
                std::ops::Bound::Excluded(prefix),
                std::ops::Bound::Unbounded,
            ))
            .take_while(|(path, _)| path.starts_with(prefix))
            .filter_map(|(_, id)| self.nodes.get(id))
            .collect()
    }

    /// The node itself plus every descendant, as an id set. Ids absent from
    /// the tree yield an empty set, not an error.
    pub fn self_and_descendant_ids(&self, id: LocationId) -> HashSet<LocationId> {
        let mut ids = HashSet::new();
        if self.nodes.contains_key(&id) {
            ids.insert(id);
            for node in self.get_descendants(id) {
                ids.insert(node.id);
            }
        }
        ids
    }

    /// Root-to-parent ancestor chain, root first.
    pub fn get_ancestors(&self, id: LocationId) -> Vec<&LocationNode> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut ancestors = Vec::new();
        let mut end = SEGMENT_LEN;
        while end < node.path.len() {
            if let Some(ancestor_id) = self.by_path.get(&node.path[..end]) {
                if let Some(ancestor) = self.nodes.get(ancestor_id) {
                    ancestors.push(ancestor);
                }
            }
            end += SEGMENT_LEN;
        }
        ancestors
    }

    pub fn parent(&self, id: LocationId) -> Option<&LocationNode> {
        let node = self.nodes.get(&id)?;
        if node.path.len() <= SEGMENT_LEN {
            return None;
        }
        let parent_path = &node.path[..node.path.len() - SEGMENT_LEN];
        self.by_path
            .get(parent_path)
            .and_then(|id| self.nodes.get(id))
    }

    /// Immediate children only.
    pub fn children(&self, id: LocationId) -> Vec<&LocationNode> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let child_len = node.path.len() + SEGMENT_LEN;
        self.get_descendants(id)
            .into_iter()
            .filter(|child| child.path.len() == child_len)
            .collect()
    }

    pub fn roots(&self) -> Vec<&LocationNode> {
        self.by_path
            .iter()
            .filter(|(path, _)| path.len() == SEGMENT_LEN)
            .filter_map(|(_, id)| self.nodes.get(id))
            .collect()
    }

    /// Return the sentinel node for records whose true location is
    /// unresolvable, creating it if absent: as a root when the tree is
    /// empty, otherwise as a facility leaf under the first root.
    pub fn resolve_or_create_unknown(&mut self, name: &str) -> Result<LocationId> {
        let name = if name.is_empty() { "Unknown" } else { name };
        if let Some(node) = self.get_by_name(name) {
            return Ok(node.id);
        }
        let first_root = self.roots().first().map(|root| root.id);
        match first_root {
            Some(root) => self.add_child(root, name, LocationKind::Facility),
            None => self.add_root(name, LocationKind::Facility),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationNode> {
        self.by_path.values().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate the next free sibling path under `parent_path`.
    fn next_segment(&self, parent_path: &str) -> Result<String> {
        let child_len = parent_path.len() + SEGMENT_LEN;
        let last_sibling = self
            .by_path
            .range::<str, _>((
                std::ops::Bound::Excluded(parent_path),
                std::ops::Bound::Unbounded,
            ))
            .take_while(|(path, _)| path.starts_with(parent_path))
            .filter(|(path, _)| path.len() == child_len)
            .last()
            .map(|(path, _)| path.clone());

        let next_index = match last_sibling {
            Some(path) => decode_segment(&path[parent_path.len()..]) + 1,
            None => 0,
        };
        if next_index >= SEGMENT_SPACE {
            return Err(RegistryError::StructuralConflict {
                path: parent_path.to_string(),
            });
        }
        let path = format!("{}{}", parent_path, encode_segment(next_index));
        if self.by_path.contains_key(&path) {
            return Err(RegistryError::StructuralConflict { path });
        }
        Ok(path)
    }

    fn insert_at(&mut self, path: String, name: &str, kind: LocationKind) -> Result<LocationId> {
        let id = LocationId(self.next_id);
        self.next_id += 1;
        let stamp = now();
        let node = LocationNode {
            id,
            name: name.to_string(),
            kind,
            active: true,
            path: path.clone(),
            created: stamp,
            updated: stamp,
        };
        self.by_path.insert(path, id);
        self.nodes.insert(id, node);
        Ok(id)
    }
}

fn encode_segment(mut index: u32) -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut chars = [b'0'; SEGMENT_LEN];
    for slot in chars.iter_mut().rev() {
        *slot = ALPHABET[(index % 36) as usize];
        index /= 36;
    }
    String::from_utf8_lossy(&chars).into_owned()
}

fn decode_segment(segment: &str) -> u32 {
    segment.bytes().fold(0, |acc, byte| {
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'A'..=b'Z' => byte - b'A' + 10,
            _ => 0,
        };
        acc * 36 + digit as u32
    })
}
