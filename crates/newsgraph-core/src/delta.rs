use crate::{EntityId, RelationshipId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a graph operation changed. Operations return one of these instead of
/// notifying observers themselves; the controller turns it into events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDelta {
    pub added_nodes: BTreeSet<EntityId>,
    pub removed_nodes: BTreeSet<EntityId>,
    pub updated_nodes: BTreeSet<EntityId>,
    pub added_edges: BTreeSet<RelationshipId>,
    pub removed_edges: BTreeSet<RelationshipId>,
    pub updated_edges: BTreeSet<RelationshipId>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.updated_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
            && self.updated_edges.is_empty()
    }

    /// True when nodes or edges were added or removed (positions must re-settle).
    pub fn is_structural(&self) -> bool {
        !(self.added_nodes.is_empty()
            && self.removed_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty())
    }

    pub fn node_added(&mut self, id: EntityId) {
        self.removed_nodes.remove(&id);
        self.added_nodes.insert(id);
    }

    pub fn node_removed(&mut self, id: EntityId) {
        self.updated_nodes.remove(&id);
        // Added and removed within one operation is no change at all.
        if !self.added_nodes.remove(&id) {
            self.removed_nodes.insert(id);
        }
    }

    pub fn node_updated(&mut self, id: EntityId) {
        if !self.added_nodes.contains(&id) {
            self.updated_nodes.insert(id);
        }
    }

    pub fn edge_added(&mut self, id: RelationshipId) {
        self.removed_edges.remove(&id);
        self.added_edges.insert(id);
    }

    pub fn edge_removed(&mut self, id: RelationshipId) {
        self.updated_edges.remove(&id);
        if !self.added_edges.remove(&id) {
            self.removed_edges.insert(id);
        }
    }

    pub fn edge_updated(&mut self, id: RelationshipId) {
        if !self.added_edges.contains(&id) {
            self.updated_edges.insert(id);
        }
    }

    /// Fold a later delta into this one.
    pub fn absorb(&mut self, later: GraphDelta) {
        for id in later.added_nodes {
            self.node_added(id);
        }
        for id in later.updated_nodes {
            self.node_updated(id);
        }
        for id in later.removed_nodes {
            self.node_removed(id);
        }
        for id in later.added_edges {
            self.edge_added(id);
        }
        for id in later.updated_edges {
            self.edge_updated(id);
        }
        for id in later.removed_edges {
            self.edge_removed(id);
        }
    }
}
