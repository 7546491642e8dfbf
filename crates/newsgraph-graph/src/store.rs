use newsgraph_core::{
    EdgeRecord, EndpointPair, Entity, EntityId, EntityType, GraphError, NodeRecord, Relationship,
    RelationshipId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Report an invariant breach: panics in debug builds, returns the error otherwise.
pub(crate) fn violation(message: String) -> GraphError {
    debug_assert!(false, "{message}");
    tracing::error!("{message}");
    GraphError::InvariantViolation(message)
}

/// Canonical set of entities and relationships.
///
/// Every public method leaves the store consistent: one entity per id, one
/// relationship per unordered endpoint pair, no self-loops and no edge whose
/// endpoint is missing. Provenance is only editable through the store so the
/// reverse `children` index stays exact.
#[derive(Debug, Default, Clone)]
pub struct EntityGraphStore {
    nodes: BTreeMap<EntityId, Entity>,
    edges: BTreeMap<RelationshipId, Relationship>,
    pair_index: HashMap<EndpointPair, RelationshipId>,
    adjacency: HashMap<EntityId, BTreeSet<RelationshipId>>,
    // parent -> entities whose provenance contains parent
    children: HashMap<EntityId, BTreeSet<EntityId>>,
}

impl EntityGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert entities whose id is not yet present. Existing entities are left
    /// untouched; frequency and type only change through edit or merge.
    /// Returns the ids actually inserted, in record order.
    pub fn upsert_nodes<I>(&mut self, records: I, provenance: &BTreeSet<EntityId>) -> Vec<EntityId>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        let mut inserted = Vec::new();
        for record in records {
            let id = record.id();
            if self.nodes.contains_key(&id) {
                tracing::debug!("Ignoring duplicate node record {}", id);
                continue;
            }
            let mut owners = provenance.clone();
            // An entity never owns itself.
            owners.remove(&id);
            for parent in &owners {
                self.children.entry(*parent).or_default().insert(id);
            }
            self.nodes.insert(id, Entity::from_record(record, owners));
            self.adjacency.entry(id).or_default();
            inserted.push(id);
        }
        inserted
    }

    /// Insert relationships whose endpoints both exist and whose endpoint pair
    /// is not yet connected. Returns the ids actually inserted.
    pub fn upsert_edges<I>(&mut self, records: I) -> Vec<RelationshipId>
    where
        I: IntoIterator<Item = EdgeRecord>,
    {
        let mut inserted = Vec::new();
        for record in records {
            let edge = Relationship::from_record(record);
            if self.edges.contains_key(&edge.id) {
                tracing::debug!("Ignoring duplicate edge record {}", edge.id);
                continue;
            }
            if edge.source == edge.target {
                tracing::warn!(
                    "Dropping edge {} because it would be a self-loop on {}",
                    edge.id,
                    edge.source
                );
                continue;
            }
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                tracing::debug!(
                    "Dropping edge {} because endpoint {} or {} is missing",
                    edge.id,
                    edge.source,
                    edge.target
                );
                continue;
            }
            let pair = edge.pair();
            if let Some(existing) = self.pair_index.get(&pair) {
                tracing::debug!(
                    "Dropping edge {} because {} already connects {} and {}",
                    edge.id,
                    existing,
                    edge.source,
                    edge.target
                );
                continue;
            }
            self.link(edge.source, edge.target, edge.id);
            self.pair_index.insert(pair, edge.id);
            inserted.push(edge.id);
            self.edges.insert(edge.id, edge);
        }
        inserted
    }

    pub fn remove_edge(&mut self, id: RelationshipId) -> Result<Relationship, GraphError> {
        let edge = self
            .edges
            .remove(&id)
            .ok_or(GraphError::RelationshipNotFound(id))?;
        self.pair_index.remove(&edge.pair());
        self.unlink(edge.source, edge.target, id);
        Ok(edge)
    }

    /// Remove an entity. Incident relationships must already be gone; the
    /// store never cascades. The id is also dropped from every other entity's
    /// provenance so no provenance refers to a missing entity.
    pub fn remove_node(&mut self, id: EntityId) -> Result<Entity, GraphError> {
        if !self.nodes.contains_key(&id) {
            return Err(GraphError::EntityNotFound(id));
        }
        if self.adjacency.get(&id).is_some_and(|edges| !edges.is_empty()) {
            return Err(violation(format!(
                "Removing entity {id} would leave dangling relationships"
            )));
        }

        self.adjacency.remove(&id);
        if let Some(orphans) = self.children.remove(&id) {
            for child in orphans {
                if let Some(entity) = self.nodes.get_mut(&child) {
                    entity.provenance.remove(&id);
                }
            }
        }
        let entity = self
            .nodes
            .remove(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        for parent in &entity.provenance {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.remove(&id);
                if siblings.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
        Ok(entity)
    }

    /// Drop `parent` from `child`'s provenance.
    pub fn detach_parent(&mut self, child: EntityId, parent: EntityId) -> Result<bool, GraphError> {
        let entity = self
            .nodes
            .get_mut(&child)
            .ok_or(GraphError::EntityNotFound(child))?;
        let removed = entity.provenance.remove(&parent);
        if removed && let Some(siblings) = self.children.get_mut(&parent) {
            siblings.remove(&child);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
        Ok(removed)
    }

    pub fn set_expanded(&mut self, id: EntityId, expanded: bool) -> Result<(), GraphError> {
        let entity = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        entity.expanded = expanded;
        Ok(())
    }

    /// Returns false when the name was already `name`.
    pub fn rename(&mut self, id: EntityId, name: &str) -> Result<bool, GraphError> {
        let entity = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        if entity.name == name {
            return Ok(false);
        }
        entity.name = name.to_string();
        Ok(true)
    }

    /// Returns false when the type was already `kind`.
    pub fn retype(&mut self, id: EntityId, kind: EntityType) -> Result<bool, GraphError> {
        let entity = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        if entity.kind == kind {
            return Ok(false);
        }
        entity.kind = kind;
        Ok(true)
    }

    pub fn add_node_frequency(&mut self, id: EntityId, amount: u64) -> Result<u64, GraphError> {
        let entity = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        entity.frequency = entity.frequency.saturating_add(amount);
        Ok(entity.frequency)
    }

    pub fn add_edge_frequency(
        &mut self,
        id: RelationshipId,
        amount: u64,
    ) -> Result<u64, GraphError> {
        let edge = self
            .edges
            .get_mut(&id)
            .ok_or(GraphError::RelationshipNotFound(id))?;
        edge.frequency = edge.frequency.saturating_add(amount);
        Ok(edge.frequency)
    }

    /// Move the `from` endpoint of a relationship onto `to`, keeping its id and
    /// frequency. Refuses to create a self-loop or a second edge for a pair.
    pub fn reattach_edge(
        &mut self,
        id: RelationshipId,
        from: EntityId,
        to: EntityId,
    ) -> Result<(), GraphError> {
        let edge = self
            .edges
            .get(&id)
            .ok_or(GraphError::RelationshipNotFound(id))?;
        let other = edge.other_end(from).ok_or_else(|| {
            GraphError::invalid(format!("Entity {from} is not an endpoint of {id}"))
        })?;
        if !self.nodes.contains_key(&to) {
            return Err(GraphError::EntityNotFound(to));
        }
        let new_pair = EndpointPair::new(other, to);
        if new_pair.is_loop() {
            return Err(violation(format!(
                "Re-attaching {id} onto {to} would create a self-loop"
            )));
        }
        if self.pair_index.contains_key(&new_pair) {
            return Err(violation(format!(
                "Re-attaching {id} onto {to} would duplicate the edge to {other}"
            )));
        }

        let old_pair = edge.pair();
        self.pair_index.remove(&old_pair);
        self.unlink(from, other, id);

        if let Some(edge) = self.edges.get_mut(&id) {
            if edge.source == from {
                edge.source = to;
            } else {
                edge.target = to;
            }
        }
        self.link(other, to, id);
        self.pair_index.insert(new_pair, id);
        Ok(())
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.pair_index.clear();
        self.adjacency.clear();
        self.children.clear();
    }

    pub fn find_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.nodes.get(&id)
    }

    /// Names are not unique; duplicates coexist until merged.
    pub fn find_by_name(&self, name: &str) -> Vec<&Entity> {
        self.nodes.values().filter(|e| e.name == name).collect()
    }

    pub fn get_edge(&self, id: RelationshipId) -> Option<&Relationship> {
        self.edges.get(&id)
    }

    pub fn contains_node(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_edge(&self, id: RelationshipId) -> bool {
        self.edges.contains_key(&id)
    }

    pub fn edge_between(&self, a: EntityId, b: EntityId) -> Option<&Relationship> {
        self.pair_index
            .get(&EndpointPair::new(a, b))
            .and_then(|id| self.edges.get(id))
    }

    /// Relationships touching `id`, ascending by id.
    pub fn incident_edges(&self, id: EntityId) -> Vec<RelationshipId> {
        self.adjacency
            .get(&id)
            .map(|edges| edges.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn neighbors(&self, id: EntityId) -> Vec<EntityId> {
        let mut neighbors: Vec<EntityId> = self
            .incident_edges(id)
            .into_iter()
            .filter_map(|edge_id| self.edges.get(&edge_id))
            .filter_map(|edge| edge.other_end(id))
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Entities whose provenance contains `parent`, ascending by id.
    pub fn children_of(&self, parent: EntityId) -> Vec<EntityId> {
        self.children
            .get(&parent)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Entity> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Relationship> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Full consistency check of the store and its indexes.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        let mut seen_pairs = HashMap::new();
        for edge in self.edges.values() {
            if edge.source == edge.target {
                return Err(GraphError::invariant(format!(
                    "Relationship {} is a self-loop",
                    edge.id
                )));
            }
            for endpoint in [edge.source, edge.target] {
                if !self.nodes.contains_key(&endpoint) {
                    return Err(GraphError::invariant(format!(
                        "Relationship {} references missing entity {}",
                        edge.id, endpoint
                    )));
                }
                if !self
                    .adjacency
                    .get(&endpoint)
                    .is_some_and(|set| set.contains(&edge.id))
                {
                    return Err(GraphError::invariant(format!(
                        "Adjacency of {} is missing relationship {}",
                        endpoint, edge.id
                    )));
                }
            }
            if let Some(other) = seen_pairs.insert(edge.pair(), edge.id) {
                return Err(GraphError::invariant(format!(
                    "Relationships {} and {} share an endpoint pair",
                    other, edge.id
                )));
            }
            if self.pair_index.get(&edge.pair()) != Some(&edge.id) {
                return Err(GraphError::invariant(format!(
                    "Pair index out of date for relationship {}",
                    edge.id
                )));
            }
        }
        if self.pair_index.len() != self.edges.len() {
            return Err(GraphError::invariant("Pair index has stale entries"));
        }

        let adjacency_total: usize = self.adjacency.values().map(BTreeSet::len).sum();
        if adjacency_total != self.edges.len() * 2 {
            return Err(GraphError::invariant("Adjacency has stale entries"));
        }

        let mut child_links = 0;
        for entity in self.nodes.values() {
            for parent in &entity.provenance {
                if !self.nodes.contains_key(parent) {
                    return Err(GraphError::invariant(format!(
                        "Entity {} claims missing parent {}",
                        entity.id, parent
                    )));
                }
                if !self
                    .children
                    .get(parent)
                    .is_some_and(|set| set.contains(&entity.id))
                {
                    return Err(GraphError::invariant(format!(
                        "Child index of {} is missing {}",
                        parent, entity.id
                    )));
                }
                child_links += 1;
            }
        }
        let indexed_links: usize = self.children.values().map(BTreeSet::len).sum();
        if indexed_links != child_links {
            return Err(GraphError::invariant("Child index has stale entries"));
        }
        Ok(())
    }

    fn link(&mut self, a: EntityId, b: EntityId, id: RelationshipId) {
        self.adjacency.entry(a).or_default().insert(id);
        self.adjacency.entry(b).or_default().insert(id);
    }

    fn unlink(&mut self, a: EntityId, b: EntityId, id: RelationshipId) {
        for endpoint in [a, b] {
            if let Some(set) = self.adjacency.get_mut(&endpoint) {
                set.remove(&id);
            }
        }
    }
}
