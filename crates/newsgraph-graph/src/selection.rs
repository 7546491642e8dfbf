use crate::highlight::HighlightRemoval;
use crate::store::EntityGraphStore;
use newsgraph_core::{
    CategoryWords, EntityId, EntityType, GraphDelta, GraphError, OperationGates, RelationshipId,
};

/// A selected node together with the highlight entry it contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Marked {
    id: EntityId,
    name: String,
    kind: EntityType,
}

/// Selected nodes and edges in selection order, plus the highlight words
/// they drive.
#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    nodes: Vec<Marked>,
    edges: Vec<RelationshipId>,
    highlight: CategoryWords,
    removal: HighlightRemoval,
}

impl SelectionController {
    pub fn new(removal: HighlightRemoval) -> Self {
        Self {
            removal,
            ..Self::default()
        }
    }

    pub fn selected_nodes(&self) -> Vec<EntityId> {
        self.nodes.iter().map(|m| m.id).collect()
    }

    pub fn selected_edges(&self) -> &[RelationshipId] {
        &self.edges
    }

    pub fn is_node_selected(&self, id: EntityId) -> bool {
        self.nodes.iter().any(|m| m.id == id)
    }

    pub fn is_edge_selected(&self, id: RelationshipId) -> bool {
        self.edges.contains(&id)
    }

    /// The node selected last, if any.
    pub fn most_recent_node(&self) -> Option<EntityId> {
        self.nodes.last().map(|m| m.id)
    }

    pub fn highlight(&self) -> &CategoryWords {
        &self.highlight
    }

    pub fn gates(&self) -> OperationGates {
        OperationGates::for_counts(self.nodes.len(), self.edges.len())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Returns whether the node is selected afterwards.
    pub fn toggle_node(&mut self, store: &EntityGraphStore, id: EntityId) -> Result<bool, GraphError> {
        if self.unselect_node(id) {
            return Ok(false);
        }
        self.select_node(store, id)?;
        Ok(true)
    }

    /// Returns false when the node was already selected.
    pub fn select_node(&mut self, store: &EntityGraphStore, id: EntityId) -> Result<bool, GraphError> {
        let entity = store.find_by_id(id).ok_or(GraphError::EntityNotFound(id))?;
        if self.is_node_selected(id) {
            return Ok(false);
        }
        self.highlight.insert(entity.kind, &entity.name);
        self.nodes.push(Marked {
            id,
            name: entity.name.clone(),
            kind: entity.kind,
        });
        Ok(true)
    }

    /// Returns false when the node was not selected.
    pub fn unselect_node(&mut self, id: EntityId) -> bool {
        let Some(pos) = self.nodes.iter().position(|m| m.id == id) else {
            return false;
        };
        let marked = self.nodes.remove(pos);
        self.release(&marked);
        true
    }

    pub fn toggle_edge(
        &mut self,
        store: &EntityGraphStore,
        id: RelationshipId,
    ) -> Result<bool, GraphError> {
        if self.unselect_edge(id) {
            return Ok(false);
        }
        self.select_edge(store, id)?;
        Ok(true)
    }

    pub fn select_edge(
        &mut self,
        store: &EntityGraphStore,
        id: RelationshipId,
    ) -> Result<bool, GraphError> {
        if !store.contains_edge(id) {
            return Err(GraphError::RelationshipNotFound(id));
        }
        if self.edges.contains(&id) {
            return Ok(false);
        }
        self.edges.push(id);
        Ok(true)
    }

    pub fn unselect_edge(&mut self, id: RelationshipId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|edge| *edge != id);
        self.edges.len() != before
    }

    /// Select every node carrying `name`. Returns the newly selected ids.
    pub fn select_by_name(&mut self, store: &EntityGraphStore, name: &str) -> Vec<EntityId> {
        let ids: Vec<EntityId> = store.find_by_name(name).iter().map(|e| e.id).collect();
        ids.into_iter()
            .filter(|id| self.select_node(store, *id).unwrap_or(false))
            .collect()
    }

    /// Unselect every selected node whose name was `name` when selected.
    pub fn unselect_by_name(&mut self, name: &str) -> Vec<EntityId> {
        let ids: Vec<EntityId> = self
            .nodes
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.id)
            .collect();
        for id in &ids {
            self.unselect_node(*id);
        }
        ids
    }

    /// Replace the whole selection with one node.
    pub fn select_only(&mut self, store: &EntityGraphStore, id: EntityId) -> Result<(), GraphError> {
        if !store.contains_node(id) {
            return Err(GraphError::EntityNotFound(id));
        }
        self.clear();
        self.select_node(store, id)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.highlight.clear();
    }

    /// Drop selected elements that are no longer in the store.
    /// Returns true when anything was dropped.
    pub fn prune(&mut self, store: &EntityGraphStore) -> bool {
        let (live, dead): (Vec<_>, Vec<_>) = std::mem::take(&mut self.nodes)
            .into_iter()
            .partition(|m| store.contains_node(m.id));
        self.nodes = live;
        for marked in &dead {
            self.release(marked);
        }

        let before = self.edges.len();
        self.edges.retain(|id| store.contains_edge(*id));
        !dead.is_empty() || self.edges.len() != before
    }

    /// Re-read a selected node's name and type after an edit.
    /// Returns true when the highlight words changed.
    pub fn refresh_entity(&mut self, store: &EntityGraphStore, id: EntityId) -> bool {
        let Some(entity) = store.find_by_id(id) else {
            return false;
        };
        let Some(pos) = self.nodes.iter().position(|m| m.id == id) else {
            return false;
        };
        if self.nodes[pos].name == entity.name && self.nodes[pos].kind == entity.kind {
            return false;
        }
        let stale = std::mem::replace(
            &mut self.nodes[pos],
            Marked {
                id,
                name: entity.name.clone(),
                kind: entity.kind,
            },
        );
        self.release(&stale);
        self.highlight.insert(entity.kind, &entity.name);
        true
    }

    /// Remove the selection from the store: selected edges, then every edge
    /// touching a selected node, then the nodes. Clears the selection.
    pub fn hide_selected(&mut self, store: &mut EntityGraphStore) -> Result<GraphDelta, GraphError> {
        let mut delta = GraphDelta::default();
        for id in &self.edges {
            if store.contains_edge(*id) {
                store.remove_edge(*id)?;
                delta.edge_removed(*id);
            }
        }
        for marked in &self.nodes {
            for edge in store.incident_edges(marked.id) {
                store.remove_edge(edge)?;
                delta.edge_removed(edge);
            }
        }
        for marked in &self.nodes {
            if store.contains_node(marked.id) {
                store.remove_node(marked.id)?;
                delta.node_removed(marked.id);
            }
        }
        tracing::info!(
            "Hid {} nodes and {} edges",
            delta.removed_nodes.len(),
            delta.removed_edges.len()
        );
        self.clear();
        Ok(delta)
    }

    /// Human-readable list of the selection, e.g. `Paris, Berlin and Rome`.
    /// Edges read `target <--> source`.
    pub fn describe(&self, store: &EntityGraphStore) -> String {
        let mut items: Vec<String> = self
            .nodes
            .iter()
            .map(|m| {
                store
                    .find_by_id(m.id)
                    .map_or_else(|| m.name.clone(), |e| e.name.clone())
            })
            .collect();
        for id in &self.edges {
            if let Some(edge) = store.get_edge(*id) {
                let name = |id| store.find_by_id(id).map_or("", |e| e.name.as_str());
                items.push(format!("{} <--> {}", name(edge.target), name(edge.source)));
            }
        }
        join_natural(&items)
    }

    fn release(&mut self, marked: &Marked) {
        let shared = self
            .nodes
            .iter()
            .any(|m| m.kind == marked.kind && m.name == marked.name);
        if self.removal == HighlightRemoval::Unconditional || !shared {
            self.highlight.remove(marked.kind, &marked.name);
        }
    }
}

fn join_natural(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
