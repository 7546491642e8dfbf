use crate::store::EntityGraphStore;
use newsgraph_core::{EntityId, GraphDelta, GraphError};

/// Undo the expansion of `parent`.
///
/// Entities owned only by `parent` are removed together with their edges;
/// entities shared with other parents just lose `parent` from their
/// provenance. An exclusively owned child that was itself expanded is
/// collapsed first, so nothing is left pointing at a removed owner.
pub fn collapse(store: &mut EntityGraphStore, parent: EntityId) -> Result<GraphDelta, GraphError> {
    let entity = store
        .find_by_id(parent)
        .ok_or(GraphError::EntityNotFound(parent))?;
    if !entity.expanded {
        return Err(GraphError::invalid(format!(
            "Entity {parent} is not expanded"
        )));
    }

    let mut delta = GraphDelta::default();
    collapse_inner(store, parent, &mut delta)?;
    tracing::info!(
        "Collapsed {}: -{} nodes, -{} edges",
        parent,
        delta.removed_nodes.len(),
        delta.removed_edges.len()
    );
    Ok(delta)
}

fn collapse_inner(
    store: &mut EntityGraphStore,
    parent: EntityId,
    delta: &mut GraphDelta,
) -> Result<(), GraphError> {
    let nested: Vec<EntityId> = store
        .children_of(parent)
        .into_iter()
        .filter(|child| {
            store
                .find_by_id(*child)
                .is_some_and(|e| e.expanded && e.is_collapsible_by(parent))
        })
        .collect();
    for child in nested {
        collapse_inner(store, child, delta)?;
    }

    // Snapshot before mutating so removals can't change later verdicts.
    let mut doomed = Vec::new();
    let mut shared = Vec::new();
    for child in store.children_of(parent) {
        if let Some(entity) = store.find_by_id(child) {
            if entity.is_collapsible_by(parent) {
                doomed.push(child);
            } else {
                shared.push(child);
            }
        }
    }

    for child in &doomed {
        for edge in store.incident_edges(*child) {
            store.remove_edge(edge)?;
            delta.edge_removed(edge);
        }
    }
    for child in shared {
        store.detach_parent(child, parent)?;
        delta.node_updated(child);
    }
    for child in doomed {
        store.remove_node(child)?;
        delta.node_removed(child);
    }

    store.set_expanded(parent, false)?;
    delta.node_updated(parent);
    Ok(())
}
