use crate::store::EntityGraphStore;
use newsgraph_core::{EntityId, GraphDelta, GraphError, GraphPayload};
use std::collections::BTreeSet;

/// How a fetched neighbourhood is merged into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    /// Explicit expand of a node already in the store. New neighbours are
    /// owned by the center and the center is marked expanded.
    Expand,
    /// "Load more": new neighbours join without an owner and the center's
    /// `expanded` flag is left alone.
    LoadMore,
    /// Name lookup of a node that may not be in the store yet. The center is
    /// inserted from the payload as a base node, then treated like `Expand`.
    Discover,
}

/// Merge one ego-network response into the store.
///
/// Records whose id is already present are skipped, so existing entities keep
/// their provenance. Either the whole payload is applied or, when the center
/// cannot be resolved, nothing is.
pub fn apply_ego_network(
    store: &mut EntityGraphStore,
    center: EntityId,
    payload: GraphPayload,
    mode: ExpansionMode,
) -> Result<GraphDelta, GraphError> {
    let mut delta = GraphDelta::default();
    let GraphPayload { nodes, links } = payload;

    let (center_record, neighbours): (Vec<_>, Vec<_>) =
        nodes.into_iter().partition(|record| record.id() == center);

    if !store.contains_node(center) {
        if mode != ExpansionMode::Discover || center_record.is_empty() {
            return Err(GraphError::EntityNotFound(center));
        }
        for id in store.upsert_nodes(center_record, &BTreeSet::new()) {
            delta.node_added(id);
        }
    }

    let owners = match mode {
        ExpansionMode::Expand | ExpansionMode::Discover => BTreeSet::from([center]),
        ExpansionMode::LoadMore => BTreeSet::new(),
    };

    let fresh_nodes: Vec<_> = neighbours
        .into_iter()
        .filter(|record| !store.contains_node(record.id()))
        .collect();
    let fresh_edges: Vec<_> = links
        .into_iter()
        .filter(|record| !store.contains_edge(record.id()))
        .collect();

    for id in store.upsert_nodes(fresh_nodes, &owners) {
        delta.node_added(id);
    }
    for id in store.upsert_edges(fresh_edges) {
        delta.edge_added(id);
    }

    if mode != ExpansionMode::LoadMore {
        store.set_expanded(center, true)?;
        delta.node_updated(center);
    }

    tracing::info!(
        "Applied ego network of {} ({:?}): +{} nodes, +{} edges",
        center,
        mode,
        delta.added_nodes.len(),
        delta.added_edges.len()
    );
    Ok(delta)
}
