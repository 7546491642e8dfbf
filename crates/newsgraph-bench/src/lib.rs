use newsgraph_core::{
    EdgeRecord, EntityId, EntityType, GraphDelta, GraphError, GraphPayload, NodeRecord,
};
use newsgraph_graph::{EntityGraphStore, ExpansionMode, apply_ego_network};
use std::collections::BTreeSet;

/// Deterministic base graph: `node_count` entities, each linked to the next
/// `fan_out` ids (wrapping), so every node has roughly `2 * fan_out` edges.
pub fn synthetic_store(node_count: i64, fan_out: i64) -> EntityGraphStore {
    let mut store = EntityGraphStore::new();
    store.upsert_nodes(
        (0..node_count).map(|i| {
            NodeRecord::new(
                i,
                format!("Entity_{}", i % (node_count / 2).max(1)),
                (i as u64 * 7) % 1000,
                EntityType::ALL[(i % 4) as usize],
            )
        }),
        &BTreeSet::new(),
    );
    let mut edge_id = 0;
    let mut edges = Vec::new();
    for i in 0..node_count {
        for step in 1..=fan_out {
            edges.push(EdgeRecord::new(
                edge_id,
                i,
                (i + step) % node_count,
                (edge_id as u64 % 50) + 1,
            ));
            edge_id += 1;
        }
    }
    store.upsert_edges(edges);
    store
}

/// Hang `children` freshly fetched nodes under `center`, each linked to the
/// center and to one existing base node.
pub fn expand_synthetic(
    store: &mut EntityGraphStore,
    center: i64,
    children: i64,
) -> Result<GraphDelta, GraphError> {
    let first = 1_000_000 + center * children;
    let base = store.node_count() as i64;
    let nodes = (0..children)
        .map(|i| NodeRecord::new(first + i, format!("Child_{}", first + i), 1, EntityType::PERSON))
        .collect();
    let links = (0..children)
        .flat_map(|i| {
            let id = first + i;
            [
                EdgeRecord::new(id * 2, center, id, 1),
                EdgeRecord::new(id * 2 + 1, id, (center + i + 1) % base.max(1), 1),
            ]
        })
        .collect();
    let payload = GraphPayload { nodes, links };
    apply_ego_network(store, EntityId(center), payload, ExpansionMode::Expand)
}
