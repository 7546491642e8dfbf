use crate::collapse::collapse;
use crate::expand::{ExpansionMode, apply_ego_network};
use crate::merge::merge;
use crate::store::EntityGraphStore;
use newsgraph_core::{EdgeRecord, EntityId, EntityType, GraphPayload, NodeRecord, RelationshipId};
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Op {
    Nodes(Vec<(i64, u64)>),
    Edges(Vec<(i64, i64, i64, u64)>),
    RemoveEdge(i64),
    Merge(i64, Vec<i64>),
}

fn kind_for(id: i64) -> EntityType {
    EntityType::ALL[id.rem_euclid(4) as usize]
}

fn node(id: i64, frequency: u64) -> NodeRecord {
    NodeRecord::new(id, format!("entity-{id}"), frequency, kind_for(id))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec((0i64..12, 0u64..50), 1..6).prop_map(Op::Nodes),
        prop::collection::vec((0i64..40, 0i64..12, 0i64..12, 0u64..20), 1..8).prop_map(Op::Edges),
        (0i64..40).prop_map(Op::RemoveEdge),
        (0i64..12, prop::collection::vec(0i64..12, 1..4)).prop_map(|(f, ids)| Op::Merge(f, ids)),
    ]
}

fn apply(store: &mut EntityGraphStore, op: Op) {
    match op {
        Op::Nodes(nodes) => {
            store.upsert_nodes(
                nodes.into_iter().map(|(id, f)| node(id, f)),
                &BTreeSet::new(),
            );
        }
        Op::Edges(edges) => {
            store.upsert_edges(
                edges
                    .into_iter()
                    .map(|(id, a, b, f)| EdgeRecord::new(id, a, b, f)),
            );
        }
        Op::RemoveEdge(id) => {
            let _ = store.remove_edge(RelationshipId(id));
        }
        Op::Merge(focal, ids) => {
            let ids: Vec<EntityId> = ids.into_iter().map(EntityId).collect();
            let _ = merge(store, EntityId(focal), &ids);
        }
    }
}

proptest! {
    #[test]
    fn prop_store_stays_consistent(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut store = EntityGraphStore::new();
        for op in ops {
            apply(&mut store, op);
            prop_assert!(store.check_invariants().is_ok());
        }
    }

    #[test]
    fn prop_merge_preserves_frequency(
        nodes in prop::collection::btree_map(0i64..10, 0u64..100, 2..10),
        edges in prop::collection::vec((0i64..60, 0i64..10, 0i64..10, 1u64..20), 0..30),
        pick in prop::collection::vec(any::<prop::sample::Index>(), 1..5),
    ) {
        let mut store = EntityGraphStore::new();
        store.upsert_nodes(nodes.iter().map(|(id, f)| node(*id, *f)), &BTreeSet::new());
        store.upsert_edges(edges.into_iter().map(|(id, a, b, f)| EdgeRecord::new(id, a, b, f)));

        let keys: Vec<i64> = nodes.keys().copied().collect();
        let focal = EntityId(keys[0]);
        let mut ids: Vec<EntityId> = pick.iter().map(|ix| EntityId(*ix.get(&keys))).collect();
        ids.push(EntityId(keys[keys.len() - 1]));
        let absorbed: BTreeSet<EntityId> = ids.iter().copied().filter(|id| *id != focal).collect();

        let expected: u64 = nodes[&focal.0]
            + absorbed.iter().map(|id| nodes[&id.0]).sum::<u64>();
        let edge_weight_before: u64 = store
            .edges()
            .filter(|e| {
                let ends = [e.source, e.target];
                !ends.iter().all(|x| absorbed.contains(x) || *x == focal)
            })
            .map(|e| e.frequency)
            .sum();

        merge(&mut store, focal, &ids).unwrap();

        prop_assert_eq!(store.find_by_id(focal).unwrap().frequency, expected);
        prop_assert!(store.check_invariants().is_ok());
        for id in &absorbed {
            prop_assert!(!store.contains_node(*id));
        }
        // Folding moves weight around but never loses it.
        let edge_weight_after: u64 = store.edges().map(|e| e.frequency).sum();
        prop_assert_eq!(edge_weight_after, edge_weight_before);
    }

    #[test]
    fn prop_expand_collapse_round_trip(
        base in prop::collection::btree_map(0i64..8, 1u64..50, 1..8),
        base_edges in prop::collection::vec((0i64..20, 0i64..8, 0i64..8), 0..12),
        fresh in prop::collection::btree_set(100i64..110, 0..6),
        fresh_edges in prop::collection::vec((200i64..240, 0usize..16, 0usize..16), 0..12),
    ) {
        let mut store = EntityGraphStore::new();
        store.upsert_nodes(base.iter().map(|(id, f)| node(*id, *f)), &BTreeSet::new());
        store.upsert_edges(base_edges.into_iter().map(|(id, a, b)| EdgeRecord::new(id, a, b, 1)));
        let nodes_before: Vec<_> = store.nodes().cloned().collect();
        let edges_before: Vec<_> = store.edges().cloned().collect();

        let center = *base.keys().next().unwrap();
        let fresh: Vec<i64> = fresh.into_iter().collect();
        // Every fetched edge touches at least one freshly fetched node.
        let links = fresh_edges
            .into_iter()
            .filter(|_| !fresh.is_empty())
            .map(|(id, a, b)| {
                let one = fresh[a % fresh.len()];
                let other = if b % 2 == 0 { center } else { fresh[b % fresh.len()] };
                EdgeRecord::new(id, one, other, 1)
            })
            .collect();
        let payload = GraphPayload {
            nodes: fresh.iter().map(|id| node(*id, 1)).collect(),
            links,
        };

        apply_ego_network(&mut store, EntityId(center), payload, ExpansionMode::Expand).unwrap();
        prop_assert!(store.check_invariants().is_ok());
        collapse(&mut store, EntityId(center)).unwrap();

        prop_assert_eq!(store.nodes().cloned().collect::<Vec<_>>(), nodes_before);
        prop_assert_eq!(store.edges().cloned().collect::<Vec<_>>(), edges_before);
    }
}
