use crate::store::EntityGraphStore;
use newsgraph_core::{EntityId, GraphDelta, GraphError, RelationshipId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub focal: EntityId,
    pub absorbed: Vec<EntityId>,
    pub delta: GraphDelta,
}

/// Fold every id in `ids` other than `focal` into `focal`.
///
/// Frequencies add up on the focal entity. Edges of absorbed entities are
/// re-pointed at the focal entity, folded into an existing focal edge to the
/// same neighbour, or dropped when they would become self-loops. Edges are
/// visited in ascending id order; the first edge to reach a neighbour becomes
/// the canonical one.
pub fn merge(
    store: &mut EntityGraphStore,
    focal: EntityId,
    ids: &[EntityId],
) -> Result<MergeOutcome, GraphError> {
    if !store.contains_node(focal) {
        return Err(GraphError::EntityNotFound(focal));
    }
    let absorbed: BTreeSet<EntityId> = ids.iter().copied().filter(|id| *id != focal).collect();
    if absorbed.is_empty() {
        return Err(GraphError::invalid(
            "Merge needs at least one entity besides the focal one",
        ));
    }
    if let Some(missing) = absorbed.iter().find(|id| !store.contains_node(**id)) {
        return Err(GraphError::EntityNotFound(*missing));
    }

    let mut delta = GraphDelta::default();
    let affected: BTreeSet<RelationshipId> = absorbed
        .iter()
        .flat_map(|id| store.incident_edges(*id))
        .collect();

    for edge_id in affected {
        let Some(edge) = store.get_edge(edge_id) else {
            continue;
        };
        let (source, target, frequency) = (edge.source, edge.target, edge.frequency);
        let source_gone = absorbed.contains(&source);
        let target_gone = absorbed.contains(&target);
        let (gone, survivor) = if source_gone { (source, target) } else { (target, source) };

        if (source_gone && target_gone) || survivor == focal {
            store.remove_edge(edge_id)?;
            delta.edge_removed(edge_id);
            continue;
        }

        match store.edge_between(focal, survivor).map(|e| e.id) {
            Some(existing) => {
                store.add_edge_frequency(existing, frequency)?;
                store.remove_edge(edge_id)?;
                delta.edge_updated(existing);
                delta.edge_removed(edge_id);
            }
            None => {
                store.reattach_edge(edge_id, gone, focal)?;
                delta.edge_updated(edge_id);
            }
        }
    }

    for id in &absorbed {
        let entity = store.remove_node(*id)?;
        store.add_node_frequency(focal, entity.frequency)?;
        delta.node_removed(*id);
    }
    delta.node_updated(focal);

    tracing::info!(
        "Merged {} entities into {}, {} edges removed",
        absorbed.len(),
        focal,
        delta.removed_edges.len()
    );
    Ok(MergeOutcome {
        focal,
        absorbed: absorbed.into_iter().collect(),
        delta,
    })
}
