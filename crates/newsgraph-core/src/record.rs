use crate::{EntityId, EntityType, RelationshipId};
use serde::{Deserialize, Serialize};

/// Raw node tuple as delivered by the data service:
/// `[id, name, frequency, typeCode]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord(pub EntityId, pub String, pub u64, pub EntityType);

impl NodeRecord {
    pub fn new(id: i64, name: impl Into<String>, frequency: u64, kind: EntityType) -> Self {
        Self(EntityId(id), name.into(), frequency, kind)
    }

    pub fn id(&self) -> EntityId {
        self.0
    }

    pub fn name(&self) -> &str {
        &self.1
    }

    pub fn frequency(&self) -> u64 {
        self.2
    }

    pub fn kind(&self) -> EntityType {
        self.3
    }
}

/// Raw edge tuple: `[id, sourceId, targetId, frequency]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord(
    pub RelationshipId,
    pub EntityId,
    pub EntityId,
    pub u64,
);

impl EdgeRecord {
    pub fn new(id: i64, source: i64, target: i64, frequency: u64) -> Self {
        Self(
            RelationshipId(id),
            EntityId(source),
            EntityId(target),
            frequency,
        )
    }

    pub fn id(&self) -> RelationshipId {
        self.0
    }

    pub fn source(&self) -> EntityId {
        self.1
    }

    pub fn target(&self) -> EntityId {
        self.2
    }

    pub fn frequency(&self) -> u64 {
        self.3
    }
}

/// `{nodes, links}` response shape shared by full-graph and ego-network queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<EdgeRecord>,
}

impl GraphPayload {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

/// Response of the name to id lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdLookup {
    #[serde(default)]
    pub ids: Vec<EntityId>,
}
