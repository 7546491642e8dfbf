use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub mod delta;
pub mod entity_type;
pub mod error;
pub mod gates;
pub mod record;
pub mod words;

pub use delta::GraphDelta;
pub use entity_type::EntityType;
pub use error::{EnumConversionError, GraphError};
pub use gates::OperationGates;
pub use record::{EdgeRecord, GraphPayload, IdLookup, NodeRecord};
pub use words::CategoryWords;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub i64);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unordered endpoint pair. `(a, b)` and `(b, a)` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointPair {
    low: EntityId,
    high: EntityId,
}

impl EndpointPair {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn is_loop(&self) -> bool {
        self.low == self.high
    }

    pub fn ids(&self) -> (EntityId, EntityId) {
        (self.low, self.high)
    }
}

/// A named entity in the working graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityType,
    pub frequency: u64,
    /// Parents whose expansion introduced this entity. Empty for base-graph entities.
    pub provenance: BTreeSet<EntityId>,
    /// Whether this entity's own ego network has been merged in.
    pub expanded: bool,
}

impl Entity {
    pub fn from_record(record: NodeRecord, provenance: BTreeSet<EntityId>) -> Self {
        let NodeRecord(id, name, frequency, kind) = record;
        Self {
            id,
            name,
            kind,
            frequency,
            provenance,
            expanded: false,
        }
    }

    /// True when `parent` is the only owner of this entity.
    pub fn is_collapsible_by(&self, parent: EntityId) -> bool {
        self.provenance.len() == 1 && self.provenance.contains(&parent)
    }
}

/// A co-occurrence relationship between two distinct entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source: EntityId,
    pub target: EntityId,
    pub frequency: u64,
}

impl Relationship {
    pub fn from_record(record: EdgeRecord) -> Self {
        let EdgeRecord(id, source, target, frequency) = record;
        Self {
            id,
            source,
            target,
            frequency,
        }
    }

    pub fn pair(&self) -> EndpointPair {
        EndpointPair::new(self.source, self.target)
    }

    pub fn touches(&self, id: EntityId) -> bool {
        self.source == id || self.target == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn other_end(&self, id: EntityId) -> Option<EntityId> {
        if self.source == id {
            Some(self.target)
        } else if self.target == id {
            Some(self.source)
        } else {
            None
        }
    }
}

/// A selectable or annotatable graph element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    Entity(EntityId),
    Relationship(RelationshipId),
}

/// Neighbour budget per category, in `EntityType::ALL` order.
/// Serialized as a bare four-element array, the way the data service expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryQuota(pub [u32; 4]);

impl CategoryQuota {
    pub const fn uniform(per_category: u32) -> Self {
        Self([per_category; 4])
    }

    pub fn for_kind(&self, kind: EntityType) -> u32 {
        self.0[kind.index()]
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

impl Default for CategoryQuota {
    fn default() -> Self {
        Self::uniform(2)
    }
}
