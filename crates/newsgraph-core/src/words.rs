use crate::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One name set per entity category, as consumed by the document views for
/// highlighting and underlining. A name occurs at most once per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWords {
    sets: [BTreeSet<String>; 4],
}

impl CategoryWords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the name was not yet present for that category.
    pub fn insert(&mut self, kind: EntityType, name: &str) -> bool {
        let set = &mut self.sets[kind.index()];
        if set.contains(name) {
            return false;
        }
        set.insert(name.to_string())
    }

    pub fn remove(&mut self, kind: EntityType, name: &str) -> bool {
        self.sets[kind.index()].remove(name)
    }

    pub fn contains(&self, kind: EntityType, name: &str) -> bool {
        self.sets[kind.index()].contains(name)
    }

    pub fn get(&self, kind: EntityType) -> &BTreeSet<String> {
        &self.sets[kind.index()]
    }

    pub fn clear(&mut self) {
        for set in &mut self.sets {
            set.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(BTreeSet::is_empty)
    }

    pub fn len(&self) -> usize {
        self.sets.iter().map(BTreeSet::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityType, &BTreeSet<String>)> {
        EntityType::ALL
            .into_iter()
            .map(move |kind| (kind, &self.sets[kind.index()]))
    }
}
