use crate::store::EntityGraphStore;
use newsgraph_core::CategoryWords;
use serde::{Deserialize, Serialize};

/// What happens to a highlighted name when one of its nodes is unselected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightRemoval {
    /// Keep the name while another selected node of the same category carries it.
    #[default]
    RetainShared,
    /// Drop the name on the first unselect, even if it is still shared.
    Unconditional,
}

/// Every node name in the store, once per category.
pub fn underline_words(store: &EntityGraphStore) -> CategoryWords {
    let mut words = CategoryWords::new();
    for entity in store.nodes() {
        words.insert(entity.kind, &entity.name);
    }
    words
}
