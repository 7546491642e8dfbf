use serde::{Deserialize, Serialize};

/// Which bulk operations the current selection allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationGates {
    pub ego: bool,
    pub edit: bool,
    pub merge: bool,
    pub annotate: bool,
    pub delete_hide: bool,
}

impl OperationGates {
    /// Gates depend only on how many nodes and edges are selected.
    pub fn for_counts(nodes: usize, edges: usize) -> Self {
        if nodes == 0 && edges == 0 {
            return Self::default();
        }

        let single_node = nodes == 1 && edges == 0;
        let single_edge = nodes == 0 && edges == 1;
        if single_node || single_edge {
            return Self {
                ego: single_node,
                edit: true,
                merge: false,
                annotate: true,
                delete_hide: true,
            };
        }

        Self {
            ego: false,
            edit: false,
            merge: edges == 0,
            annotate: false,
            delete_hide: true,
        }
    }
}
