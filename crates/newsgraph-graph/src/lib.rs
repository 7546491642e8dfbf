pub mod collapse;
pub mod expand;
pub mod highlight;
pub mod merge;
pub mod selection;
pub mod store;

#[cfg(test)]
mod properties;

pub use collapse::collapse;
pub use expand::{ExpansionMode, apply_ego_network};
pub use highlight::{HighlightRemoval, underline_words};
pub use merge::{MergeOutcome, merge};
pub use selection::SelectionController;
pub use store::EntityGraphStore;

use newsgraph_events::{LayoutFrame, LayoutLink, LayoutNode};

/// Node and edge collections in the shape the layout engine simulates.
pub fn layout_frame(store: &EntityGraphStore) -> LayoutFrame {
    LayoutFrame {
        nodes: store
            .nodes()
            .map(|e| LayoutNode {
                id: e.id,
                kind: e.kind,
                frequency: e.frequency,
            })
            .collect(),
        links: store
            .edges()
            .map(|r| LayoutLink {
                id: r.id,
                source: r.source,
                target: r.target,
                frequency: r.frequency,
            })
            .collect(),
    }
}
