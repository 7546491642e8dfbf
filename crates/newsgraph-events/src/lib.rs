use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use newsgraph_core::{
    CategoryWords, ElementRef, EntityId, EntityType, GraphDelta, OperationGates, RelationshipId,
};
use serde::{Deserialize, Serialize};

pub mod telemetry;

/// Node as handed to the layout engine. Positions live on the engine side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutNode {
    pub id: EntityId,
    pub kind: EntityType,
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutLink {
    pub id: RelationshipId,
    pub source: EntityId,
    pub target: EntityId,
    pub frequency: u64,
}

/// Snapshot of the current node/edge collections for the layout engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutFrame {
    pub nodes: Vec<LayoutNode>,
    pub links: Vec<LayoutLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Graph structure
    GraphChanged {
        delta: GraphDelta,
    },
    GraphReloaded {
        node_count: usize,
        edge_count: usize,
    },
    /// Positions must re-settle; carries the collections the engine simulates.
    LayoutRestart {
        frame: LayoutFrame,
    },

    // Expansion
    ExpansionStarted {
        id: EntityId,
    },
    ExpansionCompleted {
        id: EntityId,
        added_nodes: usize,
        added_edges: usize,
    },
    ExpansionFailed {
        id: EntityId,
        error: String,
    },

    // Selection and cross-view words
    SelectionChanged {
        nodes: Vec<EntityId>,
        edges: Vec<RelationshipId>,
        gates: OperationGates,
    },
    /// Names of selected entities, per category.
    HighlightChanged {
        words: CategoryWords,
    },
    /// Names of all entities in the graph, per category.
    UnderlineChanged {
        words: CategoryWords,
    },

    // Metadata
    EntityEdited {
        id: EntityId,
        name: String,
        kind: EntityType,
    },
    AnnotationAdded {
        target: ElementRef,
        text: String,
    },

    // Notifications
    StatusUpdate {
        message: String,
    },
    ShowError {
        message: String,
    },
}

/// Fan-out bus: every subscriber owns a channel and sees every event
/// published after it subscribed.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new event stream. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Dispatch all pending events of one subscription to a listener.
/// This is useful for processing events in the UI loop.
pub fn dispatch_to<L: EventListener>(receiver: &Receiver<Event>, listener: &mut L) {
    while let Ok(event) = receiver.try_recv() {
        listener.handle_event(&event);
    }
}

/// Trait for components that respond to events.
/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}
