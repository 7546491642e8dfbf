use crate::service::GraphDataService;
use crate::settings::GraphSettings;
use crossbeam_channel::Receiver;
use newsgraph_core::{
    CategoryWords, ElementRef, Entity, EntityId, EntityType, GraphDelta, GraphError,
    OperationGates, Relationship, RelationshipId,
};
use newsgraph_events::telemetry::{
    CMD_ANNOTATE, CMD_COLLAPSE, CMD_EDIT, CMD_EXPAND, CMD_HIDE, CMD_LOAD_GRAPH, CMD_LOAD_MORE,
    CMD_LOOKUP_NAME, CMD_MERGE, CommandSpan,
};
use newsgraph_events::{Event, EventBus, LayoutFrame};
use newsgraph_graph::{
    EntityGraphStore, ExpansionMode, MergeOutcome, SelectionController, apply_ego_network,
    layout_frame, underline_words,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything the controller mutates, behind one lock.
struct GraphSession {
    store: EntityGraphStore,
    selection: SelectionController,
    annotations: BTreeMap<ElementRef, Vec<String>>,
    /// Pending ego requests, keyed to the generation they were issued in.
    in_flight: HashMap<EntityId, u64>,
    underline: CategoryWords,
    /// Bumped on every full reload; responses fetched for an older graph are dropped.
    generation: u64,
}

impl GraphSession {
    /// Release the in-flight marker of `id` if it still belongs to `generation`.
    fn finish_fetch(&mut self, id: EntityId, generation: u64) {
        if self.in_flight.get(&id) == Some(&generation) {
            self.in_flight.remove(&id);
        }
    }

    /// Bring derived state in line with the store after `delta` and collect
    /// the events that describe it.
    fn settle(&mut self, delta: &GraphDelta, events: &mut Vec<Event>) {
        if self.selection.prune(&self.store) {
            self.selection_events(events);
        }
        let store = &self.store;
        self.annotations.retain(|target, _| match target {
            ElementRef::Entity(id) => store.contains_node(*id),
            ElementRef::Relationship(id) => store.contains_edge(*id),
        });

        if delta.is_empty() {
            return;
        }
        events.push(Event::GraphChanged {
            delta: delta.clone(),
        });
        if delta.is_structural() {
            events.push(Event::LayoutRestart {
                frame: layout_frame(&self.store),
            });
        }
        self.refresh_underline(events);
    }

    fn refresh_underline(&mut self, events: &mut Vec<Event>) {
        let words = underline_words(&self.store);
        if words != self.underline {
            self.underline = words.clone();
            events.push(Event::UnderlineChanged { words });
        }
    }

    fn selection_events(&self, events: &mut Vec<Event>) {
        events.push(Event::SelectionChanged {
            nodes: self.selection.selected_nodes(),
            edges: self.selection.selected_edges().to_vec(),
            gates: self.selection.gates(),
        });
        events.push(Event::HighlightChanged {
            words: self.selection.highlight().clone(),
        });
    }
}

/// Node and edge collections at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relationship>,
}

/// Headless orchestrator for the entity graph.
///
/// Any shell (CLI, desktop, web bridge) calls methods on this controller and
/// drains `Event`s from its bus. Graph mutations run under one lock that is
/// never held across a data-service call, so two operations never interleave
/// below operation granularity.
#[derive(Clone)]
pub struct GraphController {
    state: Arc<Mutex<GraphSession>>,
    bus: EventBus,
    service: Arc<dyn GraphDataService>,
    settings: Arc<GraphSettings>,
}

impl GraphController {
    pub fn new(service: Arc<dyn GraphDataService>, settings: GraphSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(GraphSession {
                store: EntityGraphStore::new(),
                selection: SelectionController::new(settings.highlight_removal),
                annotations: BTreeMap::new(),
                in_flight: HashMap::new(),
                underline: CategoryWords::new(),
                generation: 0,
            })),
            bus: EventBus::new(),
            service,
            settings: Arc::new(settings),
        }
    }

    /// Subscribe to graph events. Every call opens its own stream that sees
    /// all events published from then on.
    pub fn events(&self) -> Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            self.bus.publish(event);
        }
    }

    fn report(&self, err: &GraphError) {
        match err {
            GraphError::DataFetch(message) => {
                tracing::error!("{}", message);
                self.bus.publish(Event::ShowError {
                    message: message.clone(),
                });
            }
            _ if !err.is_recoverable() => {
                tracing::error!("{}", err);
            }
            other => {
                tracing::warn!("Rejected: {}", other);
                self.bus.publish(Event::StatusUpdate {
                    message: other.to_string(),
                });
            }
        }
    }

    /// Replace the whole graph with a fresh full-graph query.
    /// Returns the number of nodes and edges loaded.
    pub async fn load_full_graph(&self) -> Result<(usize, usize), GraphError> {
        let span = CommandSpan::start(CMD_LOAD_GRAPH);
        let result = self.load_full_graph_inner().await;
        if let Err(err) = &result {
            self.report(err);
        }
        span.finish(result)
    }

    async fn load_full_graph_inner(&self) -> Result<(usize, usize), GraphError> {
        let payload = self
            .service
            .fetch_full_graph(&self.settings.full_graph)
            .await?;

        let mut events = Vec::new();
        let counts = {
            let mut state = self.state.lock();
            state.store.clear();
            state.selection.clear();
            state.annotations.clear();
            state.in_flight.clear();
            state.generation += 1;

            let provenance = Default::default();
            state.store.upsert_nodes(payload.nodes, &provenance);
            state.store.upsert_edges(payload.links);
            let counts = (state.store.node_count(), state.store.edge_count());

            events.push(Event::GraphReloaded {
                node_count: counts.0,
                edge_count: counts.1,
            });
            events.push(Event::LayoutRestart {
                frame: layout_frame(&state.store),
            });
            state.selection_events(&mut events);
            state.refresh_underline(&mut events);
            counts
        };
        tracing::info!("Loaded full graph: {} nodes, {} edges", counts.0, counts.1);
        self.publish_all(events);
        Ok(counts)
    }

    /// Fetch and merge the ego network of `id`.
    pub async fn expand(&self, id: EntityId) -> Result<GraphDelta, GraphError> {
        let span = CommandSpan::start(CMD_EXPAND);
        span.context(&format!("id={id}"));
        let result = self.fetch_and_apply(id, ExpansionMode::Expand).await;
        span.finish(result)
    }

    /// Attach more neighbours of `id` without making them collapsible.
    pub async fn load_more(&self, id: EntityId) -> Result<GraphDelta, GraphError> {
        let span = CommandSpan::start(CMD_LOAD_MORE);
        span.context(&format!("id={id}"));
        let result = self.fetch_and_apply(id, ExpansionMode::LoadMore).await;
        span.finish(result)
    }

    /// Expand the selected node. Needs exactly one selected node and no edges.
    pub async fn ego_selected(&self) -> Result<GraphDelta, GraphError> {
        let target = {
            let state = self.state.lock();
            if state.selection.gates().ego {
                state.selection.most_recent_node()
            } else {
                None
            }
        };
        match target {
            Some(id) => self.expand(id).await,
            None => {
                let err = GraphError::invalid("Ego network needs exactly one selected node");
                self.report(&err);
                Err(err)
            }
        }
    }

    async fn fetch_and_apply(
        &self,
        id: EntityId,
        mode: ExpansionMode,
    ) -> Result<GraphDelta, GraphError> {
        let (generation, exclude) = {
            let mut state = self.state.lock();
            let begun = Self::begin_fetch(&mut *state, id, mode);
            if let Err(err) = &begun {
                drop(state);
                self.report(err);
            }
            begun?
        };
        self.bus.publish(Event::ExpansionStarted { id });

        let quota = match mode {
            ExpansionMode::LoadMore => self.settings.load_more_quota,
            ExpansionMode::Expand | ExpansionMode::Discover => self.settings.expand_quota,
        };
        let fetched = self.service.fetch_ego_network(id, quota, &exclude).await;

        let mut events = Vec::new();
        let outcome = {
            let mut state = self.state.lock();
            state.finish_fetch(id, generation);
            match fetched {
                Err(err) => Err(err),
                Ok(_) if state.generation != generation || !state.store.contains_node(id) => {
                    tracing::warn!("Discarding ego network of {} fetched for a stale graph", id);
                    Ok(GraphDelta::default())
                }
                Ok(payload) => {
                    let applied = apply_ego_network(&mut state.store, id, payload, mode);
                    if let Ok(delta) = &applied {
                        state.settle(delta, &mut events);
                    }
                    applied
                }
            }
        };

        match &outcome {
            Ok(delta) => events.push(Event::ExpansionCompleted {
                id,
                added_nodes: delta.added_nodes.len(),
                added_edges: delta.added_edges.len(),
            }),
            Err(err) => {
                events.push(Event::ExpansionFailed {
                    id,
                    error: err.to_string(),
                });
            }
        }
        self.publish_all(events);
        if let Err(err) = &outcome {
            self.report(err);
        }
        outcome
    }

    /// Validate an expand/load-more request and mark it in flight.
    fn begin_fetch(
        state: &mut GraphSession,
        id: EntityId,
        mode: ExpansionMode,
    ) -> Result<(u64, Vec<EntityId>), GraphError> {
        let entity = state
            .store
            .find_by_id(id)
            .ok_or(GraphError::EntityNotFound(id))?;
        if mode == ExpansionMode::Expand && entity.expanded {
            return Err(GraphError::invalid(format!("Entity {id} is already expanded")));
        }
        if state.in_flight.contains_key(&id) {
            return Err(GraphError::invalid(format!(
                "A request for entity {id} is already in flight"
            )));
        }
        let exclude = match mode {
            ExpansionMode::LoadMore => state.store.neighbors(id),
            ExpansionMode::Expand | ExpansionMode::Discover => Vec::new(),
        };
        state.in_flight.insert(id, state.generation);
        Ok((state.generation, exclude))
    }

    /// Select every node named `name`. When the graph has none, the ids are
    /// looked up and their ego networks fetched first.
    pub async fn select_by_name(&self, name: &str) -> Result<Vec<EntityId>, GraphError> {
        let mut events = Vec::new();
        let selected = {
            let mut state = self.state.lock();
            let GraphSession {
                store, selection, ..
            } = &mut *state;
            let selected = selection.select_by_name(store, name);
            if !selected.is_empty() || !store.find_by_name(name).is_empty() {
                state.selection_events(&mut events);
                Some(selected)
            } else {
                None
            }
        };
        if let Some(selected) = selected {
            self.publish_all(events);
            return Ok(selected);
        }

        let span = CommandSpan::start(CMD_LOOKUP_NAME);
        span.context(name);
        let result = self.discover_and_select(name).await;
        if let Err(err) = &result {
            self.report(err);
        }
        span.finish(result)
    }

    async fn discover_and_select(&self, name: &str) -> Result<Vec<EntityId>, GraphError> {
        let ids = self.service.fetch_ids_by_name(name).await?;
        if ids.is_empty() {
            return Err(GraphError::invalid(format!("No entity named {name:?}")));
        }

        let mut discovered = GraphDelta::default();
        let mut failure = None;
        for id in &ids {
            let generation = {
                let mut state = self.state.lock();
                if state.store.contains_node(*id) || state.in_flight.contains_key(id) {
                    continue;
                }
                let generation = state.generation;
                state.in_flight.insert(*id, generation);
                generation
            };
            let fetched = self
                .service
                .fetch_ego_network(*id, self.settings.expand_quota, &[])
                .await;

            let mut state = self.state.lock();
            state.finish_fetch(*id, generation);
            let payload = match fetched {
                Ok(payload) => payload,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };
            if state.generation != generation {
                continue;
            }
            match apply_ego_network(&mut state.store, *id, payload, ExpansionMode::Discover) {
                Ok(delta) => discovered.absorb(delta),
                Err(err) => tracing::warn!("Lookup of {} returned no center: {}", id, err),
            }
        }

        let mut events = Vec::new();
        let selected = {
            let mut state = self.state.lock();
            state.settle(&discovered, &mut events);
            let GraphSession {
                store, selection, ..
            } = &mut *state;
            let selected: Vec<EntityId> = ids
                .iter()
                .copied()
                .filter(|id| selection.select_node(store, *id).unwrap_or(false))
                .collect();
            state.selection_events(&mut events);
            selected
        };
        self.publish_all(events);
        match failure {
            Some(err) => Err(err),
            None => Ok(selected),
        }
    }

    pub fn unselect_by_name(&self, name: &str) -> Vec<EntityId> {
        let mut events = Vec::new();
        let removed = {
            let mut state = self.state.lock();
            let removed = state.selection.unselect_by_name(name);
            if !removed.is_empty() {
                state.selection_events(&mut events);
            }
            removed
        };
        self.publish_all(events);
        removed
    }

    /// Undo the expansion of `id`.
    pub fn collapse(&self, id: EntityId) -> Result<GraphDelta, GraphError> {
        let span = CommandSpan::start(CMD_COLLAPSE);
        span.context(&format!("id={id}"));
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            if state.in_flight.contains_key(&id) {
                Err(GraphError::invalid(format!(
                    "Entity {id} has an expansion in flight"
                )))
            } else {
                let collapsed = newsgraph_graph::collapse(&mut state.store, id);
                if let Ok(delta) = &collapsed {
                    state.settle(delta, &mut events);
                }
                collapsed
            }
        };
        self.publish_all(events);
        if let Err(err) = &result {
            self.report(err);
        }
        span.finish(result)
    }

    /// Merge `ids` into `focal`; the selection becomes `focal` alone.
    pub fn merge(&self, focal: EntityId, ids: &[EntityId]) -> Result<MergeOutcome, GraphError> {
        let span = CommandSpan::start(CMD_MERGE);
        span.context(&format!("focal={focal} count={}", ids.len()));
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            let merged = newsgraph_graph::merge(&mut state.store, focal, ids);
            if let Ok(outcome) = &merged {
                let GraphSession {
                    store, selection, ..
                } = &mut *state;
                if let Err(err) = selection.select_only(store, focal) {
                    tracing::error!("Failed to select merged entity {}: {}", focal, err);
                }
                state.selection_events(&mut events);
                state.settle(&outcome.delta, &mut events);
            }
            merged
        };
        self.publish_all(events);
        if let Err(err) = &result {
            self.report(err);
        }
        span.finish(result)
    }

    /// Merge the selected nodes into `focal`, which must be one of them.
    pub fn merge_selected(&self, focal: EntityId) -> Result<MergeOutcome, GraphError> {
        let (gates, nodes) = {
            let state = self.state.lock();
            (state.selection.gates(), state.selection.selected_nodes())
        };
        if !gates.merge {
            let err = GraphError::invalid("Merge needs two or more selected nodes and no edges");
            self.report(&err);
            return Err(err);
        }
        if !nodes.contains(&focal) {
            let err = GraphError::invalid(format!("Entity {focal} is not selected"));
            self.report(&err);
            return Err(err);
        }
        self.merge(focal, &nodes)
    }

    /// Remove the selected nodes and edges from the graph.
    pub fn hide_selected(&self) -> Result<GraphDelta, GraphError> {
        let span = CommandSpan::start(CMD_HIDE);
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            if !state.selection.gates().delete_hide {
                Err(GraphError::invalid("Nothing selected"))
            } else {
                let GraphSession {
                    store, selection, ..
                } = &mut *state;
                let hidden = selection.hide_selected(store);
                if let Ok(delta) = &hidden {
                    state.selection_events(&mut events);
                    state.settle(delta, &mut events);
                }
                hidden
            }
        };
        self.publish_all(events);
        if let Err(err) = &result {
            self.report(err);
        }
        span.finish(result)
    }

    /// Rename an entity and save the new name with the data service.
    /// Returns false when the name is unchanged. The local rename stands
    /// even when saving fails.
    pub async fn edit_name(&self, id: EntityId, name: &str) -> Result<bool, GraphError> {
        let name = name.trim();
        if name.is_empty() {
            let err = GraphError::invalid("Entity names cannot be empty");
            self.report(&err);
            return Err(err);
        }
        let span = CommandSpan::start(CMD_EDIT);
        span.context(&format!("id={id} name={name:?}"));
        let result = match self.edit(id, |store| store.rename(id, name)) {
            Ok(true) => self
                .persist(self.service.update_entity_name(id, name).await)
                .map(|()| true),
            other => other,
        };
        span.finish(result)
    }

    /// Change an entity's category and save it with the data service.
    /// Returns false when it is unchanged.
    pub async fn edit_type(&self, id: EntityId, kind: EntityType) -> Result<bool, GraphError> {
        let span = CommandSpan::start(CMD_EDIT);
        span.context(&format!("id={id} kind={kind}"));
        let result = match self.edit(id, |store| store.retype(id, kind)) {
            Ok(true) => self
                .persist(self.service.update_entity_type(id, kind).await)
                .map(|()| true),
            other => other,
        };
        span.finish(result)
    }

    fn persist(&self, saved: Result<(), GraphError>) -> Result<(), GraphError> {
        if let Err(err) = &saved {
            self.report(err);
        }
        saved
    }

    fn edit<F>(&self, id: EntityId, apply: F) -> Result<bool, GraphError>
    where
        F: FnOnce(&mut EntityGraphStore) -> Result<bool, GraphError>,
    {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            let changed = apply(&mut state.store);
            if let Ok(true) = changed
                && let Some(entity) = state.store.find_by_id(id)
            {
                events.push(Event::EntityEdited {
                    id,
                    name: entity.name.clone(),
                    kind: entity.kind,
                });
                let mut delta = GraphDelta::default();
                delta.node_updated(id);
                let GraphSession {
                    store, selection, ..
                } = &mut *state;
                if selection.refresh_entity(store, id) {
                    events.push(Event::HighlightChanged {
                        words: selection.highlight().clone(),
                    });
                }
                state.settle(&delta, &mut events);
            }
            changed
        };
        self.publish_all(events);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Toggle a node's selection. Returns whether it is selected afterwards.
    pub fn toggle_node(&self, id: EntityId) -> Result<bool, GraphError> {
        self.toggle(|state| {
            let GraphSession {
                store, selection, ..
            } = state;
            selection.toggle_node(store, id)
        })
    }

    /// Toggle an edge's selection. Returns whether it is selected afterwards.
    pub fn toggle_edge(&self, id: RelationshipId) -> Result<bool, GraphError> {
        self.toggle(|state| {
            let GraphSession {
                store, selection, ..
            } = state;
            selection.toggle_edge(store, id)
        })
    }

    fn toggle<F>(&self, apply: F) -> Result<bool, GraphError>
    where
        F: FnOnce(&mut GraphSession) -> Result<bool, GraphError>,
    {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            let toggled = apply(&mut *state);
            if toggled.is_ok() {
                state.selection_events(&mut events);
            }
            toggled
        };
        self.publish_all(events);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    pub fn clear_selection(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            state.selection.clear();
            state.selection_events(&mut events);
        }
        self.publish_all(events);
    }

    /// Attach a note to the single selected node or edge.
    pub fn annotate(&self, text: &str) -> Result<ElementRef, GraphError> {
        let span = CommandSpan::start(CMD_ANNOTATE);
        let result = {
            let mut state = self.state.lock();
            let selection = &state.selection;
            let target = if selection.gates().annotate {
                selection
                    .selected_nodes()
                    .first()
                    .map(|id| ElementRef::Entity(*id))
                    .or_else(|| {
                        selection
                            .selected_edges()
                            .first()
                            .map(|id| ElementRef::Relationship(*id))
                    })
            } else {
                None
            };
            match target {
                Some(target) => {
                    state
                        .annotations
                        .entry(target)
                        .or_default()
                        .push(text.to_string());
                    Ok(target)
                }
                None => Err(GraphError::invalid(
                    "Annotations need exactly one selected node or edge",
                )),
            }
        };
        match &result {
            Ok(target) => self.bus.publish(Event::AnnotationAdded {
                target: *target,
                text: text.to_string(),
            }),
            Err(err) => self.report(err),
        }
        span.finish(result)
    }

    pub fn annotations(&self, target: ElementRef) -> Vec<String> {
        self.state
            .lock()
            .annotations
            .get(&target)
            .cloned()
            .unwrap_or_default()
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.state.lock().store.find_by_id(id).cloned()
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<Relationship> {
        self.state.lock().store.get_edge(id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Vec<Entity> {
        self.state
            .lock()
            .store
            .find_by_name(name)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.lock();
        GraphSnapshot {
            nodes: state.store.nodes().cloned().collect(),
            edges: state.store.edges().cloned().collect(),
        }
    }

    pub fn layout_frame(&self) -> LayoutFrame {
        layout_frame(&self.state.lock().store)
    }

    pub fn gates(&self) -> OperationGates {
        self.state.lock().selection.gates()
    }

    pub fn selected_nodes(&self) -> Vec<EntityId> {
        self.state.lock().selection.selected_nodes()
    }

    pub fn selected_edges(&self) -> Vec<RelationshipId> {
        self.state.lock().selection.selected_edges().to_vec()
    }

    /// Human-readable list of the current selection.
    pub fn selection_text(&self) -> String {
        let state = self.state.lock();
        state.selection.describe(&state.store)
    }

    pub fn highlight(&self) -> CategoryWords {
        self.state.lock().selection.highlight().clone()
    }

    pub fn underline(&self) -> CategoryWords {
        self.state.lock().underline.clone()
    }

    pub fn is_expanding(&self, id: EntityId) -> bool {
        self.state.lock().in_flight.contains_key(&id)
    }

    /// Full consistency check of the underlying store.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        self.state.lock().store.check_invariants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{GraphFilters, StaticGraphService};
    use async_trait::async_trait;
    use newsgraph_core::{CategoryQuota, EdgeRecord, GraphPayload, NodeRecord};
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Static dataset that can be told to fail, or to hold ego requests
    /// until released.
    struct ScriptedService {
        inner: StaticGraphService,
        failing: AtomicBool,
        gates: Mutex<VecDeque<Arc<Notify>>>,
    }

    impl ScriptedService {
        fn new(dataset: GraphPayload) -> Self {
            Self {
                inner: StaticGraphService::new(dataset),
                failing: AtomicBool::new(false),
                gates: Mutex::new(VecDeque::new()),
            }
        }

        /// Hold the next ego request until the returned gate is notified.
        fn hold_next(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates.lock().push_back(gate.clone());
            gate
        }

        fn check(&self) -> Result<(), GraphError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(GraphError::fetch("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl GraphDataService for ScriptedService {
        async fn fetch_full_graph(
            &self,
            filters: &GraphFilters,
        ) -> Result<GraphPayload, GraphError> {
            self.check()?;
            self.inner.fetch_full_graph(filters).await
        }

        async fn fetch_ego_network(
            &self,
            id: EntityId,
            quota: CategoryQuota,
            exclude: &[EntityId],
        ) -> Result<GraphPayload, GraphError> {
            let gate = self.gates.lock().pop_front();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.check()?;
            self.inner.fetch_ego_network(id, quota, exclude).await
        }

        async fn fetch_ids_by_name(&self, name: &str) -> Result<Vec<EntityId>, GraphError> {
            self.check()?;
            self.inner.fetch_ids_by_name(name).await
        }

        async fn update_entity_name(&self, id: EntityId, name: &str) -> Result<(), GraphError> {
            self.check()?;
            self.inner.update_entity_name(id, name).await
        }

        async fn update_entity_type(
            &self,
            id: EntityId,
            kind: EntityType,
        ) -> Result<(), GraphError> {
            self.check()?;
            self.inner.update_entity_type(id, kind).await
        }
    }

    fn dataset() -> GraphPayload {
        GraphPayload {
            nodes: vec![
                NodeRecord::new(1, "Paris", 5000, EntityType::LOCATION),
                NodeRecord::new(2, "France", 3000, EntityType::LOCATION),
                NodeRecord::new(3, "Berlin", 2500, EntityType::LOCATION),
                NodeRecord::new(10, "Merkel", 9000, EntityType::PERSON),
                NodeRecord::new(20, "X", 1, EntityType::PERSON),
                NodeRecord::new(21, "Y", 2, EntityType::ORGANIZATION),
                NodeRecord::new(30, "Berlin", 40, EntityType::LOCATION),
            ],
            links: vec![
                EdgeRecord::new(50, 1, 2, 2000),
                EdgeRecord::new(51, 10, 3, 3000),
                EdgeRecord::new(99, 10, 20, 3),
                EdgeRecord::new(98, 10, 21, 2),
                EdgeRecord::new(60, 30, 21, 9),
            ],
        }
    }

    fn settings() -> GraphSettings {
        GraphSettings {
            full_graph: GraphFilters {
                per_category: CategoryQuota([3, 0, 1, 0]),
                ..GraphFilters::default()
            },
            ..GraphSettings::default()
        }
    }

    fn controller_with(service: ScriptedService) -> GraphController {
        GraphController::new(Arc::new(service), settings())
    }

    async fn loaded() -> GraphController {
        let controller = controller_with(ScriptedService::new(dataset()));
        controller.load_full_graph().await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_full_load_populates_store() {
        let controller = controller_with(ScriptedService::new(dataset()));
        let events = controller.events();
        controller.load_full_graph().await.unwrap();
        let snapshot = controller.snapshot();
        let ids: Vec<i64> = snapshot.nodes.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 10]);
        assert_eq!(snapshot.edges.len(), 2);
        assert!(controller.underline().contains(EntityType::PERSON, "Merkel"));

        let events: Vec<Event> = events.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::GraphReloaded {
                node_count: 4,
                edge_count: 2
            }
        )));
        assert!(events.iter().any(|e| matches!(e, Event::LayoutRestart { .. })));
    }

    #[tokio::test]
    async fn test_expand_then_collapse() {
        let controller = loaded().await;
        let before = controller.snapshot();

        let delta = controller.expand(EntityId(10)).await.unwrap();
        assert_eq!(
            delta.added_nodes,
            BTreeSet::from([EntityId(20), EntityId(21)])
        );
        let x = controller.entity(EntityId(20)).unwrap();
        assert_eq!(x.provenance, BTreeSet::from([EntityId(10)]));
        let edge = controller.relationship(RelationshipId(99)).unwrap();
        assert_eq!((edge.source, edge.target), (EntityId(10), EntityId(20)));
        assert!(controller.entity(EntityId(10)).unwrap().expanded);

        // A second expand of the same node is rejected.
        assert!(matches!(
            controller.expand(EntityId(10)).await,
            Err(GraphError::InvalidOperation(_))
        ));

        controller.collapse(EntityId(10)).unwrap();
        let mut after = controller.snapshot();
        after.nodes.iter_mut().for_each(|n| n.expanded = false);
        assert_eq!(after, before);
        controller.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_failed_expansion_leaves_graph_unchanged() {
        let service = ScriptedService::new(dataset());
        let controller = GraphController::new(Arc::new(service), settings());
        controller.load_full_graph().await.unwrap();
        let events = controller.events();
        events.try_iter().for_each(drop);

        // Swap in a failing service sharing nothing but the loaded graph.
        let failing = ScriptedService::new(dataset());
        failing.failing.store(true, Ordering::SeqCst);
        let broken = GraphController {
            service: Arc::new(failing),
            ..controller.clone()
        };

        let before = controller.snapshot();
        let err = broken.expand(EntityId(10)).await.unwrap_err();
        assert!(matches!(err, GraphError::DataFetch(_)));
        assert_eq!(controller.snapshot(), before);
        assert!(!controller.entity(EntityId(10)).unwrap().expanded);
        assert!(!controller.is_expanding(EntityId(10)));

        let published: Vec<Event> = events.try_iter().collect();
        assert!(published.iter().any(|e| matches!(e, Event::ExpansionFailed { .. })));
        assert!(published.iter().any(|e| matches!(e, Event::ShowError { .. })));

        // Retry succeeds once the service is back.
        controller.expand(EntityId(10)).await.unwrap();
        assert!(controller.entity(EntityId(10)).unwrap().expanded);
    }

    #[tokio::test]
    async fn test_in_flight_expansion_blocks_collapse_and_reexpand() {
        let service = ScriptedService::new(dataset());
        let gate = service.hold_next();
        let controller = controller_with(service);
        controller.load_full_graph().await.unwrap();

        let pending = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.expand(EntityId(10)).await })
        };
        while !controller.is_expanding(EntityId(10)) {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            controller.expand(EntityId(10)).await,
            Err(GraphError::InvalidOperation(_))
        ));
        assert!(matches!(
            controller.collapse(EntityId(10)),
            Err(GraphError::InvalidOperation(_))
        ));

        gate.notify_one();
        let delta = pending.await.unwrap().unwrap();
        assert_eq!(delta.added_nodes.len(), 2);
        assert!(!controller.is_expanding(EntityId(10)));
    }

    #[tokio::test]
    async fn test_response_for_removed_center_is_discarded() {
        let service = ScriptedService::new(dataset());
        let gate = service.hold_next();
        let controller = controller_with(service);
        controller.load_full_graph().await.unwrap();

        let pending = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.expand(EntityId(10)).await })
        };
        while !controller.is_expanding(EntityId(10)) {
            tokio::task::yield_now().await;
        }
        controller.toggle_node(EntityId(10)).unwrap();
        controller.hide_selected().unwrap();

        gate.notify_one();
        let delta = pending.await.unwrap().unwrap();
        assert!(delta.is_empty());
        assert!(controller.entity(EntityId(20)).is_none());
        controller.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_merge_selected_nodes() {
        let controller = loaded().await;
        controller.toggle_node(EntityId(1)).unwrap();
        controller.toggle_node(EntityId(2)).unwrap();
        assert!(controller.gates().merge);

        let outcome = controller.merge_selected(EntityId(1)).unwrap();
        assert_eq!(outcome.absorbed, vec![EntityId(2)]);

        let paris = controller.entity(EntityId(1)).unwrap();
        assert_eq!(paris.frequency, 8000);
        assert!(controller.relationship(RelationshipId(50)).is_none());
        assert_eq!(controller.selected_nodes(), vec![EntityId(1)]);
        assert!(!controller.highlight().contains(EntityType::LOCATION, "France"));
        assert!(!controller.underline().contains(EntityType::LOCATION, "France"));
    }

    #[tokio::test]
    async fn test_merge_focal_must_be_selected() {
        let controller = loaded().await;
        controller.toggle_node(EntityId(1)).unwrap();
        controller.toggle_node(EntityId(2)).unwrap();
        assert!(matches!(
            controller.merge_selected(EntityId(3)),
            Err(GraphError::InvalidOperation(_))
        ));

        controller.toggle_edge(RelationshipId(50)).unwrap();
        assert!(matches!(
            controller.merge_selected(EntityId(1)),
            Err(GraphError::InvalidOperation(_))
        ));
        assert_eq!(controller.snapshot().nodes.len(), 4);
    }

    #[tokio::test]
    async fn test_select_by_name_discovers_missing_entities() {
        let controller = loaded().await;
        let selected = controller.select_by_name("Berlin").await.unwrap();
        // 3 is already loaded, so no lookup happens.
        assert_eq!(selected, vec![EntityId(3)]);

        controller.clear_selection();
        let selected = controller.select_by_name("Y").await.unwrap();
        assert_eq!(selected, vec![EntityId(21)]);
        let y = controller.entity(EntityId(21)).unwrap();
        assert!(y.provenance.is_empty());
        assert!(y.expanded);
        let neighbour = controller.entity(EntityId(30)).unwrap();
        assert_eq!(neighbour.provenance, BTreeSet::from([EntityId(21)]));
        assert!(controller.highlight().contains(EntityType::ORGANIZATION, "Y"));

        assert_eq!(controller.unselect_by_name("Y"), vec![EntityId(21)]);
        assert!(controller.highlight().is_empty());

        assert!(controller.select_by_name("Atlantis").await.is_err());
    }

    #[tokio::test]
    async fn test_load_more_excludes_neighbours() {
        let controller = loaded().await;
        let delta = controller.load_more(EntityId(10)).await.unwrap();

        // Berlin (3) is already adjacent; one new neighbour per category.
        assert_eq!(
            delta.added_nodes,
            BTreeSet::from([EntityId(20), EntityId(21)])
        );
        assert!(controller.entity(EntityId(20)).unwrap().provenance.is_empty());
        assert!(!controller.entity(EntityId(10)).unwrap().expanded);
    }

    #[tokio::test]
    async fn test_edit_updates_highlight_and_underline() {
        let controller = loaded().await;
        controller.toggle_node(EntityId(3)).unwrap();

        assert!(!controller.edit_name(EntityId(3), "Berlin").await.unwrap());
        assert!(controller.edit_name(EntityId(3), "Berlin (city)").await.unwrap());
        assert!(controller.highlight().contains(EntityType::LOCATION, "Berlin (city)"));
        assert!(controller.underline().contains(EntityType::LOCATION, "Berlin (city)"));

        assert!(
            controller
                .edit_type(EntityId(3), EntityType::MISCELLANEOUS)
                .await
                .unwrap()
        );
        assert!(controller.highlight().contains(EntityType::MISCELLANEOUS, "Berlin (city)"));
        assert!(controller.edit_name(EntityId(3), "  ").await.is_err());

        // The data service saw both edits.
        let ids = controller.service.fetch_ids_by_name("Berlin (city)").await.unwrap();
        assert_eq!(ids, vec![EntityId(3)]);
        let ego = controller
            .service
            .fetch_ego_network(EntityId(3), CategoryQuota::uniform(0), &[])
            .await
            .unwrap();
        assert_eq!(ego.nodes[0].kind(), EntityType::MISCELLANEOUS);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_local_edit_and_reports() {
        let service = Arc::new(ScriptedService::new(dataset()));
        let controller = GraphController::new(service.clone(), settings());
        controller.load_full_graph().await.unwrap();
        let events = controller.events();

        service.failing.store(true, Ordering::SeqCst);
        let err = controller
            .edit_name(EntityId(3), "Berlin (city)")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::DataFetch(_)));
        assert_eq!(controller.entity(EntityId(3)).unwrap().name, "Berlin (city)");
        assert!(matches!(
            controller.edit_type(EntityId(3), EntityType::PERSON).await,
            Err(GraphError::DataFetch(_))
        ));

        let published: Vec<Event> = events.try_iter().collect();
        let errors = published
            .iter()
            .filter(|e| matches!(e, Event::ShowError { .. }))
            .count();
        assert_eq!(errors, 2);
        assert!(published.iter().any(|e| matches!(e, Event::EntityEdited { .. })));

        // Unchanged edits never reach the service.
        assert!(!controller.edit_name(EntityId(3), "Berlin (city)").await.unwrap());
    }

    #[tokio::test]
    async fn test_annotations_follow_their_target() {
        let controller = loaded().await;
        assert!(controller.annotate("nothing selected").is_err());

        controller.toggle_edge(RelationshipId(50)).unwrap();
        let target = controller.annotate("same place").unwrap();
        assert_eq!(target, ElementRef::Relationship(RelationshipId(50)));
        assert_eq!(controller.annotations(target), vec!["same place".to_string()]);

        controller.hide_selected().unwrap();
        assert!(controller.annotations(target).is_empty());
    }

    #[tokio::test]
    async fn test_selection_text_and_gates() {
        let controller = loaded().await;
        controller.toggle_node(EntityId(1)).unwrap();
        controller.toggle_node(EntityId(10)).unwrap();
        controller.toggle_edge(RelationshipId(51)).unwrap();

        assert_eq!(
            controller.selection_text(),
            "Paris, Merkel and Berlin <--> Merkel"
        );
        let gates = controller.gates();
        assert!(!gates.merge && !gates.ego && gates.delete_hide);

        assert!(matches!(
            controller.ego_selected().await,
            Err(GraphError::InvalidOperation(_))
        ));
        assert!(!controller.entity(EntityId(10)).unwrap().expanded);

        controller.clear_selection();
        controller.toggle_node(EntityId(10)).unwrap();
        assert!(controller.gates().ego);
        controller.ego_selected().await.unwrap();
        assert!(controller.entity(EntityId(10)).unwrap().expanded);
    }

    #[tokio::test]
    async fn test_stale_response_keeps_newer_request_guarded() {
        let service = ScriptedService::new(dataset());
        let first = service.hold_next();
        let second = service.hold_next();
        let controller = controller_with(service);
        controller.load_full_graph().await.unwrap();

        let stale = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.expand(EntityId(10)).await })
        };
        while !controller.is_expanding(EntityId(10)) {
            tokio::task::yield_now().await;
        }
        controller.load_full_graph().await.unwrap();
        assert!(!controller.is_expanding(EntityId(10)));

        let fresh = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.expand(EntityId(10)).await })
        };
        while !controller.is_expanding(EntityId(10)) {
            tokio::task::yield_now().await;
        }

        first.notify_one();
        assert!(stale.await.unwrap().unwrap().is_empty());
        assert!(controller.is_expanding(EntityId(10)));
        assert!(matches!(
            controller.expand(EntityId(10)).await,
            Err(GraphError::InvalidOperation(_))
        ));
        assert!(matches!(
            controller.collapse(EntityId(10)),
            Err(GraphError::InvalidOperation(_))
        ));

        second.notify_one();
        let delta = fresh.await.unwrap().unwrap();
        assert_eq!(delta.added_nodes.len(), 2);
        assert!(!controller.is_expanding(EntityId(10)));
        controller.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_the_full_stream() {
        let controller = controller_with(ScriptedService::new(dataset()));
        let layout = controller.events();
        let view = controller.events();
        controller.load_full_graph().await.unwrap();

        let layout: Vec<Event> = layout.try_iter().collect();
        let view: Vec<Event> = view.try_iter().collect();
        assert!(!layout.is_empty());
        assert_eq!(layout.len(), view.len());
        for stream in [&layout, &view] {
            assert!(stream.iter().any(|e| matches!(e, Event::LayoutRestart { .. })));
            assert!(stream.iter().any(|e| matches!(e, Event::UnderlineChanged { .. })));
        }
    }
}
