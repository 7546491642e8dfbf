use anyhow::Context;
use async_trait::async_trait;
use newsgraph_core::{
    CategoryQuota, EdgeRecord, EntityId, EntityType, GraphError, GraphPayload, IdLookup,
    NodeRecord,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use crate::settings::DataServiceSettings;

/// Filters for the initial full-graph load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFilters {
    pub per_category: CategoryQuota,
    pub min_edge_frequency: u64,
    pub max_edge_frequency: u64,
    /// Pick the least instead of the most frequent entities.
    pub least_frequent: bool,
}

impl Default for GraphFilters {
    fn default() -> Self {
        Self {
            per_category: CategoryQuota::uniform(3),
            min_edge_frequency: 1500,
            max_edge_frequency: 81337,
            least_frequent: false,
        }
    }
}

impl GraphFilters {
    pub fn edge_window(&self) -> RangeInclusive<u64> {
        self.min_edge_frequency..=self.max_edge_frequency
    }
}

/// Source of raw node and edge records.
#[async_trait]
pub trait GraphDataService: Send + Sync {
    async fn fetch_full_graph(&self, filters: &GraphFilters) -> Result<GraphPayload, GraphError>;

    /// `id` plus up to `quota` neighbours per category, skipping `exclude`.
    async fn fetch_ego_network(
        &self,
        id: EntityId,
        quota: CategoryQuota,
        exclude: &[EntityId],
    ) -> Result<GraphPayload, GraphError>;

    async fn fetch_ids_by_name(&self, name: &str) -> Result<Vec<EntityId>, GraphError>;

    /// Persist a rename made in the graph.
    async fn update_entity_name(&self, id: EntityId, name: &str) -> Result<(), GraphError>;

    /// Persist a category change made in the graph.
    async fn update_entity_type(&self, id: EntityId, kind: EntityType) -> Result<(), GraphError>;
}

/// `{"result": bool}` acknowledgement of an edit.
#[derive(Debug, Deserialize)]
struct EditAck {
    result: bool,
}

impl EditAck {
    fn into_result(self, id: EntityId) -> Result<(), GraphError> {
        if self.result {
            Ok(())
        } else {
            Err(GraphError::fetch(format!("Backend rejected the edit of entity {id}")))
        }
    }
}

fn join_numbers<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// JSON-over-HTTP client for the network endpoints of the news backend.
#[derive(Debug, Clone)]
pub struct HttpGraphService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGraphService {
    pub fn new(settings: &DataServiceSettings) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| GraphError::fetch(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GraphError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| GraphError::fetch(format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::fetch(format!("{url}: HTTP {status}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GraphError::fetch(format!("{url}: malformed response: {e}")))
    }
}

#[async_trait]
impl GraphDataService for HttpGraphService {
    async fn fetch_full_graph(&self, filters: &GraphFilters) -> Result<GraphPayload, GraphError> {
        let query = [
            ("least", u8::from(filters.least_frequent).to_string()),
            ("amounts", join_numbers(filters.per_category.0)),
            ("minEdgeFreq", filters.min_edge_frequency.to_string()),
            ("maxEdgeFreq", filters.max_edge_frequency.to_string()),
        ];
        self.get_json("/network/graph", &query).await
    }

    async fn fetch_ego_network(
        &self,
        id: EntityId,
        quota: CategoryQuota,
        exclude: &[EntityId],
    ) -> Result<GraphPayload, GraphError> {
        let query = [
            ("amounts", join_numbers(quota.0)),
            ("exclude", join_numbers(exclude.iter().map(|id| id.0))),
        ];
        self.get_json(&format!("/network/ego/{id}"), &query).await
    }

    async fn fetch_ids_by_name(&self, name: &str) -> Result<Vec<EntityId>, GraphError> {
        let lookup: IdLookup = self
            .get_json("/network/ids", &[("name", name.to_string())])
            .await?;
        Ok(lookup.ids)
    }

    async fn update_entity_name(&self, id: EntityId, name: &str) -> Result<(), GraphError> {
        let ack: EditAck = self
            .get_json(&format!("/network/entity/{id}/name"), &[("name", name.to_string())])
            .await?;
        ack.into_result(id)
    }

    async fn update_entity_type(&self, id: EntityId, kind: EntityType) -> Result<(), GraphError> {
        let ack: EditAck = self
            .get_json(
                &format!("/network/entity/{id}/type"),
                &[("type", kind.code().to_string())],
            )
            .await?;
        ack.into_result(id)
    }
}

/// Answers the graph queries from an in-memory co-occurrence dataset.
/// Edits are written back to the dataset.
#[derive(Debug, Default)]
pub struct StaticGraphService {
    nodes: RwLock<HashMap<EntityId, NodeRecord>>,
    links: Vec<EdgeRecord>,
}

impl StaticGraphService {
    pub fn new(dataset: GraphPayload) -> Self {
        Self {
            nodes: RwLock::new(
                dataset
                    .nodes
                    .into_iter()
                    .map(|record| (record.id(), record))
                    .collect(),
            ),
            links: dataset.links,
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        let dataset: GraphPayload = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse dataset {}", path.display()))?;
        tracing::info!(
            "Loaded dataset with {} nodes and {} links",
            dataset.nodes.len(),
            dataset.links.len()
        );
        Ok(Self::new(dataset))
    }

    fn edit_record<F>(&self, id: EntityId, apply: F) -> Result<(), GraphError>
    where
        F: FnOnce(&mut NodeRecord),
    {
        let mut nodes = self.nodes.write();
        let record = nodes
            .get_mut(&id)
            .ok_or_else(|| GraphError::fetch(format!("Unknown entity {id}")))?;
        apply(record);
        Ok(())
    }

    fn links_within(&self, ids: &BTreeSet<EntityId>) -> impl Iterator<Item = &EdgeRecord> {
        self.links
            .iter()
            .filter(move |l| ids.contains(&l.source()) && ids.contains(&l.target()))
    }
}

/// Highest (or lowest) weighted records, at most `quota` of each category.
fn pick_per_category<'a>(
    mut ranked: Vec<(&'a NodeRecord, u64)>,
    quota: CategoryQuota,
    ascending: bool,
) -> Vec<&'a NodeRecord> {
    ranked.sort_by(|(a, wa), (b, wb)| {
        let by_weight = if ascending { wa.cmp(wb) } else { wb.cmp(wa) };
        by_weight.then(a.id().cmp(&b.id()))
    });
    let mut taken = [0u32; 4];
    let mut picked = Vec::new();
    for (record, _) in ranked {
        let slot = &mut taken[record.kind().index()];
        if *slot < quota.for_kind(record.kind()) {
            *slot += 1;
            picked.push(record);
        }
    }
    picked
}

#[async_trait]
impl GraphDataService for StaticGraphService {
    async fn fetch_full_graph(&self, filters: &GraphFilters) -> Result<GraphPayload, GraphError> {
        let nodes = self.nodes.read();
        let ranked = nodes.values().map(|n| (n, n.frequency())).collect();
        let picked = pick_per_category(ranked, filters.per_category, filters.least_frequent);
        let ids: BTreeSet<EntityId> = picked.iter().map(|n| n.id()).collect();
        let window = filters.edge_window();
        Ok(GraphPayload {
            nodes: picked.into_iter().cloned().collect(),
            links: self
                .links_within(&ids)
                .filter(|l| window.contains(&l.frequency()))
                .cloned()
                .collect(),
        })
    }

    async fn fetch_ego_network(
        &self,
        id: EntityId,
        quota: CategoryQuota,
        exclude: &[EntityId],
    ) -> Result<GraphPayload, GraphError> {
        let records = self.nodes.read();
        let Some(center) = records.get(&id) else {
            return Ok(GraphPayload::default());
        };
        let excluded: BTreeSet<EntityId> = exclude.iter().copied().collect();
        // One entry per neighbour, ranked by its strongest link.
        let mut strongest: HashMap<EntityId, (&NodeRecord, u64)> = HashMap::new();
        for link in &self.links {
            let other = if link.source() == id {
                link.target()
            } else if link.target() == id {
                link.source()
            } else {
                continue;
            };
            if other == id || excluded.contains(&other) {
                continue;
            }
            let Some(record) = records.get(&other) else {
                continue;
            };
            strongest
                .entry(other)
                .and_modify(|(_, weight)| *weight = (*weight).max(link.frequency()))
                .or_insert((record, link.frequency()));
        }
        let ranked = strongest.into_values().collect();

        let mut nodes = vec![center.clone()];
        nodes.extend(pick_per_category(ranked, quota, false).into_iter().cloned());
        let ids: BTreeSet<EntityId> = nodes.iter().map(|n| n.id()).collect();
        Ok(GraphPayload {
            links: self.links_within(&ids).cloned().collect(),
            nodes,
        })
    }

    async fn fetch_ids_by_name(&self, name: &str) -> Result<Vec<EntityId>, GraphError> {
        let mut ids: Vec<EntityId> = self
            .nodes
            .read()
            .values()
            .filter(|n| n.name() == name)
            .map(|n| n.id())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn update_entity_name(&self, id: EntityId, name: &str) -> Result<(), GraphError> {
        self.edit_record(id, |record| record.1 = name.to_string())
    }

    async fn update_entity_type(&self, id: EntityId, kind: EntityType) -> Result<(), GraphError> {
        self.edit_record(id, |record| record.3 = kind)
    }
}
