use crate::service::GraphFilters;
use anyhow::{Context, Result};
use newsgraph_core::CategoryQuota;
use newsgraph_graph::HighlightRemoval;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub data_service: DataServiceSettings,
    pub full_graph: GraphFilters,
    /// Neighbours per category fetched by an explicit expand.
    pub expand_quota: CategoryQuota,
    /// Neighbours per category fetched by "load more".
    pub load_more_quota: CategoryQuota,
    pub highlight_removal: HighlightRemoval,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            data_service: DataServiceSettings::default(),
            full_graph: GraphFilters::default(),
            expand_quota: CategoryQuota::uniform(2),
            load_more_quota: CategoryQuota::uniform(1),
            highlight_removal: HighlightRemoval::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataServiceSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for DataServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl GraphSettings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!("Loading settings from {:?}", path);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Like `load`, but falls back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("Settings file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = GraphSettings::default();
        assert_eq!(settings.expand_quota, CategoryQuota([2, 2, 2, 2]));
        assert_eq!(settings.load_more_quota, CategoryQuota([1, 1, 1, 1]));
        assert_eq!(settings.full_graph.edge_window(), 1500..=81337);
        assert_eq!(settings.highlight_removal, HighlightRemoval::RetainShared);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: GraphSettings = serde_json::from_str(
            r#"{"expand_quota": [3, 0, 3, 0], "highlight_removal": "unconditional"}"#,
        )
        .unwrap();
        assert_eq!(settings.expand_quota, CategoryQuota([3, 0, 3, 0]));
        assert_eq!(settings.highlight_removal, HighlightRemoval::Unconditional);
        assert_eq!(settings.full_graph, GraphFilters::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = GraphSettings::default();
        settings.data_service.base_url = "http://news.example:8080".to_string();
        settings.full_graph.least_frequent = true;
        settings.save(&path).unwrap();

        assert_eq!(GraphSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(GraphSettings::load(&path).is_err());
        assert_eq!(
            GraphSettings::load_or_default(&path).unwrap(),
            GraphSettings::default()
        );
    }
}
