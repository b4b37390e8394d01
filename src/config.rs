//! Configuration Management
//!
//! Persistent settings for gcpbatch, stored as JSON under the user config
//! directory. Every field is optional on disk.

use crate::requests::{PollSettings, DEFAULT_MAX_BATCH_SIZE};
use crate::resource::Catalog;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default project for requests that do not name one
    #[serde(default)]
    pub project_id: Option<String>,
    /// Batch endpoint override (e.g. a private service connect address)
    #[serde(default)]
    pub batch_url: Option<String>,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default)]
    pub poll: PollSettings,
    /// Narrate completed operations
    #[serde(default)]
    pub log_result: bool,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            batch_url: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            poll: PollSettings::default(),
            log_result: false,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcpbatch").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A missing or unreadable file yields the
    /// defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective project (CLI > config > gcloud default)
    pub fn effective_project(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.project_id.clone())
            .or_else(crate::gcp::auth::get_default_project)
            .filter(|p| !p.is_empty())
    }

    /// Get effective batch endpoint (CLI > config > catalog)
    pub fn effective_batch_url(
        &self,
        cli: Option<&str>,
        catalog: &Catalog,
        api: &str,
    ) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.batch_url.clone())
            .or_else(|| catalog.api(api).map(|def| def.batch_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let config: Config = serde_json::from_str(r#"{"project_id": "p1"}"#).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("p1"));
        assert_eq!(config.max_batch_size, DEFAULT_MAX_BATCH_SIZE);
        assert!(config.poll.use_wait);
        assert!(!config.log_result);
    }

    #[test]
    fn test_partial_poll_settings() {
        let config: Config =
            serde_json::from_str(r#"{"poll": {"max_interval_ms": 9000}}"#).unwrap();
        assert_eq!(config.poll.max_interval_ms, 9000);
        assert_eq!(
            config.poll.initial_interval_ms,
            PollSettings::default().initial_interval_ms
        );
    }

    #[test]
    fn test_cli_wins() {
        let config = Config {
            project_id: Some("from-config".into()),
            ..Config::default()
        };
        assert_eq!(
            config.effective_project(Some("from-cli")).as_deref(),
            Some("from-cli")
        );
        assert_eq!(
            config.effective_project(None).as_deref(),
            Some("from-config")
        );
    }

    #[test]
    fn test_batch_url_falls_back_to_catalog() {
        let config = Config::default();
        let url = config
            .effective_batch_url(None, Catalog::builtin(), "compute")
            .unwrap();
        assert_eq!(url, "https://compute.googleapis.com/batch/compute/v1");

        let config = Config {
            batch_url: Some("http://localhost:9000/batch".into()),
            ..Config::default()
        };
        assert_eq!(
            config
                .effective_batch_url(None, Catalog::builtin(), "compute")
                .as_deref(),
            Some("http://localhost:9000/batch")
        );
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = std::env::temp_dir().join(format!("gcpbatch-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let config = Config {
            project_id: Some("saved".into()),
            log_result: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.project_id.as_deref(), Some("saved"));
        assert!(loaded.log_result);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = std::env::temp_dir().join(format!("gcpbatch-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let loaded = Config::load_from(&path);
        assert!(loaded.project_id.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
