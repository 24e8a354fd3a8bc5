//! Build configuration loaded from JSON and overridden from the command line

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use weave_model::{BindPath, Localization};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid configuration in {0}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_paths: Vec<BindPath>,
    /// Registered before the program's own variables, in order
    pub bind_variables: IndexMap<String, String>,
    /// Values for `bind.*` references finished by the optimize stage
    pub delayed_values: IndexMap<String, String>,
    pub cultures: Vec<String>,
    /// Localization files (JSON) supplied outside the program
    pub localizations: Vec<PathBuf>,
    pub allow_unresolved_variables: bool,
    pub referenced_components: Vec<String>,
    pub intermediate_folder: Option<PathBuf>,
    pub tracking_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub library_id: Option<String>,
    pub bind_files: bool,
    pub max_parallel_transfers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_paths: Vec::new(),
            bind_variables: IndexMap::new(),
            delayed_values: IndexMap::new(),
            cultures: Vec::new(),
            localizations: Vec::new(),
            allow_unresolved_variables: false,
            referenced_components: Vec::new(),
            intermediate_folder: None,
            tracking_file: None,
            output: None,
            library_id: None,
            bind_files: false,
            max_parallel_transfers: default_max_parallel(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.to_path_buf(), e))
    }

    /// Read every configured localization file
    pub fn load_localizations(&self) -> Result<Vec<Localization>, ConfigError> {
        self.localizations
            .iter()
            .map(|path| {
                let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.clone(), e))?;
                serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.clone(), e))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_model::BindStage;

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weave.json");
        std::fs::write(
            &path,
            r#"{
                "bind_paths": [{ "name": "media", "path": "/media" }, { "path": "/src", "stage": "Target" }],
                "bind_variables": { "B": "2", "A": "1" },
                "cultures": ["en-US"]
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.bind_paths[0], BindPath::named("media", "/media"));
        assert_eq!(config.bind_paths[1].stage, BindStage::Target);
        assert_eq!(config.bind_variables.keys().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(config.max_parallel_transfers, 4);
        assert!(!config.bind_files);
    }

    #[test]
    fn test_malformed_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weave.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Json(..))));
        assert!(matches!(Config::load(&dir.path().join("missing.json")), Err(ConfigError::Io(..))));
    }
}
