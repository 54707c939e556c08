// File: src/config.rs
use crate::core::types::{Combination, Smoothing};
use crate::error::{Result, WpError};
use crate::lm::RecencyParams;
use crate::lmid::ModelClass;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "wordpredict";

/// Intervals of the periodic background save, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub postpone_delay_secs: u64,
    pub tick_secs: u64,
    pub pause_secs: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 10 * 60,
            max_interval_secs: 30 * 60,
            postpone_delay_secs: 10,
            tick_secs: 5,
            pause_secs: 60,
        }
    }
}

impl AutoSaveConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }

    pub fn postpone_delay(&self) -> Duration {
        Duration::from_secs(self.postpone_delay_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

/// Engine settings. Every field has a default, so a config file only needs
/// to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub system_model_dir: PathBuf,
    pub user_model_dir: PathBuf,
    /// Append every learned token section to `learned_text.txt`.
    pub log_learning: bool,
    pub default_order: usize,
    pub dynamic_smoothing: Smoothing,
    pub recency: RecencyParams,
    pub combination: Combination,
    pub autosave: AutoSaveConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_model_dir: default_dir(dirs::data_dir()),
            user_model_dir: default_dir(dirs::data_local_dir()),
            log_learning: false,
            default_order: 3,
            dynamic_smoothing: Smoothing::AbsDiscI,
            recency: RecencyParams::default(),
            combination: Combination::Linear,
            autosave: AutoSaveConfig::default(),
        }
    }
}

fn default_dir(base: Option<PathBuf>) -> PathBuf {
    match base {
        Some(mut path) => {
            path.push(APP_DIR);
            path.push("models");
            path
        }
        None => PathBuf::from("models"),
    }
}

impl EngineConfig {
    /// Config with both model directories under `root`.
    pub fn with_model_root(root: &Path) -> Self {
        Self {
            system_model_dir: root.join("system"),
            user_model_dir: root.join("user"),
            ..Self::default()
        }
    }

    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| WpError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Directory holding models of `class`; mem models have none.
    pub fn model_dir(&self, class: ModelClass) -> Option<&Path> {
        match class {
            ModelClass::System => Some(self.system_model_dir.as_path()),
            ModelClass::User => Some(self.user_model_dir.as_path()),
            ModelClass::Mem => None,
        }
    }
}
