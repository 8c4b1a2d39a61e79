//! Waymark configuration
//!
//! Layered JSON config: global (`~/.config/waymark/config.json`) is loaded
//! first, then the project file (`.waymark/config.json`) overrides it.
//! Everything has a working default; a missing config is not an error.

use crate::storage::JsonStore;
use crate::types::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const CONFIG_FILE: &str = "config.json";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaymarkConfig {
    /// Persistence strategy for new sessions
    pub strategy: StrategyKind,

    /// Author recorded on checkpoint commits
    pub author: String,

    /// Maximum commits walked when answering shadow-branch reachability
    pub ancestry_depth_limit: usize,

    /// Commits scanned for rewind points when no merge-base exists
    pub rewind_scan_limit: usize,

    /// Seconds after which a review worker lock counts as abandoned
    pub review_lock_stale_secs: u64,

    /// Maximum uncached sessions processed per insights run
    pub insights_batch_limit: usize,

    /// Enable the detached background review worker
    pub review_enabled: bool,
}

impl Default for WaymarkConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::ManualCommit,
            author: "waymark".to_string(),
            ancestry_depth_limit: 500,
            rewind_scan_limit: 50,
            review_lock_stale_secs: 15 * 60,
            insights_batch_limit: 50,
            review_enabled: true,
        }
    }
}

impl WaymarkConfig {
    /// Load config for a repository: global first, project overrides
    pub fn load(repo_root: &Path) -> Self {
        let mut config = WaymarkConfig::default();

        if let Ok(global) = JsonStore::global() {
            if let Ok(Some(loaded)) = global.load_optional::<WaymarkConfig>(CONFIG_FILE) {
                debug!("Loaded global config from {:?}", global.base_dir());
                config = loaded;
            }
        }

        let project = JsonStore::project(repo_root);
        if let Ok(Some(loaded)) = project.load_optional::<WaymarkConfig>(CONFIG_FILE) {
            debug!("Loaded project config from {:?}", project.base_dir());
            config = loaded;
        }

        config
    }

    /// Persist as the project config
    pub fn save(&self, repo_root: &Path) -> crate::Result<()> {
        JsonStore::project(repo_root).save(CONFIG_FILE, self)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}
