//! Session insights extraction
//!
//! Background enrichment over committed history for the explain/insights
//! consumers. First run against a large history is bounded on both axes: a
//! worker pool of half the available cores (minimum one) and at most a
//! configured number of uncached sessions per run. Extraction failures
//! degrade completeness, never abort.

use crate::git::Repository;
use crate::store::{CheckpointStore, StoreError};

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use waymark_foundation::{JsonStore, SessionId, SessionRecord, TokenUsage, WaymarkConfig};

/// Aggregated per-session numbers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInsight {
    pub session_id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub checkpoint_count: usize,

    /// Distinct files touched across the session
    #[serde(default)]
    pub files_touched: usize,

    #[serde(default)]
    pub token_usage: TokenUsage,
}

/// Extracts and caches session insights
pub struct InsightsExtractor {
    store: Arc<CheckpointStore>,
    cache: JsonStore,
    batch_limit: usize,
}

impl InsightsExtractor {
    pub fn new(store: CheckpointStore, config: &WaymarkConfig) -> Self {
        let cache = JsonStore::project(store.repo().root()).subdir("cache/insights");
        Self {
            store: Arc::new(store),
            cache,
            batch_limit: config.insights_batch_limit,
        }
    }

    fn cache_file(session_id: &SessionId) -> String {
        format!("{}.json", session_id)
    }

    /// Insights for every known session, cache-first
    ///
    /// Uncached sessions beyond the batch limit are deferred to the next
    /// run (and logged), bounding memory and latency on first contact with
    /// a large history.
    pub fn collect(&self) -> Result<Vec<SessionInsight>, StoreError> {
        let sessions = self.store.list_sessions()?;

        let mut insights: Vec<SessionInsight> = Vec::with_capacity(sessions.len());
        let mut uncached: Vec<SessionRecord> = Vec::new();
        for record in sessions {
            match self
                .cache
                .load_optional::<SessionInsight>(&Self::cache_file(&record.id))
            {
                Ok(Some(cached)) => insights.push(cached),
                Ok(None) => uncached.push(record),
                Err(e) => {
                    warn!("Unreadable insight cache for {}; recomputing: {}", record.id, e);
                    uncached.push(record);
                }
            }
        }

        if uncached.len() > self.batch_limit {
            debug!(
                "Deferring {} uncached sessions past the batch limit of {}",
                uncached.len() - self.batch_limit,
                self.batch_limit
            );
            uncached.truncate(self.batch_limit);
        }

        insights.extend(self.extract_batch(&uncached));
        insights.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        Ok(insights)
    }

    /// Extract a batch on a bounded pool, merging into a shared map
    fn extract_batch(&self, records: &[SessionRecord]) -> Vec<SessionInsight> {
        if records.is_empty() {
            return Vec::new();
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get() / 2)
            .unwrap_or(1)
            .max(1);
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Insights pool unavailable; skipping extraction: {}", e);
                return Vec::new();
            }
        };

        let results: Mutex<HashMap<String, SessionInsight>> = Mutex::new(HashMap::new());
        pool.install(|| {
            records.par_iter().for_each(|record| {
                match self.extract(record) {
                    Ok(insight) => {
                        if let Err(e) = self
                            .cache
                            .save(&Self::cache_file(&record.id), &insight)
                        {
                            warn!("Failed to cache insight for {}: {}", record.id, e);
                        }
                        results.lock().insert(insight.session_id.clone(), insight);
                    }
                    Err(e) => warn!("Insight extraction for {} failed: {}", record.id, e),
                }
            });
        });

        results.into_inner().into_values().collect()
    }

    /// Aggregate one session's committed checkpoints
    fn extract(&self, record: &SessionRecord) -> Result<SessionInsight, StoreError> {
        let mut insight = SessionInsight {
            session_id: record.id.to_string(),
            description: record.description.clone(),
            ..Default::default()
        };

        let mut files: HashSet<String> = HashSet::new();
        for id in &record.checkpoints {
            let cp = match self.store.read_committed(id) {
                Ok(cp) => cp,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            insight.checkpoint_count += 1;
            insight.token_usage.add(&cp.token_usage);
            files.extend(cp.files_touched.iter().cloned());
        }
        insight.files_touched = files.len();
        Ok(insight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_serde_defaults() {
        let insight: SessionInsight =
            serde_json::from_str(r#"{"session_id": "20260101-000000-aaaaaa"}"#).unwrap();
        assert_eq!(insight.checkpoint_count, 0);
        assert!(insight.token_usage.is_empty());
    }
}
