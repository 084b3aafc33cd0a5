//! Lazily created, memoized pipelines keyed by target identity.

use crate::breaker::CircuitState;
use crate::listener::StateListener;
use crate::pipeline::{Pipeline, PipelineConfig};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// One pipeline per distinct remote target.
///
/// Identical targets always get the same pipeline; distinct targets never
/// share breaker state. Entries live until [`reset`](Self::reset).
pub struct PipelineRegistry {
    config: PipelineConfig,
    listeners: Vec<Arc<dyn StateListener>>,
    pipelines: DashMap<String, Arc<Pipeline>>,
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("config", &self.config)
            .field("targets", &self.pipelines.len())
            .finish()
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl PipelineRegistry {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            listeners: Vec::new(),
            pipelines: DashMap::new(),
        }
    }

    /// Attach a transition listener to every pipeline created afterwards.
    pub fn with_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Configuration used for new pipelines.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get or create the pipeline for `target`.
    pub fn pipeline(&self, target: &str) -> Arc<Pipeline> {
        self.pipeline_with(target, || self.config.clone())
    }

    /// Get or create the pipeline for `target`, building its configuration
    /// only on first use.
    pub fn pipeline_with<C>(&self, target: &str, config: C) -> Arc<Pipeline>
    where
        C: FnOnce() -> PipelineConfig,
    {
        if let Some(existing) = self.pipelines.get(target) {
            return Arc::clone(existing.value());
        }

        // The entry guard holds the shard lock, so racing first calls agree
        // on one pipeline.
        let entry = self.pipelines.entry(target.to_string()).or_insert_with(|| {
            debug!(target_id = %target, "Creating pipeline");
            Arc::new(Pipeline::new(target, config(), self.listeners.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Existing pipeline, without creating one.
    pub fn get(&self, target: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(target).map(|p| Arc::clone(p.value()))
    }

    /// Breaker state of every known target.
    pub fn snapshot(&self) -> BTreeMap<String, CircuitState> {
        self.pipelines
            .iter()
            .filter_map(|entry| entry.value().state().map(|s| (entry.key().clone(), s)))
            .collect()
    }

    /// Known target identities, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.pipelines.iter().map(|e| e.key().clone()).collect();
        targets.sort();
        targets
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Drop every pipeline.
    pub fn reset(&self) {
        self.pipelines.clear();
    }
}
