use crate::executor::HttpExecutor;
use preset_core::config::Config;
use preset_core::registry::Registry;
use preset_core::{Orchestrator, RemoteExecutor, StatusEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<Registry>,
    pub event_tx: broadcast::Sender<StatusEvent>,
}

impl AppState {
    /// Wire an orchestrator over `registry`, publishing verdict changes to
    /// the SSE channel.
    pub fn new(config: &Config, registry: Arc<Registry>, executor: Arc<dyn RemoteExecutor>) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            config.reconcile.clone(),
            registry.clone(),
            registry.clone(),
            executor,
        ));
        let (tx, _) = broadcast::channel(256);
        orchestrator.add_sink(Arc::new(tx.clone()));
        Self {
            orchestrator,
            registry,
            event_tx: tx,
        }
    }

    /// State backed by the HTTP executor. Edits are written back to `path`
    /// when one is given.
    pub fn from_config(config: &Config, path: Option<PathBuf>) -> Self {
        let mut registry = Registry::from_config(config);
        if let Some(path) = path {
            registry = registry.persist_to(path);
        }
        let registry = Arc::new(registry);
        let executor = Arc::new(HttpExecutor::new(registry.clone(), config.agent.clone()));
        Self::new(config, registry, executor)
    }
}
