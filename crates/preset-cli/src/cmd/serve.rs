use anyhow::Context;
use preset_core::config::{Config, WarnLevel};
use preset_core::reconcile::run_loop;
use preset_server::AppState;
use std::path::Path;
use tokio::sync::watch;

pub fn run(path: &Path, port: u16) -> anyhow::Result<()> {
    let config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => tracing::error!("config: {}", w.message),
        }
    }
    if config.reconcile.has_zero_timing() {
        anyhow::bail!("invalid reconcile timings in {}", path.display());
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let state = AppState::from_config(&config, Some(path.to_path_buf()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let reconcile = tokio::spawn(run_loop(state.orchestrator.clone(), stop_rx));

        tracing::info!(
            presets = config.presets.len(),
            clients = config.clients.len(),
            "loaded {}",
            path.display()
        );

        let result = tokio::select! {
            res = preset_server::serve(state, port) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        };

        let _ = stop_tx.send(true);
        let _ = reconcile.await;
        result
    })
}
