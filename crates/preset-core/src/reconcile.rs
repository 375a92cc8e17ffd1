//! Keeps one current verdict per preset and publishes changes.
//!
//! A reconciliation pass loads the preset, resolves its group fresh, merges
//! the optimistic overlay onto the latest client snapshot and evaluates. Only
//! one pass per preset runs at a time; passes for different presets run
//! concurrently.

use crate::aggregator;
use crate::dispatch::{StatusEvent, StatusSink};
use crate::error::{PresetError, Result};
use crate::orchestrator::Orchestrator;
use crate::overlay::OptimisticOverlay;
use crate::registry::{GroupResolver, PresetSource};
use crate::status::PresetStatus;
use crate::tracker::ClientStateTracker;
use crate::types::{ClientId, GroupId, Preset, PresetId};
use chrono::Utc;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, OwnedMutexGuard};

// ---------------------------------------------------------------------------
// PresetLocks
// ---------------------------------------------------------------------------

/// Lazily created exclusion scope per preset id.
#[derive(Debug, Default)]
pub(crate) struct PresetLocks {
    locks: Mutex<HashMap<PresetId, Arc<tokio::sync::Mutex<()>>>>,
}

impl PresetLocks {
    pub(crate) async fn acquire(&self, preset_id: &PresetId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(preset_id.clone())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    fn forget(&self, preset_id: &PresetId) {
        self.locks.lock().remove(preset_id);
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Reason to reconcile ahead of the next timer tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Client(ClientId),
    Group(GroupId),
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    presets: Arc<dyn PresetSource>,
    groups: Arc<dyn GroupResolver>,
    tracker: Arc<ClientStateTracker>,
    overlay: Arc<OptimisticOverlay>,
    locks: PresetLocks,
    verdicts: RwLock<HashMap<PresetId, Arc<PresetStatus>>>,
    sinks: RwLock<Vec<Arc<dyn StatusSink>>>,
}

impl Reconciler {
    pub fn new(
        presets: Arc<dyn PresetSource>,
        groups: Arc<dyn GroupResolver>,
        tracker: Arc<ClientStateTracker>,
        overlay: Arc<OptimisticOverlay>,
    ) -> Self {
        Self {
            presets,
            groups,
            tracker,
            overlay,
            locks: PresetLocks::default(),
            verdicts: RwLock::new(HashMap::new()),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn StatusSink>) {
        self.sinks.write().push(sink);
    }

    /// Latest verdict for `preset_id`, or `None` while it is still unknown.
    pub fn verdict(&self, preset_id: &PresetId) -> Option<Arc<PresetStatus>> {
        self.verdicts.read().get(preset_id).cloned()
    }

    /// All known verdicts, ordered by preset id.
    pub fn verdicts(&self) -> Vec<Arc<PresetStatus>> {
        let mut all: Vec<_> = self.verdicts.read().values().cloned().collect();
        all.sort_by(|a, b| a.preset_id.cmp(&b.preset_id));
        all
    }

    pub(crate) async fn lock(&self, preset_id: &PresetId) -> OwnedMutexGuard<()> {
        self.locks.acquire(preset_id).await
    }

    /// Store and publish the current verdict while the caller already holds
    /// the preset's lock.
    pub(crate) fn refresh_locked(&self, preset_id: &PresetId) -> Result<Arc<PresetStatus>> {
        let (_, status) = self.evaluate_current(preset_id)?;
        Ok(self.store(status))
    }

    /// Evaluate `preset_id` against current inputs without storing the result.
    ///
    /// A group that no longer exists evaluates as blocked; any other lookup
    /// failure is returned.
    pub fn evaluate_current(&self, preset_id: &PresetId) -> Result<(Preset, PresetStatus)> {
        let preset = self.presets.preset(preset_id)?;
        let members = match &preset.target_group_id {
            None => None,
            Some(group_id) => match self.groups.members(group_id) {
                Ok(members) => Some(members),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
        };
        let snapshot = self.overlay.merge(&self.tracker.snapshot());
        let status = aggregator::evaluate(&preset, members.as_deref(), &snapshot);
        Ok((preset, status))
    }

    /// Recompute and store the verdict for one preset.
    ///
    /// Returns `Ok(None)` when the preset no longer exists and its verdict was
    /// dropped. On any other failure the previous verdict is kept.
    pub async fn reconcile_preset(
        &self,
        preset_id: &PresetId,
    ) -> Result<Option<Arc<PresetStatus>>> {
        let _guard = self.locks.acquire(preset_id).await;
        match self.evaluate_current(preset_id) {
            Ok((_, status)) => Ok(Some(self.store(status))),
            Err(PresetError::PresetNotFound(_)) => {
                self.drop_verdict(preset_id);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    preset_id = %preset_id,
                    error = %e,
                    "reconcile failed, keeping last known verdict"
                );
                Err(e)
            }
        }
    }

    /// Reconcile `ids` concurrently and collect per-preset failures.
    pub async fn reconcile_many(&self, ids: &[PresetId]) -> Vec<(PresetId, PresetError)> {
        let passes = ids.iter().map(|id| async move {
            self.reconcile_preset(id)
                .await
                .err()
                .map(|e| (id.clone(), e))
        });
        join_all(passes).await.into_iter().flatten().collect()
    }

    /// Reconcile every preset, dropping verdicts of presets that disappeared.
    pub async fn reconcile_all(&self) -> Result<Vec<(PresetId, PresetError)>> {
        let ids = self.presets.preset_ids()?;
        let stale: Vec<PresetId> = self
            .verdicts
            .read()
            .keys()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect();
        for id in &stale {
            let _guard = self.locks.acquire(id).await;
            self.drop_verdict(id);
        }
        Ok(self.reconcile_many(&ids).await)
    }

    /// Drop the verdict for a deleted preset and publish its removal.
    pub async fn remove(&self, preset_id: &PresetId) -> bool {
        let removed = {
            let _guard = self.locks.acquire(preset_id).await;
            self.drop_verdict(preset_id)
        };
        self.locks.forget(preset_id);
        removed
    }

    fn store(&self, status: PresetStatus) -> Arc<PresetStatus> {
        let status = Arc::new(status);
        let previous = self
            .verdicts
            .write()
            .insert(status.preset_id.clone(), status.clone());
        let changed = previous.map_or(true, |p| !p.same_verdict(&status));
        if changed {
            tracing::debug!(
                preset_id = %status.preset_id,
                status = %status.overall_status,
                "verdict changed"
            );
            self.publish(StatusEvent::Updated {
                preset_id: status.preset_id.clone(),
                status: status.clone(),
            });
        }
        status
    }

    fn drop_verdict(&self, preset_id: &PresetId) -> bool {
        let existed = self.verdicts.write().remove(preset_id).is_some();
        if existed {
            tracing::info!(preset_id = %preset_id, "preset removed");
            self.publish(StatusEvent::Removed {
                preset_id: preset_id.clone(),
            });
        }
        existed
    }

    fn publish(&self, event: StatusEvent) {
        for sink in self.sinks.read().iter() {
            sink.publish(event.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Background loop
// ---------------------------------------------------------------------------

/// Drive reconciliation until `shutdown` flips to `true` or its sender drops.
///
/// Reacts to triggers as they arrive and runs a full pass on every interval
/// tick as a backstop.
pub async fn run_loop(orchestrator: Arc<Orchestrator>, mut shutdown: watch::Receiver<bool>) {
    let Some(mut triggers) = orchestrator.take_triggers() else {
        tracing::warn!("reconcile loop already running");
        return;
    };
    let config = orchestrator.config().clone();
    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = config.interval_secs,
        "reconcile loop started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(max_age) = config.client_stale() {
                    orchestrator.tracker().sweep_stale(max_age, Utc::now());
                }
                report(orchestrator.reconciler().reconcile_all().await);
            }
            trigger = triggers.recv() => {
                let Some(trigger) = trigger else { break };
                let ids = orchestrator.affected_presets(&trigger);
                tracing::debug!(?trigger, presets = ids.len(), "reconcile triggered");
                report(Ok(orchestrator.reconciler().reconcile_many(&ids).await));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("reconcile loop stopped");
}

fn report(outcome: Result<Vec<(PresetId, PresetError)>>) {
    match outcome {
        Ok(failures) if failures.is_empty() => {}
        Ok(failures) => {
            tracing::warn!(failed = failures.len(), "reconcile pass finished with failures");
        }
        Err(e) => tracing::warn!(error = %e, "could not list presets"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
