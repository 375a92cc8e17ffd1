//! Inbound facade over the tracker, reconciler and execution controller.

use crate::config::ReconcileConfig;
use crate::controller::{ExecutionController, ExecutionResult, StopPolicy, StopResult};
use crate::dispatch::{RemoteExecutor, StatusSink};
use crate::error::{PresetError, Result};
use crate::overlay::OptimisticOverlay;
use crate::reconcile::{Reconciler, Trigger};
use crate::registry::{GroupResolver, PresetSource};
use crate::status::PresetStatus;
use crate::tracker::ClientStateTracker;
use crate::types::{ClientId, ClientState, GroupId, PresetId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Triggers waiting for the loop. Beyond this they are dropped and the next
/// interval tick catches up.
const TRIGGER_QUEUE: usize = 256;

pub struct Orchestrator {
    config: ReconcileConfig,
    presets: Arc<dyn PresetSource>,
    groups: Arc<dyn GroupResolver>,
    tracker: Arc<ClientStateTracker>,
    reconciler: Arc<Reconciler>,
    controller: ExecutionController,
    triggers: mpsc::Sender<Trigger>,
    pending_triggers: Mutex<Option<mpsc::Receiver<Trigger>>>,
}

impl Orchestrator {
    pub fn new(
        config: ReconcileConfig,
        presets: Arc<dyn PresetSource>,
        groups: Arc<dyn GroupResolver>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        let tracker = Arc::new(ClientStateTracker::new());
        let overlay = Arc::new(OptimisticOverlay::new(config.optimistic_grace()));
        let reconciler = Arc::new(Reconciler::new(
            presets.clone(),
            groups.clone(),
            tracker.clone(),
            overlay.clone(),
        ));
        let controller = ExecutionController::new(
            reconciler.clone(),
            overlay,
            executor,
            config.dispatch_timeout(),
        );
        let (tx, rx) = mpsc::channel(TRIGGER_QUEUE);
        Self {
            config,
            presets,
            groups,
            tracker,
            reconciler,
            controller,
            triggers: tx,
            pending_triggers: Mutex::new(Some(rx)),
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ClientStateTracker {
        &self.tracker
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn add_sink(&self, sink: Arc<dyn StatusSink>) {
        self.reconciler.add_sink(sink);
    }

    /// Hand the trigger queue to the background loop. Only the first caller
    /// gets it.
    pub(crate) fn take_triggers(&self) -> Option<mpsc::Receiver<Trigger>> {
        self.pending_triggers.lock().take()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current verdict, evaluated on demand when none exists yet.
    pub async fn status(&self, preset_id: &PresetId) -> Result<Arc<PresetStatus>> {
        if let Some(status) = self.reconciler.verdict(preset_id) {
            return Ok(status);
        }
        self.reconciler
            .reconcile_preset(preset_id)
            .await?
            .ok_or_else(|| PresetError::PresetNotFound(preset_id.clone()))
    }

    /// Verdicts for every preset, evaluating the ones not seen yet.
    pub async fn statuses(&self) -> Result<Vec<Arc<PresetStatus>>> {
        let ids = self.presets.preset_ids()?;
        let unseen: Vec<PresetId> = ids
            .iter()
            .filter(|id| self.reconciler.verdict(id).is_none())
            .cloned()
            .collect();
        if !unseen.is_empty() {
            self.reconciler.reconcile_many(&unseen).await;
        }
        Ok(self
            .reconciler
            .verdicts()
            .into_iter()
            .filter(|s| ids.contains(&s.preset_id))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub async fn start(&self, preset_id: &PresetId) -> Result<ExecutionResult> {
        self.controller.start(preset_id).await
    }

    pub async fn stop(&self, preset_id: &PresetId, policy: StopPolicy) -> Result<StopResult> {
        self.controller.stop(preset_id, policy).await
    }

    // -----------------------------------------------------------------------
    // Change notifications
    // -----------------------------------------------------------------------

    /// Feed a client report into the tracker. Returns whether it changed
    /// anything reconciliation depends on.
    pub fn on_client_state_changed(&self, client_id: &ClientId, state: ClientState) -> bool {
        let changed = self.tracker.apply(client_id, state);
        if changed {
            self.trigger(Trigger::Client(client_id.clone()));
        }
        changed
    }

    pub fn on_group_membership_changed(&self, group_id: &GroupId) {
        self.trigger(Trigger::Group(group_id.clone()));
    }

    /// Reconcile an edited preset right away and return its new verdict.
    pub async fn on_preset_changed(&self, preset_id: &PresetId) -> Result<Arc<PresetStatus>> {
        self.reconciler
            .reconcile_preset(preset_id)
            .await?
            .ok_or_else(|| PresetError::PresetNotFound(preset_id.clone()))
    }

    pub async fn on_preset_deleted(&self, preset_id: &PresetId) {
        self.reconciler.remove(preset_id).await;
    }

    fn trigger(&self, trigger: Trigger) {
        match self.triggers.try_send(trigger) {
            Ok(()) => {}
            Err(TrySendError::Full(trigger)) => {
                tracing::debug!(?trigger, "trigger queue full, left to the next tick");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("reconcile loop gone, trigger dropped");
            }
        }
    }

    /// Presets a trigger may have affected.
    ///
    /// Lookups that fail keep the preset in the result so the reconcile pass
    /// reports the failure.
    pub fn affected_presets(&self, trigger: &Trigger) -> Vec<PresetId> {
        let ids = match self.presets.preset_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "could not list presets");
                return Vec::new();
            }
        };
        match trigger {
            Trigger::Group(group_id) => ids
                .into_iter()
                .filter(|id| match self.presets.preset(id) {
                    Ok(p) => p.target_group_id.as_ref() == Some(group_id),
                    Err(_) => true,
                })
                .collect(),
            Trigger::Client(client_id) => ids
                .into_iter()
                .filter(|id| {
                    let Ok(preset) = self.presets.preset(id) else {
                        return true;
                    };
                    let Some(group_id) = &preset.target_group_id else {
                        return false;
                    };
                    match self.groups.members(group_id) {
                        Ok(members) => members.contains(client_id),
                        Err(e) => !e.is_not_found(),
                    }
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
