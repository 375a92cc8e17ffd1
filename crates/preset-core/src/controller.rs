//! Start and stop a preset across its target group.
//!
//! Planning happens under the preset's exclusion scope against the snapshot
//! merged with the optimistic overlay, so a repeated start sees the clients it
//! just dispatched to as already running. Dispatch itself runs outside the
//! scope, concurrently, with a per-call timeout.

use crate::dispatch::{DispatchResult, RemoteExecutor};
use crate::error::{PresetError, Result};
use crate::overlay::{Expectation, OptimisticOverlay};
use crate::reconcile::Reconciler;
use crate::status::{ClientCondition, OverallStatus, PresetStatus};
use crate::types::{ClientId, PresetId};
use futures::future::{join_all, BoxFuture};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched,
    AlreadyRunning,
    SkippedOffline,
    SkippedMissingCommand,
    Failed { reason: String },
    TimedOut { timeout_ms: u64 },
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Failed { .. } | DispatchOutcome::TimedOut { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOutcome {
    pub client_id: ClientId,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    /// Clients a command was sent to.
    pub attempted: usize,
    /// Clients now running the preset: successful dispatches plus those
    /// already running it.
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub online: usize,
    pub offline: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub preset_id: PresetId,
    pub clients: Vec<ClientOutcome>,
    pub summary: ExecutionSummary,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopResult {
    pub preset_id: PresetId,
    pub clients: Vec<ClientOutcome>,
    pub stopped: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
}

/// Clients whose dispatch failed or timed out.
fn failed_clients(clients: &[ClientOutcome]) -> Vec<ClientId> {
    clients
        .iter()
        .filter(|c| c.outcome.is_failure())
        .map(|c| c.client_id.clone())
        .collect()
}

/// Dispatch failures as errors: one `PartialDispatchFailure` followed by a
/// `DispatchTimeout` per client that timed out.
fn dispatch_failures(clients: &[ClientOutcome]) -> Vec<PresetError> {
    let failed = failed_clients(clients);
    if failed.is_empty() {
        return Vec::new();
    }
    let mut errors = vec![PresetError::PartialDispatchFailure { failed }];
    for c in clients {
        if let DispatchOutcome::TimedOut { timeout_ms } = c.outcome {
            errors.push(PresetError::DispatchTimeout {
                client_id: c.client_id.clone(),
                timeout_ms,
            });
        }
    }
    errors
}

impl ExecutionResult {
    pub fn partial_failure(&self) -> Option<PresetError> {
        let failed = failed_clients(&self.clients);
        (!failed.is_empty()).then_some(PresetError::PartialDispatchFailure { failed })
    }

    pub fn failures(&self) -> Vec<PresetError> {
        dispatch_failures(&self.clients)
    }
}

impl StopResult {
    fn empty(preset_id: PresetId) -> Self {
        Self {
            preset_id,
            clients: Vec::new(),
            stopped: 0,
            failed: 0,
            warnings: Vec::new(),
        }
    }

    pub fn partial_failure(&self) -> Option<PresetError> {
        let failed = failed_clients(&self.clients);
        (!failed.is_empty()).then_some(PresetError::PartialDispatchFailure { failed })
    }

    pub fn failures(&self) -> Vec<PresetError> {
        dispatch_failures(&self.clients)
    }
}

/// What `stop` does when nothing is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Succeed with an empty result.
    #[default]
    Idempotent,
    /// Fail with `NoActiveExecution`.
    RequireActive,
}

// ---------------------------------------------------------------------------
// ExecutionController
// ---------------------------------------------------------------------------

struct PlannedCall {
    client_id: ClientId,
    command: Option<String>,
    seq: u64,
}

pub struct ExecutionController {
    reconciler: Arc<Reconciler>,
    overlay: Arc<OptimisticOverlay>,
    executor: Arc<dyn RemoteExecutor>,
    dispatch_timeout: Duration,
}

impl ExecutionController {
    pub fn new(
        reconciler: Arc<Reconciler>,
        overlay: Arc<OptimisticOverlay>,
        executor: Arc<dyn RemoteExecutor>,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            reconciler,
            overlay,
            executor,
            dispatch_timeout,
        }
    }

    pub async fn start(&self, preset_id: &PresetId) -> Result<ExecutionResult> {
        let (status, mut clients, calls) = {
            let _guard = self.reconciler.lock(preset_id).await;
            let (preset, status) = self.reconciler.evaluate_current(preset_id)?;
            if status.overall_status == OverallStatus::Blocked {
                return Err(PresetError::NotRunnable {
                    preset_id: preset_id.clone(),
                    reason: status.message,
                });
            }

            let mut clients = Vec::new();
            let mut calls = Vec::new();
            for member in &status.clients {
                let skipped = match member.condition {
                    ClientCondition::MissingCommand => Some(DispatchOutcome::SkippedMissingCommand),
                    ClientCondition::Offline => Some(DispatchOutcome::SkippedOffline),
                    ClientCondition::RunningThis => Some(DispatchOutcome::AlreadyRunning),
                    ClientCondition::Idle | ClientCondition::RunningOther => None,
                };
                let command = preset.command_for(&member.client_id);
                match (skipped, command) {
                    (Some(outcome), _) => clients.push(ClientOutcome {
                        client_id: member.client_id.clone(),
                        outcome,
                    }),
                    (None, None) => clients.push(ClientOutcome {
                        client_id: member.client_id.clone(),
                        outcome: DispatchOutcome::SkippedMissingCommand,
                    }),
                    (None, Some(command)) => {
                        let seq = self.overlay.expect(
                            &member.client_id,
                            Expectation::Running(preset_id.clone()),
                        );
                        calls.push(PlannedCall {
                            client_id: member.client_id.clone(),
                            command: Some(command.to_string()),
                            seq,
                        });
                    }
                }
            }
            self.show_expected(preset_id, &calls);
            (status, clients, calls)
        };

        tracing::info!(
            preset_id = %preset_id,
            dispatching = calls.len(),
            "starting preset"
        );
        let attempted = calls.len();
        clients.extend(self.fan_out(preset_id, calls, "start").await);
        order_like(&status, &mut clients);

        let summary = summarize(&status, &clients, attempted);
        let warnings = start_warnings(&clients);
        self.settle(preset_id).await;

        Ok(ExecutionResult {
            preset_id: preset_id.clone(),
            clients,
            summary,
            warnings,
        })
    }

    pub async fn stop(&self, preset_id: &PresetId, policy: StopPolicy) -> Result<StopResult> {
        let (status, calls) = {
            let _guard = self.reconciler.lock(preset_id).await;
            let (_, status) = self.reconciler.evaluate_current(preset_id)?;
            let running: Vec<ClientId> = status
                .clients_in(ClientCondition::RunningThis)
                .cloned()
                .collect();
            if running.is_empty() {
                return match policy {
                    StopPolicy::Idempotent => Ok(StopResult::empty(preset_id.clone())),
                    StopPolicy::RequireActive => {
                        Err(PresetError::NoActiveExecution(preset_id.clone()))
                    }
                };
            }
            let calls: Vec<PlannedCall> = running
                .into_iter()
                .map(|client_id| {
                    let seq = self
                        .overlay
                        .expect(&client_id, Expectation::Stopped(preset_id.clone()));
                    PlannedCall {
                        client_id,
                        command: None,
                        seq,
                    }
                })
                .collect();
            self.show_expected(preset_id, &calls);
            (status, calls)
        };

        tracing::info!(
            preset_id = %preset_id,
            dispatching = calls.len(),
            "stopping preset"
        );
        let mut clients = self.fan_out(preset_id, calls, "stop").await;
        order_like(&status, &mut clients);

        let failed = clients.iter().filter(|c| c.outcome.is_failure()).count();
        let warnings = failure_warnings(&clients);
        self.settle(preset_id).await;

        Ok(StopResult {
            preset_id: preset_id.clone(),
            stopped: clients.len() - failed,
            failed,
            clients,
            warnings,
        })
    }

    async fn fan_out(
        &self,
        preset_id: &PresetId,
        calls: Vec<PlannedCall>,
        action: &'static str,
    ) -> Vec<ClientOutcome> {
        let timeout_ms = u64::try_from(self.dispatch_timeout.as_millis()).unwrap_or(u64::MAX);
        let pending = calls.iter().map(|call| async move {
            let request: BoxFuture<'_, DispatchResult> = match &call.command {
                Some(command) => self.executor.dispatch_start(&call.client_id, command),
                None => self.executor.dispatch_stop(&call.client_id),
            };
            let outcome = match tokio::time::timeout(self.dispatch_timeout, request).await {
                Ok(Ok(())) => DispatchOutcome::Dispatched,
                Ok(Err(e)) => {
                    tracing::warn!(
                        preset_id = %preset_id,
                        client_id = %call.client_id,
                        error = %e,
                        "{action} dispatch failed"
                    );
                    DispatchOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        preset_id = %preset_id,
                        client_id = %call.client_id,
                        timeout_ms,
                        "{action} dispatch timed out"
                    );
                    DispatchOutcome::TimedOut { timeout_ms }
                }
            };
            if outcome.is_failure() {
                self.overlay.retract(&call.client_id, call.seq);
            }
            ClientOutcome {
                client_id: call.client_id.clone(),
                outcome,
            }
        });
        join_all(pending).await
    }

    /// Publish the verdict with the new hints applied before any dispatch
    /// completes.
    fn show_expected(&self, preset_id: &PresetId, calls: &[PlannedCall]) {
        if calls.is_empty() {
            return;
        }
        if let Err(e) = self.reconciler.refresh_locked(preset_id) {
            tracing::warn!(preset_id = %preset_id, error = %e, "could not publish expected state");
        }
    }

    async fn settle(&self, preset_id: &PresetId) {
        // Failure is already logged by the reconciler.
        let _ = self.reconciler.reconcile_preset(preset_id).await;
    }
}

/// Sort outcomes into group member order.
fn order_like(status: &PresetStatus, clients: &mut [ClientOutcome]) {
    let position = |id: &ClientId| {
        status
            .clients
            .iter()
            .position(|c| &c.client_id == id)
            .unwrap_or(usize::MAX)
    };
    clients.sort_by_key(|c| position(&c.client_id));
}

fn summarize(status: &PresetStatus, clients: &[ClientOutcome], attempted: usize) -> ExecutionSummary {
    let mut summary = ExecutionSummary {
        total: status.summary.total,
        attempted,
        online: status.summary.online,
        offline: status.summary.offline,
        ..ExecutionSummary::default()
    };
    for c in clients {
        match c.outcome {
            DispatchOutcome::Dispatched | DispatchOutcome::AlreadyRunning => summary.executed += 1,
            DispatchOutcome::SkippedOffline | DispatchOutcome::SkippedMissingCommand => {
                summary.skipped += 1
            }
            DispatchOutcome::Failed { .. } | DispatchOutcome::TimedOut { .. } => {
                summary.failed += 1
            }
        }
    }
    summary
}

fn start_warnings(clients: &[ClientOutcome]) -> Vec<String> {
    let listed = |outcome: &DispatchOutcome| -> Vec<&str> {
        clients
            .iter()
            .filter(|c| &c.outcome == outcome)
            .map(|c| c.client_id.as_str())
            .collect()
    };
    let mut warnings = Vec::new();
    let offline = listed(&DispatchOutcome::SkippedOffline);
    if !offline.is_empty() {
        warnings.push(format!("offline, not started: {}", offline.join(", ")));
    }
    let missing = listed(&DispatchOutcome::SkippedMissingCommand);
    if !missing.is_empty() {
        warnings.push(format!("no launch command: {}", missing.join(", ")));
    }
    warnings.extend(failure_warnings(clients));
    warnings
}

fn failure_warnings(clients: &[ClientOutcome]) -> Vec<String> {
    clients
        .iter()
        .filter_map(|c| match &c.outcome {
            DispatchOutcome::Failed { reason } => Some(format!("{}: {reason}", c.client_id)),
            DispatchOutcome::TimedOut { timeout_ms } => Some(format!(
                "{}: no response within {timeout_ms}ms",
                c.client_id
            )),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::registry::Registry;
    use crate::status::ControlAction;
    use crate::tracker::ClientStateTracker;
    use crate::types::{ClientState, Group, GroupId, Preset};
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Start(ClientId, String),
        Stop(ClientId),
    }

    /// Records every call. Listed clients fail or hang.
    #[derive(Default)]
    pub(crate) struct FakeExecutor {
        pub(crate) calls: Mutex<Vec<Call>>,
        pub(crate) failing: Mutex<HashSet<ClientId>>,
        pub(crate) hanging: Mutex<HashSet<ClientId>>,
    }

    impl FakeExecutor {
        pub(crate) fn starts(&self) -> Vec<ClientId> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    Call::Start(id, _) => Some(id.clone()),
                    Call::Stop(_) => None,
                })
                .collect()
        }

        pub(crate) fn stops(&self) -> Vec<ClientId> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    Call::Stop(id) => Some(id.clone()),
                    Call::Start(..) => None,
                })
                .collect()
        }

        fn respond(&self, client_id: &ClientId, call: Call) -> BoxFuture<'static, DispatchResult> {
            self.calls.lock().push(call);
            let client_id = client_id.clone();
            if self.hanging.lock().contains(&client_id) {
                return futures::future::pending().boxed();
            }
            let failing = self.failing.lock().contains(&client_id);
            async move {
                if failing {
                    Err(DispatchError::Unreachable(client_id, "connection refused".into()))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    impl RemoteExecutor for FakeExecutor {
        fn dispatch_start<'a>(
            &'a self,
            client_id: &'a ClientId,
            command: &'a str,
        ) -> BoxFuture<'a, DispatchResult> {
            self.respond(client_id, Call::Start(client_id.clone(), command.to_string()))
        }

        fn dispatch_stop<'a>(&'a self, client_id: &'a ClientId) -> BoxFuture<'a, DispatchResult> {
            self.respond(client_id, Call::Stop(client_id.clone()))
        }
    }

    struct Fixture {
        tracker: Arc<ClientStateTracker>,
        overlay: Arc<OptimisticOverlay>,
        executor: Arc<FakeExecutor>,
        reconciler: Arc<Reconciler>,
        controller: ExecutionController,
    }

    fn fixture(states: &[(&str, ClientState)]) -> Fixture {
        let registry = Arc::new(Registry::new());
        let members: Vec<ClientId> = ["c1", "c2", "c3"].iter().map(|c| ClientId::from(*c)).collect();
        registry
            .upsert_group(Group {
                id: GroupId::from("wall"),
                name: "Wall".into(),
                members,
            })
            .unwrap();
        registry
            .save_preset(
                Preset::new("p1", "Main")
                    .with_group("wall")
                    .with_command("c1", "show.exe -dc_node=Node_0")
                    .with_command("c2", "show.exe -dc_node=Node_1")
                    .with_command("c3", "show.exe -dc_node=Node_2"),
            )
            .unwrap();

        let tracker = Arc::new(ClientStateTracker::new());
        for (id, state) in states {
            tracker.apply(&ClientId::from(*id), state.clone());
        }
        let overlay = Arc::new(OptimisticOverlay::new(Duration::from_secs(30)));
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            registry,
            tracker.clone(),
            overlay.clone(),
        ));
        let executor = Arc::new(FakeExecutor::default());
        let controller = ExecutionController::new(
            reconciler.clone(),
            overlay.clone(),
            executor.clone(),
            Duration::from_millis(500),
        );
        Fixture {
            tracker,
            overlay,
            executor,
            reconciler,
            controller,
        }
    }

    fn p1() -> PresetId {
        PresetId::from("p1")
    }

    fn outcomes(result: &[ClientOutcome]) -> HashMap<&str, DispatchOutcome> {
        result
            .iter()
            .map(|c| (c.client_id.as_str(), c.outcome.clone()))
            .collect()
    }

    #[tokio::test]
    async fn start_skips_offline_and_reports_it() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::offline()),
        ]);
        let result = f.controller.start(&p1()).await.unwrap();

        assert_eq!(
            f.executor.starts(),
            vec![ClientId::from("c1"), ClientId::from("c2")]
        );
        let by_client = outcomes(&result.clients);
        assert_eq!(by_client["c3"], DispatchOutcome::SkippedOffline);
        assert_eq!(result.summary.executed, 2);
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(result.summary.offline, 1);
        assert!(result.warnings.iter().any(|w| w.contains("c3")));
        assert!(result.partial_failure().is_none());
    }

    #[tokio::test]
    async fn start_sends_each_client_its_own_command() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.controller.start(&p1()).await.unwrap();
        let calls = f.executor.calls.lock();
        assert!(calls.contains(&Call::Start(
            ClientId::from("c2"),
            "show.exe -dc_node=Node_1".into()
        )));
    }

    #[tokio::test]
    async fn repeated_start_dispatches_nothing_new() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.controller.start(&p1()).await.unwrap();
        assert_eq!(f.executor.starts().len(), 3);

        let second = f.controller.start(&p1()).await.unwrap();
        assert_eq!(f.executor.starts().len(), 3);
        assert_eq!(second.summary.attempted, 0);
        assert!(second
            .clients
            .iter()
            .all(|c| c.outcome == DispatchOutcome::AlreadyRunning));
    }

    #[tokio::test]
    async fn start_takes_over_client_running_another_preset() {
        let f = fixture(&[
            ("c1", ClientState::running(PresetId::from("other"))),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.controller.start(&p1()).await.unwrap();
        assert_eq!(f.executor.starts().len(), 3);
    }

    #[tokio::test]
    async fn failed_dispatch_is_reported_and_hint_retracted() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.executor.failing.lock().insert(ClientId::from("c3"));

        let result = f.controller.start(&p1()).await.unwrap();
        assert_eq!(result.summary.failed, 1);
        assert_eq!(result.summary.executed, 2);
        match result.partial_failure() {
            Some(PresetError::PartialDispatchFailure { failed }) => {
                assert_eq!(failed, vec![ClientId::from("c3")]);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert!(f.overlay.expectation(&ClientId::from("c3")).is_none());
        assert!(f.overlay.expectation(&ClientId::from("c1")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_client_times_out() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.executor.hanging.lock().insert(ClientId::from("c2"));

        let result = f.controller.start(&p1()).await.unwrap();
        let by_client = outcomes(&result.clients);
        assert_eq!(by_client["c2"], DispatchOutcome::TimedOut { timeout_ms: 500 });
        assert_eq!(by_client["c1"], DispatchOutcome::Dispatched);

        let failures = result.failures();
        assert!(matches!(
            failures.as_slice(),
            [
                PresetError::PartialDispatchFailure { .. },
                PresetError::DispatchTimeout { timeout_ms: 500, .. }
            ]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expected_state_is_published_while_a_dispatch_hangs() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.executor.hanging.lock().insert(ClientId::from("c2"));

        let id = p1();
        let peek = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            f.reconciler.verdict(&id)
        };
        let (result, during) = tokio::join!(f.controller.start(&id), peek);
        result.unwrap();

        let during = during.expect("verdict published before dispatch finished");
        assert_eq!(during.overall_status, OverallStatus::Running);
        assert_eq!(during.control, ControlAction::Stop);
        assert_eq!(during.summary.executing, 3);

        let after = f.reconciler.verdict(&p1()).unwrap();
        assert_eq!(after.overall_status, OverallStatus::Degraded);
        assert_eq!(after.summary.executing, 2);
    }

    #[tokio::test]
    async fn start_on_blocked_preset_is_rejected() {
        let f = fixture(&[("c1", ClientState::idle()), ("c2", ClientState::idle())]);
        let registry = Registry::new();
        registry
            .upsert_group(Group {
                id: GroupId::from("wall"),
                name: "Wall".into(),
                members: vec![ClientId::from("c1")],
            })
            .unwrap();
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(UnconfiguredPreset),
            Arc::new(registry),
            f.tracker.clone(),
            f.overlay.clone(),
        ));
        let controller = ExecutionController::new(
            reconciler,
            f.overlay.clone(),
            f.executor.clone(),
            Duration::from_millis(500),
        );

        let err = controller.start(&p1()).await.unwrap_err();
        assert!(matches!(err, PresetError::NotRunnable { .. }));
        assert!(f.executor.calls.lock().is_empty());
    }

    /// A preset saved before its group gained a member it has no command for.
    struct UnconfiguredPreset;

    impl crate::registry::PresetSource for UnconfiguredPreset {
        fn preset(&self, id: &PresetId) -> Result<Preset> {
            Ok(Preset::new(id.clone(), "Main").with_group("wall"))
        }

        fn preset_ids(&self) -> Result<Vec<PresetId>> {
            Ok(vec![p1()])
        }
    }

    #[tokio::test]
    async fn unknown_preset_is_not_found() {
        let f = fixture(&[]);
        let err = f.controller.start(&PresetId::from("nope")).await.unwrap_err();
        assert!(matches!(err, PresetError::PresetNotFound(_)));
    }

    #[tokio::test]
    async fn stop_partial_execution() {
        let f = fixture(&[
            ("c1", ClientState::running(p1())),
            ("c2", ClientState::idle()),
            ("c3", ClientState::running(p1())),
        ]);
        let result = f.controller.stop(&p1(), StopPolicy::Idempotent).await.unwrap();

        assert_eq!(
            f.executor.stops(),
            vec![ClientId::from("c1"), ClientId::from("c3")]
        );
        assert_eq!(result.stopped, 2);
        assert_eq!(
            f.overlay.expectation(&ClientId::from("c1")),
            Some(Expectation::Stopped(p1()))
        );
    }

    #[tokio::test]
    async fn stop_with_nothing_running_follows_policy() {
        let f = fixture(&[("c1", ClientState::idle())]);

        let result = f.controller.stop(&p1(), StopPolicy::Idempotent).await.unwrap();
        assert!(result.clients.is_empty());
        assert!(f.executor.calls.lock().is_empty());

        let err = f
            .controller
            .stop(&p1(), StopPolicy::RequireActive)
            .await
            .unwrap_err();
        assert!(matches!(err, PresetError::NoActiveExecution(_)));
    }

    #[tokio::test]
    async fn stop_after_start_targets_optimistically_running_clients() {
        let f = fixture(&[
            ("c1", ClientState::idle()),
            ("c2", ClientState::idle()),
            ("c3", ClientState::idle()),
        ]);
        f.controller.start(&p1()).await.unwrap();
        let result = f.controller.stop(&p1(), StopPolicy::RequireActive).await.unwrap();
        assert_eq!(result.stopped, 3);
    }
}
