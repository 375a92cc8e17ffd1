//! Optimistic expectations recorded by the execution controller.
//!
//! After a start or stop is dispatched the controller records what it expects
//! the client to report next. Hints are merged over real snapshots until the
//! client confirms them or `grace` elapses; they never override connectivity.

use crate::tracker::ClientSnapshot;
use crate::types::{ClientId, ClientState, PresetId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Client should soon report running this preset.
    Running(PresetId),
    /// Client should soon report it is no longer running this preset.
    Stopped(PresetId),
}

impl Expectation {
    fn confirmed_by(&self, state: &ClientState) -> bool {
        match self {
            Expectation::Running(p) => state.is_online() && state.active_preset() == Some(p),
            Expectation::Stopped(p) => state.active_preset() != Some(p),
        }
    }

    fn apply_to(&self, state: &mut ClientState) {
        match self {
            Expectation::Running(p) => {
                state.current_preset_id = Some(p.clone());
                state.running = true;
            }
            Expectation::Stopped(p) => {
                if state.current_preset_id.as_ref() == Some(p) {
                    state.current_preset_id = None;
                    state.running = false;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Hint {
    expectation: Expectation,
    seq: u64,
    recorded_at: Instant,
}

#[derive(Debug)]
pub struct OptimisticOverlay {
    grace: Duration,
    hints: Mutex<HashMap<ClientId, Hint>>,
    next_seq: AtomicU64,
}

impl OptimisticOverlay {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            hints: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Record an expectation for `client_id`, replacing any earlier one.
    ///
    /// The returned sequence number identifies this hint for [`retract`](Self::retract).
    pub fn expect(&self, client_id: &ClientId, expectation: Expectation) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.hints.lock().insert(
            client_id.clone(),
            Hint {
                expectation,
                seq,
                recorded_at: Instant::now(),
            },
        );
        seq
    }

    /// Drop the hint for `client_id` if it is still the one recorded as `seq`.
    pub fn retract(&self, client_id: &ClientId, seq: u64) -> bool {
        let mut hints = self.hints.lock();
        match hints.get(client_id) {
            Some(h) if h.seq == seq => {
                hints.remove(client_id);
                true
            }
            _ => false,
        }
    }

    pub fn expectation(&self, client_id: &ClientId) -> Option<Expectation> {
        self.hints
            .lock()
            .get(client_id)
            .map(|h| h.expectation.clone())
    }

    pub fn pending(&self) -> usize {
        self.hints.lock().len()
    }

    /// Overlay live hints onto `snapshot`, pruning confirmed and expired ones.
    pub fn merge(&self, snapshot: &ClientSnapshot) -> ClientSnapshot {
        let now = Instant::now();
        let mut hints = self.hints.lock();
        hints.retain(|client_id, hint| {
            if now.duration_since(hint.recorded_at) >= self.grace {
                tracing::debug!(client_id = %client_id, "optimistic hint expired");
                return false;
            }
            if let Some(real) = snapshot.get(client_id) {
                if hint.expectation.confirmed_by(real) {
                    return false;
                }
            }
            true
        });

        if hints.is_empty() {
            return snapshot.clone();
        }

        let mut states = snapshot.clone().into_states();
        for (client_id, hint) in hints.iter() {
            let state = states
                .entry(client_id.clone())
                .or_insert_with(ClientState::offline);
            hint.expectation.apply_to(state);
        }
        ClientSnapshot::new(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ClientStateTracker;

    fn ids() -> (ClientId, PresetId) {
        (ClientId::from("c1"), PresetId::from("p1"))
    }

    #[tokio::test(start_paused = true)]
    async fn running_hint_overlays_idle_client() {
        let (c1, p1) = ids();
        let tracker = ClientStateTracker::new();
        tracker.apply(&c1, ClientState::idle());
        let overlay = OptimisticOverlay::new(Duration::from_secs(30));

        overlay.expect(&c1, Expectation::Running(p1.clone()));
        let merged = overlay.merge(&tracker.snapshot());
        assert_eq!(merged.state_of(&c1).active_preset(), Some(&p1));
        assert_eq!(overlay.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_discards_hint() {
        let (c1, p1) = ids();
        let tracker = ClientStateTracker::new();
        tracker.apply(&c1, ClientState::running(p1.clone()));
        let overlay = OptimisticOverlay::new(Duration::from_secs(30));

        overlay.expect(&c1, Expectation::Running(p1));
        overlay.merge(&tracker.snapshot());
        assert_eq!(overlay.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hint_expires_after_grace() {
        let (c1, p1) = ids();
        let tracker = ClientStateTracker::new();
        tracker.apply(&c1, ClientState::idle());
        let overlay = OptimisticOverlay::new(Duration::from_secs(30));

        overlay.expect(&c1, Expectation::Running(p1));
        tokio::time::advance(Duration::from_secs(31)).await;

        let merged = overlay.merge(&tracker.snapshot());
        assert!(!merged.state_of(&c1).running);
        assert_eq!(overlay.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hint_never_brings_client_online() {
        let (c1, p1) = ids();
        let tracker = ClientStateTracker::new();
        tracker.apply(&c1, ClientState::offline());
        let overlay = OptimisticOverlay::new(Duration::from_secs(30));

        overlay.expect(&c1, Expectation::Running(p1));
        let merged = overlay.merge(&tracker.snapshot());
        assert!(!merged.state_of(&c1).is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_hint_clears_running_this() {
        let (c1, p1) = ids();
        let tracker = ClientStateTracker::new();
        tracker.apply(&c1, ClientState::running(p1.clone()));
        let overlay = OptimisticOverlay::new(Duration::from_secs(30));

        overlay.expect(&c1, Expectation::Stopped(p1));
        let merged = overlay.merge(&tracker.snapshot());
        assert!(!merged.state_of(&c1).running);
        assert_eq!(overlay.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retract_ignores_superseded_hint() {
        let (c1, p1) = ids();
        let overlay = OptimisticOverlay::new(Duration::from_secs(30));

        let start_seq = overlay.expect(&c1, Expectation::Running(p1.clone()));
        overlay.expect(&c1, Expectation::Stopped(p1.clone()));

        assert!(!overlay.retract(&c1, start_seq));
        assert_eq!(overlay.expectation(&c1), Some(Expectation::Stopped(p1)));
    }
}
