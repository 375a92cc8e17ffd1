//! Latest known state of every remote client.
//!
//! The tracker publishes immutable snapshots. Writers build a new map and swap
//! it in, so a reader holding a snapshot never observes a concurrent update
//! until it asks for the next one.

use crate::types::{ClientId, ClientState, Connectivity};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Immutable point-in-time view of client states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSnapshot {
    states: HashMap<ClientId, ClientState>,
}

impl ClientSnapshot {
    pub fn new(states: HashMap<ClientId, ClientState>) -> Self {
        Self { states }
    }

    pub fn get(&self, client_id: &ClientId) -> Option<&ClientState> {
        self.states.get(client_id)
    }

    /// State of `client_id`; clients never reported are treated as offline.
    pub fn state_of(&self, client_id: &ClientId) -> ClientState {
        self.states
            .get(client_id)
            .cloned()
            .unwrap_or_else(ClientState::offline)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &ClientState)> {
        self.states.iter()
    }

    pub(crate) fn into_states(self) -> HashMap<ClientId, ClientState> {
        self.states
    }
}

#[derive(Debug, Default)]
pub struct ClientStateTracker {
    current: RwLock<Arc<ClientSnapshot>>,
}

impl ClientStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ClientSnapshot> {
        self.current.read().clone()
    }

    /// Record a new state for `client_id`.
    ///
    /// Returns `true` when the connectivity or execution state changed, which
    /// is what reconciliation needs to react to. Timestamp-only refreshes
    /// (heartbeats) return `false`.
    pub fn apply(&self, client_id: &ClientId, state: ClientState) -> bool {
        let mut guard = self.current.write();
        let changed = guard
            .get(client_id)
            .map(|prev| !prev.same_execution_state(&state))
            .unwrap_or(true);
        let mut next = (**guard).clone();
        next.states.insert(client_id.clone(), state);
        *guard = Arc::new(next);
        changed
    }

    /// Mark a client offline, keeping what it last reported running.
    pub fn mark_offline(&self, client_id: &ClientId) -> bool {
        let mut guard = self.current.write();
        let mut state = guard.state_of(client_id);
        let changed = state.connectivity != Connectivity::Offline || guard.get(client_id).is_none();
        state.connectivity = Connectivity::Offline;
        state.updated_at = Utc::now();
        let mut next = (**guard).clone();
        next.states.insert(client_id.clone(), state);
        *guard = Arc::new(next);
        changed
    }

    /// Mark online clients offline when their last report is older than `max_age`.
    ///
    /// Returns the ids that transitioned.
    pub fn sweep_stale(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<ClientId> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let cutoff = now - max_age;

        let mut guard = self.current.write();
        let stale: Vec<ClientId> = guard
            .iter()
            .filter(|(_, s)| s.is_online() && s.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        if stale.is_empty() {
            return stale;
        }

        let mut next = (**guard).clone();
        for id in &stale {
            if let Some(state) = next.states.get_mut(id) {
                state.connectivity = Connectivity::Offline;
            }
        }
        *guard = Arc::new(next);
        for id in &stale {
            tracing::info!(client_id = %id, "client stopped reporting, marked offline");
        }
        stale
    }
}
