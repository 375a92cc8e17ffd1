//! Outbound seams: command dispatch to clients and verdict publication.

use crate::error::DispatchError;
use crate::status::PresetStatus;
use crate::types::{ClientId, PresetId};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::broadcast;

pub type DispatchResult = std::result::Result<(), DispatchError>;

/// Sends start and stop commands to the execution agent on a client.
///
/// Implementations must not retry; the controller bounds every call with its
/// own timeout.
pub trait RemoteExecutor: Send + Sync {
    fn dispatch_start<'a>(
        &'a self,
        client_id: &'a ClientId,
        command: &'a str,
    ) -> BoxFuture<'a, DispatchResult>;

    fn dispatch_stop<'a>(&'a self, client_id: &'a ClientId) -> BoxFuture<'a, DispatchResult>;
}

// ---------------------------------------------------------------------------
// StatusEvent / StatusSink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum StatusEvent {
    Updated {
        preset_id: PresetId,
        status: Arc<PresetStatus>,
    },
    Removed {
        preset_id: PresetId,
    },
}

impl StatusEvent {
    pub fn preset_id(&self) -> &PresetId {
        match self {
            StatusEvent::Updated { preset_id, .. } | StatusEvent::Removed { preset_id } => preset_id,
        }
    }
}

/// Receives every verdict change. Must not block.
pub trait StatusSink: Send + Sync {
    fn publish(&self, event: StatusEvent);
}

impl StatusSink for broadcast::Sender<StatusEvent> {
    fn publish(&self, event: StatusEvent) {
        // No subscribers is fine.
        let _ = self.send(event);
    }
}
