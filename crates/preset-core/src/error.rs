use crate::types::{ClientId, GroupId, PresetId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("preset not found: {0}")]
    PresetNotFound(PresetId),

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("preset '{preset_id}' is not runnable: {reason}")]
    NotRunnable { preset_id: PresetId, reason: String },

    #[error("preset '{0}' has no active execution")]
    NoActiveExecution(PresetId),

    #[error("invalid preset: {0}")]
    InvalidPreset(String),

    #[error("dispatch failed for {} client(s): {}", failed.len(), join_ids(failed))]
    PartialDispatchFailure { failed: Vec<ClientId> },

    #[error("dispatch to client '{client_id}' timed out after {timeout_ms}ms")]
    DispatchTimeout { client_id: ClientId, timeout_ms: u64 },

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PresetError {
    /// True for lookups that failed because the record is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PresetError::PresetNotFound(_) | PresetError::GroupNotFound(_)
        )
    }
}

/// Failure reported by a remote executor for a single outbound call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("client '{0}' unreachable: {1}")]
    Unreachable(ClientId, String),

    #[error("client '{0}' rejected the command: {1}")]
    Rejected(ClientId, String),

    #[error("client '{0}' has no known address")]
    UnknownClient(ClientId),
}

fn join_ids(ids: &[ClientId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PresetError>;
