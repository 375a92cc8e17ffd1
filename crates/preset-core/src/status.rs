use crate::types::{ClientId, PresetId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// OverallStatus
// ---------------------------------------------------------------------------

/// Aggregate verdict for one preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every member is configured, online and not running this preset.
    Runnable,
    /// Every member is running this preset.
    Running,
    /// Partial execution, or offline members prevent a full run.
    Degraded,
    /// Not configured, or the target group is missing or empty.
    Blocked,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Runnable => "runnable",
            OverallStatus::Running => "running",
            OverallStatus::Degraded => "degraded",
            OverallStatus::Blocked => "blocked",
        }
    }

    /// Colour code for a preset card. `red` means the preset cannot be
    /// started until it is fixed; it never offers a run control.
    pub fn status_code(self) -> &'static str {
        match self {
            OverallStatus::Runnable => "gray",
            OverallStatus::Running => "green",
            OverallStatus::Degraded => "yellow",
            OverallStatus::Blocked => "red",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClientCondition
// ---------------------------------------------------------------------------

/// Per-member classification, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCondition {
    MissingCommand,
    Offline,
    RunningThis,
    RunningOther,
    Idle,
}

impl ClientCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCondition::MissingCommand => "missing_command",
            ClientCondition::Offline => "offline",
            ClientCondition::RunningThis => "running_this",
            ClientCondition::RunningOther => "running_other",
            ClientCondition::Idle => "idle",
        }
    }
}

impl fmt::Display for ClientCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ControlAction
// ---------------------------------------------------------------------------

/// The one control an operator should be offered for a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
    Disabled,
}

// ---------------------------------------------------------------------------
// PresetStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client_id: ClientId,
    pub condition: ClientCondition,
    /// Preset the client reports running, when it is running one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_preset_id: Option<PresetId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub executing: usize,
}

/// Derived, never persisted. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetStatus {
    pub preset_id: PresetId,
    pub overall_status: OverallStatus,
    pub status_code: String,
    pub control: ControlAction,
    pub clients: Vec<ClientStatus>,
    pub summary: StatusSummary,
    pub message: String,
    pub evaluated_at: DateTime<Utc>,
}

impl PresetStatus {
    /// Whether two verdicts would look the same to an observer.
    pub fn same_verdict(&self, other: &PresetStatus) -> bool {
        self.preset_id == other.preset_id
            && self.overall_status == other.overall_status
            && self.control == other.control
            && self.clients == other.clients
            && self.summary == other.summary
            && self.message == other.message
    }

    pub fn clients_in(&self, condition: ClientCondition) -> impl Iterator<Item = &ClientId> {
        self.clients
            .iter()
            .filter(move |c| c.condition == condition)
            .map(|c| &c.client_id)
    }
}
