//! Status aggregation for a single preset.
//!
//! [`evaluate`] is a pure function of the preset, its resolved group members
//! and a client snapshot. It never patches an earlier verdict: every call
//! builds a complete [`PresetStatus`].

use crate::status::{
    ClientCondition, ClientStatus, ControlAction, OverallStatus, PresetStatus, StatusSummary,
};
use crate::tracker::ClientSnapshot;
use crate::types::{ClientId, ClientState, Preset};
use chrono::Utc;

/// Classify one group member for `preset`.
pub fn classify(preset: &Preset, client_id: &ClientId, state: &ClientState) -> ClientCondition {
    if preset.command_for(client_id).is_none() {
        return ClientCondition::MissingCommand;
    }
    if !state.is_online() {
        return ClientCondition::Offline;
    }
    match state.active_preset() {
        Some(p) if *p == preset.id => ClientCondition::RunningThis,
        Some(_) => ClientCondition::RunningOther,
        None => ClientCondition::Idle,
    }
}

/// Compute the verdict for `preset`.
///
/// `members` is `None` when the target group is unset or no longer resolves.
pub fn evaluate(
    preset: &Preset,
    members: Option<&[ClientId]>,
    snapshot: &ClientSnapshot,
) -> PresetStatus {
    let members = match members {
        Some(m) if !m.is_empty() => m,
        Some(_) => {
            return blocked(preset, Vec::new(), StatusSummary::default(), "target group has no clients");
        }
        None => {
            return blocked(preset, Vec::new(), StatusSummary::default(), "target group not found");
        }
    };

    let mut clients = Vec::with_capacity(members.len());
    let mut summary = StatusSummary {
        total: members.len(),
        ..StatusSummary::default()
    };

    for client_id in members {
        let state = snapshot.state_of(client_id);
        if state.is_online() {
            summary.online += 1;
        } else {
            summary.offline += 1;
        }
        let condition = classify(preset, client_id, &state);
        if condition == ClientCondition::RunningThis {
            summary.executing += 1;
        }
        clients.push(ClientStatus {
            client_id: client_id.clone(),
            condition,
            running_preset_id: state.active_preset().cloned(),
        });
    }

    let count = |c: ClientCondition| clients.iter().filter(|s| s.condition == c).count();
    let missing = count(ClientCondition::MissingCommand);

    if missing > 0 {
        let message = format!("not configured: {missing} client(s) without a launch command");
        return blocked(preset, clients, summary, &message);
    }

    let (overall, control, message) = if summary.executing == summary.total {
        (
            OverallStatus::Running,
            ControlAction::Stop,
            format!("running on all {} client(s)", summary.total),
        )
    } else if summary.executing > 0 {
        (
            OverallStatus::Degraded,
            ControlAction::Stop,
            format!(
                "partially running: {}/{} client(s) executing, {} offline",
                summary.executing, summary.total, summary.offline
            ),
        )
    } else if summary.offline > 0 {
        (
            OverallStatus::Degraded,
            ControlAction::Disabled,
            format!(
                "{} of {} client(s) offline; cannot run on every client",
                summary.offline, summary.total
            ),
        )
    } else {
        let busy = count(ClientCondition::RunningOther);
        let message = if busy > 0 {
            format!("ready on {} client(s), {busy} running another preset", summary.total)
        } else {
            format!("ready on {} client(s)", summary.total)
        };
        (OverallStatus::Runnable, ControlAction::Start, message)
    };

    PresetStatus {
        preset_id: preset.id.clone(),
        overall_status: overall,
        status_code: overall.status_code().to_string(),
        control,
        clients,
        summary,
        message,
        evaluated_at: Utc::now(),
    }
}

fn blocked(
    preset: &Preset,
    clients: Vec<ClientStatus>,
    summary: StatusSummary,
    message: &str,
) -> PresetStatus {
    PresetStatus {
        preset_id: preset.id.clone(),
        overall_status: OverallStatus::Blocked,
        status_code: OverallStatus::Blocked.status_code().to_string(),
        control: ControlAction::Disabled,
        clients,
        summary,
        message: message.to_string(),
        evaluated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
