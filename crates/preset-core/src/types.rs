use crate::error::{PresetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identity of a remote display client.
    ClientId
);
string_id!(
    /// Identity of a client group.
    GroupId
);
string_id!(
    /// Identity of a preset.
    PresetId
);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// `host` or `host:port` of the client's execution agent.
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest reported state of a client, as delivered by the connectivity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    pub connectivity: Connectivity,
    #[serde(default)]
    pub current_preset_id: Option<PresetId>,
    #[serde(default)]
    pub running: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ClientState {
    pub fn offline() -> Self {
        Self {
            connectivity: Connectivity::Offline,
            current_preset_id: None,
            running: false,
            updated_at: Utc::now(),
        }
    }

    pub fn idle() -> Self {
        Self {
            connectivity: Connectivity::Online,
            current_preset_id: None,
            running: false,
            updated_at: Utc::now(),
        }
    }

    pub fn running(preset_id: PresetId) -> Self {
        Self {
            connectivity: Connectivity::Online,
            current_preset_id: Some(preset_id),
            running: true,
            updated_at: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity == Connectivity::Online
    }

    /// The preset this client is executing, if it is executing anything.
    pub fn active_preset(&self) -> Option<&PresetId> {
        if self.running {
            self.current_preset_id.as_ref()
        } else {
            None
        }
    }

    /// Equality on the fields reconciliation cares about (ignores `updated_at`).
    pub fn same_execution_state(&self, other: &ClientState) -> bool {
        self.connectivity == other.connectivity
            && self.running == other.running
            && self.current_preset_id == other.current_preset_id
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub members: Vec<ClientId>,
}

// ---------------------------------------------------------------------------
// Preset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: PresetId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub target_group_id: Option<GroupId>,
    /// Launch command per client. Entries for clients outside the target
    /// group are kept but ignored.
    #[serde(default)]
    pub client_commands: BTreeMap<ClientId, String>,
}

impl Preset {
    pub fn new(id: impl Into<PresetId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            target_group_id: None,
            client_commands: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, group_id: impl Into<GroupId>) -> Self {
        self.target_group_id = Some(group_id.into());
        self
    }

    pub fn with_command(mut self, client_id: impl Into<ClientId>, command: impl Into<String>) -> Self {
        self.client_commands.insert(client_id.into(), command.into());
        self
    }

    /// The trimmed launch command for `client_id`, or `None` when absent or blank.
    pub fn command_for(&self, client_id: &ClientId) -> Option<&str> {
        self.client_commands
            .get(client_id)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    /// Check the preset is fit to be saved against the group it targets.
    ///
    /// `lookup_name` resolves a client id to its display name for the error
    /// message; unknown clients fall back to their id.
    pub fn validate<F>(&self, group: Option<&Group>, lookup_name: F) -> Result<()>
    where
        F: Fn(&ClientId) -> Option<String>,
    {
        if self.name.trim().is_empty() {
            return Err(PresetError::InvalidPreset("preset name is required".into()));
        }
        let Some(group_id) = &self.target_group_id else {
            return Err(PresetError::InvalidPreset("a target group is required".into()));
        };
        let Some(group) = group else {
            return Err(PresetError::GroupNotFound(group_id.clone()));
        };
        if let Some(missing) = group.members.iter().find(|c| self.command_for(c).is_none()) {
            let name = lookup_name(missing).unwrap_or_else(|| missing.to_string());
            return Err(PresetError::InvalidPreset(format!(
                "client \"{name}\" has no launch command"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn group(members: &[&str]) -> Group {
        Group {
            id: GroupId::from("wall"),
            name: "Video wall".into(),
            members: members.iter().map(|m| ClientId::from(*m)).collect(),
        }
    }

    #[test]
    fn blank_command_counts_as_missing() {
        let preset = Preset::new("p1", "Main")
            .with_command("c1", "   ")
            .with_command("c2", " run.exe ");
        assert_eq!(preset.command_for(&ClientId::from("c1")), None);
        assert_eq!(preset.command_for(&ClientId::from("c2")), Some("run.exe"));
        assert_eq!(preset.command_for(&ClientId::from("c3")), None);
    }

    #[test]
    fn validate_requires_name_and_group() {
        let g = group(&["c1"]);
        let unnamed = Preset::new("p1", " ").with_group("wall");
        assert!(matches!(
            unnamed.validate(Some(&g), |_| None),
            Err(PresetError::InvalidPreset(_))
        ));

        let ungrouped = Preset::new("p1", "Main");
        let err = ungrouped.validate(None, |_| None).unwrap_err();
        assert!(err.to_string().contains("target group"));
    }

    #[test]
    fn validate_names_client_missing_command() {
        let g = group(&["c1", "c2"]);
        let preset = Preset::new("p1", "Main")
            .with_group("wall")
            .with_command("c1", "run.exe");
        let err = preset
            .validate(Some(&g), |id| (id.as_str() == "c2").then(|| "Node 2".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("\"Node 2\""));
    }

    #[test]
    fn validate_accepts_extra_commands() {
        let g = group(&["c1"]);
        let preset = Preset::new("p1", "Main")
            .with_group("wall")
            .with_command("c1", "run.exe")
            .with_command("old", "legacy.exe");
        assert!(preset.validate(Some(&g), |_| None).is_ok());
    }

    #[test]
    fn client_state_ignores_timestamp_in_comparison() {
        let a = ClientState::running(PresetId::from("p1"));
        let mut b = a.clone();
        b.updated_at = a.updated_at + chrono::Duration::seconds(5);
        assert!(a.same_execution_state(&b));
        assert!(!a.same_execution_state(&ClientState::idle()));
    }

    #[test]
    fn client_commands_deserialize_from_yaml_map() {
        let yaml = "id: p1\nname: Main\ntarget_group_id: wall\nclient_commands:\n  c1: run.exe -dc_node=Node_0\n";
        let preset: Preset = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            preset.command_for(&ClientId::from("c1")),
            Some("run.exe -dc_node=Node_0")
        );
    }
}
