use crate::error::Result;
use crate::types::{Client, Group, Preset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const DEFAULT_CONFIG_FILE: &str = "presets.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ReconcileConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Timer backstop for full reconciliation.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on a single outbound start/stop call.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// How long an optimistic hint survives without confirmation.
    #[serde(default = "default_optimistic_grace_secs")]
    pub optimistic_grace_secs: u64,
    /// Clients silent for longer than this are marked offline. Unset disables the sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_stale_secs: Option<u64>,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

fn default_optimistic_grace_secs() -> u64 {
    30
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            optimistic_grace_secs: default_optimistic_grace_secs(),
            client_stale_secs: None,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn optimistic_grace(&self) -> Duration {
        Duration::from_secs(self.optimistic_grace_secs)
    }

    pub fn client_stale(&self) -> Option<Duration> {
        self.client_stale_secs.map(Duration::from_secs)
    }

    /// A zero period, timeout or grace the engine cannot run with.
    pub fn has_zero_timing(&self) -> bool {
        self.interval_secs == 0
            || self.dispatch_timeout_ms == 0
            || self.optimistic_grace_secs == 0
            || self.client_stale_secs == Some(0)
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// How to reach the execution agent running on each client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Used when a client address carries no port.
    #[serde(default = "default_agent_port")]
    pub port: u16,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_agent_port() -> u16 {
    8081
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            port: default_agent_port(),
        }
    }
}

impl AgentConfig {
    /// Base URL of the agent at `address`.
    pub fn base_url(&self, address: &str) -> String {
        let address = address.trim_end_matches('/');
        if address.contains("://") {
            return address.to_string();
        }
        let has_port = address
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        if has_port {
            format!("{}://{}", self.scheme, address)
        } else {
            format!("{}://{}:{}", self.scheme, address, self.port)
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Config::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Timings must be non-zero
        if self.reconcile.interval_secs == 0 {
            warnings.push(error("reconcile.interval_secs must be greater than zero"));
        }
        if self.reconcile.dispatch_timeout_ms == 0 {
            warnings.push(error("reconcile.dispatch_timeout_ms must be greater than zero"));
        }
        if self.reconcile.optimistic_grace_secs == 0 {
            warnings.push(error("reconcile.optimistic_grace_secs must be greater than zero"));
        }
        if self.reconcile.client_stale_secs == Some(0) {
            warnings.push(error("reconcile.client_stale_secs must be greater than zero"));
        }

        // 2. Duplicate ids
        check_duplicates(
            "client",
            self.clients.iter().map(|c| c.id.as_str()),
            &mut warnings,
        );
        check_duplicates(
            "group",
            self.groups.iter().map(|g| g.id.as_str()),
            &mut warnings,
        );
        check_duplicates(
            "preset",
            self.presets.iter().map(|p| p.id.as_str()),
            &mut warnings,
        );

        // 3. Group members must be known clients
        let client_ids: HashSet<&str> = self.clients.iter().map(|c| c.id.as_str()).collect();
        for group in &self.groups {
            for member in &group.members {
                if !client_ids.contains(member.as_str()) {
                    warnings.push(warning(format!(
                        "group '{}' references unknown client '{}'",
                        group.id, member
                    )));
                }
            }
        }

        // 4. Presets must target a known group and configure every member
        for preset in &self.presets {
            let Some(group_id) = &preset.target_group_id else {
                warnings.push(warning(format!("preset '{}' has no target group", preset.id)));
                continue;
            };
            let Some(group) = self.groups.iter().find(|g| &g.id == group_id) else {
                warnings.push(warning(format!(
                    "preset '{}' targets unknown group '{}'",
                    preset.id, group_id
                )));
                continue;
            };
            for member in &group.members {
                if preset.command_for(member).is_none() {
                    warnings.push(error(format!(
                        "preset '{}' has no command for client '{}'",
                        preset.id, member
                    )));
                }
            }
        }

        warnings
    }
}

fn check_duplicates<'a>(
    kind: &str,
    ids: impl Iterator<Item = &'a str>,
    warnings: &mut Vec<ConfigWarning>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            warnings.push(error(format!("duplicate {kind} id '{id}'")));
        }
    }
}

fn warning(message: impl Into<String>) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Warning,
        message: message.into(),
    }
}

fn error(message: impl Into<String>) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Error,
        message: message.into(),
    }
}

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
