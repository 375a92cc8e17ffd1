pub mod aggregator;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod overlay;
pub mod reconcile;
pub mod registry;
pub mod status;
pub mod tracker;
pub mod types;

pub use controller::{ExecutionResult, StopPolicy, StopResult};
pub use dispatch::{DispatchResult, RemoteExecutor, StatusEvent, StatusSink};
pub use error::{DispatchError, PresetError, Result};
pub use orchestrator::Orchestrator;
pub use status::{OverallStatus, PresetStatus};
pub use types::{Client, ClientId, ClientState, Group, GroupId, Preset, PresetId};
