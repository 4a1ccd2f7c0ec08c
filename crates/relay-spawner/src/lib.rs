//! Launches and supervises worker processes (coding-agent CLIs running in a
//! PTY) on behalf of a single project, independent of the message-relay
//! bridge's own connection lifecycle.

pub mod cli_adapter;
pub mod control;
pub mod error;
pub mod pty;
pub mod registry;
pub mod shadow;
pub mod spawner;
pub mod worker;

pub use control::ControlRequest;
pub use error::SpawnError;
pub use pty::{NativePtyLauncher, PtyChild, PtyLaunchSpec, PtyLauncher};
pub use shadow::{resolve_triggers, RolePreset, ShadowTrigger};
pub use spawner::{clear_log_broadcaster, set_log_broadcaster, LogBroadcaster, Spawner, SpawnerOptions};
pub use worker::{
    ShadowMode, ShadowSpawnResult, ShadowSpec, SpawnRequest, SpawnResult, WorkerInfo,
    WorkerSnapshotEntry, WorkersSnapshot,
};
