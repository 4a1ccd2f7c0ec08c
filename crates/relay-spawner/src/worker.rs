use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shadow::ShadowTrigger;

/// A request to bring up one worker.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub name: String,
    /// The literal CLI invocation, e.g. `"claude --model sonnet"`.
    pub cli: String,
    pub task: String,
    pub team: Option<String>,
    pub shadow_of: Option<String>,
    pub shadow_speak_on: Option<Vec<ShadowTrigger>>,
}

impl SpawnRequest {
    pub fn new(name: impl Into<String>, cli: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cli: cli.into(),
            task: task.into(),
            team: None,
            shadow_of: None,
            shadow_speak_on: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpawnResult {
    pub success: bool,
    pub name: String,
    pub pid: Option<u32>,
    pub error: Option<String>,
}

/// A live worker tracked by the Spawner's active table.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub name: String,
    pub cli: String,
    pub task: String,
    pub team: Option<String>,
    pub spawned_at: chrono::DateTime<chrono::Utc>,
    pub pid: Option<u32>,
    pub log_file: PathBuf,
    pub shadow_of: Option<String>,
    pub shadow_speak_on: Option<Vec<ShadowTrigger>>,
}

/// One entry of the persisted `workers.json` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshotEntry {
    pub name: String,
    pub cli: String,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub spawned_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_of: Option<String>,
}

/// The shape written atomically to `team/workers.json` after every
/// mutation of the active-worker table.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkersSnapshot {
    pub workers: Vec<WorkerSnapshotEntry>,
}

impl From<&WorkerInfo> for WorkerSnapshotEntry {
    fn from(info: &WorkerInfo) -> Self {
        Self {
            name: info.name.clone(),
            cli: info.cli.clone(),
            task: info.task.clone(),
            team: info.team.clone(),
            spawned_at: info.spawned_at,
            pid: info.pid,
            log_file: Some(info.log_file.display().to_string()),
            shadow_of: info.shadow_of.clone(),
        }
    }
}

/// Describes the shadow half of a primary/shadow pairing request.
#[derive(Debug, Clone)]
pub struct ShadowSpec {
    pub name: String,
    pub cli: String,
    pub task: String,
    pub role_preset: Option<crate::shadow::RolePreset>,
    pub speak_on_override: Option<Vec<ShadowTrigger>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowMode {
    /// The shadow rides along as a native subagent; no separate process is spawned.
    Subagent,
    /// The shadow is a genuinely separate spawned worker.
    Process,
}

#[derive(Debug, Clone)]
pub struct ShadowSpawnResult {
    pub primary: SpawnResult,
    pub shadow: Option<SpawnResult>,
    pub shadow_mode: Option<ShadowMode>,
}
