//! Launches, tracks, and tears down worker processes for a single project.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use relay_core::types::{CliKind, ProjectConfig};
use tracing::{debug, info, warn};

use crate::cli_adapter;
use crate::control::ControlRequest;
use crate::error::SpawnError;
use crate::pty::{NativePtyLauncher, PtyChild, PtyLaunchSpec, PtyLauncher};
use crate::registry;
use crate::shadow;
use crate::worker::{
    ShadowMode, ShadowSpawnResult, ShadowSpec, SpawnRequest, SpawnResult, WorkerInfo,
    WorkerSnapshotEntry, WorkersSnapshot,
};

/// Knobs that govern how a [`Spawner`] brings workers up.
#[derive(Debug, Clone)]
pub struct SpawnerOptions {
    pub dashboard_port: Option<u16>,
    pub max_workers: u32,
    pub registration_timeout: Duration,
    pub registration_poll: Duration,
    /// Delay before injecting a worker's initial task, giving the CLI time
    /// to finish its own startup banner/prompt.
    pub task_injection_delay: Duration,
}

impl Default for SpawnerOptions {
    fn default() -> Self {
        Self {
            dashboard_port: None,
            max_workers: 32,
            registration_timeout: Duration::from_secs(30),
            registration_poll: Duration::from_millis(500),
            task_injection_delay: Duration::from_secs(1),
        }
    }
}

impl From<&relay_core::config::SpawnerConfig> for SpawnerOptions {
    fn from(cfg: &relay_core::config::SpawnerConfig) -> Self {
        Self {
            dashboard_port: cfg.dashboard_port,
            max_workers: cfg.max_workers,
            registration_timeout: Duration::from_secs(cfg.registration_timeout_secs),
            registration_poll: Duration::from_millis(cfg.registration_poll_ms),
            task_injection_delay: Duration::from_secs(1),
        }
    }
}

fn debug_spawn_enabled() -> bool {
    std::env::var("DEBUG_SPAWN").map(|v| v == "1").unwrap_or(false)
}

struct ActiveWorker {
    info: WorkerInfo,
    pty: Arc<dyn PtyChild>,
}

/// Type alias for the process-wide log-broadcaster hook set by
/// [`set_log_broadcaster`].
pub type LogBroadcaster = Arc<dyn Fn(String, String) + Send + Sync>;

static LOG_BROADCASTER: OnceLock<std::sync::Mutex<Option<LogBroadcaster>>> = OnceLock::new();

/// Installs a process-wide hook invoked with `(worker_name, line)` for every
/// line a worker prints. Intended for forwarding worker output to a
/// dashboard or aggregate log sink; harmless to leave unset.
pub fn set_log_broadcaster(f: LogBroadcaster) {
    LOG_BROADCASTER
        .get_or_init(|| std::sync::Mutex::new(None))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .replace(f);
}

pub fn clear_log_broadcaster() {
    if let Some(slot) = LOG_BROADCASTER.get() {
        slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

fn log_broadcaster() -> Option<LogBroadcaster> {
    LOG_BROADCASTER
        .get()
        .and_then(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
}

/// Owns the worker table for a single project: spawning, releasing, and
/// persisting a point-in-time snapshot of who is active.
///
/// A `Spawner` does not share the Bridge's shutdown latch; it is brought
/// down independently by the binary wiring the two together (see
/// `DESIGN.md`).
pub struct Spawner {
    project_root: PathBuf,
    agents_path: PathBuf,
    socket_path: PathBuf,
    logs_dir: PathBuf,
    workers_path: PathBuf,
    options: SpawnerOptions,
    launcher: Arc<dyn PtyLauncher>,
    workers: tokio::sync::Mutex<HashMap<String, ActiveWorker>>,
    http: reqwest::Client,
}

impl Spawner {
    pub fn new(project: &ProjectConfig) -> std::io::Result<Self> {
        Self::with_launcher(project, SpawnerOptions::default(), Arc::new(NativePtyLauncher))
    }

    pub fn with_options(project: &ProjectConfig, options: SpawnerOptions) -> std::io::Result<Self> {
        Self::with_launcher(project, options, Arc::new(NativePtyLauncher))
    }

    pub fn with_launcher(
        project: &ProjectConfig,
        options: SpawnerOptions,
        launcher: Arc<dyn PtyLauncher>,
    ) -> std::io::Result<Self> {
        let logs_dir = project.logs_dir();
        std::fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            project_root: project.project_root.clone(),
            agents_path: project.agents_path(),
            socket_path: project.socket_path.clone(),
            workers_path: project.workers_path(),
            logs_dir,
            options,
            launcher,
            workers: tokio::sync::Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
        })
    }

    pub async fn spawn(&self, req: SpawnRequest) -> SpawnResult {
        let name = req.name.clone();
        match self.spawn_inner(req).await {
            Ok(result) => result,
            Err(e) => {
                warn!(worker = %name, error = %e, "spawn failed");
                SpawnResult {
                    success: false,
                    name,
                    pid: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn spawn_inner(&self, req: SpawnRequest) -> Result<SpawnResult, SpawnError> {
        {
            let workers = self.workers.lock().await;
            if workers.contains_key(&req.name) {
                return Err(SpawnError::AlreadyExists(req.name.clone()));
            }
            if workers.len() as u32 >= self.options.max_workers {
                return Err(SpawnError::AtCapacity(self.options.max_workers));
            }
        }

        let mut parts = req.cli.split_whitespace();
        let command_name = parts.next().unwrap_or(&req.cli).to_string();
        let mut args: Vec<String> = parts.map(str::to_string).collect();

        let command = cli_adapter::resolve_executable(&command_name)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| {
                warn!(worker = %req.name, command = %command_name, "executable not found on PATH, launching by name verbatim");
                command_name.clone()
            });

        cli_adapter::adapter_for_command(&command_name).rewrite_args(&mut args);

        let spec = PtyLaunchSpec {
            name: req.name.clone(),
            command,
            args,
            socket_path: self.socket_path.clone(),
            cwd: self.project_root.clone(),
            logs_dir: self.logs_dir.clone(),
            parse_control_lines: self.options.dashboard_port.is_none(),
        };

        if debug_spawn_enabled() {
            debug!(worker = %spec.name, command = %spec.command, args = ?spec.args, "launching pty");
        }
        let pty = self.launcher.launch(&spec)?;

        if let Some(broadcaster) = log_broadcaster() {
            let mut rx = pty.subscribe_output();
            let name = req.name.clone();
            tokio::spawn(async move {
                while let Ok(line) = rx.recv().await {
                    broadcaster(name.clone(), line);
                }
            });
        }

        let registered = self.wait_for_registration(&req.name).await;
        if !registered {
            let _ = pty.kill();
            return Err(SpawnError::FailedToRegister(req.name.clone()));
        }

        let pid = pty.pid();

        if !req.task.trim().is_empty() {
            self.inject_task(&req.name, &req.task, pty.as_ref()).await;
        }

        let info = WorkerInfo {
            name: req.name.clone(),
            cli: req.cli.clone(),
            task: req.task.clone(),
            team: req.team.clone(),
            spawned_at: chrono::Utc::now(),
            pid,
            log_file: pty.log_path().to_path_buf(),
            shadow_of: req.shadow_of.clone(),
            shadow_speak_on: req.shadow_speak_on.clone(),
        };

        {
            let mut workers = self.workers.lock().await;
            workers.insert(req.name.clone(), ActiveWorker { info, pty });
        }
        self.persist_snapshot().await;

        info!(worker = %req.name, ?pid, "worker spawned");
        Ok(SpawnResult {
            success: true,
            name: req.name,
            pid,
            error: None,
        })
    }

    async fn wait_for_registration(&self, name: &str) -> bool {
        let debug = debug_spawn_enabled();
        let deadline = tokio::time::Instant::now() + self.options.registration_timeout;
        loop {
            if registry::is_registered(&self.agents_path, name) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            if debug {
                debug!(worker = %name, path = %self.agents_path.display(), "still waiting for registration");
            }
            tokio::time::sleep(self.options.registration_poll).await;
        }
    }

    async fn inject_task(&self, name: &str, task: &str, pty: &dyn PtyChild) {
        if let Some(port) = self.options.dashboard_port {
            tokio::time::sleep(self.options.task_injection_delay).await;
            let url = format!("http://127.0.0.1:{port}/api/send");
            let body = serde_json::json!({"to": name, "message": task, "from": "__spawner__"});
            let delivered = match self.http.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
                    .unwrap_or(false),
                _ => false,
            };
            if delivered {
                return;
            }
            warn!(worker = %name, "dashboard task injection failed, falling back to direct pty write");
        }

        let mut bytes = task.as_bytes().to_vec();
        bytes.push(b'\r');
        let _ = pty.write(&bytes);
    }

    /// Spawns a primary worker and, if it comes up successfully, a paired
    /// shadow -- either a native subagent (no process) or a genuinely
    /// separate worker, depending on the primary's CLI family.
    pub async fn spawn_with_shadow(&self, primary: SpawnRequest, shadow: ShadowSpec) -> ShadowSpawnResult {
        let primary_command = primary.cli.split_whitespace().next().unwrap_or(&primary.cli).to_string();
        let primary_team = primary.team.clone();
        let primary_result = self.spawn(primary).await;
        if !primary_result.success {
            return ShadowSpawnResult {
                primary: primary_result,
                shadow: None,
                shadow_mode: None,
            };
        }

        let triggers = shadow::resolve_triggers(shadow.role_preset, shadow.speak_on_override.clone());
        let mode = match CliKind::from_command(&primary_command) {
            CliKind::Claude | CliKind::Codex | CliKind::OpenCode => ShadowMode::Subagent,
            _ => ShadowMode::Process,
        };

        match mode {
            ShadowMode::Subagent => {
                info!(primary = %primary_result.name, shadow = %shadow.name, ?triggers, "shadow attached as native subagent");
                ShadowSpawnResult {
                    primary: primary_result,
                    shadow: Some(SpawnResult {
                        success: true,
                        name: shadow.name,
                        pid: None,
                        error: None,
                    }),
                    shadow_mode: Some(mode),
                }
            }
            ShadowMode::Process => {
                let shadow_req = SpawnRequest {
                    name: shadow.name,
                    cli: shadow.cli,
                    task: shadow.task,
                    team: primary_team,
                    shadow_of: Some(primary_result.name.clone()),
                    shadow_speak_on: Some(triggers),
                };
                let shadow_result = self.spawn(shadow_req).await;
                ShadowSpawnResult {
                    primary: primary_result,
                    shadow: Some(shadow_result),
                    shadow_mode: Some(mode),
                }
            }
        }
    }

    /// Stops a worker: a graceful exit line, a 2-second grace period, then
    /// a hard kill if it is still running.
    pub async fn release(&self, name: &str) -> bool {
        let pty = {
            let workers = self.workers.lock().await;
            match workers.get(name) {
                Some(w) => w.pty.clone(),
                None => return false,
            }
        };

        if let Err(e) = pty.stop() {
            warn!(worker = %name, error = %e, "graceful stop failed");
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        if pty.is_running() {
            if let Err(e) = pty.kill() {
                warn!(worker = %name, error = %e, "force kill failed");
            }
        }

        {
            let mut workers = self.workers.lock().await;
            workers.remove(name);
        }
        self.persist_snapshot().await;
        info!(worker = %name, "worker released");
        true
    }

    pub async fn release_all(&self) {
        let names: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        for name in names {
            self.release(&name).await;
        }
    }

    pub async fn active_workers(&self) -> Vec<WorkerInfo> {
        self.workers.lock().await.values().map(|w| w.info.clone()).collect()
    }

    pub async fn has_worker(&self, name: &str) -> bool {
        self.workers.lock().await.contains_key(name)
    }

    pub async fn worker_output(&self, name: &str, limit: Option<usize>) -> Option<Vec<String>> {
        self.workers.lock().await.get(name).map(|w| w.pty.output(limit))
    }

    pub async fn worker_raw_output(&self, name: &str) -> Option<String> {
        self.workers.lock().await.get(name).map(|w| w.pty.raw_output())
    }

    /// Drains any nested spawn/release requests a worker's own output
    /// raised while the Spawner has no dashboard HTTP surface configured.
    /// A caller (the binary wiring project and Spawner together) is
    /// expected to poll this and act on the results.
    pub async fn poll_control_requests(&self) -> Vec<(String, ControlRequest)> {
        let workers = self.workers.lock().await;
        workers
            .iter()
            .flat_map(|(name, w)| {
                w.pty
                    .take_control_requests()
                    .into_iter()
                    .map(|req| (name.clone(), req))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    async fn persist_snapshot(&self) {
        let snapshot = {
            let workers = self.workers.lock().await;
            WorkersSnapshot {
                workers: workers.values().map(|w| WorkerSnapshotEntry::from(&w.info)).collect(),
            }
        };
        if let Err(e) = write_snapshot_atomically(&self.workers_path, &snapshot) {
            warn!(error = %e, path = %self.workers_path.display(), "failed to persist workers.json");
        }
    }
}

fn write_snapshot_atomically(path: &std::path::Path, snapshot: &WorkersSnapshot) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
