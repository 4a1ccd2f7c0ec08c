//! PTY-backed worker processes.
//!
//! Each worker runs in its own pseudo-terminal with two background threads:
//! one reading the master side into a bounded output ring and an append-mode
//! log file, the other draining a bounded channel of caller-submitted bytes
//! into the master's write half. This mirrors the two-thread-per-session
//! design used elsewhere for PTY-backed child processes; the worker table
//! itself tracks these handles through the [`PtyChild`] trait object rather
//! than the concrete type, so [`Spawner`](crate::spawner::Spawner) can be
//! exercised against fakes in tests.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tracing::{debug, warn};

use crate::control::{parse_control_line, ControlRequest};
use crate::error::SpawnError;

/// Number of output lines retained per worker in the in-memory ring.
pub const OUTPUT_RING_CAPACITY: usize = 2000;

/// What [`PtyLauncher::launch`] needs to bring a worker's process to life.
#[derive(Debug, Clone)]
pub struct PtyLaunchSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub socket_path: PathBuf,
    pub cwd: PathBuf,
    pub logs_dir: PathBuf,
    /// `true` when no dashboard HTTP surface is configured, in which case
    /// the reader thread parses nested spawn/release requests out of the
    /// child's own output instead of leaving that to the dashboard.
    pub parse_control_lines: bool,
}

/// A running (or exited) worker process.
///
/// Implementations must be safe to hold behind `Arc` and shared across the
/// worker table and any background tasks draining its output.
pub trait PtyChild: Send + Sync {
    fn pid(&self) -> Option<u32>;
    fn is_running(&self) -> bool;
    fn log_path(&self) -> &Path;
    fn write(&self, bytes: &[u8]) -> Result<(), SpawnError>;
    /// Best-effort graceful stop: writes an exit line the CLI is expected to honor.
    fn stop(&self) -> Result<(), SpawnError>;
    fn kill(&self) -> Result<(), SpawnError>;
    /// Last `limit` captured lines (all of them if `limit` is `None`).
    fn output(&self, limit: Option<usize>) -> Vec<String>;
    /// The full buffered transcript, unbounded.
    fn raw_output(&self) -> String;
    /// Subscribe to output lines as they are captured.
    fn subscribe_output(&self) -> tokio::sync::broadcast::Receiver<String>;
    /// Drain any nested spawn/release requests parsed from this worker's output.
    fn take_control_requests(&self) -> Vec<ControlRequest>;
}

/// Builds and launches the process backing a worker.
pub trait PtyLauncher: Send + Sync {
    fn launch(&self, spec: &PtyLaunchSpec) -> Result<Arc<dyn PtyChild>, SpawnError>;
}

struct Captured {
    lines: VecDeque<String>,
    raw: String,
    partial: String,
    control: Vec<ControlRequest>,
}

impl Captured {
    fn new() -> Self {
        Self {
            lines: VecDeque::with_capacity(OUTPUT_RING_CAPACITY),
            raw: String::new(),
            partial: String::new(),
            control: Vec::new(),
        }
    }

    /// Appends `chunk`, returning the complete lines it produced (in order)
    /// so callers can publish exactly the new lines without having to infer
    /// them from the ring's length, which stops growing once it's full.
    fn push_chunk(&mut self, chunk: &str, parse_control: bool) -> Vec<String> {
        self.raw.push_str(chunk);
        self.partial.push_str(chunk);
        let mut new_lines = Vec::new();
        while let Some(idx) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=idx).collect();
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            if parse_control {
                if let Some(req) = parse_control_line(&line) {
                    self.control.push(req);
                }
            }
            if self.lines.len() >= OUTPUT_RING_CAPACITY {
                self.lines.pop_front();
            }
            self.lines.push_back(line.clone());
            new_lines.push(line);
        }
        new_lines
    }
}

pub struct NativePtyChild {
    name: String,
    log_path: PathBuf,
    child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>,
    master: Arc<Mutex<Box<dyn portable_pty::MasterPty + Send>>>,
    writer: flume::Sender<Vec<u8>>,
    captured: Arc<Mutex<Captured>>,
    output_tx: tokio::sync::broadcast::Sender<String>,
    _reader_thread: Option<std::thread::JoinHandle<()>>,
    _writer_thread: Option<std::thread::JoinHandle<()>>,
}

impl NativePtyChild {
    fn lock_child(
        &self,
    ) -> std::sync::MutexGuard<'_, Box<dyn portable_pty::Child + Send + Sync>> {
        self.child.lock().unwrap_or_else(|e| {
            warn!(worker = %self.name, "pty child lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl PtyChild for NativePtyChild {
    fn pid(&self) -> Option<u32> {
        self.lock_child().process_id()
    }

    fn is_running(&self) -> bool {
        matches!(self.lock_child().try_wait(), Ok(None))
    }

    fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn write(&self, bytes: &[u8]) -> Result<(), SpawnError> {
        self.writer
            .send(bytes.to_vec())
            .map_err(|_| SpawnError::Write(std::io::Error::other("pty writer channel closed")))
    }

    fn stop(&self) -> Result<(), SpawnError> {
        let mut bytes = b"/exit".to_vec();
        bytes.push(b'\r');
        self.write(&bytes)
    }

    fn kill(&self) -> Result<(), SpawnError> {
        self.lock_child()
            .kill()
            .map_err(|e| SpawnError::Launch {
                name: self.name.clone(),
                command: "kill".into(),
                source: e,
            })
    }

    fn output(&self, limit: Option<usize>) -> Vec<String> {
        let captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        match limit {
            Some(n) => captured.lines.iter().rev().take(n).rev().cloned().collect(),
            None => captured.lines.iter().cloned().collect(),
        }
    }

    fn raw_output(&self) -> String {
        self.captured.lock().unwrap_or_else(|e| e.into_inner()).raw.clone()
    }

    fn subscribe_output(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.output_tx.subscribe()
    }

    fn take_control_requests(&self) -> Vec<ControlRequest> {
        let mut captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut captured.control)
    }
}

/// Launches workers as real PTY-backed child processes.
pub struct NativePtyLauncher;

impl PtyLauncher for NativePtyLauncher {
    fn launch(&self, spec: &PtyLaunchSpec) -> Result<Arc<dyn PtyChild>, SpawnError> {
        std::fs::create_dir_all(&spec.logs_dir)?;
        let log_path = spec.logs_dir.join(format!("{}.log", spec.name));
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| SpawnError::LogFile(log_path.clone(), e))?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SpawnError::Launch {
                name: spec.name.clone(),
                command: spec.command.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        let mut command = CommandBuilder::new(&spec.command);
        for arg in &spec.args {
            command.arg(arg);
        }
        command.cwd(&spec.cwd);
        command.env("RELAY_SOCKET_PATH", &spec.socket_path);

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| SpawnError::Launch {
                name: spec.name.clone(),
                command: spec.command.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        debug!(worker = %spec.name, command = %spec.command, ?spec.args, "spawned pty worker");

        let child = Arc::new(Mutex::new(child));
        let master = Arc::new(Mutex::new(pair.master));

        let captured = Arc::new(Mutex::new(Captured::new()));
        let (output_tx, _) = tokio::sync::broadcast::channel(256);

        let mut reader = master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .try_clone_reader()
            .map_err(|e| SpawnError::Launch {
                name: spec.name.clone(),
                command: spec.command.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        let reader_thread = {
            let captured = captured.clone();
            let output_tx = output_tx.clone();
            let parse_control = spec.parse_control_lines;
            let worker_name = spec.name.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            let chunk = String::from_utf8_lossy(&buf[..n]);
                            let _ = log_file.write_all(chunk.as_bytes());
                            let _ = log_file.flush();

                            let new_lines = {
                                let mut c = captured.lock().unwrap_or_else(|e| e.into_inner());
                                c.push_chunk(&chunk, parse_control)
                            };
                            for line in new_lines {
                                let _ = output_tx.send(line);
                            }
                        }
                        Err(e) => {
                            debug!(worker = %worker_name, "pty reader stopped: {e}");
                            break;
                        }
                    }
                }
            })
        };

        let (write_tx, write_rx) = flume::bounded::<Vec<u8>>(256);
        let writer_thread = {
            let master = master.clone();
            std::thread::spawn(move || {
                let mut writer = match master.lock().unwrap_or_else(|e| e.into_inner()).take_writer() {
                    Ok(w) => w,
                    Err(_) => return,
                };
                while let Ok(data) = write_rx.recv() {
                    if writer.write_all(&data).is_err() {
                        break;
                    }
                    let _ = writer.flush();
                }
            })
        };

        Ok(Arc::new(NativePtyChild {
            name: spec.name.clone(),
            log_path,
            child,
            master,
            writer: write_tx,
            captured,
            output_tx,
            _reader_thread: Some(reader_thread),
            _writer_thread: Some(writer_thread),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_chunk_returns_only_the_newly_completed_lines() {
        let mut captured = Captured::new();
        let first = captured.push_chunk("line1\nline2\n", false);
        assert_eq!(first, vec!["line1".to_string(), "line2".to_string()]);

        let second = captured.push_chunk("line3\n", false);
        assert_eq!(second, vec!["line3".to_string()]);
        assert_eq!(captured.lines.len(), 3);
    }

    #[test]
    fn push_chunk_keeps_returning_new_lines_once_the_ring_is_full() {
        let mut captured = Captured::new();
        for i in 0..OUTPUT_RING_CAPACITY {
            let returned = captured.push_chunk(&format!("line{i}\n"), false);
            assert_eq!(returned, vec![format!("line{i}")]);
        }
        assert_eq!(captured.lines.len(), OUTPUT_RING_CAPACITY);

        // The ring is now at capacity, so every further push evicts the
        // oldest line and keeps the length constant -- a length-delta would
        // see `before == after == OUTPUT_RING_CAPACITY` and wrongly report
        // no new lines.
        let returned = captured.push_chunk("overflow\n", false);
        assert_eq!(returned, vec!["overflow".to_string()]);
        assert_eq!(captured.lines.len(), OUTPUT_RING_CAPACITY);
        assert_eq!(captured.lines.back(), Some(&"overflow".to_string()));
    }

    #[test]
    fn push_chunk_buffers_partial_lines_across_calls() {
        let mut captured = Captured::new();
        let returned = captured.push_chunk("partial-", false);
        assert!(returned.is_empty());

        let returned = captured.push_chunk("line\n", false);
        assert_eq!(returned, vec!["partial-line".to_string()]);
    }
}
