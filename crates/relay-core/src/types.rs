use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CliKind
// ---------------------------------------------------------------------------

/// Which coding-agent CLI family a project's agents run under.
///
/// Drives argument rewriting in `relay-spawner` (see `cli_adapter`) and the
/// subagent-vs-process decision for shadow pairing. `Other` covers any binary
/// not covered by a built-in adapter; it is spawned verbatim with no rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliKind {
    Claude,
    Codex,
    Gemini,
    OpenCode,
    Other(String),
}

impl CliKind {
    /// Parses a CLI kind from a command-line token such as `"claude"` or
    /// `"codex-exp"`, matching on family prefix rather than exact equality so
    /// versioned binary names (`claude-3`, `codex-cli`) still resolve.
    pub fn from_command(command: &str) -> Self {
        if command.starts_with("claude") {
            CliKind::Claude
        } else if command.starts_with("codex") {
            CliKind::Codex
        } else if command.starts_with("gemini") {
            CliKind::Gemini
        } else if command.starts_with("opencode") {
            CliKind::OpenCode
        } else {
            CliKind::Other(command.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CliKind::Claude => "claude",
            CliKind::Codex => "codex",
            CliKind::Gemini => "gemini",
            CliKind::OpenCode => "opencode",
            CliKind::Other(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for CliKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// Caller-supplied, immutable description of one project the bridge fans out
/// to and the spawner can launch workers in.
///
/// `id` must be unique across the set of projects handed to a single
/// `Bridge`; the bridge keys its connection table on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub project_root: std::path::PathBuf,
    pub socket_path: std::path::PathBuf,
    pub lead_name: String,
    pub cli_kind: CliKind,
}

impl ProjectConfig {
    pub fn new(
        id: impl Into<String>,
        project_root: impl Into<std::path::PathBuf>,
        lead_name: impl Into<String>,
        cli_kind: CliKind,
    ) -> Self {
        let project_root = project_root.into();
        let socket_path = project_root.join(".agent-relay").join("relay.sock");
        Self {
            id: id.into(),
            project_root,
            socket_path,
            lead_name: lead_name.into(),
            cli_kind,
        }
    }

    pub fn agents_path(&self) -> std::path::PathBuf {
        self.project_root.join("team").join("agents.json")
    }

    pub fn logs_dir(&self) -> std::path::PathBuf {
        self.project_root.join("team").join("worker-logs")
    }

    pub fn workers_path(&self) -> std::path::PathBuf {
        self.project_root.join("team").join("workers.json")
    }
}
