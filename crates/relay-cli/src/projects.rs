//! Loads the set of projects the bridge fans out to and the spawner can
//! launch workers in.
//!
//! Per-project identity (id, path, socket path, lead, CLI kind) is supplied
//! by the operator, not read from [`relay_core::Config`] -- that file governs
//! the bridge's and spawner's own operational knobs, not the project set.
//! This is the thin plumbing layer the binary uses to get from "a TOML file
//! on disk" to the `Vec<ProjectConfig>` the library crates expect; it carries
//! no behavior of its own.

use std::path::{Path, PathBuf};

use relay_core::types::{CliKind, ProjectConfig};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ProjectsError {
    #[error("failed to read projects file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse projects file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
struct ProjectsFile {
    #[serde(default)]
    project: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    id: String,
    path: PathBuf,
    lead_name: String,
    #[serde(default = "default_cli_kind")]
    cli_kind: String,
}

fn default_cli_kind() -> String {
    "claude".into()
}

/// Default location when neither `--projects` nor `RELAY_BRIDGE_PROJECTS` is set.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay-bridge")
        .join("projects.toml")
}

/// Loads project configs from `path`. A missing file yields an empty list
/// (the binary can still start up with nothing to fan out to) rather than an
/// error, matching [`relay_core::Config::load`]'s "absent file -> defaults"
/// posture.
pub fn load(path: &Path) -> Result<Vec<ProjectConfig>, ProjectsError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no projects file found, starting with no projects");
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path).map_err(|e| ProjectsError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let parsed: ProjectsFile = toml::from_str(&text).map_err(|e| ProjectsError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(parsed
        .project
        .into_iter()
        .map(|entry| {
            ProjectConfig::new(
                entry.id,
                entry.path,
                entry.lead_name,
                CliKind::from_command(&entry.cli_kind),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn parses_projects_with_defaulted_cli_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.toml");
        std::fs::write(
            &path,
            r#"
            [[project]]
            id = "web"
            path = "/tmp/web"
            lead_name = "web-lead"

            [[project]]
            id = "api"
            path = "/tmp/api"
            lead_name = "api-lead"
            cli_kind = "codex"
            "#,
        )
        .unwrap();

        let projects = load(&path).unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].id, "web");
        assert_eq!(projects[0].cli_kind, CliKind::Claude);
        assert_eq!(projects[1].cli_kind, CliKind::Codex);
    }
}
