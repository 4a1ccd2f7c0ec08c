//! Per-CLI-family argument rewriting and executable resolution.
//!
//! The Spawner receives a worker's CLI invocation as a single string
//! (`"claude --model sonnet"`); before launching it, the command name is
//! resolved against `PATH` and the argument list is rewritten per the
//! conventions of the family it belongs to.

use std::path::{Path, PathBuf};

use relay_core::types::CliKind;

/// A per-CLI-family strategy for rewriting a worker's argument list.
///
/// Rewriting is idempotent: running it twice over an already-rewritten
/// argument list must not duplicate flags.
pub trait CliAdapter: Send + Sync {
    fn cli_kind(&self) -> CliKind;
    fn rewrite_args(&self, args: &mut Vec<String>);
}

struct ClaudeAdapter;

impl CliAdapter for ClaudeAdapter {
    fn cli_kind(&self) -> CliKind {
        CliKind::Claude
    }

    fn rewrite_args(&self, args: &mut Vec<String>) {
        let flag = "--dangerously-skip-permissions";
        if !args.iter().any(|a| a == flag) {
            args.push(flag.to_string());
        }
    }
}

struct CodexAdapter;

impl CliAdapter for CodexAdapter {
    fn cli_kind(&self) -> CliKind {
        CliKind::Codex
    }

    fn rewrite_args(&self, args: &mut Vec<String>) {
        let flag = "--dangerously-bypass-approvals-and-sandbox";
        if !args.iter().any(|a| a == flag) {
            args.push(flag.to_string());
        }
    }
}

struct PassthroughAdapter(CliKind);

impl CliAdapter for PassthroughAdapter {
    fn cli_kind(&self) -> CliKind {
        self.0.clone()
    }

    fn rewrite_args(&self, _args: &mut Vec<String>) {}
}

/// Picks the adapter for a worker's command name, matching by family prefix
/// via [`CliKind::from_command`]. Unknown binaries run with no rewriting.
pub fn adapter_for_command(command_name: &str) -> Box<dyn CliAdapter> {
    match CliKind::from_command(command_name) {
        CliKind::Claude => Box::new(ClaudeAdapter),
        CliKind::Codex => Box::new(CodexAdapter),
        other => Box::new(PassthroughAdapter(other)),
    }
}

/// Resolves `command_name` to an executable path, searching `PATH` unless
/// the name already contains a path separator. Returns `None` if nothing
/// executable is found, in which case the caller falls back to the raw name
/// and lets the OS report the failure.
pub fn resolve_executable(command_name: &str) -> Option<PathBuf> {
    if command_name.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(command_name);
        return is_executable(&candidate).then_some(candidate);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(command_name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_adapter_is_idempotent() {
        let adapter = adapter_for_command("claude");
        let mut args = vec!["--model".to_string(), "sonnet".to_string()];
        adapter.rewrite_args(&mut args);
        adapter.rewrite_args(&mut args);
        assert_eq!(
            args.iter().filter(|a| a.as_str() == "--dangerously-skip-permissions").count(),
            1
        );
    }

    #[test]
    fn codex_adapter_appends_bypass_flag() {
        let adapter = adapter_for_command("codex-exp");
        let mut args = vec![];
        adapter.rewrite_args(&mut args);
        assert_eq!(args, vec!["--dangerously-bypass-approvals-and-sandbox".to_string()]);
    }

    #[test]
    fn unknown_cli_is_untouched() {
        let adapter = adapter_for_command("my-custom-agent");
        let mut args = vec!["--flag".to_string()];
        adapter.rewrite_args(&mut args);
        assert_eq!(args, vec!["--flag".to_string()]);
    }

    #[test]
    fn resolves_sh_from_path() {
        assert!(resolve_executable("sh").is_some());
    }

    #[test]
    fn unresolvable_command_is_none() {
        assert!(resolve_executable("definitely-not-a-real-binary-xyz").is_none());
    }
}
