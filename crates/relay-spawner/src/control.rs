//! Nested spawn/release requests parsed out of a worker's own output.
//!
//! Used only when the Spawner has no dashboard HTTP surface configured;
//! otherwise a worker asking to spawn or release another worker goes
//! through the dashboard API instead. A worker emits a control line by
//! printing `##RELAY-CONTROL## <json>` to its own stdout.

use serde::Deserialize;

use crate::worker::SpawnRequest;

const MARKER: &str = "##RELAY-CONTROL##";

#[derive(Debug, Clone)]
pub enum ControlRequest {
    Spawn(SpawnRequest),
    Release(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ControlLine {
    Spawn {
        name: String,
        cli: String,
        #[serde(default)]
        task: String,
        #[serde(default)]
        team: Option<String>,
    },
    Release {
        name: String,
    },
}

pub fn parse_control_line(line: &str) -> Option<ControlRequest> {
    let trimmed = line.trim();
    let payload = trimmed.strip_prefix(MARKER)?.trim();
    match serde_json::from_str::<ControlLine>(payload) {
        Ok(ControlLine::Spawn { name, cli, task, team }) => Some(ControlRequest::Spawn(SpawnRequest {
            name,
            cli,
            task,
            team,
            shadow_of: None,
            shadow_speak_on: None,
        })),
        Ok(ControlLine::Release { name }) => Some(ControlRequest::Release(name)),
        Err(e) => {
            tracing::warn!(line = %trimmed, error = %e, "malformed control line, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spawn_request() {
        let line = r#"##RELAY-CONTROL## {"action":"spawn","name":"helper","cli":"claude","task":"review this"}"#;
        match parse_control_line(line) {
            Some(ControlRequest::Spawn(req)) => {
                assert_eq!(req.name, "helper");
                assert_eq!(req.cli, "claude");
                assert_eq!(req.task, "review this");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_release_request() {
        let line = "##RELAY-CONTROL## {\"action\":\"release\",\"name\":\"helper\"}";
        match parse_control_line(line) {
            Some(ControlRequest::Release(name)) => assert_eq!(name, "helper"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ignores_lines_without_marker() {
        assert!(parse_control_line("just some normal output").is_none());
    }

    #[test]
    fn ignores_malformed_json() {
        assert!(parse_control_line("##RELAY-CONTROL## not json").is_none());
    }
}
