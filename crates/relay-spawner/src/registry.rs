//! Reads `team/agents.json`, the project's own record of which agents have
//! announced themselves, to drive the registration gate a freshly spawned
//! worker must clear before a task is handed to it.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: AgentsCollection,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgentsCollection {
    List(Vec<AgentEntry>),
    Map(HashMap<String, AgentEntry>),
}

impl Default for AgentsCollection {
    fn default() -> Self {
        AgentsCollection::List(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct AgentEntry {
    name: String,
    #[serde(flatten)]
    #[allow(dead_code)]
    rest: serde_json::Map<String, Value>,
}

/// Returns `true` once `worker_name` shows up as a registered agent.
///
/// A missing or unparsable file is treated as "not yet registered" rather
/// than an error -- the registration-gate poll in
/// [`Spawner::spawn`](crate::spawner::Spawner::spawn) just keeps waiting
/// until its deadline.
pub fn is_registered(agents_path: &Path, worker_name: &str) -> bool {
    let Ok(text) = std::fs::read_to_string(agents_path) else {
        return false;
    };
    let Ok(parsed) = serde_json::from_str::<AgentsFile>(&text) else {
        return false;
    };
    let entries = match parsed.agents {
        AgentsCollection::List(v) => v,
        AgentsCollection::Map(m) => m.into_values().collect(),
    };
    entries.iter().any(|a| a.name == worker_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_registered() {
        assert!(!is_registered(Path::new("/nonexistent/agents.json"), "w1"));
    }

    #[test]
    fn finds_worker_in_list_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, r#"{"agents":[{"name":"w1","role":"lead"}]}"#).unwrap();
        assert!(is_registered(&path, "w1"));
        assert!(!is_registered(&path, "w2"));
    }

    #[test]
    fn finds_worker_in_map_form() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, r#"{"agents":{"a1":{"name":"w1","pid":42}}}"#).unwrap();
        assert!(is_registered(&path, "w1"));
    }

    #[test]
    fn malformed_json_is_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(!is_registered(&path, "w1"));
    }
}
