//! Agent-to-agent command dispatch.
//!
//! Inbound payloads are JSON objects with a `command` field; replies are
//! plain strings: the tool's data on success, a JSON error object
//! otherwise. The command surface is the full coordination-tool set plus
//! `initialize` and `create_task`.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::coordination::tools::{AgentTools, ToolOutcome};
use crate::coordination::types::Task;

const EXPECTED_FORMAT: &str = r#"{"command": "<name>", ...arguments}"#;

#[derive(Debug, Clone, Deserialize)]
struct CreateTaskArgs {
    title: String,
    workspace_id: String,

    #[serde(default)]
    objective: Option<String>,

    #[serde(default)]
    scope: Vec<String>,

    #[serde(default)]
    acceptance_criteria: Vec<String>,

    #[serde(default)]
    verification_commands: Vec<String>,
}

pub struct CommandDispatcher {
    tools: Arc<AgentTools>,
}

impl CommandDispatcher {
    pub fn new(tools: Arc<AgentTools>) -> Self {
        Self { tools }
    }

    /// Handle one inbound message payload and produce the reply text.
    pub fn dispatch(&self, payload: &str) -> String {
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                return format!(
                    "Error: {}\n\nExpected JSON format: {}",
                    err, EXPECTED_FORMAT
                );
            }
        };

        let Some(command) = value.get("command").and_then(|c| c.as_str()) else {
            return ToolOutcome::err(format!(
                "Missing 'command' field. Expected JSON format: {}",
                EXPECTED_FORMAT
            ))
            .into_reply();
        };
        debug!(command, "A2A command received");

        match command {
            "initialize" => self.initialize(&value).into_reply(),
            "create_task" => self.create_task(&value).into_reply(),
            other => self.tools.dispatch(other, &value).into_reply(),
        }
    }

    /// Create or return the workspace's ROUTA agent.
    fn initialize(&self, value: &serde_json::Value) -> ToolOutcome {
        let Some(workspace_id) = value.get("workspace_id").and_then(|w| w.as_str()) else {
            return ToolOutcome::err("Missing required field 'workspace_id'");
        };
        match self.tools.store().initialize_workspace(workspace_id) {
            Ok(routa_id) => {
                ToolOutcome::ok(serde_json::json!({ "routa_id": routa_id }).to_string())
            }
            Err(err) => err.into(),
        }
    }

    /// Write a task record directly, without markdown parsing.
    fn create_task(&self, value: &serde_json::Value) -> ToolOutcome {
        let args: CreateTaskArgs = match serde_json::from_value(value.clone()) {
            Ok(args) => args,
            Err(err) => return ToolOutcome::err(format!("Bad input: {}", err)),
        };

        let task = Task::new(&args.title, &args.workspace_id)
            .with_objective(args.objective.unwrap_or_default())
            .with_scope(args.scope)
            .with_acceptance_criteria(args.acceptance_criteria)
            .with_verification_commands(args.verification_commands);
        let task_id = task.id.clone();

        match self.tools.store().save_task(task) {
            Ok(()) => ToolOutcome::ok(serde_json::json!({ "task_id": task_id }).to_string()),
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::event_bus::EventBus;
    use crate::coordination::store::CoordinationStore;
    use crate::coordination::types::TaskStatus;

    fn dispatcher() -> (CommandDispatcher, Arc<CoordinationStore>) {
        let store = Arc::new(CoordinationStore::new());
        let bus = Arc::new(EventBus::new());
        let tools = Arc::new(AgentTools::new(Arc::clone(&store), bus));
        (CommandDispatcher::new(tools), store)
    }

    #[test]
    fn test_initialize_idempotent() {
        let (dispatcher, _) = dispatcher();

        let reply = dispatcher.dispatch(r#"{"command": "initialize", "workspace_id": "ws-1"}"#);
        let first: serde_json::Value = serde_json::from_str(&reply).unwrap();
        let routa_id = first["routa_id"].as_str().unwrap().to_string();

        let reply = dispatcher.dispatch(r#"{"command": "initialize", "workspace_id": "ws-1"}"#);
        let second: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(second["routa_id"].as_str().unwrap(), routa_id);
    }

    #[test]
    fn test_create_task_direct() {
        let (dispatcher, store) = dispatcher();
        let reply = dispatcher.dispatch(
            r#"{"command": "create_task", "title": "Wire the parser", "workspace_id": "ws-1",
                "objective": "Parse blocks", "scope": ["src/parser.rs"],
                "acceptance_criteria": ["parses"], "verification_commands": ["cargo test"]}"#,
        );
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        let task_id = value["task_id"].as_str().unwrap();

        let task = store.get_task(task_id).unwrap();
        assert_eq!(task.title, "Wire the parser");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.scope, vec!["src/parser.rs"]);
    }

    #[test]
    fn test_tool_command_passthrough() {
        let (dispatcher, _) = dispatcher();
        dispatcher.dispatch(r#"{"command": "initialize", "workspace_id": "ws-1"}"#);

        let reply = dispatcher.dispatch(r#"{"command": "list_agents", "workspace_id": "ws-1"}"#);
        assert!(reply.contains("ROUTA"));
    }

    #[test]
    fn test_malformed_json_reply() {
        let (dispatcher, _) = dispatcher();
        let reply = dispatcher.dispatch("{not json");
        assert!(reply.starts_with("Error: "));
        assert!(reply.contains("Expected JSON format"));
    }

    #[test]
    fn test_missing_command_field() {
        let (dispatcher, _) = dispatcher();
        let reply = dispatcher.dispatch(r#"{"workspace_id": "ws-1"}"#);
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["success"], serde_json::json!(false));
        assert!(value["error"].as_str().unwrap().contains("command"));
    }

    #[test]
    fn test_unknown_command() {
        let (dispatcher, _) = dispatcher();
        let reply = dispatcher.dispatch(r#"{"command": "sudo_rm"}"#);
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["success"], serde_json::json!(false));
        assert!(value["error"].as_str().unwrap().contains("sudo_rm"));
    }

    #[test]
    fn test_missing_required_field() {
        let (dispatcher, _) = dispatcher();
        let reply = dispatcher.dispatch(r#"{"command": "create_task", "title": "x"}"#);
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["success"], serde_json::json!(false));
        assert!(value["error"].as_str().unwrap().contains("workspace_id"));
    }
}
