//! The A2A command surface end to end: a remote client bootstraps a
//! workspace, creates and delegates work, and reads state back, all
//! through JSON message payloads.

use std::sync::Arc;

use routa_core::coordination::{AgentTools, CoordinationStore, EventBus, TaskStatus};
use routa_core::CommandDispatcher;

fn dispatcher() -> (CommandDispatcher, Arc<CoordinationStore>) {
    let store = Arc::new(CoordinationStore::new());
    let tools = Arc::new(AgentTools::new(Arc::clone(&store), Arc::new(EventBus::new())));
    (CommandDispatcher::new(tools), store)
}

fn json(reply: &str) -> serde_json::Value {
    serde_json::from_str(reply).unwrap_or_else(|_| panic!("expected JSON reply, got: {}", reply))
}

#[test]
fn remote_session_full_flow() {
    let (dispatcher, store) = dispatcher();

    // Bootstrap the workspace.
    let reply = dispatcher.dispatch(r#"{"command": "initialize", "workspace_id": "ws-a2a"}"#);
    let routa_id = json(&reply)["routa_id"].as_str().unwrap().to_string();

    // Create a task record directly.
    let reply = dispatcher.dispatch(
        r#"{"command": "create_task", "title": "Index the corpus", "workspace_id": "ws-a2a",
            "objective": "Build the search index", "scope": ["src/index.rs"],
            "acceptance_criteria": ["index builds"], "verification_commands": ["cargo test index"]}"#,
    );
    let task_id = json(&reply)["task_id"].as_str().unwrap().to_string();

    // Wake-or-create spawns a CRAFTER and delegates.
    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "wake_or_create_task_agent", "task_id": "{}",
            "context_message": "Please start", "caller_agent_id": "{}",
            "workspace_id": "ws-a2a"}}"#,
        task_id, routa_id
    ));
    let agent_id = json(&reply)["created_new"].as_str().unwrap().to_string();
    assert_eq!(store.get_task(&task_id).unwrap().status, TaskStatus::InProgress);

    // Second wake routes a message instead of creating.
    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "wake_or_create_task_agent", "task_id": "{}",
            "context_message": "Any update?", "caller_agent_id": "{}",
            "workspace_id": "ws-a2a"}}"#,
        task_id, routa_id
    ));
    assert_eq!(json(&reply)["woke"].as_str().unwrap(), agent_id);

    // Roster shows all three agents' roles.
    let roster = dispatcher.dispatch(r#"{"command": "list_agents", "workspace_id": "ws-a2a"}"#);
    assert!(roster.contains("ROUTA"));
    assert!(roster.contains("CRAFTER"));

    // Worker reports completion back to its parent.
    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "report_to_parent", "agent_id": "{}", "task_id": "{}",
            "summary": "Index built and tested", "files_modified": ["src/index.rs"],
            "success": true}}"#,
        agent_id, task_id
    ));
    assert!(reply.contains(&routa_id));
    assert_eq!(store.get_task(&task_id).unwrap().status, TaskStatus::Completed);

    // The parent's conversation now carries the report and both wake
    // messages routed through the worker's conversation.
    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "read_agent_conversation", "agent_id": "{}"}}"#,
        routa_id
    ));
    assert!(reply.contains("Index built and tested"));

    // Event subscription round trip.
    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "subscribe_to_events", "agent_id": "{}", "agent_name": "ROUTA",
            "event_types": ["task.*"], "exclude_self": true}}"#,
        routa_id
    ));
    let sub_id = json(&reply)["subscription_id"].as_str().unwrap().to_string();
    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "unsubscribe_from_events", "subscription_id": "{}"}}"#,
        sub_id
    ));
    assert!(reply.contains(&sub_id));
}

#[test]
fn error_replies_are_structured() {
    let (dispatcher, _) = dispatcher();

    // Unknown command.
    let reply = dispatcher.dispatch(r#"{"command": "fly_to_moon"}"#);
    let value = json(&reply);
    assert_eq!(value["success"], serde_json::json!(false));

    // Missing required field.
    let reply = dispatcher.dispatch(r#"{"command": "get_agent_status"}"#);
    let value = json(&reply);
    assert_eq!(value["success"], serde_json::json!(false));

    // Referencing a missing entity.
    let reply =
        dispatcher.dispatch(r#"{"command": "get_agent_status", "agent_id": "ghost"}"#);
    let value = json(&reply);
    assert_eq!(value["success"], serde_json::json!(false));
    assert!(value["error"].as_str().unwrap().contains("ghost"));

    // Malformed JSON gets the plain-text remediation reply.
    let reply = dispatcher.dispatch("not json at all");
    assert!(reply.starts_with("Error: "));
    assert!(reply.contains("Expected JSON format"));
}

#[test]
fn create_agent_cannot_add_second_routa() {
    let (dispatcher, store) = dispatcher();
    dispatcher.dispatch(r#"{"command": "initialize", "workspace_id": "ws-a2a"}"#);

    let reply = dispatcher.dispatch(
        r#"{"command": "create_agent", "name": "usurper", "role": "ROUTA",
            "workspace_id": "ws-a2a"}"#,
    );
    let value = json(&reply);
    assert_eq!(value["success"], serde_json::json!(false));
    assert!(value["error"].as_str().unwrap().contains("already has a ROUTA"));
    assert_eq!(store.list_agents("ws-a2a").len(), 1);
}

#[test]
fn send_message_to_unassigned_task_fails() {
    let (dispatcher, _) = dispatcher();
    dispatcher.dispatch(r#"{"command": "initialize", "workspace_id": "ws-a2a"}"#);
    let reply = dispatcher.dispatch(
        r#"{"command": "create_task", "title": "Orphan", "workspace_id": "ws-a2a"}"#,
    );
    let task_id = json(&reply)["task_id"].as_str().unwrap().to_string();

    let reply = dispatcher.dispatch(&format!(
        r#"{{"command": "send_message_to_task_agent", "task_id": "{}",
            "message": "hello?", "caller_agent_id": "nobody"}}"#,
        task_id
    ));
    let value = json(&reply);
    assert_eq!(value["success"], serde_json::json!(false));
    assert!(value["error"].as_str().unwrap().contains("NOT_ASSIGNED"));
}
