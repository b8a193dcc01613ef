//! Cross-module coordination properties: event glob delivery, status
//! monotonicity, and the delegate/report lifecycle through the typed
//! tool surface.

use std::sync::Arc;

use routa_core::coordination::tools::{
    CreateAgentArgs, DelegateTaskArgs, SubscribeArgs, WakeOrCreateArgs,
};
use routa_core::coordination::{
    AgentStatus, AgentTools, CompletionReport, CoordinationStore, Event, EventBus, Task,
    TaskStatus,
};

fn runtime() -> (Arc<AgentTools>, Arc<CoordinationStore>, Arc<EventBus>, String) {
    let store = Arc::new(CoordinationStore::new());
    let bus = Arc::new(EventBus::new());
    let routa_id = store.initialize_workspace("ws-int").unwrap();
    let tools = Arc::new(AgentTools::new(Arc::clone(&store), Arc::clone(&bus)));
    (tools, store, bus, routa_id)
}

#[test]
fn agent_glob_subscription_filters_task_events() {
    let (_, _, bus, _) = runtime();
    let sub = bus.subscribe("watcher", "watcher", vec!["agent.*".into()], false);

    bus.publish(Event::new("agent.created"));
    bus.publish(Event::new("agent.updated"));
    bus.publish(Event::new("task.created"));
    bus.publish(Event::new("agent"));

    let delivered: Vec<String> = sub.recv_all().into_iter().map(|e| e.event_type).collect();
    assert_eq!(delivered, vec!["agent.created", "agent.updated"]);
}

#[test]
fn status_monotonicity_through_full_lifecycle() {
    let (tools, store, _, routa_id) = runtime();

    let created = tools.create_agent(CreateAgentArgs {
        name: "worker".into(),
        role: "CRAFTER".into(),
        workspace_id: "ws-int".into(),
        parent_id: Some(routa_id.clone()),
        model_tier: None,
    });
    let agent_id = serde_json::from_str::<serde_json::Value>(&created.data.unwrap()).unwrap()
        ["agent_id"]
        .as_str()
        .unwrap()
        .to_string();

    let task = Task::new("lifecycle", "ws-int");
    let task_id = task.id.clone();
    store.save_task(task).unwrap();

    assert!(tools
        .delegate_task(DelegateTaskArgs {
            agent_id: agent_id.clone(),
            task_id: task_id.clone(),
            caller_agent_id: routa_id.clone(),
        })
        .success);
    assert_eq!(store.get_task(&task_id).unwrap().status, TaskStatus::InProgress);
    assert_eq!(store.get_agent(&agent_id).unwrap().status, AgentStatus::Active);

    assert!(tools
        .report_to_parent(CompletionReport {
            agent_id: agent_id.clone(),
            task_id: task_id.clone(),
            summary: "all good".into(),
            files_modified: vec![],
            success: true,
        })
        .success);
    assert_eq!(store.get_task(&task_id).unwrap().status, TaskStatus::Completed);
    assert_eq!(
        store.get_agent(&agent_id).unwrap().status,
        AgentStatus::Completed
    );

    // Nothing may move a terminal task or agent backwards.
    assert!(store
        .update_task_status(&task_id, TaskStatus::Pending, None)
        .is_err());
    assert!(store
        .update_task_status(&task_id, TaskStatus::InProgress, None)
        .is_err());
    assert!(store
        .update_agent_status(&agent_id, AgentStatus::Active)
        .is_err());
}

#[test]
fn delegate_and_report_emit_matching_events() {
    let (tools, store, bus, routa_id) = runtime();
    let sub = bus.subscribe("watcher", "watcher", vec!["task.*".into()], false);

    let task = Task::new("observed", "ws-int");
    let task_id = task.id.clone();
    store.save_task(task).unwrap();

    let outcome = tools.wake_or_create_task_agent(WakeOrCreateArgs {
        task_id: task_id.clone(),
        context_message: "start now".into(),
        caller_agent_id: routa_id.clone(),
        workspace_id: "ws-int".into(),
        agent_name: Some("observed-worker".into()),
        model_tier: None,
    });
    assert!(outcome.success, "{:?}", outcome.error);
    let agent_id = serde_json::from_str::<serde_json::Value>(&outcome.data.unwrap()).unwrap()
        ["created_new"]
        .as_str()
        .unwrap()
        .to_string();

    tools.report_to_parent(CompletionReport {
        agent_id,
        task_id: task_id.clone(),
        summary: "observed done".into(),
        files_modified: vec!["src/observed.rs".into()],
        success: true,
    });

    let types: Vec<String> = sub.recv_all().into_iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec!["task.delegated", "task.completed"]);
}

#[test]
fn exclude_self_suppresses_own_events() {
    let (tools, _, bus, routa_id) = runtime();

    let outcome = tools.subscribe_to_events(SubscribeArgs {
        agent_id: routa_id.clone(),
        agent_name: "ROUTA".into(),
        event_types: vec!["*".into()],
        exclude_self: Some(true),
    });
    let sub_id = serde_json::from_str::<serde_json::Value>(&outcome.data.unwrap()).unwrap()
        ["subscription_id"]
        .as_str()
        .unwrap()
        .to_string();
    let sub = bus.subscriber(&sub_id).unwrap();

    bus.publish(Event::new("message.sent").with_source(&routa_id));
    bus.publish(Event::new("message.sent").with_source("someone-else"));

    let delivered = sub.recv_all();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].source_agent_id.as_deref(), Some("someone-else"));
}

#[tokio::test]
async fn concurrent_appends_preserve_per_agent_order() {
    use routa_core::coordination::{ConversationMessage, MessageKind};

    let (_, store, _, routa_id) = runtime();

    let mut handles = Vec::new();
    for batch in 0..4 {
        let store = Arc::clone(&store);
        let routa_id = routa_id.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                store
                    .append_message(ConversationMessage::new(
                        &routa_id,
                        format!("writer-{}", batch),
                        format!("{}:{}", batch, i),
                        MessageKind::System,
                    ))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let messages = store.read_conversation(&routa_id, None, true).unwrap();
    assert_eq!(messages.len(), 100);

    // Within each writer the sequence must be strictly increasing.
    for batch in 0..4 {
        let prefix = format!("{}:", batch);
        let sequence: Vec<usize> = messages
            .iter()
            .filter(|m| m.content.starts_with(&prefix))
            .map(|m| m.content.split(':').nth(1).unwrap().parse().unwrap())
            .collect();
        assert_eq!(sequence.len(), 25);
        assert!(sequence.windows(2).all(|w| w[0] < w[1]));
    }
}
