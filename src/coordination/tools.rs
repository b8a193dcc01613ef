//! The typed coordination surface exposed to LLMs.
//!
//! Every operation takes a typed argument record and returns a
//! [`ToolOutcome`]; descriptors make the set dispatchable from
//! stringly-typed extractions and from the A2A command surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RoutaError;
use crate::tooling::{ParamSpec, ParamType, ToolDescriptor};

use super::event_bus::{Event, EventBus};
use super::store::CoordinationStore;
use super::types::{
    Agent, AgentRole, AgentStatus, CompletionReport, ConversationMessage, MessageKind, ModelTier,
    TaskStatus,
};

/// Result of one coordination-tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
        }
    }

    pub fn err(message: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }

    /// Wire reply: the data itself on success, a JSON error object otherwise.
    pub fn into_reply(self) -> String {
        if self.success {
            self.data.unwrap_or_default()
        } else {
            serde_json::json!({
                "success": false,
                "error": self.error.unwrap_or_else(|| "unknown error".into()),
            })
            .to_string()
        }
    }
}

impl From<RoutaError> for ToolOutcome {
    fn from(err: RoutaError) -> Self {
        Self::err(err)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListAgentsArgs {
    pub workspace_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentArgs {
    pub name: String,
    pub role: String,
    pub workspace_id: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub model_tier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentIdArgs {
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadConversationArgs {
    pub agent_id: String,

    #[serde(default)]
    pub last_n: Option<usize>,

    #[serde(default)]
    pub include_tool_calls: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageAgentArgs {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegateTaskArgs {
    pub agent_id: String,
    pub task_id: String,
    pub caller_agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WakeOrCreateArgs {
    pub task_id: String,
    pub context_message: String,
    pub caller_agent_id: String,
    pub workspace_id: String,

    #[serde(default)]
    pub agent_name: Option<String>,

    #[serde(default)]
    pub model_tier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskMessageArgs {
    pub task_id: String,
    pub message: String,
    pub caller_agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeArgs {
    pub agent_id: String,
    pub agent_name: String,
    pub event_types: Vec<String>,

    #[serde(default)]
    pub exclude_self: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeArgs {
    pub subscription_id: String,
}

pub struct AgentTools {
    store: Arc<CoordinationStore>,
    bus: Arc<EventBus>,
}

impl AgentTools {
    pub fn new(store: Arc<CoordinationStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &Arc<CoordinationStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Newline-formatted roster of a workspace's agents.
    pub fn list_agents(&self, args: ListAgentsArgs) -> ToolOutcome {
        let agents = self.store.list_agents(&args.workspace_id);
        if agents.is_empty() {
            return ToolOutcome::ok(format!("No agents in workspace {}", args.workspace_id));
        }
        let roster = agents
            .iter()
            .map(|a| {
                format!(
                    "{} | {} | {} | {}",
                    a.id,
                    a.name,
                    a.role.as_str(),
                    a.status.as_str()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        ToolOutcome::ok(roster)
    }

    pub fn create_agent(&self, args: CreateAgentArgs) -> ToolOutcome {
        let role = match AgentRole::parse(&args.role) {
            Ok(role) => role,
            Err(err) => return err.into(),
        };

        let mut agent = Agent::new(&args.name, role, &args.workspace_id);
        if let Some(parent_id) = &args.parent_id {
            agent = agent.with_parent(parent_id);
        }
        if let Some(tier) = &args.model_tier {
            match ModelTier::parse(tier) {
                Ok(tier) => agent = agent.with_model_tier(tier),
                Err(err) => return err.into(),
            }
        }

        let id = agent.id.clone();
        if let Err(err) = self.store.save_agent(agent) {
            return err.into();
        }

        info!(agent_id = %id, name = %args.name, role = %args.role, "Agent created");
        self.bus.publish(
            Event::new("agent.created")
                .with_payload("agent_id", &id)
                .with_payload("name", &args.name)
                .with_payload("workspace_id", &args.workspace_id)
                .with_source(args.parent_id.as_deref().unwrap_or(&id)),
        );
        ToolOutcome::ok(serde_json::json!({ "agent_id": id }).to_string())
    }

    pub fn get_agent_status(&self, args: AgentIdArgs) -> ToolOutcome {
        match self.store.get_agent(&args.agent_id) {
            Ok(agent) => ToolOutcome::ok(format!(
                "status: {}\nrole: {}\nparent: {}",
                agent.status.as_str(),
                agent.role.as_str(),
                agent.parent_id.as_deref().unwrap_or("none")
            )),
            Err(err) => err.into(),
        }
    }

    /// Latest objective, last visible message, and task count for an agent.
    pub fn get_agent_summary(&self, args: AgentIdArgs) -> ToolOutcome {
        if let Err(err) = self.store.get_agent(&args.agent_id) {
            return err.into();
        }

        let tasks = self.store.tasks_for_agent(&args.agent_id);
        let objective = tasks
            .last()
            .map(|t| t.objective.clone())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "none".into());

        let last_message = self
            .store
            .read_conversation(&args.agent_id, Some(1), false)
            .ok()
            .and_then(|msgs| msgs.into_iter().next_back())
            .map(|m| m.content)
            .unwrap_or_else(|| "none".into());

        ToolOutcome::ok(format!(
            "objective: {}\nlast_message: {}\ntask_count: {}",
            objective,
            last_message,
            tasks.len()
        ))
    }

    pub fn read_agent_conversation(&self, args: ReadConversationArgs) -> ToolOutcome {
        match self.store.read_conversation(
            &args.agent_id,
            args.last_n,
            args.include_tool_calls.unwrap_or(false),
        ) {
            Ok(messages) => {
                if messages.is_empty() {
                    return ToolOutcome::ok("No messages");
                }
                let formatted = messages
                    .iter()
                    .map(|m| format!("[{:?}] {}: {}", m.kind, m.from_agent_id, m.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolOutcome::ok(formatted)
            }
            Err(err) => err.into(),
        }
    }

    pub fn message_agent(&self, args: MessageAgentArgs) -> ToolOutcome {
        let message = ConversationMessage::new(
            &args.to_agent_id,
            &args.from_agent_id,
            &args.message,
            MessageKind::User,
        );
        if let Err(err) = self.store.append_message(message) {
            return err.into();
        }

        debug!(from = %args.from_agent_id, to = %args.to_agent_id, "Message routed");
        self.bus.publish(
            Event::new("message.sent")
                .with_payload("from_agent_id", &args.from_agent_id)
                .with_payload("to_agent_id", &args.to_agent_id)
                .with_source(&args.from_agent_id),
        );
        ToolOutcome::ok(format!("Message delivered to {}", args.to_agent_id))
    }

    /// Assign a task: task → IN_PROGRESS, agent → ACTIVE.
    pub fn delegate_task(&self, args: DelegateTaskArgs) -> ToolOutcome {
        if let Err(err) =
            self.store
                .update_task_status(&args.task_id, TaskStatus::InProgress, Some(&args.agent_id))
        {
            return err.into();
        }
        if let Err(err) = self
            .store
            .update_agent_status(&args.agent_id, AgentStatus::Active)
        {
            return err.into();
        }

        info!(task_id = %args.task_id, agent_id = %args.agent_id, "Task delegated");
        self.bus.publish(
            Event::new("task.delegated")
                .with_payload("task_id", &args.task_id)
                .with_payload("agent_id", &args.agent_id)
                .with_source(&args.caller_agent_id),
        );
        ToolOutcome::ok(format!(
            "Task {} delegated to {}",
            args.task_id, args.agent_id
        ))
    }

    /// Terminal report from a worker: task → COMPLETED/FAILED, agent →
    /// COMPLETED, summary appended to the parent's conversation.
    pub fn report_to_parent(&self, report: CompletionReport) -> ToolOutcome {
        let agent = match self.store.get_agent(&report.agent_id) {
            Ok(agent) => agent,
            Err(err) => return err.into(),
        };
        let parent_id = match &agent.parent_id {
            Some(parent_id) => parent_id.clone(),
            None => {
                return ToolOutcome::err(format!(
                    "Agent {} has no parent to report to",
                    report.agent_id
                ));
            }
        };

        let task_status = if report.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if let Err(err) = self.store.update_task_status(&report.task_id, task_status, None) {
            return err.into();
        }
        if let Err(err) = self
            .store
            .update_agent_status(&report.agent_id, AgentStatus::Completed)
        {
            return err.into();
        }

        let mut summary = format!(
            "[{}] Task {}: {}",
            if report.success { "DONE" } else { "FAILED" },
            report.task_id,
            report.summary
        );
        if !report.files_modified.is_empty() {
            summary.push_str(&format!(
                "\nFiles modified: {}",
                report.files_modified.join(", ")
            ));
        }
        if let Err(err) = self.store.append_message(ConversationMessage::new(
            &parent_id,
            &report.agent_id,
            summary,
            MessageKind::User,
        )) {
            return err.into();
        }

        info!(
            task_id = %report.task_id,
            agent_id = %report.agent_id,
            success = report.success,
            "Completion reported"
        );
        self.bus.publish(
            Event::new("task.completed")
                .with_payload("task_id", &report.task_id)
                .with_payload("agent_id", &report.agent_id)
                .with_payload("success", report.success.to_string())
                .with_source(&report.agent_id),
        );
        ToolOutcome::ok(format!("Report delivered to {}", parent_id))
    }

    /// Wake the task's assignee with a message, or create a fresh CRAFTER
    /// and delegate the task to it.
    pub fn wake_or_create_task_agent(&self, args: WakeOrCreateArgs) -> ToolOutcome {
        let task = match self.store.get_task(&args.task_id) {
            Ok(task) => task,
            Err(err) => return err.into(),
        };

        if let Some(assignee) = &task.assigned_to {
            let outcome = self.message_agent(MessageAgentArgs {
                from_agent_id: args.caller_agent_id.clone(),
                to_agent_id: assignee.clone(),
                message: args.context_message.clone(),
            });
            if !outcome.success {
                return outcome;
            }
            return ToolOutcome::ok(
                serde_json::json!({ "woke": assignee, "task_id": args.task_id }).to_string(),
            );
        }

        let name = args
            .agent_name
            .clone()
            .unwrap_or_else(|| format!("crafter-{}", &args.task_id[..args.task_id.len().min(8)]));
        let created = self.create_agent(CreateAgentArgs {
            name,
            role: AgentRole::Crafter.as_str().into(),
            workspace_id: args.workspace_id.clone(),
            parent_id: Some(args.caller_agent_id.clone()),
            model_tier: args.model_tier.clone(),
        });
        if !created.success {
            return created;
        }
        let agent_id = created
            .data
            .as_deref()
            .and_then(|data| serde_json::from_str::<serde_json::Value>(data).ok())
            .and_then(|v| v.get("agent_id").and_then(|id| id.as_str()).map(String::from));
        let agent_id = match agent_id {
            Some(id) => id,
            None => return ToolOutcome::err("Agent creation returned no id"),
        };

        let delegated = self.delegate_task(DelegateTaskArgs {
            agent_id: agent_id.clone(),
            task_id: args.task_id.clone(),
            caller_agent_id: args.caller_agent_id.clone(),
        });
        if !delegated.success {
            return delegated;
        }

        let seeded = self.message_agent(MessageAgentArgs {
            from_agent_id: args.caller_agent_id,
            to_agent_id: agent_id.clone(),
            message: args.context_message,
        });
        if !seeded.success {
            return seeded;
        }

        ToolOutcome::ok(
            serde_json::json!({ "created_new": agent_id, "task_id": args.task_id }).to_string(),
        )
    }

    pub fn send_message_to_task_agent(&self, args: TaskMessageArgs) -> ToolOutcome {
        let task = match self.store.get_task(&args.task_id) {
            Ok(task) => task,
            Err(err) => return err.into(),
        };
        match task.assigned_to {
            Some(assignee) => self.message_agent(MessageAgentArgs {
                from_agent_id: args.caller_agent_id,
                to_agent_id: assignee,
                message: args.message,
            }),
            None => ToolOutcome::err(format!("NOT_ASSIGNED: task {} has no agent", args.task_id)),
        }
    }

    pub fn subscribe_to_events(&self, args: SubscribeArgs) -> ToolOutcome {
        let subscriber = self.bus.subscribe(
            &args.agent_id,
            &args.agent_name,
            args.event_types,
            args.exclude_self.unwrap_or(false),
        );
        ToolOutcome::ok(
            serde_json::json!({ "subscription_id": subscriber.subscription_id() }).to_string(),
        )
    }

    pub fn unsubscribe_from_events(&self, args: UnsubscribeArgs) -> ToolOutcome {
        self.bus.unsubscribe(&args.subscription_id);
        ToolOutcome::ok(format!("Unsubscribed {}", args.subscription_id))
    }

    /// Dispatch by tool name with a JSON argument object.
    ///
    /// Shared by the A2A command surface and the text-based executor
    /// adapter; argument records are rebuilt through serde.
    pub fn dispatch(&self, name: &str, arguments: &serde_json::Value) -> ToolOutcome {
        fn parse<T: serde::de::DeserializeOwned>(
            value: &serde_json::Value,
        ) -> std::result::Result<T, ToolOutcome> {
            serde_json::from_value(value.clone())
                .map_err(|e| ToolOutcome::err(format!("Bad input: {}", e)))
        }

        match name {
            "list_agents" => match parse(arguments) {
                Ok(args) => self.list_agents(args),
                Err(outcome) => outcome,
            },
            "create_agent" => match parse(arguments) {
                Ok(args) => self.create_agent(args),
                Err(outcome) => outcome,
            },
            "get_agent_status" => match parse(arguments) {
                Ok(args) => self.get_agent_status(args),
                Err(outcome) => outcome,
            },
            "get_agent_summary" => match parse(arguments) {
                Ok(args) => self.get_agent_summary(args),
                Err(outcome) => outcome,
            },
            "read_agent_conversation" => match parse(arguments) {
                Ok(args) => self.read_agent_conversation(args),
                Err(outcome) => outcome,
            },
            "message_agent" => match parse(arguments) {
                Ok(args) => self.message_agent(args),
                Err(outcome) => outcome,
            },
            "delegate_task" => match parse(arguments) {
                Ok(args) => self.delegate_task(args),
                Err(outcome) => outcome,
            },
            "report_to_parent" => match parse(arguments) {
                Ok(report) => self.report_to_parent(report),
                Err(outcome) => outcome,
            },
            "wake_or_create_task_agent" => match parse(arguments) {
                Ok(args) => self.wake_or_create_task_agent(args),
                Err(outcome) => outcome,
            },
            "send_message_to_task_agent" => match parse(arguments) {
                Ok(args) => self.send_message_to_task_agent(args),
                Err(outcome) => outcome,
            },
            "subscribe_to_events" => match parse(arguments) {
                Ok(args) => self.subscribe_to_events(args),
                Err(outcome) => outcome,
            },
            "unsubscribe_from_events" => match parse(arguments) {
                Ok(args) => self.unsubscribe_from_events(args),
                Err(outcome) => outcome,
            },
            other => ToolOutcome::err(format!(
                "Unknown tool '{}'. Available: {}",
                other,
                Self::tool_names().join(", ")
            )),
        }
    }

    pub fn tool_names() -> Vec<&'static str> {
        vec![
            "list_agents",
            "create_agent",
            "get_agent_status",
            "get_agent_summary",
            "read_agent_conversation",
            "message_agent",
            "delegate_task",
            "report_to_parent",
            "wake_or_create_task_agent",
            "send_message_to_task_agent",
            "subscribe_to_events",
            "unsubscribe_from_events",
        ]
    }

    /// Descriptors for the whole surface, in dispatch order.
    pub fn descriptors() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("list_agents", "List all agents in a workspace")
                .with_param(ParamSpec::new(
                    "workspace_id",
                    ParamType::String,
                    "Workspace to list",
                )),
            ToolDescriptor::new("create_agent", "Create a new agent in PENDING status")
                .with_param(ParamSpec::new("name", ParamType::String, "Agent name"))
                .with_param(ParamSpec::new(
                    "role",
                    ParamType::Enum(vec!["ROUTA".into(), "CRAFTER".into(), "GATE".into()]),
                    "Agent role",
                ))
                .with_param(ParamSpec::new(
                    "workspace_id",
                    ParamType::String,
                    "Owning workspace",
                ))
                .with_param(
                    ParamSpec::new("parent_id", ParamType::String, "Parent agent id").optional(),
                )
                .with_param(
                    ParamSpec::new(
                        "model_tier",
                        ParamType::Enum(vec!["FAST".into(), "BALANCED".into(), "SMART".into()]),
                        "Model tier hint",
                    )
                    .optional(),
                ),
            ToolDescriptor::new("get_agent_status", "Status, role, and parent of an agent")
                .with_param(ParamSpec::new("agent_id", ParamType::String, "Agent id")),
            ToolDescriptor::new(
                "get_agent_summary",
                "Latest objective, last message, and task count",
            )
            .with_param(ParamSpec::new("agent_id", ParamType::String, "Agent id")),
            ToolDescriptor::new(
                "read_agent_conversation",
                "Chronological conversation of an agent",
            )
            .with_param(ParamSpec::new("agent_id", ParamType::String, "Agent id"))
            .with_param(
                ParamSpec::new("last_n", ParamType::Integer, "Trailing message window").optional(),
            )
            .with_param(
                ParamSpec::new(
                    "include_tool_calls",
                    ParamType::Boolean,
                    "Include tool traffic",
                )
                .optional(),
            ),
            ToolDescriptor::new("message_agent", "Send a message to another agent")
                .with_param(ParamSpec::new(
                    "from_agent_id",
                    ParamType::String,
                    "Sender agent id",
                ))
                .with_param(ParamSpec::new(
                    "to_agent_id",
                    ParamType::String,
                    "Recipient agent id",
                ))
                .with_param(ParamSpec::new("message", ParamType::String, "Message body")),
            ToolDescriptor::new("delegate_task", "Assign a task to an agent and activate it")
                .with_param(ParamSpec::new("agent_id", ParamType::String, "Assignee"))
                .with_param(ParamSpec::new("task_id", ParamType::String, "Task to assign"))
                .with_param(ParamSpec::new(
                    "caller_agent_id",
                    ParamType::String,
                    "Delegating agent",
                )),
            ToolDescriptor::new(
                "report_to_parent",
                "Report task completion or failure to the parent agent",
            )
            .with_param(ParamSpec::new("agent_id", ParamType::String, "Reporting agent"))
            .with_param(ParamSpec::new("task_id", ParamType::String, "Finished task"))
            .with_param(ParamSpec::new("summary", ParamType::String, "Result summary"))
            .with_param(
                ParamSpec::new(
                    "files_modified",
                    ParamType::List(Box::new(ParamType::String)),
                    "Files touched",
                )
                .optional(),
            )
            .with_param(ParamSpec::new(
                "success",
                ParamType::Boolean,
                "Whether the task succeeded",
            )),
            ToolDescriptor::new(
                "wake_or_create_task_agent",
                "Message a task's agent, creating and delegating one if absent",
            )
            .with_param(ParamSpec::new("task_id", ParamType::String, "Target task"))
            .with_param(ParamSpec::new(
                "context_message",
                ParamType::String,
                "Message for the task agent",
            ))
            .with_param(ParamSpec::new(
                "caller_agent_id",
                ParamType::String,
                "Calling agent",
            ))
            .with_param(ParamSpec::new(
                "workspace_id",
                ParamType::String,
                "Owning workspace",
            ))
            .with_param(
                ParamSpec::new("agent_name", ParamType::String, "Name for a new agent").optional(),
            )
            .with_param(
                ParamSpec::new(
                    "model_tier",
                    ParamType::Enum(vec!["FAST".into(), "BALANCED".into(), "SMART".into()]),
                    "Model tier for a new agent",
                )
                .optional(),
            ),
            ToolDescriptor::new(
                "send_message_to_task_agent",
                "Route a message to the agent assigned to a task",
            )
            .with_param(ParamSpec::new("task_id", ParamType::String, "Target task"))
            .with_param(ParamSpec::new("message", ParamType::String, "Message body"))
            .with_param(ParamSpec::new(
                "caller_agent_id",
                ParamType::String,
                "Calling agent",
            )),
            ToolDescriptor::new("subscribe_to_events", "Subscribe to event types by glob")
                .with_param(ParamSpec::new("agent_id", ParamType::String, "Subscriber id"))
                .with_param(ParamSpec::new(
                    "agent_name",
                    ParamType::String,
                    "Subscriber name",
                ))
                .with_param(ParamSpec::new(
                    "event_types",
                    ParamType::List(Box::new(ParamType::String)),
                    "Type globs, e.g. agent.*",
                ))
                .with_param(
                    ParamSpec::new(
                        "exclude_self",
                        ParamType::Boolean,
                        "Drop events sourced by the subscriber",
                    )
                    .optional(),
                ),
            ToolDescriptor::new("unsubscribe_from_events", "Release a subscription")
                .with_param(ParamSpec::new(
                    "subscription_id",
                    ParamType::String,
                    "Subscription to release",
                )),
        ]
    }
}
