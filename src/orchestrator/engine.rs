//! The ROUTA → CRAFTER(s) → GATE phase pipeline.
//!
//! Tasks are dispatched in parse order; sequential mode starts task N+1
//! strictly after task N completes, parallel mode keeps up to the
//! configured bound in flight with per-task stream fan-out. Cancellation
//! interrupts every running agent and waits a bounded grace for
//! cooperative exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::agent::CancellationRegistry;
use crate::coordination::event_bus::{Event, EventBus};
use crate::coordination::store::CoordinationStore;
use crate::coordination::types::{
    Agent, AgentRole, AgentStatus, ConversationMessage, MessageKind, Task, TaskStatus,
};
use crate::error::Result;
use crate::llm::stream::StreamChunk;
use crate::planning::format_task;
use crate::planning::parser::parse_tasks;
use crate::util::truncate_chars;

use super::debug_log::{DebugKind, DebugLog};
use super::runner::AgentRunner;

const PROMPT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Dispatch,
    Craft,
    Verify,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "PLAN",
            Self::Dispatch => "DISPATCH",
            Self::Craft => "CRAFT",
            Self::Verify => "VERIFY",
            Self::Done => "DONE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workspace_id: String,
    /// 1 means sequential; higher bounds parallel crafting.
    pub max_parallel: usize,
    pub cancel_grace_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workspace_id: "default".into(),
            max_parallel: 1,
            cancel_grace_secs: 5,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Success {
        verdict: String,
        tasks: Vec<Task>,
        crafter_outputs: Vec<String>,
    },
    NoTasks {
        plan: String,
    },
    Failure {
        reason: String,
        partial: Vec<String>,
    },
    Cancelled {
        reached_phase: Phase,
    },
}

enum CraftResult {
    Done(Vec<String>),
    Cancelled,
    Failed { reason: String, partial: Vec<String> },
}

pub struct Orchestrator {
    store: Arc<CoordinationStore>,
    bus: Arc<EventBus>,
    runner: Arc<dyn AgentRunner>,
    cancellation: Arc<CancellationRegistry>,
    config: OrchestratorConfig,
    debug: DebugLog,
    phase: Mutex<Phase>,
    stop_requested: AtomicBool,
    task_streams: DashMap<String, UnboundedSender<StreamChunk>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<CoordinationStore>,
        bus: Arc<EventBus>,
        runner: Arc<dyn AgentRunner>,
        cancellation: Arc<CancellationRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            bus,
            runner,
            cancellation,
            config,
            debug: DebugLog::default(),
            phase: Mutex::new(Phase::Plan),
            stop_requested: AtomicBool::new(false),
            task_streams: DashMap::new(),
        }
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.debug
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Attach an independent chunk subscriber for one task's stream.
    /// Task ids are published on the bus as `task.planned` at dispatch.
    pub fn subscribe_task_stream(&self, task_id: &str) -> UnboundedReceiver<StreamChunk> {
        let (tx, rx) = unbounded_channel();
        self.task_streams.insert(task_id.to_string(), tx);
        rx
    }

    /// Request cancellation: every running agent's flag is set.
    pub fn cancel(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.cancellation.interrupt_all();
        self.debug.record(DebugKind::Stop, "Cancellation requested");
    }

    /// Cancel and wait for cooperative exit, bounded by the grace window.
    pub async fn cancel_and_wait(&self) -> Phase {
        self.cancel();
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.cancel_grace_secs);
        while !self.cancellation.active_agents().is_empty() {
            if tokio::time::Instant::now() >= deadline {
                warn!("Cancellation grace elapsed with agents still active");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.phase()
    }

    fn stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn cancelled_outcome(&self) -> RunOutcome {
        RunOutcome::Cancelled {
            reached_phase: self.phase(),
        }
    }

    fn transition(&self, next: Phase) {
        let mut phase = self.phase.lock();
        let from = *phase;
        *phase = next;
        drop(phase);
        info!(from = from.as_str(), to = next.as_str(), "Phase transition");
        self.debug.record(
            DebugKind::Phase,
            format!("PHASE {} -> {}", from.as_str(), next.as_str()),
        );
    }

    /// Drive the full pipeline for one user request.
    pub async fn run(&self, user_request: &str) -> RunOutcome {
        match self.run_phases(user_request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.debug
                    .record(DebugKind::Error, format!("Run failed: {}", err));
                RunOutcome::Failure {
                    reason: err.to_string(),
                    partial: Vec::new(),
                }
            }
        }
    }

    async fn run_phases(&self, user_request: &str) -> Result<RunOutcome> {
        self.transition(Phase::Plan);
        let routa_id = self.store.initialize_workspace(&self.config.workspace_id)?;
        self.store.append_message(ConversationMessage::new(
            &routa_id,
            "user",
            user_request,
            MessageKind::User,
        ))?;
        self.debug.record(
            DebugKind::Prompt,
            format!(
                "ROUTA prompt: {}",
                truncate_chars(user_request, PROMPT_PREVIEW_CHARS)
            ),
        );
        self.debug.record(DebugKind::AgentStart, "ROUTA running");

        let plan = match self
            .runner
            .run(AgentRole::Routa, &routa_id, user_request)
            .await
        {
            Ok(plan) => plan,
            Err(err) => {
                self.debug
                    .record(DebugKind::Error, format!("ROUTA failed: {}", err));
                return Ok(RunOutcome::Failure {
                    reason: err.to_string(),
                    partial: Vec::new(),
                });
            }
        };
        self.debug.record(DebugKind::AgentComplete, "ROUTA completed");
        self.store.append_message(ConversationMessage::new(
            &routa_id,
            &routa_id,
            &plan,
            MessageKind::Assistant,
        ))?;
        if self.stopped() {
            return Ok(self.cancelled_outcome());
        }

        self.transition(Phase::Dispatch);
        let tasks = parse_tasks(&plan, &self.config.workspace_id);
        if tasks.is_empty() {
            self.debug
                .record(DebugKind::Stop, "NO_TASKS: plan produced no task blocks");
            self.transition(Phase::Done);
            return Ok(RunOutcome::NoTasks { plan });
        }
        for task in &tasks {
            self.store.save_task(task.clone())?;
            self.debug
                .record(DebugKind::TaskParse, format!("TASK planned: {}", task.title));
            self.bus.publish(
                Event::new("task.planned")
                    .with_payload("task_id", &task.id)
                    .with_payload("title", &task.title)
                    .with_source(&routa_id),
            );
        }
        if self.stopped() {
            return Ok(self.cancelled_outcome());
        }

        self.transition(Phase::Craft);
        let craft = if self.config.max_parallel > 1 {
            self.craft_parallel(&tasks, &routa_id).await?
        } else {
            self.craft_sequential(&tasks, &routa_id).await?
        };
        let outputs = match craft {
            CraftResult::Done(outputs) => outputs,
            CraftResult::Cancelled => return Ok(self.cancelled_outcome()),
            CraftResult::Failed { reason, partial } => {
                return Ok(RunOutcome::Failure { reason, partial });
            }
        };
        if self.stopped() {
            return Ok(self.cancelled_outcome());
        }

        self.transition(Phase::Verify);
        let verdict = match self.run_gate(&tasks, &outputs, &routa_id).await {
            Ok(verdict) => verdict,
            Err(err) => {
                self.debug
                    .record(DebugKind::Error, format!("GATE failed: {}", err));
                return Ok(RunOutcome::Failure {
                    reason: err.to_string(),
                    partial: outputs,
                });
            }
        };

        self.transition(Phase::Done);
        let tasks = tasks
            .iter()
            .map(|task| self.store.get_task(&task.id))
            .collect::<Result<Vec<_>>>()?;
        Ok(RunOutcome::Success {
            verdict,
            tasks,
            crafter_outputs: outputs,
        })
    }

    async fn craft_sequential(&self, tasks: &[Task], routa_id: &str) -> Result<CraftResult> {
        let mut outputs = Vec::with_capacity(tasks.len());
        for task in tasks {
            if self.stopped() {
                return Ok(CraftResult::Cancelled);
            }
            match self.run_crafter(task, routa_id).await {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    self.debug
                        .record(DebugKind::Error, format!("CRAFTER failed: {}", err));
                    return Ok(CraftResult::Failed {
                        reason: err.to_string(),
                        partial: outputs,
                    });
                }
            }
        }
        Ok(CraftResult::Done(outputs))
    }

    async fn craft_parallel(&self, tasks: &[Task], routa_id: &str) -> Result<CraftResult> {
        let results: Vec<Result<String>> =
            futures::stream::iter(tasks.iter().cloned().map(|task| {
                let routa_id = routa_id.to_string();
                async move { self.run_crafter(&task, &routa_id).await }
            }))
                .buffered(self.config.max_parallel)
                .collect()
                .await;

        if self.stopped() {
            return Ok(CraftResult::Cancelled);
        }

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    self.debug
                        .record(DebugKind::Error, format!("CRAFTER failed: {}", err));
                    return Ok(CraftResult::Failed {
                        reason: err.to_string(),
                        partial: outputs,
                    });
                }
            }
        }
        Ok(CraftResult::Done(outputs))
    }

    async fn run_crafter(&self, task: &Task, routa_id: &str) -> Result<String> {
        let agent = Agent::new(
            format!("crafter-{}", &task.id[..task.id.len().min(8)]),
            AgentRole::Crafter,
            &self.config.workspace_id,
        )
        .with_parent(routa_id);
        let agent_id = agent.id.clone();
        self.store.save_agent(agent)?;
        self.store
            .update_task_status(&task.id, TaskStatus::InProgress, Some(&agent_id))?;
        self.store
            .update_agent_status(&agent_id, AgentStatus::Active)?;

        self.debug
            .record(DebugKind::AgentStart, format!("CRAFTER running: {}", task.title));
        let prompt = build_crafter_prompt(task);
        self.debug.record(
            DebugKind::Prompt,
            format!(
                "CRAFTER prompt: {}",
                truncate_chars(&prompt, PROMPT_PREVIEW_CHARS)
            ),
        );

        let stream_tx = self
            .task_streams
            .get(&task.id)
            .map(|entry| entry.value().clone());
        let output = match stream_tx {
            Some(tx) => {
                self.debug
                    .record(DebugKind::StreamOpen, format!("Stream open: task {}", task.id));
                let result = self
                    .runner
                    .run_streaming(AgentRole::Crafter, &agent_id, &prompt, tx)
                    .await;
                self.debug
                    .record(DebugKind::StreamClose, format!("Stream close: task {}", task.id));
                result?
            }
            None => {
                self.runner
                    .run(AgentRole::Crafter, &agent_id, &prompt)
                    .await?
            }
        };

        self.store
            .update_task_status(&task.id, TaskStatus::Completed, None)?;
        self.store
            .update_agent_status(&agent_id, AgentStatus::Completed)?;
        self.debug.record(
            DebugKind::AgentComplete,
            format!("CRAFTER completed: {}", task.title),
        );
        self.bus.publish(
            Event::new("task.completed")
                .with_payload("task_id", &task.id)
                .with_payload("agent_id", &agent_id)
                .with_payload("success", "true")
                .with_source(&agent_id),
        );
        Ok(output)
    }

    async fn run_gate(
        &self,
        tasks: &[Task],
        outputs: &[String],
        routa_id: &str,
    ) -> Result<String> {
        let agent = Agent::new("gate", AgentRole::Gate, &self.config.workspace_id)
            .with_parent(routa_id);
        let agent_id = agent.id.clone();
        self.store.save_agent(agent)?;
        self.store
            .update_agent_status(&agent_id, AgentStatus::Active)?;

        self.debug.record(DebugKind::AgentStart, "GATE running");
        let prompt = build_gate_prompt(tasks, outputs);
        self.debug.record(
            DebugKind::Prompt,
            format!(
                "GATE prompt: {}",
                truncate_chars(&prompt, PROMPT_PREVIEW_CHARS)
            ),
        );

        let verdict = self.runner.run(AgentRole::Gate, &agent_id, &prompt).await?;
        self.store
            .update_agent_status(&agent_id, AgentStatus::Completed)?;
        self.debug.record(DebugKind::AgentComplete, "GATE completed");
        Ok(verdict)
    }
}

fn build_crafter_prompt(task: &Task) -> String {
    format!(
        "You are assigned the following task:\n\n{}\n\nWork it to completion \
         and finish with a summary of what you did.",
        format_task(task)
    )
}

fn build_gate_prompt(tasks: &[Task], outputs: &[String]) -> String {
    let definitions = tasks
        .iter()
        .map(format_task)
        .collect::<Vec<_>>()
        .join("\n\n");
    let reports = tasks
        .iter()
        .zip(outputs.iter())
        .map(|(task, output)| format!("--- {} ---\n{}", task.title, output))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Task definitions:\n\n{}\n\nImplementation reports:\n\n{}\n\n\
         Decide whether the work satisfies the task definitions. Start your \
         reply with APPROVED or REJECTED.",
        definitions, reports
    )
}
