//! The iterative text-based tool loop.
//!
//! Tool semantics ride inside message text: the LLM call always carries an
//! empty native-tools list, calls are extracted from the response, executed,
//! and their formatted results appended as the next user turn. The loop
//! terminates on the first response without tool calls, on cancellation, or
//! on the iteration budget.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::stream::StreamChunk;
use crate::llm::types::{ChatMessage, ChatRequest, StreamEvent};
use crate::llm::LlmExecutor;
use crate::tooling::{extract_tool_calls, format_results, TextToolExecutor};

use super::cancellation::CancellationRegistry;

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

const CANCELLED_PLACEHOLDER: &str = "[Agent cancelled]";
const BUDGET_PLACEHOLDER: &str = "[Agent reached max iterations]";

pub struct WorkspaceAgent {
    agent_id: String,
    model: String,
    executor: Arc<dyn LlmExecutor>,
    tools: TextToolExecutor,
    cancellation: Arc<CancellationRegistry>,
    max_iterations: u32,
}

impl WorkspaceAgent {
    pub fn new(
        agent_id: impl Into<String>,
        model: impl Into<String>,
        executor: Arc<dyn LlmExecutor>,
        tools: TextToolExecutor,
        cancellation: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            model: model.into(),
            executor,
            tools,
            cancellation,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn build_messages(&self, system_prompt: &str, conversation: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(conversation);
        messages
    }

    fn request(&self, system_prompt: &str, conversation: &[ChatMessage]) -> ChatRequest {
        // No native tools, ever: the protocol is text-based.
        ChatRequest::new(&self.model, self.build_messages(system_prompt, conversation))
    }

    /// One-shot loop: returns the first response without tool calls.
    pub async fn run(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.cancellation.begin(&self.agent_id);
        let result = self.run_inner(system_prompt, user_prompt).await;
        self.cancellation.finish(&self.agent_id);
        result
    }

    async fn run_inner(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut conversation = vec![ChatMessage::user(user_prompt)];
        let mut last_response: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            if self.cancellation.is_cancelled(&self.agent_id) {
                debug!(agent_id = %self.agent_id, iteration, "Loop cancelled");
                return Ok(last_response.unwrap_or_else(|| CANCELLED_PLACEHOLDER.into()));
            }

            let response = self
                .executor
                .execute(self.request(system_prompt, &conversation))
                .await?;

            let calls = extract_tool_calls(&response.content);
            if calls.is_empty() {
                debug!(agent_id = %self.agent_id, iteration, "Loop terminal");
                return Ok(response.content);
            }

            debug!(agent_id = %self.agent_id, iteration, calls = calls.len(), "Executing tool calls");
            conversation.push(ChatMessage::assistant(&response.content));
            last_response = Some(response.content);

            let results = self.tools.execute_all(&calls).await;
            conversation.push(ChatMessage::user(format_results(&results)));
        }

        warn!(agent_id = %self.agent_id, budget = self.max_iterations, "Iteration budget exhausted");
        Ok(last_response.unwrap_or_else(|| BUDGET_PLACEHOLDER.into()))
    }

    /// Streaming loop: identical decisions, but the LLM call is consumed
    /// as a stream. Text is forwarded as it arrives; between iterations
    /// the caller observes tool-call status chunks and a `"\n\n"`
    /// separator. Chunks stop the moment cancellation is observed.
    pub async fn run_streaming(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        chunks: UnboundedSender<StreamChunk>,
    ) -> Result<String> {
        self.cancellation.begin(&self.agent_id);
        let result = self
            .run_streaming_inner(system_prompt, user_prompt, chunks)
            .await;
        self.cancellation.finish(&self.agent_id);
        result
    }

    async fn run_streaming_inner(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        chunks: UnboundedSender<StreamChunk>,
    ) -> Result<String> {
        let mut conversation = vec![ChatMessage::user(user_prompt)];
        let mut last_response: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            if self.cancellation.is_cancelled(&self.agent_id) {
                return Ok(last_response.unwrap_or_else(|| CANCELLED_PLACEHOLDER.into()));
            }

            let mut stream = self
                .executor
                .execute_streaming(self.request(system_prompt, &conversation))
                .await?;

            let mut accumulated = String::new();
            while let Some(event) = stream.next().await {
                if self.cancellation.is_cancelled(&self.agent_id) {
                    drop(stream);
                    return Ok(if accumulated.is_empty() {
                        last_response.unwrap_or_else(|| CANCELLED_PLACEHOLDER.into())
                    } else {
                        accumulated
                    });
                }
                match event {
                    StreamEvent::Append(text) => {
                        accumulated.push_str(&text);
                        let _ = chunks.send(StreamChunk::text(text));
                    }
                    // The loop never registers native tools; a provider
                    // emitting one anyway is logged and skipped.
                    StreamEvent::NativeToolCall { name, .. } => {
                        warn!(agent_id = %self.agent_id, tool = %name, "Ignoring native tool call");
                    }
                    StreamEvent::End => break,
                }
            }

            let calls = extract_tool_calls(&accumulated);
            if calls.is_empty() {
                let _ = chunks.send(StreamChunk::Completed {
                    stop_reason: "end_turn".into(),
                });
                return Ok(accumulated);
            }

            debug!(agent_id = %self.agent_id, iteration, calls = calls.len(), "Executing tool calls");
            conversation.push(ChatMessage::assistant(&accumulated));
            last_response = Some(accumulated);

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                if self.cancellation.is_cancelled(&self.agent_id) {
                    return Ok(last_response.unwrap_or_else(|| CANCELLED_PLACEHOLDER.into()));
                }
                let arguments = serde_json::to_string(&call.arguments).unwrap_or_default();
                let _ = chunks.send(StreamChunk::tool_started(&call.name, arguments));

                let result = self.tools.execute(call).await;
                let _ = chunks.send(StreamChunk::tool_finished(
                    &call.name,
                    result.success,
                    result.output.clone(),
                ));
                results.push(result);
            }

            conversation.push(ChatMessage::user(format_results(&results)));
            let _ = chunks.send(StreamChunk::text("\n\n"));
        }

        let _ = chunks.send(StreamChunk::error("Iteration budget exhausted", false));
        Ok(last_response.unwrap_or_else(|| BUDGET_PLACEHOLDER.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutaError;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted executor: pops one canned reply per call.
    pub(crate) struct ScriptedExecutor {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedExecutor {
        pub(crate) fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            }
        }

        fn pop(&self) -> Result<String> {
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| RoutaError::Upstream("Script exhausted".into()))
        }
    }

    #[async_trait]
    impl LlmExecutor for ScriptedExecutor {
        async fn execute(&self, _request: ChatRequest) -> Result<crate::llm::types::ChatResponse> {
            Ok(crate::llm::types::ChatResponse {
                content: self.pop()?,
                stop_reason: Some("stop".into()),
            })
        }

        async fn execute_streaming(
            &self,
            _request: ChatRequest,
        ) -> Result<BoxStream<'static, StreamEvent>> {
            let content = self.pop()?;
            let mut events: Vec<StreamEvent> = content
                .split_inclusive(' ')
                .map(|piece| StreamEvent::Append(piece.to_string()))
                .collect();
            events.push(StreamEvent::End);
            Ok(futures::stream::iter(events).boxed())
        }
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("src/b.txt"), "beta").unwrap();
        dir
    }

    fn agent(dir: &tempfile::TempDir, replies: Vec<&str>) -> WorkspaceAgent {
        WorkspaceAgent::new(
            "agent-1",
            "test-model",
            Arc::new(ScriptedExecutor::new(replies)),
            TextToolExecutor::new(dir.path()),
            Arc::new(CancellationRegistry::new()),
        )
    }

    #[tokio::test]
    async fn test_terminal_on_plain_response() {
        let dir = fixture_dir();
        let agent = agent(&dir, vec!["All done, no tools needed."]);
        let result = agent.run("system", "go").await.unwrap();
        assert_eq!(result, "All done, no tools needed.");
    }

    #[tokio::test]
    async fn test_tool_loop_two_iterations() {
        let dir = fixture_dir();
        let agent = agent(
            &dir,
            vec![
                "<tool_call>{\"name\":\"list_files\",\"arguments\":{\"path\":\"src\"}}</tool_call>",
                "Done.",
            ],
        );
        let result = agent.run("system", "List files in src/").await.unwrap();
        assert_eq!(result, "Done.");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_response() {
        let dir = fixture_dir();
        let call = "<tool_call>{\"name\":\"list_files\",\"arguments\":{}}</tool_call>";
        let agent = agent(&dir, vec![call, call, call]).with_max_iterations(3);
        let result = agent.run("system", "loop forever").await.unwrap();
        assert_eq!(result, call);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let dir = fixture_dir();
        let agent = agent(&dir, vec!["never used"]);
        agent.cancellation.interrupt("agent-1");
        let result = agent.run("system", "go").await.unwrap();
        assert_eq!(result, CANCELLED_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_active_map_converges_after_run() {
        let dir = fixture_dir();
        let agent = agent(&dir, vec!["done"]);
        agent.run("system", "go").await.unwrap();
        assert!(agent.cancellation.active_agents().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_chunks_and_separator() {
        let dir = fixture_dir();
        let agent = agent(
            &dir,
            vec![
                "<tool_call>{\"name\":\"list_files\",\"arguments\":{\"path\":\"src\"}}</tool_call>",
                "Done.",
            ],
        );

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = agent.run_streaming("system", "go", tx).await.unwrap();
        assert_eq!(result, "Done.");

        let mut saw_started = false;
        let mut saw_completed_call = false;
        let mut saw_separator = false;
        let mut saw_terminal = false;
        while let Ok(chunk) = rx.try_recv() {
            match chunk {
                StreamChunk::ToolCall { status, result, .. } => match status {
                    crate::llm::stream::ToolCallStatus::Started => saw_started = true,
                    crate::llm::stream::ToolCallStatus::Completed => {
                        saw_completed_call = true;
                        assert!(result.unwrap().contains("[file] a.txt"));
                    }
                    _ => {}
                },
                StreamChunk::Text { content } if content == "\n\n" => saw_separator = true,
                StreamChunk::Completed { .. } => saw_terminal = true,
                _ => {}
            }
        }
        assert!(saw_started && saw_completed_call && saw_separator && saw_terminal);
    }

    #[tokio::test]
    async fn test_streaming_forwards_text() {
        let dir = fixture_dir();
        let agent = agent(&dir, vec!["hello streaming world"]);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = agent.run_streaming("system", "go", tx).await.unwrap();
        assert_eq!(result, "hello streaming world");

        let mut text = String::new();
        while let Ok(chunk) = rx.try_recv() {
            if let StreamChunk::Text { content } = chunk {
                text.push_str(&content);
            }
        }
        assert_eq!(text, "hello streaming world");
    }
}
