//! OpenAI-compatible chat-completions client.
//!
//! One `reqwest::Client` is shared across calls and safe for concurrent
//! use. Base URLs always end with `/` so the endpoint join never replaces
//! the last path segment.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::error::{Result, RoutaError};

use super::executor::LlmExecutor;
use super::types::{ChatRequest, ChatResponse, StreamEvent};

/// Trim and guarantee a trailing slash.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    format!("{}/", trimmed)
}

pub struct OpenAiCompatExecutor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiCompatExecutor {
    pub fn new(base_url: impl AsRef<str>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url.as_ref()),
            api_key: api_key.into(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}chat/completions", self.base_url)
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(self.endpoint());
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
        }
        body
    }
}

#[async_trait]
impl LlmExecutor for OpenAiCompatExecutor {
    async fn execute(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(&request, false);
        debug!(model = %request.model, endpoint = %self.endpoint(), "Chat request");

        let response = self
            .build_request()
            .json(&body)
            .send()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RoutaError::Upstream(format!(
                "Chat request failed with {}: {}",
                status, detail
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Malformed response: {}", e)))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let stop_reason = json["choices"][0]["finish_reason"]
            .as_str()
            .map(String::from);

        Ok(ChatResponse {
            content,
            stop_reason,
        })
    }

    async fn execute_streaming(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, StreamEvent>> {
        let body = self.build_body(&request, true);
        debug!(model = %request.model, endpoint = %self.endpoint(), "Streaming chat request");

        let response = self
            .build_request()
            .json(&body)
            .send()
            .await
            .map_err(|e| RoutaError::Upstream(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RoutaError::Upstream(format!(
                "Chat request failed with {}: {}",
                status, detail
            )));
        }

        let state = SseState {
            bytes: response.bytes_stream().boxed(),
            buffer: String::new(),
            pending: VecDeque::new(),
            tool_fragments: BTreeMap::new(),
            done: false,
        };

        Ok(futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.done {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                        state.drain_lines();
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "Stream transport error; ending stream");
                        state.finish();
                    }
                    None => state.finish(),
                }
            }
        })
        .boxed())
    }
}

struct SseState {
    bytes: BoxStream<'static, std::result::Result<bytes::Bytes, reqwest::Error>>,
    buffer: String,
    pending: VecDeque<StreamEvent>,
    /// Tool-call fragments accumulated by stream index until the stream
    /// completes.
    tool_fragments: BTreeMap<u64, (String, String)>,
    done: bool,
}

impl SseState {
    /// Consume complete SSE lines from the buffer into pending events.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.finish();
                return;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
                continue;
            };
            let delta = &value["choices"][0]["delta"];
            if let Some(content) = delta["content"].as_str() {
                if !content.is_empty() {
                    self.pending.push_back(StreamEvent::Append(content.to_string()));
                }
            }
            if let Some(calls) = delta["tool_calls"].as_array() {
                for call in calls {
                    let index = call["index"].as_u64().unwrap_or(0);
                    let entry = self.tool_fragments.entry(index).or_default();
                    if let Some(name) = call["function"]["name"].as_str() {
                        entry.0.push_str(name);
                    }
                    if let Some(arguments) = call["function"]["arguments"].as_str() {
                        entry.1.push_str(arguments);
                    }
                }
            }
        }
    }

    /// Flush accumulated tool calls and terminate.
    fn finish(&mut self) {
        if self.done {
            return;
        }
        for (_, (name, arguments)) in std::mem::take(&mut self.tool_fragments) {
            let arguments = serde_json::from_str(&arguments)
                .unwrap_or(serde_json::Value::String(arguments));
            self.pending
                .push_back(StreamEvent::NativeToolCall { name, arguments });
        }
        self.pending.push_back(StreamEvent::End);
        self.done = true;
    }
}
