//! The stream-chunk surface produced to embedders (IDE plugins, TUIs).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingPhase {
    Start,
    Chunk,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Started,
    InProgress,
    Completed,
    Failed,
}

/// One unit of the embedder-facing streaming protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Text {
        content: String,
    },
    Thinking {
        phase: ThinkingPhase,
        content: String,
    },
    ToolCall {
        name: String,
        status: ToolCallStatus,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    Error {
        message: String,
        recoverable: bool,
    },
    Completed {
        stop_reason: String,
    },
    Heartbeat,
    CompletionReport {
        summary: String,
        success: bool,

        #[serde(default)]
        files_modified: Vec<String>,
    },
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn tool_started(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::ToolCall {
            name: name.into(),
            status: ToolCallStatus::Started,
            arguments: Some(arguments.into()),
            result: None,
        }
    }

    pub fn tool_finished(name: impl Into<String>, success: bool, result: impl Into<String>) -> Self {
        Self::ToolCall {
            name: name.into(),
            status: if success {
                ToolCallStatus::Completed
            } else {
                ToolCallStatus::Failed
            },
            arguments: None,
            result: Some(result.into()),
        }
    }

    pub fn error(message: impl Into<String>, recoverable: bool) -> Self {
        Self::Error {
            message: message.into(),
            recoverable,
        }
    }
}
