//! Extraction of structured tool calls from free-form LLM output.
//!
//! Two surface forms are recognized, never combined: explicit
//! `<tool_call>…</tool_call>` regions take precedence; fenced JSON code
//! blocks are the fallback. Malformed JSON in a region skips that region
//! only.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::coordination::types::ToolCall;

static TOOL_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("tool_call regex"));

static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n(.*?)```").expect("fence regex"));

/// Extract tool calls from a response, XML form first, fenced blocks as
/// fallback. Fenced extraction suppresses duplicate tool names.
pub fn extract_tool_calls(response: &str) -> Vec<ToolCall> {
    let xml_calls: Vec<ToolCall> = TOOL_CALL_RE
        .captures_iter(response)
        .filter_map(|cap| parse_call_json(cap[1].trim()))
        .collect();
    if !xml_calls.is_empty() {
        return xml_calls;
    }

    let mut seen = Vec::new();
    let mut calls = Vec::new();
    for cap in FENCED_RE.captures_iter(response) {
        if let Some(call) = parse_call_json(cap[1].trim()) {
            if seen.contains(&call.name) {
                continue;
            }
            seen.push(call.name.clone());
            calls.push(call);
        }
    }
    calls
}

/// True iff the XML form appears or extraction yields at least one call.
pub fn has_tool_calls(response: &str) -> bool {
    TOOL_CALL_RE.is_match(response) || !extract_tool_calls(response).is_empty()
}

/// Strip every `<tool_call>` region and trim the remainder.
pub fn remove_tool_calls(response: &str) -> String {
    TOOL_CALL_RE.replace_all(response, "").trim().to_string()
}

fn parse_call_json(raw: &str) -> Option<ToolCall> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "Skipping unparseable tool-call region");
            return None;
        }
    };

    let name = value.get("name")?.as_str()?.to_string();
    let mut call = ToolCall::new(name);

    if let Some(arguments) = value.get("arguments").and_then(|a| a.as_object()) {
        for (key, value) in arguments {
            call.arguments.insert(key.clone(), stringify_value(value));
        }
    }
    Some(call)
}

/// Primitives keep their content form; nested values keep their JSON
/// serialization so the executor can re-parse them against the descriptor.
fn stringify_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => value.to_string(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => value.to_string(),
    }
}
