//! Execution of extracted tool calls against a typed registry.
//!
//! Built-in file tools resolve paths relative to a working directory and
//! refuse anything that escapes it. Registered tools get their arguments
//! rebuilt into typed JSON from the descriptor before dispatch. Failures
//! never abort the loop; they surface as failed [`ToolResult`]s the LLM
//! sees on the next iteration.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::coordination::types::{ToolCall, ToolResult};

use super::descriptor::{ParamType, ToolDescriptor, TypedTool};

const WRITE_FILE_DISABLED: &str = "write_file is disabled in this runtime. Delegate \
implementation work by emitting an @@@task block for a worker agent instead.";

pub struct TextToolExecutor {
    cwd: PathBuf,
    tools: HashMap<String, Arc<dyn TypedTool>>,
}

impl TextToolExecutor {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: lexical_normalize(&cwd.into()),
            tools: HashMap::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn TypedTool>>) -> Self {
        for tool in tools {
            self.tools.insert(tool.descriptor().name.clone(), tool);
        }
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Descriptors of everything dispatchable here: built-ins first, then
    /// registered tools by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = builtin_descriptors();
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        for name in names {
            descriptors.push(self.tools[name].descriptor().clone());
        }
        descriptors
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        debug!(tool = %call.name, "Executing tool call");
        match call.name.as_str() {
            "read_file" => self.read_file(call).await,
            "list_files" => self.list_files(call).await,
            "write_file" => ToolResult::error("write_file", WRITE_FILE_DISABLED),
            _ => self.execute_registered(call).await,
        }
    }

    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }

    async fn read_file(&self, call: &ToolCall) -> ToolResult {
        let path = match call.argument("path") {
            Some(path) => path,
            None => return ToolResult::error("read_file", "Missing required argument 'path'"),
        };
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(message) => return ToolResult::error("read_file", message),
        };

        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_file() => match tokio::fs::read_to_string(&resolved).await {
                Ok(content) => ToolResult::ok("read_file", content),
                Err(err) => ToolResult::error("read_file", format!("Cannot read {}: {}", path, err)),
            },
            Ok(_) => ToolResult::error("read_file", format!("Not a file: {}", path)),
            Err(_) => ToolResult::error("read_file", format!("Not found: {}", path)),
        }
    }

    async fn list_files(&self, call: &ToolCall) -> ToolResult {
        let path = call.argument("path").unwrap_or(".");
        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(message) => return ToolResult::error("list_files", message),
        };

        let mut read_dir = match tokio::fs::read_dir(&resolved).await {
            Ok(read_dir) => read_dir,
            Err(_) => return ToolResult::error("list_files", format!("Not found: {}", path)),
        };

        let mut entries: Vec<(bool, String)> = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push((is_dir, entry.file_name().to_string_lossy().into_owned()));
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        let listing = entries
            .iter()
            .map(|(is_dir, name)| {
                format!("[{}] {}", if *is_dir { "dir" } else { "file" }, name)
            })
            .collect::<Vec<_>>()
            .join("\n");
        ToolResult::ok("list_files", listing)
    }

    async fn execute_registered(&self, call: &ToolCall) -> ToolResult {
        let tool = match self.tools.get(&call.name) {
            Some(tool) => tool,
            None => {
                let mut available: Vec<String> =
                    builtin_descriptors().iter().map(|d| d.name.clone()).collect();
                available.extend(self.tools.keys().cloned());
                available.sort();
                return ToolResult::error(
                    &call.name,
                    format!(
                        "Unknown tool '{}'. Available: {}",
                        call.name,
                        available.join(", ")
                    ),
                );
            }
        };

        let arguments = coerce_arguments(tool.descriptor(), &call.arguments);
        match tool.invoke(arguments).await {
            Ok(output) => ToolResult::ok(&call.name, output),
            Err(err) => ToolResult::error(&call.name, err),
        }
    }

    /// Resolve a tool path against cwd. The lexically-normalized result
    /// must stay under cwd; `..` escapes are denied before any fs access.
    fn resolve(&self, path: &str) -> std::result::Result<PathBuf, String> {
        let joined = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.cwd.join(path)
        };
        let normalized = lexical_normalize(&joined);
        if !normalized.starts_with(&self.cwd) {
            return Err(format!(
                "Access denied: '{}' is outside the working directory",
                path
            ));
        }
        Ok(normalized)
    }
}

/// Resolve `.`/`..` components without touching the filesystem, so escape
/// checks also cover paths that do not exist.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn builtin_descriptors() -> Vec<ToolDescriptor> {
    use super::descriptor::ParamSpec;
    vec![
        ToolDescriptor::new("read_file", "Read a file relative to the working directory")
            .with_param(ParamSpec::new("path", ParamType::String, "File path")),
        ToolDescriptor::new("list_files", "List a directory's immediate children")
            .with_param(
                ParamSpec::new("path", ParamType::String, "Directory path, default '.'")
                    .optional(),
            ),
        ToolDescriptor::new("write_file", "Disabled; delegate writes via a task block"),
    ]
}

/// Rebuild typed JSON arguments from the extractor's string values using
/// the tool's parameter descriptor. Arguments without a descriptor entry
/// pass through as strings.
pub fn coerce_arguments(
    descriptor: &ToolDescriptor,
    raw: &std::collections::BTreeMap<String, String>,
) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (key, value) in raw {
        let coerced = match descriptor.param(key).map(|p| &p.param_type) {
            Some(ParamType::Boolean) => {
                let parsed = value
                    .parse::<bool>()
                    .unwrap_or_else(|_| value.eq_ignore_ascii_case("true"));
                serde_json::Value::Bool(parsed)
            }
            Some(ParamType::Integer) => {
                serde_json::Value::from(value.parse::<i64>().unwrap_or(0))
            }
            Some(ParamType::Float) => {
                serde_json::Value::from(value.parse::<f64>().unwrap_or(0.0))
            }
            Some(ParamType::List(_)) => serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::json!([value])),
            Some(ParamType::Object) => serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone())),
            _ => serde_json::Value::String(value.clone()),
        };
        object.insert(key.clone(), coerced);
    }
    serde_json::Value::Object(object)
}

/// Render results in the wire form consumed by the next loop iteration.
pub fn format_results(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(|result| {
            format!(
                "<tool_result>\n<tool_name>{}</tool_name>\n<status>{}</status>\n<output>\n{}\n</output>\n</tool_result>",
                result.tool_name,
                if result.success { "success" } else { "error" },
                result.output
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tooling::descriptor::ParamSpec;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                descriptor: ToolDescriptor::new("echo", "Echo typed arguments back")
                    .with_param(ParamSpec::new("count", ParamType::Integer, "A number"))
                    .with_param(ParamSpec::new("enabled", ParamType::Boolean, "A flag"))
                    .with_param(ParamSpec::new(
                        "items",
                        ParamType::List(Box::new(ParamType::String)),
                        "Some items",
                    ))
                    .with_param(ParamSpec::new("config", ParamType::Object, "Nested config")),
            }
        }
    }

    #[async_trait]
    impl TypedTool for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, arguments: serde_json::Value) -> Result<String> {
            Ok(arguments.to_string())
        }
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("src/b.txt"), "beta").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_read_file() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path());

        let call = ToolCall::new("read_file").with_argument("path", "src/a.txt");
        let result = executor.execute(&call).await;
        assert!(result.success);
        assert_eq!(result.output, "alpha");
    }

    #[tokio::test]
    async fn test_read_file_escape_denied() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path());

        let call = ToolCall::new("read_file").with_argument("path", "../etc/passwd");
        let result = executor.execute(&call).await;
        assert!(!result.success);
        assert!(result.output.contains("Access denied"));
    }

    #[tokio::test]
    async fn test_read_file_dotdot_inside_stays_allowed() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path());

        let call = ToolCall::new("read_file").with_argument("path", "src/../src/a.txt");
        let result = executor.execute(&call).await;
        assert!(result.success, "{}", result.output);
    }

    #[tokio::test]
    async fn test_read_missing_and_directory() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path());

        let result = executor
            .execute(&ToolCall::new("read_file").with_argument("path", "src/ghost.txt"))
            .await;
        assert!(result.output.contains("Not found"));

        let result = executor
            .execute(&ToolCall::new("read_file").with_argument("path", "src"))
            .await;
        assert!(result.output.contains("Not a file"));
    }

    #[tokio::test]
    async fn test_list_files_sorted_with_prefixes() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path());

        let call = ToolCall::new("list_files").with_argument("path", "src");
        let result = executor.execute(&call).await;
        assert!(result.success);
        assert_eq!(result.output, "[file] a.txt\n[file] b.txt");

        let result = executor.execute(&ToolCall::new("list_files")).await;
        assert_eq!(result.output, "[dir] src");
    }

    #[tokio::test]
    async fn test_write_file_disabled() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path());

        let call = ToolCall::new("write_file")
            .with_argument("path", "src/c.txt")
            .with_argument("content", "gamma");
        let result = executor.execute(&call).await;
        assert!(!result.success);
        assert!(result.output.contains("@@@task"));
    }

    #[tokio::test]
    async fn test_registered_tool_coercion() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path())
            .with_tools(vec![Arc::new(EchoTool::new()) as Arc<dyn TypedTool>]);

        let call = ToolCall::new("echo")
            .with_argument("count", "42")
            .with_argument("enabled", "TRUE")
            .with_argument("items", r#"["a","b"]"#)
            .with_argument("config", r#"{"k":1}"#);
        let result = executor.execute(&call).await;
        assert!(result.success);

        let echoed: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(echoed["count"], serde_json::json!(42));
        assert_eq!(echoed["enabled"], serde_json::json!(true));
        assert_eq!(echoed["items"], serde_json::json!(["a", "b"]));
        assert_eq!(echoed["config"], serde_json::json!({"k": 1}));
    }

    #[tokio::test]
    async fn test_coercion_fallbacks() {
        let descriptor = EchoTool::new().descriptor.clone();
        let mut raw = BTreeMap::new();
        raw.insert("count".to_string(), "not-a-number".to_string());
        raw.insert("items".to_string(), "just-one".to_string());
        raw.insert("config".to_string(), "plain".to_string());

        let value = coerce_arguments(&descriptor, &raw);
        assert_eq!(value["count"], serde_json::json!(0));
        assert_eq!(value["items"], serde_json::json!(["just-one"]));
        assert_eq!(value["config"], serde_json::json!("plain"));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let dir = fixture_dir();
        let executor = TextToolExecutor::new(dir.path())
            .with_tools(vec![Arc::new(EchoTool::new()) as Arc<dyn TypedTool>]);

        let result = executor.execute(&ToolCall::new("teleport")).await;
        assert!(!result.success);
        assert!(result.output.contains("read_file"));
        assert!(result.output.contains("list_files"));
        assert!(result.output.contains("echo"));
    }

    #[test]
    fn test_format_results_grammar() {
        let results = vec![
            ToolResult::ok("list_files", "[file] a.txt"),
            ToolResult::error("read_file", "Not found: x"),
        ];
        let formatted = format_results(&results);
        assert!(formatted.contains("<tool_result>\n<tool_name>list_files</tool_name>\n<status>success</status>\n<output>\n[file] a.txt\n</output>\n</tool_result>"));
        assert!(formatted.contains("<status>error</status>"));
        assert!(formatted.contains("Error: Not found: x"));
    }
}
