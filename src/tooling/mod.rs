//! Text-based tool protocol: extraction, typed dispatch, result formatting.

pub mod descriptor;
pub mod executor;
pub mod extractor;

pub use descriptor::{render_tool_protocol, ParamSpec, ParamType, ToolDescriptor, TypedTool};
pub use executor::{coerce_arguments, format_results, TextToolExecutor};
pub use extractor::{extract_tool_calls, has_tool_calls, remove_tool_calls};
