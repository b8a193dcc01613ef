//! Planner-output parsing.

pub mod parser;

pub use parser::{format_task, parse_tasks};
