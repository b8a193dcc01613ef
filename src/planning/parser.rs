//! Deterministic extraction of task records from planner markdown.
//!
//! The planner emits `@@@task … @@@` blocks. Each block holds one or more
//! level-1 titled sub-blocks with `##` sections; lines inside triple-backtick
//! fences are never treated as headers, so shell comments in code samples
//! cannot become task titles. Parsing never fails: malformed input yields an
//! empty list.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::coordination::types::Task;

static TASK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)@@@task[ \t]*\r?\n(.*?)\r?\n@@@").expect("task block regex"));

const DEFAULT_TITLE: &str = "Untitled Task";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Objective,
    Scope,
    Done,
    Verification,
}

/// Case-sensitive alias table; English and Chinese forms.
fn section_for(header: &str) -> Option<Section> {
    match header {
        "Objective" | "目标" | "Goal" | "目的" => Some(Section::Objective),
        "Scope" | "范围" | "作用域" => Some(Section::Scope),
        "Definition of Done" | "完成标准" | "验收标准" | "Acceptance Criteria"
        | "Done Criteria" | "完成条件" => Some(Section::Done),
        "Verification" | "验证" | "Verify" | "验证方法" | "测试验证" => {
            Some(Section::Verification)
        }
        _ => None,
    }
}

/// Parse every `@@@task` block in `text` into PENDING task records with
/// fresh ids, in document order.
pub fn parse_tasks(text: &str, workspace_id: &str) -> Vec<Task> {
    let mut tasks = Vec::new();
    for capture in TASK_BLOCK_RE.captures_iter(text) {
        let block = &capture[1];
        for sub_block in split_sub_blocks(block) {
            tasks.push(parse_sub_block(&sub_block, workspace_id));
        }
    }
    debug!(count = tasks.len(), "Parsed task blocks");
    tasks
}

/// Split a block at level-1 headers outside code fences. Zero or one
/// header keeps the block whole; two or more yield one sub-block per
/// header, each starting at its header line.
fn split_sub_blocks(block: &str) -> Vec<Vec<String>> {
    let lines: Vec<String> = block.lines().map(String::from).collect();

    let mut header_indices = Vec::new();
    let mut in_fence = false;
    for (idx, line) in lines.iter().enumerate() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence && is_title_line(line) {
            header_indices.push(idx);
        }
    }

    if header_indices.len() < 2 {
        return vec![lines];
    }

    let mut sub_blocks = Vec::with_capacity(header_indices.len());
    for (pos, &start) in header_indices.iter().enumerate() {
        let end = header_indices
            .get(pos + 1)
            .copied()
            .unwrap_or(lines.len());
        sub_blocks.push(lines[start..end].to_vec());
    }
    sub_blocks
}

fn is_title_line(line: &str) -> bool {
    line.starts_with("# ")
}

fn is_section_line(line: &str) -> bool {
    line.starts_with("## ")
}

fn parse_sub_block(lines: &[String], workspace_id: &str) -> Task {
    let mut title: Option<String> = None;
    let mut objective = String::new();
    let mut scope = Vec::new();
    let mut done = Vec::new();
    let mut verification = Vec::new();

    let mut seen_sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;
    let mut current_body: Vec<String> = Vec::new();
    let mut in_fence = false;

    let mut flush = |section: Option<Section>, body: &mut Vec<String>| {
        if let Some(section) = section {
            match section {
                Section::Objective => objective = body.join("\n").trim().to_string(),
                Section::Scope => scope = list_items(body),
                Section::Done => done = list_items(body),
                Section::Verification => verification = list_items(body),
            }
        }
        body.clear();
    };

    for line in lines {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            current_body.push(line.clone());
            continue;
        }
        if in_fence {
            current_body.push(line.clone());
            continue;
        }

        if is_title_line(line) {
            if title.is_none() {
                title = Some(line[2..].trim().to_string());
            }
            continue;
        }

        if is_section_line(line) {
            flush(current, &mut current_body);
            let header = line[3..].trim();
            current = match section_for(header) {
                // First occurrence of a canonical section wins.
                Some(section) if !seen_sections.contains(&section) => {
                    seen_sections.push(section);
                    Some(section)
                }
                _ => None,
            };
            continue;
        }

        current_body.push(line.clone());
    }
    flush(current, &mut current_body);

    Task::new(
        title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        workspace_id,
    )
    .with_objective(objective)
    .with_scope(scope)
    .with_acceptance_criteria(done)
    .with_verification_commands(verification)
}

/// Keep only `-` bullet lines, with the dash and surrounding whitespace
/// removed.
fn list_items(body: &[String]) -> Vec<String> {
    body.iter()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            trimmed
                .strip_prefix('-')
                .map(|rest| rest.trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Render a task back into the canonical `@@@task` grammar. Round-trips
/// through [`parse_tasks`].
pub fn format_task(task: &Task) -> String {
    let mut out = String::from("@@@task\n");
    out.push_str(&format!("# {}\n", task.title));
    if !task.objective.is_empty() {
        out.push_str("## Objective\n");
        out.push_str(&task.objective);
        out.push('\n');
    }
    if !task.scope.is_empty() {
        out.push_str("## Scope\n");
        for item in &task.scope {
            out.push_str(&format!("- {}\n", item));
        }
    }
    if !task.acceptance_criteria.is_empty() {
        out.push_str("## Definition of Done\n");
        for item in &task.acceptance_criteria {
            out.push_str(&format!("- {}\n", item));
        }
    }
    if !task.verification_commands.is_empty() {
        out.push_str("## Verification\n");
        for item in &task.verification_commands {
            out.push_str(&format!("- {}\n", item));
        }
    }
    out.push_str("@@@");
    out
}
