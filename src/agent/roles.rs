//! Per-role prompt and iteration-budget tables.
//!
//! Roles share one agent machinery; behavior differences live in this
//! table rather than in separate agent types.

use crate::coordination::types::AgentRole;
use crate::tooling::{render_tool_protocol, ToolDescriptor};

#[derive(Debug, Clone, Copy)]
pub struct RoleProfile {
    pub max_iterations: u32,
    pub system_preamble: &'static str,
}

const ROUTA_PREAMBLE: &str = "\
You are ROUTA, the planning agent. Decompose the user's request into \
discrete tasks. Emit each task as an @@@task block:

@@@task
# <task title>
## Objective
<what must be achieved>
## Scope
- <file or area>
## Definition of Done
- <acceptance criterion>
## Verification
- <command or check>
@@@

Keep tasks independent and concrete. Do not implement anything yourself.";

const CRAFTER_PREAMBLE: &str = "\
You are CRAFTER, an implementation agent working on one task. Inspect the \
workspace with the available tools, then produce the implementation the \
task asks for. Report what you did and which files are involved when you \
finish.";

const GATE_PREAMBLE: &str = "\
You are GATE, the verification agent. Compare the task definitions against \
the implementation reports and decide. Reply with a verdict line starting \
with APPROVED or REJECTED, followed by your reasoning.";

pub fn role_profile(role: AgentRole) -> RoleProfile {
    match role {
        AgentRole::Routa => RoleProfile {
            max_iterations: 12,
            system_preamble: ROUTA_PREAMBLE,
        },
        AgentRole::Crafter => RoleProfile {
            max_iterations: 20,
            system_preamble: CRAFTER_PREAMBLE,
        },
        AgentRole::Gate => RoleProfile {
            max_iterations: 6,
            system_preamble: GATE_PREAMBLE,
        },
    }
}

/// Full system prompt for a role: preamble plus the text tool protocol for
/// the tools actually available.
pub fn build_system_prompt(role: AgentRole, descriptors: &[ToolDescriptor]) -> String {
    let profile = role_profile(role);
    if descriptors.is_empty() {
        return profile.system_preamble.to_string();
    }
    format!(
        "{}\n\n{}",
        profile.system_preamble,
        render_tool_protocol(descriptors)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tooling::{ParamSpec, ParamType};

    #[test]
    fn test_budgets_per_role() {
        assert_eq!(role_profile(AgentRole::Crafter).max_iterations, 20);
        assert!(role_profile(AgentRole::Gate).max_iterations < 20);
    }

    #[test]
    fn test_system_prompt_includes_protocol() {
        let descriptors = vec![ToolDescriptor::new("read_file", "Read a file")
            .with_param(ParamSpec::new("path", ParamType::String, "File path"))];
        let prompt = build_system_prompt(AgentRole::Crafter, &descriptors);
        assert!(prompt.contains("CRAFTER"));
        assert!(prompt.contains("<tool_call>"));
        assert!(prompt.contains("read_file"));
    }

    #[test]
    fn test_no_tools_no_protocol() {
        let prompt = build_system_prompt(AgentRole::Gate, &[]);
        assert!(prompt.contains("GATE"));
        assert!(!prompt.contains("<tool_call>"));
    }
}
