//! Self-describing tool parameter metadata.
//!
//! Every tool exposed to an LLM carries a descriptor so the text-based
//! dispatcher can rebuild typed arguments from the stringly-typed values
//! the extractor produces.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Float,
    List(Box<ParamType>),
    Object,
    Enum(Vec<String>),
}

impl ParamType {
    pub fn label(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Integer => "integer".into(),
            Self::Boolean => "boolean".into(),
            Self::Float => "float".into(),
            Self::List(inner) => format!("list<{}>", inner.label()),
            Self::Object => "object".into(),
            Self::Enum(values) => format!("enum({})", values.join("|")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn new(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// One prompt-ready block describing the tool and its parameters.
    pub fn render(&self) -> String {
        let mut out = format!("- {}: {}\n", self.name, self.description);
        for param in &self.params {
            out.push_str(&format!(
                "    {} ({}{}): {}\n",
                param.name,
                param.param_type.label(),
                if param.required { "" } else { ", optional" },
                param.description
            ));
        }
        out
    }
}

/// Render the text tool-call protocol section of a system prompt.
pub fn render_tool_protocol(descriptors: &[ToolDescriptor]) -> String {
    let mut out = String::from(
        "You can call tools by emitting a block of this exact form:\n\
         \n\
         <tool_call>\n\
         {\"name\": \"<tool>\", \"arguments\": {\"<key>\": <value>}}\n\
         </tool_call>\n\
         \n\
         Tool results arrive in the next user message inside <tool_result> \
         blocks. When no tool is needed, reply with plain text and no \
         <tool_call> block.\n\
         \n\
         Available tools:\n",
    );
    for descriptor in descriptors {
        out.push_str(&descriptor.render());
    }
    out
}

/// A tool the text-based executor can dispatch to by name.
///
/// `invoke` receives arguments already rebuilt into typed JSON against the
/// descriptor; implementations return their human/LLM-readable output.
#[async_trait]
pub trait TypedTool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn invoke(&self, arguments: serde_json::Value) -> Result<String>;
}
