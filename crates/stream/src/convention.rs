//! Tool-call emulation over free-form model output.
//!
//! The assistant service has no structured function calling, so tools are
//! described in the prompt and the model is told to answer with a JSON
//! object. An [`OutputConvention`] owns both halves: the instruction it
//! appends to the query and the decoder that recognizes a call in the reply.

use regex::Regex;
use serde_json::Value;
use std::fmt::Write as _;
use wifassist_types::{ToolDeclaration, ToolInvocation, WifError, traits::Result};

/// Instruction + decoder pair for one tool-calling convention.
pub trait OutputConvention: Send + Sync {
    /// Text appended to the query; `None` when nothing needs to be added.
    fn instruction(&self, tools: &[ToolDeclaration]) -> Option<String>;

    /// Recover a tool call from the complete reply text.
    ///
    /// Malformed or incomplete candidates are not errors: they yield `None`
    /// and the reply is treated as plain text.
    fn decode(&self, text: &str) -> Option<ToolInvocation>;
}

/// `{"tool": ..., "parameters": {...}}`, preferably in a ```` ```json ```` fence.
#[derive(Debug, Clone)]
pub struct FencedJsonConvention {
    fenced: Regex,
    bare: Regex,
}

impl FencedJsonConvention {
    /// # Errors
    ///
    /// Returns [`WifError::Config`] if the built-in patterns fail to compile.
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| WifError::Config(format!("invalid pattern: {e}")))
        };
        Ok(Self {
            fenced: compile(r"(?s)```json\s*(\{.*?\})\s*```")?,
            bare: compile(r#"(?s)(\{.*"tool".*\})"#)?,
        })
    }

    /// The first candidate object: the fenced block if there is one,
    /// otherwise the widest brace span mentioning `"tool"`.
    fn candidate<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.fenced
            .captures(text)
            .or_else(|| self.bare.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

impl OutputConvention for FencedJsonConvention {
    fn instruction(&self, tools: &[ToolDeclaration]) -> Option<String> {
        if tools.is_empty() {
            return None;
        }
        let mut out = String::from("\n\nSYSTEM INSTRUCTION: You have access to the following tools:\n");
        for tool in tools {
            let _ = writeln!(out, "- `{}`: {}", tool.signature(), tool.description);
        }
        out.push_str(
            "To use a tool, you MUST output a JSON object with this EXACT format:\n\
             ```json\n\
             {\"tool\": \"function_name\", \"parameters\": {\"param_name\": \"value\"}}\n\
             ```\n\
             If you use a tool, do not output any other text.",
        );
        Some(out)
    }

    fn decode(&self, text: &str) -> Option<ToolInvocation> {
        let candidate = self.candidate(text)?;
        let value: Value = match serde_json::from_str(candidate) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "tool call candidate is not valid JSON");
                return None;
            }
        };
        let name = value.get("tool")?.as_str()?;
        let parameters = value.get("parameters")?.as_object()?;
        Some(ToolInvocation {
            name: name.to_string(),
            parameters: parameters.clone(),
        })
    }
}
