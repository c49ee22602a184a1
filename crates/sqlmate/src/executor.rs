use serde::Serialize;
use std::sync::Arc;

use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

pub const NO_OUTPUT: &str = "Tool executed successfully (no output)";
pub const ERROR_PREFIX: &str = "Error executing tool";

/// The normalized outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub payload: String,
}

impl ToolResult {
    fn ok<S: Into<String>>(payload: S) -> Self {
        Self {
            success: true,
            payload: payload.into(),
        }
    }

    fn failed(name: &str, message: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            payload: format!("{} {}: {}", ERROR_PREFIX, name, message),
        }
    }
}

/// Runs tool calls against a [`System`] and turns every outcome into text.
///
/// Execution never fails: transport and remote errors come back as a payload
/// starting with [`ERROR_PREFIX`] so they can be fed to the model.
#[derive(Clone)]
pub struct ToolExecutor {
    system: Arc<dyn System>,
}

impl ToolExecutor {
    pub fn new(system: Arc<dyn System>) -> Self {
        Self { system }
    }

    pub fn tools(&self) -> &[Tool] {
        self.system.tools()
    }

    pub async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        let name = tool_call.name.as_str();
        if name.trim().is_empty() {
            return ToolResult::failed(name, "tool name is empty");
        }

        tracing::info!(tool = %name, arguments = %tool_call.arguments, "executing tool");
        let result = match self.system.call(tool_call.clone()).await {
            Ok(content) => match content.first() {
                None => ToolResult::ok(NO_OUTPUT),
                Some(Content::Text(text)) => ToolResult::ok(text.text.clone()),
                Some(_) => ToolResult::ok(format!(
                    "Tool {} executed but returned unexpected content type",
                    name
                )),
            },
            Err(e) => ToolResult::failed(name, e.detail()),
        };

        if result.success {
            tracing::debug!(tool = %name, bytes = result.payload.len(), "tool finished");
        } else {
            tracing::warn!(tool = %name, "{}", result.payload);
        }
        result
    }
}
