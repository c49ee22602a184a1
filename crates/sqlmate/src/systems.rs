use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult, SessionError};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::session::ToolSession;

/// Something that owns a catalog of tools and can run them
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>>;
}

/// The tools served by a [`ToolSession`], with the catalog captured once at connect time
pub struct StdioSystem {
    session: Arc<ToolSession>,
    tools: Vec<Tool>,
}

impl StdioSystem {
    /// Snapshot the provider's tool catalog. An empty catalog is allowed and only
    /// logged, since the assistant can still answer in a degraded mode.
    pub async fn connect(session: Arc<ToolSession>) -> Result<Self, SessionError> {
        let tools = session.list_tools().await?;
        if tools.is_empty() {
            tracing::warn!(
                session = %session.id(),
                "tool provider offers no tools; continuing without database access"
            );
        } else {
            tracing::info!(
                session = %session.id(),
                tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "loaded tool catalog"
            );
        }
        Ok(Self { session, tools })
    }

    pub fn session(&self) -> &Arc<ToolSession> {
        &self.session
    }
}

#[async_trait]
impl System for StdioSystem {
    fn name(&self) -> &str {
        &self.session.server_info().name
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match self
            .session
            .call_tool(&tool_call.name, tool_call.arguments)
            .await
        {
            Ok(result) if result.is_error => {
                let message = result
                    .content
                    .iter()
                    .find_map(|c| c.as_text())
                    .unwrap_or("the tool reported a failure");
                Err(AgentError::ExecutionError(message.to_string()))
            }
            Ok(result) => Ok(result.content),
            Err(SessionError::Remote { message, .. }) => Err(AgentError::ExecutionError(message)),
            Err(e) => Err(AgentError::Internal(e.to_string())),
        }
    }
}
