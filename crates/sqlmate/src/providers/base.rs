use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::tool::Tool;
use crate::models::wire::{ModelResponse, WireContent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Base trait for LLM providers (Gemini, OpenAI)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next model turn for the rendered history. An empty tool
    /// slice means no tool catalog is offered to the model.
    async fn complete(
        &self,
        contents: &[WireContent],
        tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)>;
}
