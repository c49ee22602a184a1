use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, openai_response_to_model_response, tools_to_openai_spec,
    wire_to_openai_spec,
};
use crate::models::tool::Tool;
use crate::models::wire::{ModelResponse, WireContent};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = match data.get("usage") {
            Some(usage) => usage,
            None => return Usage::default(),
        };
        let read = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);

        let input_tokens = read("prompt_tokens");
        let output_tokens = read("completion_tokens");
        let total_tokens = read("total_tokens").or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(err) = body
                    .get("error")
                    .and_then(check_openai_context_length_error)
                {
                    return Err(err.into());
                }
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        contents: &[WireContent],
        tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)> {
        let messages_spec = wire_to_openai_spec(contents);
        let tools_spec = if !tools.is_empty() {
            tools_to_openai_spec(tools)?
        } else {
            vec![]
        };

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_spec
        });

        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let model_response = openai_response_to_model_response(&response)?;
        let usage = Self::get_usage(&response);
        tracing::debug!(
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "openai completion"
        );

        Ok((model_response, usage))
    }
}
