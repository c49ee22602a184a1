use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::GeminiProviderConfig;
use super::utils::{gemini_response_to_model_response, tools_to_gemini_spec, wire_to_gemini_spec};
use crate::models::tool::Tool;
use crate::models::wire::{ModelResponse, WireContent};

/// Client for the Gemini `generateContent` API
pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = match data.get("usageMetadata") {
            Some(usage) => usage,
            None => return Usage::default(),
        };
        let read = |key: &str| usage.get(key).and_then(|v| v.as_i64()).map(|v| v as i32);

        let input_tokens = read("promptTokenCount");
        let output_tokens = read("candidatesTokenCount");
        let total_tokens = read("totalTokenCount").or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.host.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
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
                let message = body["error"]["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string());
                Err(anyhow!("Request failed: {}: {}", status, message))
            }
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(
        &self,
        contents: &[WireContent],
        tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)> {
        let mut payload = json!({
            "contents": wire_to_gemini_spec(contents),
        });

        if !tools.is_empty() {
            payload["tools"] = json!([tools_to_gemini_spec(tools)?]);
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temp) = self.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(tokens));
        }
        if !generation_config.is_empty() {
            payload["generationConfig"] = Value::Object(generation_config);
        }

        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("Gemini API error: {}", error));
        }

        let model_response = gemini_response_to_model_response(&response)?;
        let usage = Self::get_usage(&response);
        tracing::debug!(
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "gemini completion"
        );

        Ok((model_response, usage))
    }
}
