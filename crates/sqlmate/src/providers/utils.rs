use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::models::wire::{ModelResponse, ResponsePart, WireContent, WireRole};

/// Prefix that marks an inlined system message inside a user turn
pub const SYSTEM_MARKER: &str = "[SYSTEM] ";

/// Render conversation messages into the two-role history model APIs accept.
///
/// System and user messages become user turns, with system text tagged by
/// [`SYSTEM_MARKER`] so the model can tell instructions from conversation.
/// Assistant and tool messages become model turns and keep their text verbatim.
pub fn messages_to_wire_contents<'a, I>(messages: I) -> Vec<WireContent>
where
    I: IntoIterator<Item = &'a Message>,
{
    messages
        .into_iter()
        .map(|message| match message.role() {
            Role::System => WireContent::new(
                WireRole::User,
                format!("{}{}", SYSTEM_MARKER, message.content()),
            ),
            Role::User => WireContent::new(WireRole::User, message.content()),
            Role::Assistant | Role::Tool => WireContent::new(WireRole::Model, message.content()),
        })
        .collect()
}

/// Convert wire contents to Gemini `contents`, folding consecutive turns of the
/// same role into one content with several parts
pub fn wire_to_gemini_spec(contents: &[WireContent]) -> Vec<Value> {
    let mut spec: Vec<Value> = Vec::new();
    let mut last_role: Option<WireRole> = None;

    for content in contents {
        let role = match content.role {
            WireRole::User => "user",
            WireRole::Model => "model",
        };
        let part = json!({ "text": content.text });

        if last_role == Some(content.role) {
            if let Some(parts) = spec
                .last_mut()
                .and_then(|entry| entry.get_mut("parts"))
                .and_then(|parts| parts.as_array_mut())
            {
                parts.push(part);
                continue;
            }
        }
        spec.push(json!({ "role": role, "parts": [part] }));
        last_role = Some(content.role);
    }

    spec
}

/// Convert wire contents to OpenAI chat `messages`
pub fn wire_to_openai_spec(contents: &[WireContent]) -> Vec<Value> {
    contents
        .iter()
        .map(|content| {
            let role = match content.role {
                WireRole::User => "user",
                WireRole::Model => "assistant",
            };
            json!({ "role": role, "content": content.text })
        })
        .collect()
}

/// Convert internal Tool format to Gemini `functionDeclarations`
pub fn tools_to_gemini_spec(tools: &[Tool]) -> Result<Value> {
    let mut tool_names = std::collections::HashSet::new();
    let mut declarations = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        let mut declaration = json!({
            "name": tool.name,
            "description": tool.description,
        });
        // Gemini rejects parameter schemas for argument-less functions
        if has_properties(&tool.input_schema) {
            declaration["parameters"] = strip_unsupported_schema_keys(&tool.input_schema);
        }
        declarations.push(declaration);
    }

    Ok(json!({ "functionDeclarations": declarations }))
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

fn has_properties(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(|p| p.as_object())
        .is_some_and(|p| !p.is_empty())
}

fn strip_unsupported_schema_keys(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| {
                    !matches!(key.as_str(), "$schema" | "title" | "additionalProperties")
                })
                .map(|(key, value)| (key.clone(), strip_unsupported_schema_keys(value)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_unsupported_schema_keys).collect()),
        other => other.clone(),
    }
}

/// Convert a Gemini `generateContent` response into a model response
pub fn gemini_response_to_model_response(response: &Value) -> Result<ModelResponse> {
    let candidate = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .ok_or_else(|| match response.get("promptFeedback") {
            Some(feedback) => anyhow!("Gemini returned no candidates: {}", feedback),
            None => anyhow!("Gemini returned no candidates"),
        })?;

    let mut parts = Vec::new();
    let raw_parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());

    for part in raw_parts.into_iter().flatten() {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            parts.push(ResponsePart::Text(text.to_string()));
        } else if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = call.get("args").cloned().unwrap_or_else(|| json!({}));
            parts.push(ResponsePart::ToolCall(ToolCall::new(name, arguments)));
        }
    }

    Ok(ModelResponse::new(parts))
}

/// Convert OpenAI's API response into a model response
pub fn openai_response_to_model_response(response: &Value) -> Result<ModelResponse> {
    let original = &response["choices"][0]["message"];
    let mut parts = Vec::new();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        parts.push(ResponsePart::Text(text.to_string()));
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(&function_name) {
                tracing::warn!(name = %function_name, "model requested a tool with an invalid name");
            }

            // Unparseable arguments are passed through as a string so the tool
            // provider reports the problem back to the model
            let arguments = match serde_json::from_str::<Value>(arguments) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(
                        name = %function_name,
                        "could not interpret tool use parameters: {}",
                        e
                    );
                    Value::String(arguments.to_string())
                }
            };
            parts.push(ResponsePart::ToolCall(ToolCall::new(function_name, arguments)));
        }
    }

    Ok(ModelResponse::new(parts))
}

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
