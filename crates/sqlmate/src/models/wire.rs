use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// The two history roles model APIs recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Model,
}

/// One entry of the history sent to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireContent {
    pub role: WireRole,
    pub text: String,
}

impl WireContent {
    pub fn new<S: Into<String>>(role: WireRole, text: S) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A piece of a model turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePart {
    Text(String),
    ToolCall(ToolCall),
}

/// Everything a model produced for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub parts: Vec<ResponsePart>,
}

impl ModelResponse {
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self { parts }
    }

    /// A response made of a single text part
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::new(vec![ResponsePart::Text(text.into())])
    }

    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.parts.push(ResponsePart::ToolCall(tool_call));
        self
    }

    /// All text parts joined with newlines
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                ResponsePart::ToolCall(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls in the order the model emitted them
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::ToolCall(call) => Some(call.clone()),
                ResponsePart::Text(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_joined_text_skips_tool_calls() {
        let response = ModelResponse::text("Let me look.")
            .with_tool_call(ToolCall::new("get_schema", json!({})));
        assert_eq!(response.joined_text(), "Let me look.");
        assert_eq!(response.tool_calls().len(), 1);
    }

    #[test]
    fn test_empty_response() {
        let response = ModelResponse::default();
        assert_eq!(response.joined_text(), "");
        assert!(response.tool_calls().is_empty());
    }
}
