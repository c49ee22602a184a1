//! Classify a model turn as a final answer or a request to run tools.
//!
//! Two interchangeable strategies exist. [`StructuredDetector`] reads the
//! function-call parts a model API returns; [`TokenDetector`] looks for command
//! tokens (`GET_SCHEMA`, `EXECUTE_SQL: ...`, `ANALYZE_TABLE: ...`) written in plain
//! text. Detectors only classify and extract, execution belongs to the
//! [`ToolExecutor`](crate::executor::ToolExecutor).
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use crate::models::tool::ToolCall;
use crate::models::wire::ModelResponse;

#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// No tool is needed, the text is the answer
    Answer(String),
    /// The model wants these tools run, in order. `text` is whatever prose came with them.
    ToolCalls { text: String, calls: Vec<ToolCall> },
}

pub trait ToolCallDetector: Send + Sync {
    fn detect(&self, response: &ModelResponse) -> Detection;
}

/// Every function-call part of the response is a tool call
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredDetector;

impl ToolCallDetector for StructuredDetector {
    fn detect(&self, response: &ModelResponse) -> Detection {
        let text = response.joined_text();
        let calls = response.tool_calls();
        if calls.is_empty() {
            Detection::Answer(text)
        } else {
            Detection::ToolCalls { text, calls }
        }
    }
}

lazy_static! {
    static ref GET_SCHEMA: Regex = Regex::new(r"(?i)GET_SCHEMA").unwrap();
    static ref EXECUTE_SQL: Regex = Regex::new(r"(?i)EXECUTE_SQL:[ \t]*([^\n]+)").unwrap();
    static ref ANALYZE_TABLE: Regex = Regex::new(r"(?i)ANALYZE_TABLE:[ \t]*(\w+)").unwrap();
}

/// Command tokens embedded in the response text. At most one command is honored,
/// the one that appears first.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDetector;

impl ToolCallDetector for TokenDetector {
    fn detect(&self, response: &ModelResponse) -> Detection {
        let text = response.joined_text();
        match parse_command(&text) {
            Some(call) => Detection::ToolCalls {
                text,
                calls: vec![call],
            },
            None => Detection::Answer(text),
        }
    }
}

/// Extract the earliest command token in `text`, if any
pub fn parse_command(text: &str) -> Option<ToolCall> {
    let mut found: Vec<(usize, ToolCall)> = Vec::new();

    if let Some(m) = GET_SCHEMA.find(text) {
        found.push((m.start(), ToolCall::new("get_schema", json!({}))));
    }
    if let Some(caps) = EXECUTE_SQL.captures(text) {
        let sql = caps[1].trim();
        if !sql.is_empty() {
            found.push((
                caps.get(0).map_or(0, |m| m.start()),
                ToolCall::new("query_data", json!({ "sql": sql })),
            ));
        }
    }
    if let Some(caps) = ANALYZE_TABLE.captures(text) {
        found.push((
            caps.get(0).map_or(0, |m| m.start()),
            ToolCall::new("analyze_table", json!({ "table_name": &caps[1] })),
        ));
    }

    found
        .into_iter()
        .min_by_key(|(start, _)| *start)
        .map(|(_, call)| call)
}
