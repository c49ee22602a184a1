use serde_json::{json, Value};

use sqlmate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerInfo, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS, METHOD_NOT_FOUND, PARSE_ERROR,
    PROTOCOL_VERSION,
};

use crate::tools::SqliteTools;

pub const SERVER_NAME: &str = "sqlite";

/// Handle one line read from stdin. Returns the line to write back, if any.
pub fn handle_line(tools: &SqliteTools, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let response = match serde_json::from_str::<JsonRpcRequest>(line) {
        Ok(request) => handle_request(tools, request)?,
        Err(e) => {
            tracing::warn!(error = %e, "could not parse request");
            JsonRpcResponse::failure(None, JsonRpcError::new(PARSE_ERROR, "Parse error"))
        }
    };

    match serde_json::to_string(&response) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            tracing::error!(error = %e, "could not encode response");
            None
        }
    }
}

pub fn handle_request(tools: &SqliteTools, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        tracing::debug!(method = %request.method, "notification");
        return None;
    }
    let id = request.id;

    let outcome = match request.method.as_str() {
        METHOD_INITIALIZE => to_value(&InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
        .map(|mut result| {
            result["capabilities"] = json!({"tools": {}});
            result
        }),
        METHOD_LIST_TOOLS => to_value(&ListToolsResult {
            tools: tools.tools(),
        }),
        METHOD_CALL_TOOL => call_tool(tools, request.params),
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

fn call_tool(tools: &SqliteTools, params: Option<Value>) -> Result<Value, JsonRpcError> {
    let params: CallToolParams = params
        .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing params"))
        .and_then(|p| {
            serde_json::from_value(p)
                .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {}", e)))
        })?;

    tracing::info!(tool = %params.name, "tool call");
    let result = match tools.call(&params.name, &params.arguments) {
        Ok(text) => CallToolResult::text(text),
        Err(e) if e.is_protocol_error() => {
            return Err(JsonRpcError::new(INVALID_PARAMS, e.to_string()))
        }
        Err(e) => {
            tracing::warn!(tool = %params.name, error = %e, "tool failed");
            CallToolResult::error(e.to_string())
        }
    };
    to_value(&result)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}
