//! The closed set of methods the server answers.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::McpError;
use crate::types::{CallToolParams, InitializeParams};

/// A request method with its parameters already validated.
#[derive(Debug, Clone)]
pub enum McpRequest {
    Initialize(InitializeParams),
    ListTools,
    CallTool(CallToolParams),
    ListResources,
    ListPrompts,
}

impl McpRequest {
    /// Map a method name plus raw params onto a variant.
    pub fn parse(method: &str, params: Option<Value>) -> Result<Self, McpError> {
        match method {
            "initialize" => {
                let params = match params {
                    None | Some(Value::Null) => InitializeParams::default(),
                    Some(raw) => serde_json::from_value(raw)
                        .map_err(|e| McpError::InvalidParams(format!("Invalid initialize params: {e}")))?,
                };
                Ok(McpRequest::Initialize(params))
            }
            "tools/list" => Ok(McpRequest::ListTools),
            "tools/call" => parse_call(params).map(McpRequest::CallTool),
            "resources/list" => Ok(McpRequest::ListResources),
            "prompts/list" => Ok(McpRequest::ListPrompts),
            other => {
                warn!(method = %other, "Unknown method");
                Err(McpError::MethodNotFound(other.to_string()))
            }
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            McpRequest::Initialize(_) => "initialize",
            McpRequest::ListTools => "tools/list",
            McpRequest::CallTool(_) => "tools/call",
            McpRequest::ListResources => "resources/list",
            McpRequest::ListPrompts => "prompts/list",
        }
    }
}

fn parse_call(params: Option<Value>) -> Result<CallToolParams, McpError> {
    let Some(raw) = params else {
        return Err(McpError::InvalidParams("Missing params for tools/call".to_string()));
    };
    let mut call: CallToolParams = serde_json::from_value(raw)
        .map_err(|e| McpError::InvalidParams(format!("Invalid tools/call params: {e}")))?;

    match call.arguments {
        Value::Object(_) => {}
        Value::Null => call.arguments = Value::Object(Map::new()),
        _ => {
            return Err(McpError::InvalidParams(
                "Tool arguments must be an object".to_string(),
            ))
        }
    }
    Ok(call)
}

/// Client-to-server notifications the server recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpNotification {
    Initialized,
    Cancelled,
    Other(String),
}

impl McpNotification {
    pub fn from_method(method: &str) -> Self {
        match method {
            "notifications/initialized" => McpNotification::Initialized,
            "notifications/cancelled" => McpNotification::Cancelled,
            other => McpNotification::Other(other.to_string()),
        }
    }
}
