//! Error types for the MCP crate.

use serde_json::json;

use pgbridge_tool_runtime::ToolError;

use crate::types::{error_codes, JsonRpcError};

/// Everything that can go wrong between reading a frame and writing its
/// response. Each variant maps to exactly one JSON-RPC error code.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The line was not valid JSON.
    #[error("Parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Transport I/O error. Ends the loop.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Valid JSON that is not a request object.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Message is sent to the client as-is.
    #[error("{0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// A statement failed inside the database.
    #[error("Database error: {message}")]
    Database { message: String, sql: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn code(&self) -> i64 {
        match self {
            McpError::JsonParse(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::ToolNotFound(_) => error_codes::INVALID_PARAMS,
            McpError::Database { .. } => error_codes::DATABASE_ERROR,
            McpError::Transport(_) | McpError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert to a JSON-RPC error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let data = match self {
            McpError::Database { sql, .. } => Some(json!({ "sql": sql })),
            _ => None,
        };
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::MissingParameter(_) | ToolError::InvalidInput(_) => {
                McpError::InvalidParams(err.to_string())
            }
            ToolError::Database { message, sql } => McpError::Database { message, sql },
            ToolError::Other(e) => McpError::Internal(format!("{e:#}")),
        }
    }
}
