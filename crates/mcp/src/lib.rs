//! MCP (Model Context Protocol) server for pgbridge.
//!
//! JSON-RPC 2.0 over newline-delimited frames, exposing the SQL tools of a
//! `ToolRegistry` to an LLM client.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **request**: the closed set of supported methods
//! - **transport**: split reader/writer halves (stdio, channels)
//! - **server**: dispatcher and the serialized/concurrent loops
//! - **error**: error taxonomy and JSON-RPC code mapping
//!
//! # Usage
//!
//! ```no_run
//! use pgbridge_mcp::{McpServer, StdioTransport};
//! use pgbridge_tool_runtime::{ToolContext, ToolRegistry};
//!
//! # async fn example(context: ToolContext) {
//! let registry = ToolRegistry::with_builtin_tools().unwrap();
//! let server = McpServer::new(registry, context);
//! server.run(StdioTransport::new()).await.unwrap();
//! # }
//! ```

pub mod error;
pub mod request;
pub mod server;
pub mod transport;
pub mod types;

pub use error::McpError;
pub use request::{McpNotification, McpRequest};
pub use server::McpServer;
pub use transport::{ChannelTransport, FrameReader, FrameWriter, McpTransport, StdioTransport};
pub use types::*;
