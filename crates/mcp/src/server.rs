//! MCP server implementation.
//!
//! Reads frames from a transport, dispatches each request through the
//! closed `McpRequest` set and writes exactly one response per request id.
//! Two scheduling modes exist:
//!
//! - **Serialized**: each line is handled to completion, response written,
//!   before the next line is read.
//! - **Concurrent**: each line runs on its own task, bounded by a semaphore;
//!   finished frames funnel through a channel to a single writer task.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use pgbridge_core::DispatchMode;
use pgbridge_tool_runtime::{ToolContext, ToolRegistry};

use crate::error::McpError;
use crate::request::{McpNotification, McpRequest};
use crate::transport::{FrameReader, FrameWriter, McpTransport};
use crate::types::*;

/// In-flight limit when none is configured.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;

/// MCP server that bridges a `ToolRegistry` to MCP clients.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    server_name: String,
    server_version: String,
    mode: DispatchMode,
    max_in_flight: usize,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, context: ToolContext) -> Self {
        Self {
            registry: Arc::new(registry),
            context,
            server_name: "postgres-query-server".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: DispatchMode::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Concurrent-mode task limit; clamped to at least one.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Run until the transport reaches end of input.
    ///
    /// Returns once every accepted request has been answered and the writer
    /// has flushed. Only transport failures surface as `Err`.
    pub async fn run<T: McpTransport>(&self, transport: T) -> Result<(), McpError> {
        info!(
            server = %self.server_name,
            mode = %self.mode,
            max_in_flight = self.max_in_flight,
            tools = self.registry.len(),
            "MCP server starting"
        );
        let (reader, writer) = transport.split();
        match self.mode {
            DispatchMode::Serialized => self.run_serialized(reader, writer).await,
            DispatchMode::Concurrent => self.run_concurrent(reader, writer).await,
        }
    }

    async fn run_serialized<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: FrameReader,
        W: FrameWriter,
    {
        while let Some(line) = reader.receive().await? {
            if let Some(response) = self.handle_line(&line).await {
                writer.send(&encode(&response)).await?;
            }
        }
        info!("Transport closed, shutting down");
        Ok(())
    }

    async fn run_concurrent<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: FrameReader,
        W: FrameWriter + 'static,
    {
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let (tx, mut rx) = mpsc::channel::<String>(self.max_in_flight * 2);

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                writer.send(&frame).await?;
            }
            Ok::<(), McpError>(())
        });

        let mut tasks = JoinSet::new();
        let read_result = loop {
            // Writer gone means stdout is gone; stop taking work.
            if tx.is_closed() {
                break Ok(());
            }
            let line = match reader.receive().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => break Err(McpError::Internal(format!("request limiter closed: {e}"))),
            };

            let server = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if let Some(response) = server.handle_line(&line).await {
                    // A send error means the writer already failed; it reports that.
                    let _ = tx.send(encode(&response)).await;
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        };

        info!(in_flight = tasks.len(), "Transport closed, draining in-flight requests");
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        drop(tx);

        let write_result = writer_task
            .await
            .unwrap_or_else(|e| Err(McpError::Internal(format!("writer task failed: {e}"))));
        read_result.and(write_result)
    }

    /// Handle one input line. `None` means nothing is written back (the
    /// line was a notification).
    ///
    /// Never fails: every fault becomes an error response, including a
    /// panic inside a handler.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        debug!(len = line.len(), "Received message");

        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to parse JSON");
                return Some(error_response(None, McpError::JsonParse(e)));
            }
        };

        let request = match parse_request(line, &raw) {
            Ok(request) => request,
            Err((id, err)) => {
                warn!(error = %err, "Invalid JSON-RPC request");
                return Some(error_response(id, err));
            }
        };

        let id = request.id.clone();
        let method = request.method.clone();
        let outcome = AssertUnwindSafe(self.handle_request(request))
            .catch_unwind()
            .await;

        match (id, outcome) {
            (Some(id), Ok(Ok(result))) => Some(JsonRpcResponse::success(Some(id), result)),
            (Some(id), Ok(Err(err))) => Some(error_response(Some(id), err)),
            (Some(id), Err(panic)) => {
                let message = panic_message(panic);
                error!(method = %method, panic = %message, "Handler panicked");
                Some(error_response(Some(id), McpError::Internal(message)))
            }
            (None, Ok(Err(err))) => {
                debug!(method = %method, error = %err, "Notification failed");
                None
            }
            (None, Err(panic)) => {
                error!(method = %method, panic = %panic_message(panic), "Notification handler panicked");
                None
            }
            (None, Ok(Ok(_))) => None,
        }
    }

    /// Dispatch a parsed request. Notifications are handled here too; the
    /// caller discards their result.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, McpError> {
        if request.is_notification() && request.method.starts_with("notifications/") {
            self.handle_notification(McpNotification::from_method(&request.method));
            return Ok(Value::Null);
        }

        debug!(method = %request.method, "Dispatching request");
        match McpRequest::parse(&request.method, request.params)? {
            McpRequest::Initialize(params) => self.handle_initialize(params),
            McpRequest::ListTools => self.handle_list_tools(),
            McpRequest::CallTool(params) => self.handle_call_tool(params).await,
            McpRequest::ListResources => to_result(ListResourcesResult::default()),
            McpRequest::ListPrompts => to_result(ListPromptsResult::default()),
        }
    }

    fn handle_notification(&self, notification: McpNotification) {
        match notification {
            McpNotification::Initialized => info!("Client confirmed initialization"),
            McpNotification::Cancelled => debug!("Client cancelled a request"),
            McpNotification::Other(method) => {
                debug!(method = %method, "Unknown notification, ignoring")
            }
        }
    }

    fn handle_initialize(&self, params: InitializeParams) -> Result<Value, McpError> {
        info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
            "Handling initialize"
        );

        to_result(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
                resources: Some(Value::Object(Default::default())),
                prompts: Some(Value::Object(Default::default())),
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: self.server_version.clone(),
            },
        })
    }

    fn handle_list_tools(&self) -> Result<Value, McpError> {
        let tools: Vec<ToolInfo> = self.registry.list().into_iter().map(ToolInfo::from).collect();
        to_result(ListToolsResult { tools })
    }

    async fn handle_call_tool(&self, params: CallToolParams) -> Result<Value, McpError> {
        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?;

        debug!(tool = %params.name, "Handling tools/call");
        let output = tool.execute(params.arguments, &self.context).await?;

        to_result(CallToolResult {
            content: vec![ToolContent::Text {
                text: output.content,
            }],
            is_error: false,
        })
    }
}

/// Validate the request envelope. On failure, return whatever id could be
/// recovered so the error can still be matched by the client.
///
/// `raw` is only inspected for shape; the request itself is decoded from
/// `line` so numeric ids keep their source text.
fn parse_request(line: &str, raw: &Value) -> Result<JsonRpcRequest, (Option<RpcId>, McpError)> {
    let Value::Object(fields) = raw else {
        return Err((None, McpError::InvalidRequest("expected a JSON object".to_string())));
    };
    let id = serde_json::from_str::<IdEnvelope>(line).ok().and_then(|e| e.id);

    match fields.get("method") {
        Some(Value::String(_)) => {}
        Some(_) => {
            return Err((id, McpError::InvalidRequest("'method' must be a string".to_string())))
        }
        None => return Err((id, McpError::InvalidRequest("missing 'method'".to_string()))),
    }

    serde_json::from_str(line).map_err(|e| (id, McpError::InvalidRequest(e.to_string())))
}

#[derive(Deserialize)]
struct IdEnvelope {
    #[serde(default)]
    id: Option<RpcId>,
}

fn error_response(id: Option<RpcId>, err: McpError) -> JsonRpcResponse {
    JsonRpcResponse::error(id, err.to_rpc_error())
}

fn to_result<T: Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::Internal(format!("failed to encode result: {e}")))
}

/// Serialize a response frame. Falls back to a bare internal error so the
/// client is never left without a line.
pub fn encode(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode response");
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Internal error: failed to encode response"}}}}"#,
            error_codes::INTERNAL_ERROR
        )
    })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Request task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pgbridge_db::{MockDriver, QueryExecutor, Row, SchemaCache};
    use pgbridge_tool_runtime::{Tool, ToolDefinition, ToolError, ToolResult};
    use serde_json::json;

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "explode".to_string(),
                description: "Always panics".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            panic!("boom");
        }
    }

    fn server(driver: MockDriver) -> McpServer {
        let context = ToolContext::new(
            QueryExecutor::new(Arc::new(driver)),
            SchemaCache::default(),
        );
        let mut registry = ToolRegistry::with_builtin_tools().unwrap();
        registry.register(PanickingTool).unwrap();
        McpServer::new(registry, context)
    }

    async fn call(server: &McpServer, line: Value) -> Value {
        let resp = server.handle_line(&line.to_string()).await.unwrap();
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = server(MockDriver::new()).with_name("nyc-taxi");
        let resp = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "test-client"}
            }}),
        )
        .await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "nyc-taxi");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
        assert_eq!(resp["result"]["capabilities"]["resources"], json!({}));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let server = server(MockDriver::new());
        let resp = call(&server, json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"})).await;
        let names: Vec<&str> = resp["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"query_database"));
        assert!(resp["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_empty_resources_and_prompts() {
        let server = server(MockDriver::new());
        let resp = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"})).await;
        assert_eq!(resp["result"], json!({"resources": []}));
        let resp = call(&server, json!({"jsonrpc": "2.0", "id": 3, "method": "prompts/list"})).await;
        assert_eq!(resp["result"], json!({"prompts": []}));
    }

    #[tokio::test]
    async fn test_call_tool_wraps_text() {
        let mut row = Row::new();
        row.insert("one".to_string(), json!(1));
        let server = server(MockDriver::new().with_rows("SELECT 1 AS one", vec![row]));
        let resp = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "query_database", "arguments": {"sql": "SELECT 1 AS one"}}}),
        )
        .await;
        assert_eq!(resp["result"]["content"][0]["type"], "text");
        let text = resp["result"]["content"][0]["text"].as_str().unwrap();
        let rows: Value = serde_json::from_str(text).unwrap();
        assert_eq!(rows, json!([{"one": 1}]));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let server = server(MockDriver::new());
        let resp = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "drop_everything"}}),
        )
        .await;
        assert_eq!(resp["error"]["code"], error_codes::INVALID_PARAMS);
        assert_eq!(resp["error"]["message"], "Unknown tool: drop_everything");
    }

    #[tokio::test]
    async fn test_database_failure_maps_to_server_error() {
        let server = server(MockDriver::new().with_failure("SELECT x", "column \"x\" does not exist"));
        let resp = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call",
                   "params": {"name": "query_database", "arguments": {"sql": "SELECT x"}}}),
        )
        .await;
        assert_eq!(resp["id"], 6);
        assert_eq!(resp["error"]["code"], error_codes::DATABASE_ERROR);
        assert_eq!(resp["error"]["data"]["sql"], "SELECT x");
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let server = server(MockDriver::new());
        let resp = server.handle_line("{not json").await.unwrap();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.unwrap().code, error_codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_request_recovers_id() {
        let server = server(MockDriver::new());
        let resp = server.handle_line(r#"{"jsonrpc":"2.0","id":9,"method":42}"#).await.unwrap();
        assert_eq!(serde_json::to_string(&resp.id).unwrap(), "9");
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);

        let resp = server.handle_line("[1,2,3]").await.unwrap();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let driver = Arc::new(MockDriver::new().with_status("DELETE FROM trips", "DELETE 3"));
        let context = ToolContext::new(QueryExecutor::new(driver.clone()), SchemaCache::default());
        let server = McpServer::new(ToolRegistry::with_builtin_tools().unwrap(), context);

        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","id":null,"method":"no/such/method"}"#)
            .await
            .is_none());
        // Dispatched for side effects, outcome discarded.
        assert!(server
            .handle_line(
                r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"query_database","arguments":{"sql":"DELETE FROM trips"}}}"#
            )
            .await
            .is_none());
        assert_eq!(driver.statements(), vec!["DELETE FROM trips".to_string()]);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let server = server(MockDriver::new());
        let resp = call(
            &server,
            json!({"jsonrpc": "2.0", "id": "p", "method": "tools/call", "params": {"name": "explode"}}),
        )
        .await;
        assert_eq!(resp["id"], "p");
        assert_eq!(resp["error"]["code"], error_codes::INTERNAL_ERROR);
        assert_eq!(resp["error"]["message"], "Internal error: boom");

        // The server is still usable afterwards.
        let resp = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        assert!(resp["result"]["tools"].is_array());
    }

    #[tokio::test]
    async fn test_numeric_ids_echoed_as_sent() {
        let server = server(MockDriver::new());
        for raw in ["1e2", "-0", "100000000000000000000000000000"] {
            let line = format!(r#"{{"jsonrpc":"2.0","id":{raw},"method":"tools/list"}}"#);
            let frame = encode(&server.handle_line(&line).await.unwrap());
            assert!(frame.contains(&format!(r#""id":{raw},"#)), "{raw} became {frame}");
        }

        // Recovered ids on rejected envelopes are verbatim too.
        let frame = encode(&server.handle_line(r#"{"jsonrpc":"2.0","id":1e2,"method":7}"#).await.unwrap());
        assert!(frame.contains(r#""id":1e2,"#), "{frame}");
    }

    #[tokio::test]
    async fn test_concurrent_panic_yields_one_error_frame() {
        use crate::transport::ChannelTransport;

        let mut row = Row::new();
        row.insert("n".to_string(), json!(1));
        let server = server(MockDriver::new().with_rows("SELECT 1 AS n", vec![row]))
            .with_mode(DispatchMode::Concurrent)
            .with_max_in_flight(3);

        let (client, server_end) = ChannelTransport::pair();
        let handle = tokio::spawn(async move { server.run(server_end).await });
        let (mut rx, mut tx) = client.split();
        let lines = [
            json!({"jsonrpc": "2.0", "id": "before", "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": "bang", "method": "tools/call", "params": {"name": "explode"}}),
            json!({"jsonrpc": "2.0", "id": "after", "method": "tools/call",
                   "params": {"name": "query_database", "arguments": {"sql": "SELECT 1 AS n"}}}),
        ];
        for line in &lines {
            tx.send(&line.to_string()).await.unwrap();
        }
        drop(tx);

        let mut frames = Vec::new();
        while let Some(frame) = rx.receive().await.unwrap() {
            frames.push(serde_json::from_str::<Value>(&frame).unwrap());
        }
        handle.await.unwrap().unwrap();

        assert_eq!(frames.len(), 3);
        let bang: Vec<&Value> = frames.iter().filter(|f| f["id"] == "bang").collect();
        assert_eq!(bang.len(), 1);
        assert_eq!(bang[0]["error"]["code"], error_codes::INTERNAL_ERROR);
        assert_eq!(bang[0]["error"]["message"], "Internal error: boom");
        for id in ["before", "after"] {
            let frame = frames.iter().find(|f| f["id"] == id).unwrap();
            assert!(frame.get("error").is_none(), "{id} failed: {frame}");
        }
    }

    #[test]
    fn test_max_in_flight_clamped() {
        let server = server(MockDriver::new()).with_max_in_flight(0);
        assert_eq!(server.max_in_flight, 1);
    }
}
