// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON-RPC dispatch and the stdio serve loop.
//!
//! A minimal MCP server: `initialize`, `tools/list`, `tools/call`, and
//! `ping` over newline-delimited JSON-RPC on stdin/stdout. Tool errors are
//! embedded in tool results as text; only malformed requests produce
//! JSON-RPC errors.

use crate::capture::LogCapture;
use crate::tools::{invoke_tool, tool_definitions};
use kash_exec::ActionRegistry;
use kash_store::FileStore;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Protocol version this server speaks.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported in the initialize handshake.
const SERVER_NAME: &str = "kash";

/// State for one MCP server instance.
pub struct McpServer {
    /// The workspace served.
    pub ws: Arc<FileStore>,
    /// The registry of published actions.
    pub registry: &'static ActionRegistry,
    /// Captured run logs returned with tool results.
    pub capture: LogCapture,
}

impl McpServer {
    /// Create a server over a workspace and registry.
    #[must_use]
    pub fn new(ws: Arc<FileStore>, registry: &'static ActionRegistry) -> Self {
        Self {
            ws,
            registry,
            capture: LogCapture::new(),
        }
    }

    /// Use an existing capture buffer (one whose layer is installed in the
    /// active subscriber) so tool results include run logs.
    #[must_use]
    pub fn with_capture(mut self, capture: LogCapture) -> Self {
        self.capture = capture;
        self
    }
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

/// Dispatch one JSON-RPC request. Returns `None` for notifications.
#[must_use]
pub fn dispatch_jsonrpc(server: &McpServer, request: &Value) -> Option<Value> {
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let id = request.get("id").cloned();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    // Notifications get no response.
    let id = match id {
        Some(id) => id,
        None => {
            debug!(target: "kash.mcp", method, "notification");
            return None;
        }
    };

    let response = match method {
        "initialize" => {
            let client_version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION);
            info!(target: "kash.mcp", client_version, "initialize");
            rpc_result(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {"tools": {}},
                }),
            )
        }
        "ping" => rpc_result(id, json!({})),
        "tools/list" => rpc_result(id, json!({"tools": tool_definitions(server.registry)})),
        "tools/call" => {
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let result = invoke_tool(
                &server.ws,
                server.registry,
                Some(&server.capture),
                name,
                &arguments,
            );
            rpc_result(id, result)
        }
        other => {
            warn!(target: "kash.mcp", method = other, "unknown method");
            rpc_error(id, -32601, &format!("method not found: {other}"))
        }
    };
    Some(response)
}

/// Serve MCP over stdio until stdin closes.
///
/// # Errors
///
/// Returns an error if stdio reads or writes fail.
pub fn run_stdio(server: &McpServer) -> std::io::Result<()> {
    info!(target: "kash.mcp", ws = %server.ws.base_dir().display(), "serving MCP over stdio");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let response = rpc_error(Value::Null, -32700, &format!("parse error: {e}"));
                writeln!(stdout, "{response}")?;
                stdout.flush()?;
                continue;
            }
        };
        if let Some(response) = dispatch_jsonrpc(server, &request) {
            writeln!(stdout, "{response}")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use kash_core::formats::Format;
    use kash_core::items::{Item, ItemType};
    use kash_exec::{ActionBuilder, ActionResult};
    use kash_store::store::SaveOptions;
    use std::sync::OnceLock;

    fn test_registry() -> &'static ActionRegistry {
        static REGISTRY: OnceLock<ActionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let registry = ActionRegistry::new();
            let echo = ActionBuilder::new("echo_items", "Echo the inputs.")
                .mcp_tool()
                .run(|input, _| Ok(ActionResult::new(input.items)))
                .build()
                .unwrap();
            registry.register(Arc::new(echo));
            registry
        })
    }

    fn test_server() -> (tempfile::TempDir, McpServer) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(FileStore::open(dir.path(), true).unwrap());
        (dir, McpServer::new(ws, test_registry()))
    }

    #[test]
    fn initialize_negotiates_and_reports_tools() {
        let (_dir, server) = test_server();

        let response = dispatch_jsonrpc(
            &server,
            &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": {"protocolVersion": "2024-11-05"}}),
        )
        .unwrap();
        assert_eq!(response["result"]["serverInfo"]["name"], "kash");
        assert!(response["result"]["capabilities"]["tools"].is_object());

        let response = dispatch_jsonrpc(
            &server,
            &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "echo_items"));
    }

    #[test]
    fn notifications_get_no_response() {
        let (_dir, server) = test_server();
        let response = dispatch_jsonrpc(
            &server,
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        );
        assert!(response.is_none());
    }

    #[test]
    fn unknown_method_is_a_jsonrpc_error() {
        let (_dir, server) = test_server();
        let response = dispatch_jsonrpc(
            &server,
            &json!({"jsonrpc": "2.0", "id": 3, "method": "bogus/method"}),
        )
        .unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn tool_call_returns_text_result() {
        let (_dir, server) = test_server();

        let mut item = Item::new(ItemType::Doc);
        item.title = Some("Echoed".into());
        item.format = Some(Format::Markdown);
        item.body = Some("payload\n".into());
        let sp = server.ws.save(&mut item, SaveOptions::default()).unwrap();

        let response = dispatch_jsonrpc(
            &server,
            &json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                    "params": {"name": "echo_items", "arguments": {"items": [sp.to_string()]}}}),
        )
        .unwrap();
        let result = &response["result"];
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("completed"));

        // A failing call is still a result, not a protocol error.
        let response = dispatch_jsonrpc(
            &server,
            &json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                    "params": {"name": "does_not_exist", "arguments": {}}}),
        )
        .unwrap();
        assert_eq!(response["result"]["isError"], true);
        assert!(response.get("error").is_none());
    }
}
