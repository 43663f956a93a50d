// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tool definitions and invocation.

use crate::capture::LogCapture;
use kash_core::params::{RawParamValues, RawValue};
use kash_exec::{run_action_with_selection, ActionRegistry, RuntimeSettings};
use kash_store::FileStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Cap on the primary output content included in a tool result.
const MAX_CONTENT_LEN: usize = 64 * 1024;

/// Tool definitions for every action published as an MCP tool.
///
/// Each tool's input schema is `{items: [string], <param>: <schema>}`;
/// `items` is required when the action expects arguments, along with any
/// explicit parameters.
#[must_use]
pub fn tool_definitions(registry: &ActionRegistry) -> Value {
    let mut tools = Vec::new();
    for action in registry.all_actions().iter() {
        let spec = action.spec();
        if !spec.mcp_tool {
            continue;
        }

        let mut properties = serde_json::Map::new();
        properties.insert(
            "items".to_string(),
            json!({
                "type": "array",
                "items": {"type": "string"},
                "description": "Input items: URLs, file paths, or store paths."
            }),
        );
        let mut required = Vec::new();
        if spec.expected_args.min > 0 {
            required.push("items".to_string());
        }
        for param in &spec.params {
            properties.insert(param.name.clone(), param.json_schema());
            if param.is_explicit {
                required.push(param.name.clone());
            }
        }

        tools.push(json!({
            "name": spec.name,
            "description": spec.description,
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        }));
    }
    Value::Array(tools)
}

fn text_content(text: String, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error,
    })
}

/// Invoke a published action as a tool.
///
/// The returned value is always a text result: on success a summary, the
/// primary output's content (only the first item's content is included),
/// and the captured log lines; on failure the error text plus logs.
pub fn invoke_tool(
    ws: &Arc<FileStore>,
    registry: &ActionRegistry,
    capture: Option<&LogCapture>,
    name: &str,
    arguments: &Value,
) -> Value {
    info!(target: "kash.mcp", tool = name, "tool call");

    let items: Vec<String> = arguments
        .get("items")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut params = RawParamValues::new();
    if let Some(object) = arguments.as_object() {
        for (key, value) in object {
            if key == "items" {
                continue;
            }
            match value {
                Value::Bool(b) => params.set_flag(key, *b),
                Value::String(s) => params.set(key, s),
                Value::Number(n) => params.set(key, n.to_string()),
                Value::Null => {
                    params.0.insert(key.clone(), RawValue::None);
                }
                other => params.set(key, other.to_string()),
            }
        }
    }

    let outcome = run_action_with_selection(
        Arc::clone(ws),
        registry,
        None,
        name,
        &params,
        &items,
        RuntimeSettings {
            workspace_dir: ws.base_dir().to_path_buf(),
            ..RuntimeSettings::default()
        },
    );

    let logs = capture.map(LogCapture::drain).unwrap_or_default();

    match outcome {
        Ok(outcome) => {
            let mut text = format!(
                "Action `{name}` completed with {} item(s).\n",
                outcome.result.items.len()
            );
            for sp in &outcome.saved_paths {
                text.push_str(&format!("- {}\n", sp.display_str()));
            }

            // Primary output content: the first item only.
            if let Some(first) = outcome.saved_paths.first() {
                if let Ok(content) = std::fs::read_to_string(ws.abs_path(first)) {
                    let truncated: String = content.chars().take(MAX_CONTENT_LEN).collect();
                    text.push_str("\n---\n");
                    text.push_str(&truncated);
                    if truncated.len() < content.len() {
                        text.push_str("\n[truncated]");
                    }
                }
            }
            if outcome.saved_paths.len() > 1 {
                text.push_str(&format!(
                    "\n[{} further output(s) not shown]",
                    outcome.saved_paths.len() - 1
                ));
            }

            if !logs.is_empty() {
                text.push_str("\n\nLogs:\n");
                text.push_str(&logs.join("\n"));
            }
            text_content(text, false)
        }
        Err(e) => {
            let mut text = format!("Action `{name}` failed: {e}");
            if !logs.is_empty() {
                text.push_str("\n\nLogs:\n");
                text.push_str(&logs.join("\n"));
            }
            text_content(text, true)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
