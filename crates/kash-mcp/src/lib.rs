// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-mcp
//!
//! The MCP tool surface.
//!
//! Actions marked `mcp_tool` are published as tools. Each tool's input
//! schema is `{items: [string], <param>: <schema>}`; invocation returns a
//! text payload holding a human-readable summary, the primary output's
//! content, and the log lines captured during the run. Every error is
//! returned as text, never as a protocol-level failure.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// In-memory log capture for returning run logs with tool results.
pub mod capture;
/// JSON-RPC dispatch and the stdio serve loop.
pub mod server;
/// Tool definitions and invocation.
pub mod tools;

pub use capture::LogCapture;
pub use server::{dispatch_jsonrpc, run_stdio, McpServer};
pub use tools::{invoke_tool, tool_definitions};
