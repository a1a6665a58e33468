//! MCP (Model Context Protocol) server core
//!
//! JSON-RPC 2.0 over stdio. No external SDK - blocking I/O, one request at
//! a time.
//!
//! ```text
//! stdin ──▶ server (framing) ──▶ Dispatcher ──▶ Registry ──▶ HandlerSet
//! stdout ◀──────────────────────────┘
//! ```

pub mod content;
pub mod dispatch;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;

pub use content::{CallToolResult, Content, Resource, ResourceContents, ToolFailure, ToolOutcome};
pub use dispatch::{Dispatcher, HandlerSet};
pub use registry::Registry;
pub use schema::{ArgType, Arguments, InputSchema};
pub use server::{run_stdio, serve};
