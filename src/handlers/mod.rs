//! The three handler sets served by `toolhost`
//!
//! Each owns its domain state and plugs into the MCP core through
//! [`HandlerSet`](crate::mcp::HandlerSet).

pub mod code;
pub mod database;
pub mod document;

pub use code::CodeServer;
pub use database::DatabaseServer;
pub use document::DocumentServer;
