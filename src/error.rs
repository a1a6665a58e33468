//! Protocol-level error types
//!
//! These are contract violations: the request is rejected with a JSON-RPC
//! error and no handler runs. Domain failures never use this type, they
//! travel in-band as [`crate::mcp::ToolFailure`].

use thiserror::Error;

/// Result type for registry and dispatch operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// JSON-RPC error codes used on the wire
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// MCP convention for unknown resources
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A tool with this name was already declared
    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),

    /// A resource scheme was registered twice
    #[error("Duplicate resource scheme: {0}")]
    DuplicateScheme(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required argument: {0}")]
    MissingRequiredArgument(String),

    #[error("Invalid argument '{key}': expected {expected}")]
    InvalidArgumentType { key: String, expected: &'static str },

    /// Tool arguments were not a JSON object
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown resource scheme: {0}")]
    UnknownResourceScheme(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// JSON-RPC error code for this error
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            ProtocolError::InvalidRequest(_) => codes::INVALID_REQUEST,
            ProtocolError::ResourceNotFound(_) => codes::RESOURCE_NOT_FOUND,
            ProtocolError::UnknownTool(_)
            | ProtocolError::MissingRequiredArgument(_)
            | ProtocolError::InvalidArgumentType { .. }
            | ProtocolError::InvalidArguments(_)
            | ProtocolError::UnknownResourceScheme(_)
            | ProtocolError::InvalidParams(_) => codes::INVALID_PARAMS,
            ProtocolError::DuplicateToolName(_)
            | ProtocolError::DuplicateScheme(_)
            | ProtocolError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }
}
