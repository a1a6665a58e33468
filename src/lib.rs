pub mod config;
pub mod error;
pub mod handlers;
pub mod mcp;
pub mod paths;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{ProtocolError, ProtocolResult};
pub use handlers::{CodeServer, DatabaseServer, DocumentServer};
pub use mcp::{Dispatcher, HandlerSet};
