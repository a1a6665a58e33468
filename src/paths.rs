//! Single source of truth for toolhost's default filesystem layout.
//!
//! Everything is relative to the working directory the server is launched
//! from, matching how MCP hosts spawn stdio servers.
//!
//! ```text
//! ./
//! ├── toolhost.toml    # Optional config
//! ├── example.db       # Database handler set
//! └── documents/       # Document handler set
//!     └── <name>.txt
//! ```

use std::path::{Path, PathBuf};

/// Config file looked up when `--config` is not given
pub const CONFIG_FILE: &str = "toolhost.toml";

/// Default SQLite file for the database server
pub const DATABASE_FILE: &str = "example.db";

/// Default directory for the document server
pub const DOCUMENTS_DIR: &str = "documents";

/// Extension of stored documents
pub const DOCUMENT_EXT: &str = "txt";

pub fn default_config() -> PathBuf {
    PathBuf::from(CONFIG_FILE)
}

pub fn default_database() -> PathBuf {
    PathBuf::from(DATABASE_FILE)
}

pub fn default_documents_dir() -> PathBuf {
    PathBuf::from(DOCUMENTS_DIR)
}

/// Expand a leading `~` so config files can point into the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// `<dir>/<name>.txt`
pub fn document_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, DOCUMENT_EXT))
}
