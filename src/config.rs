//! Server configuration stored in `toolhost.toml`
//!
//! All sections are optional with defaults, so an absent or empty file
//! yields a working configuration. CLI flags override file values.
//!
//! ```toml
//! [code]
//! python = "python3"
//! timeout_secs = 10
//!
//! [database]
//! path = "example.db"
//!
//! [document]
//! dir = "documents"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub code: CodeSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub document: DocumentSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSection {
    /// Interpreter used by `execute_code`
    #[serde(default = "default_python")]
    pub python: String,
    /// Wall-clock ceiling for one execution
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Upper bound for `timeout_secs`
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

fn default_python() -> String {
    "python3".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for CodeSection {
    fn default() -> Self {
        Self {
            python: default_python(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CodeSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "paths::default_database")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: paths::default_database(),
        }
    }
}

impl DatabaseSection {
    pub fn resolved_path(&self) -> PathBuf {
        paths::expand_home(&self.path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSection {
    #[serde(default = "paths::default_documents_dir")]
    pub dir: PathBuf,
}

impl Default for DocumentSection {
    fn default() -> Self {
        Self {
            dir: paths::default_documents_dir(),
        }
    }
}

impl DocumentSection {
    pub fn resolved_dir(&self) -> PathBuf {
        paths::expand_home(&self.dir)
    }
}

impl ServerConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `toolhost.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = paths::default_config();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.code.python, "python3");
        assert_eq!(config.code.timeout(), Duration::from_secs(10));
        assert_eq!(config.database.path, PathBuf::from("example.db"));
        assert_eq!(config.document.dir, PathBuf::from("documents"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("toolhost.toml");
        fs::write(&path, "[code]\ntimeout_secs = 3\n").unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.code.timeout_secs, 3);
        assert_eq!(config.code.python, "python3");
        assert_eq!(config.document.dir, PathBuf::from("documents"));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = ServerConfig::load(Some(&temp_dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[code\npython = ").unwrap();
        assert!(ServerConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let section = CodeSection {
            python: "python3".into(),
            timeout_secs: 0,
        };
        assert_eq!(section.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let section = CodeSection {
            python: "python3".into(),
            timeout_secs: u64::MAX,
        };
        assert_eq!(section.timeout(), Duration::from_secs(MAX_TIMEOUT_SECS));
    }
}
