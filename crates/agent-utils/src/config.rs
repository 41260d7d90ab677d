//! API key configuration
//!
//! Keys are looked up per service name. An environment variable wins over the
//! key file, which is a TOML document of the form:
//!
//! ```toml
//! [api_keys]
//! openAI = "sk-..."
//! FRED = "..."
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default location of the key file, relative to the working directory
pub const DEFAULT_KEY_FILE: &str = "API_Key/api_key.toml";

/// Errors raised while resolving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Key not present in the environment or the key file
    #[error("API key for service '{service}' not found (set {env_var} or add it to the key file)")]
    MissingKey {
        /// Service name as used in the key file
        service: String,
        /// Environment variable that was checked
        env_var: String,
    },

    /// Key file exists but could not be read
    #[error("Failed to read key file {path}: {source}")]
    Read {
        /// Path of the key file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Key file is not valid TOML
    #[error("Error decoding TOML from key file {path}: {message}")]
    Parse {
        /// Path of the key file
        path: PathBuf,
        /// Decoder message
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct KeyFile {
    #[serde(default)]
    api_keys: HashMap<String, String>,
}

/// API keys loaded from a key file
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: HashMap<String, String>,
}

impl ApiKeys {
    /// Load keys from a TOML file
    ///
    /// A missing file yields an empty key set, so that environment variables
    /// alone are enough to run.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "Key file not found, relying on environment");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&raw).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse keys from TOML text
    fn from_toml_str(raw: &str) -> Result<Self, String> {
        let file: KeyFile = toml::from_str(raw).map_err(|e| e.to_string())?;
        Ok(Self {
            keys: file.api_keys,
        })
    }

    /// Get a key from the file only
    pub fn get(&self, service: &str) -> Option<&str> {
        self.keys
            .get(service)
            .map(String::as_str)
            .filter(|key| !key.is_empty())
    }

    /// Resolve a key: `env_var` first, then the key file
    pub fn resolve(&self, service: &str, env_var: &str) -> Result<String, ConfigError> {
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return Ok(key);
            }
        }

        self.get(service)
            .map(ToString::to_string)
            .ok_or_else(|| ConfigError::MissingKey {
                service: service.to_string(),
                env_var: env_var.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_key_file() {
        let keys = ApiKeys::from_toml_str("[api_keys]\nopenAI = \"sk-test\"\nFRED = \"fred\"\n")
            .unwrap();
        assert_eq!(keys.get("openAI"), Some("sk-test"));
        assert_eq!(keys.get("FRED"), Some("fred"));
        assert_eq!(keys.get("BLS"), None);
    }

    #[test]
    fn test_empty_key_is_missing() {
        let keys = ApiKeys::from_toml_str("[api_keys]\nopenAI = \"\"\n").unwrap();
        assert_eq!(keys.get("openAI"), None);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let keys = ApiKeys::from_file(dir.path().join("nope.toml")).unwrap();
        assert_eq!(keys.get("openAI"), None);
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("api_key.toml");
        std::fs::write(&path, "[api_keys\nopenAI = ").unwrap();

        let result = ApiKeys::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_resolve_prefers_env() {
        let keys = ApiKeys::from_toml_str("[api_keys]\nopenAI = \"from-file\"\n").unwrap();

        unsafe {
            std::env::set_var("AGENT_UTILS_TEST_KEY_A", "from-env");
        }
        assert_eq!(
            keys.resolve("openAI", "AGENT_UTILS_TEST_KEY_A").unwrap(),
            "from-env"
        );
        unsafe {
            std::env::remove_var("AGENT_UTILS_TEST_KEY_A");
        }
    }

    #[test]
    fn test_resolve_falls_back_to_file() {
        let keys = ApiKeys::from_toml_str("[api_keys]\nopenAI = \"from-file\"\n").unwrap();
        assert_eq!(
            keys.resolve("openAI", "AGENT_UTILS_TEST_KEY_UNSET").unwrap(),
            "from-file"
        );
    }

    #[test]
    fn test_resolve_missing() {
        let keys = ApiKeys::default();
        let err = keys
            .resolve("openAI", "AGENT_UTILS_TEST_KEY_UNSET_2")
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
        assert!(err.to_string().contains("openAI"));
    }
}
