//! Process configuration, read from environment variables.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Uploader/registry process configuration.
///
/// Only the keys that affect the fan-out engine are modeled here in
/// detail (`min_storages`); the remaining keys gate collaborators that
/// are out of this crate's scope (REST front-end, persistent metadata,
/// per-node blob store, node registration) and are carried through as
/// plain strings so a full process can still be wired from one `Config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Metadata store DSN. Consumed by the (out-of-scope) repository backing.
    #[serde(default)]
    pub database_url: Option<String>,

    /// REST bind address (out-of-scope front-end).
    #[serde(default = "default_rest_host")]
    pub rest_host: String,

    /// Node-facing RPC bind address (out-of-scope server side of the
    /// node protocol; this crate only consumes the client side).
    #[serde(default = "default_protocol_host")]
    pub protocol_host: String,

    /// URL host minted into `upload_link` responses (out-of-scope REST).
    #[serde(default)]
    pub upload_file_host: Option<String>,

    /// Per-node blob directory (out-of-scope filesystem backend).
    #[serde(default)]
    pub fs_root_path: Option<String>,

    /// This node's self-chosen identity (out-of-scope node process).
    #[serde(default)]
    pub storage_id: Option<String>,

    /// This node's advertised address (out-of-scope node process).
    #[serde(default)]
    pub storage_host: Option<String>,

    /// Uploader/registry address nodes register against (out-of-scope).
    #[serde(default)]
    pub registry_host: Option<String>,

    /// Minimum number of storage nodes that must admit a new upload.
    #[serde(default = "default_min_storages")]
    pub min_storages: usize,
}

fn default_rest_host() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_protocol_host() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_min_storages() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            rest_host: default_rest_host(),
            protocol_host: default_protocol_host(),
            upload_file_host: None,
            fs_root_path: None,
            storage_id: None,
            storage_host: None,
            registry_host: None,
            min_storages: default_min_storages(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.database_url = std::env::var("DATABASE_URL").ok();
        if let Ok(v) = std::env::var("REST_HOST") {
            config.rest_host = v;
        }
        if let Ok(v) = std::env::var("PROTOCOL_HOST") {
            config.protocol_host = v;
        }
        config.upload_file_host = std::env::var("UPLOAD_FILE_HOST").ok();
        config.fs_root_path = std::env::var("FS_ROOT_PATH").ok();
        config.storage_id = std::env::var("STORAGE_ID").ok();
        config.storage_host = std::env::var("STORAGE_HOST").ok();
        config.registry_host = std::env::var("REGISTRY_HOST").ok();

        if let Ok(v) = std::env::var("MIN_STORAGES") {
            match v.parse() {
                Ok(parsed) => config.min_storages = parsed,
                Err(_) => {
                    tracing::warn!(value = %v, "MIN_STORAGES is not a valid integer, keeping default");
                }
            }
        }

        config
    }

    /// Validate the parts of the config the fan-out engine actually reads.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_storages == 0 {
            return Err(ConfigError::Invalid(
                "MIN_STORAGES must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
