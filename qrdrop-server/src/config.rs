//! Server configuration, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | 3001 |
//! | `QRDROP_BIND` | 0.0.0.0 |
//! | `QRDROP_DATA_DIR` | `data` |
//! | `QRDROP_MAX_UPLOAD_BYTES` | 50 MiB |
//! | `QRDROP_ENCRYPT_AT_REST` | true |
//! | `QRDROP_SINGLE_USE` | false |
//! | `QRDROP_MAX_AGE_SECS` | unset (no expiry) |
//! | `QRDROP_PURGE_INTERVAL_SECS` | 300 |
//! | `QRDROP_LEGACY_DIR` | unset |

use qrdrop_blobstore::{RetentionPolicy, StoreConfig};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub store: StoreConfig,
    /// Zero disables the maintenance task.
    pub purge_interval_secs: u64,
    /// Directory holding an old `files.json` and its payloads, imported on
    /// startup.
    pub legacy_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            store: StoreConfig::default(),
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
            legacy_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from any variable source. Unset or blank variables
    /// take their defaults; set but unparseable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            bind: get("QRDROP_BIND").unwrap_or(defaults.bind),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            data_dir: get("QRDROP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_upload_bytes: parse(&get, "QRDROP_MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            store: StoreConfig {
                encrypt_at_rest: flag(&get, "QRDROP_ENCRYPT_AT_REST")?
                    .unwrap_or(defaults.store.encrypt_at_rest),
                retention: RetentionPolicy {
                    single_use: flag(&get, "QRDROP_SINGLE_USE")?.unwrap_or(false),
                    max_age_secs: parse(&get, "QRDROP_MAX_AGE_SECS")?,
                },
            },
            purge_interval_secs: parse(&get, "QRDROP_PURGE_INTERVAL_SECS")?
                .unwrap_or(defaults.purge_interval_secs),
            legacy_dir: get("QRDROP_LEGACY_DIR").map(PathBuf::from),
        })
    }
}

fn parse<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError { var, value })
        })
        .transpose()
}

fn flag<G>(get: &G, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError { var, value }),
        })
        .transpose()
}
