use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from journeys.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct JourneysConfig {
    pub warehouse: WarehouseConfig,
    pub extract: ExtractConfig,
    pub cost: CostConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
    pub serve: ServeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// SQLite file holding the day partitions. Relative paths resolve
    /// against the data directory.
    pub path: PathBuf,
    /// Partition tables are named `{table_prefix}{YYYYMMDD}`.
    pub table_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub primary_host: String,
    pub seed_hosts: Vec<String>,
    pub remove_query_parameters: bool,
    pub excluded_path_prefixes: Vec<String>,
    /// Document types whose page paths collapse to their first segment.
    pub truncate_document_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub usd_per_tib: f64,
    pub confirm_above_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

// --- Default implementations ---

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("warehouse.db"),
            table_prefix: "ga_sessions_".to_string(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            primary_host: "www.gov.uk".to_string(),
            seed_hosts: vec![
                "account.gov.uk".to_string(),
                "signin.account.gov.uk".to_string(),
            ],
            remove_query_parameters: true,
            excluded_path_prefixes: vec!["/print".to_string()],
            truncate_document_types: vec![
                "smart_answer".to_string(),
                "simple_smart_answer".to_string(),
                "local_transaction".to_string(),
                "licence".to_string(),
                "finder".to_string(),
                "search".to_string(),
            ],
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            usd_per_tib: 5.0,
            confirm_above_bytes: 0,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top_n: 20 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".journeys"),
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

/// Errors loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl JourneysConfig {
    /// Load config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
