use crate::error::FanlogError;
use crate::record::Level;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main configuration for fanlog
///
/// Every section is optional; missing fields take their defaults. Field
/// aliases accept the key names used by older JSON configuration files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Console output
    #[serde(alias = "console_writer")]
    pub console: ConsoleConfig,

    /// Time-patterned file output
    #[serde(alias = "file_writer")]
    pub file: FileConfig,

    /// Batched remote log-analytics output
    #[serde(alias = "ali_loghub_writer")]
    pub loghub: LogHubConfig,

    /// Message-broker outputs, one sink per entry
    #[serde(alias = "kafka_writers")]
    pub kafka: Vec<KafkaConfig>,
}

impl Config {
    /// Load configuration from a file; `.json` files are parsed as JSON,
    /// anything else as TOML
    pub fn from_file(path: &Path) -> Result<Self, FanlogError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FanlogError::Config(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, FanlogError> {
        toml::from_str(content)
            .map_err(|e| FanlogError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Parse configuration from a JSON string
    ///
    /// A top-level `"level"` key is accepted as the global level.
    pub fn from_json_str(content: &str) -> Result<Self, FanlogError> {
        let mut value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| FanlogError::Config(format!("Failed to parse config: {}", e)))?;

        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("general") {
                if let Some(level) = obj.remove("level") {
                    obj.insert("general".to_string(), serde_json::json!({ "level": level }));
                }
            }
        }

        serde_json::from_value(value)
            .map_err(|e| FanlogError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, FanlogError> {
        toml::to_string_pretty(self)
            .map_err(|e| FanlogError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// The global threshold; an unrecognized value falls back to DEBUG
    pub fn global_level(&self) -> Level {
        Level::parse_or(&self.general.level, Level::Debug)
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Global threshold: debug, info, warning, error, fatal
    pub level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

/// Resolve a per-sink level string against the global level
///
/// Empty means "follow the global level" and yields `None`; an unrecognized
/// value is warned about and also yields `None`.
pub fn sink_level(value: &str) -> Option<Level> {
    if value.trim().is_empty() {
        return None;
    }
    match value.parse() {
        Ok(level) => Some(level),
        Err(e) => {
            tracing::warn!(value = %value, error = %e, "Unrecognized sink level, using global level");
            None
        }
    }
}

/// Console output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    #[serde(alias = "on")]
    pub enabled: bool,
    /// Per-sink threshold; empty follows the global level
    pub level: String,
    /// Enable colored output
    pub color: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: String::new(),
            color: false,
        }
    }
}

/// File output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(alias = "on")]
    pub enabled: bool,
    pub level: String,
    /// Output path; `%Y %M %D %H %m` expand to year, month, day, hour, minute
    #[serde(alias = "log_path")]
    pub path_pattern: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: String::new(),
            path_pattern: "logs/fanlog-%Y%M%D.log".to_string(),
        }
    }
}

/// Batched log-analytics output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogHubConfig {
    #[serde(alias = "on")]
    pub enabled: bool,
    pub level: String,
    /// Topic attached to every submitted batch
    pub log_name: String,
    /// Source attached to every submitted batch; empty means the local IP
    pub log_source: String,
    pub project_name: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub store_name: String,
    /// Number of entries buffered before an automatic flush
    pub buf_size: usize,
    /// What a failed flush does to later flushes
    pub flush_error_policy: FlushErrorPolicy,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LogHubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: String::new(),
            log_name: "fanlog".to_string(),
            log_source: String::new(),
            project_name: String::new(),
            endpoint: String::new(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            store_name: String::new(),
            buf_size: 2048,
            flush_error_policy: FlushErrorPolicy::Sticky,
            timeout_ms: 5_000,
        }
    }
}

/// What a failed batch submission does to later flushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushErrorPolicy {
    /// Refuse every later flush with the same error until it is cleared
    #[default]
    Sticky,
    /// Keep the entries and try again on the next flush
    Retry,
}

/// Message-broker output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    #[serde(alias = "on")]
    pub enabled: bool,
    pub level: String,
    /// Capacity of the queue between callers and the delivery worker
    #[serde(alias = "bufferSize")]
    pub buffer_size: usize,
    /// Echo every outgoing message to the diagnostics channel
    pub debug: bool,
    /// Constant partition key; empty sends no key
    pub key: String,
    #[serde(alias = "producerTopic")]
    pub producer_topic: String,
    /// Delivery timeout in milliseconds
    #[serde(alias = "producerTimeout")]
    pub producer_timeout: u64,
    /// Broker (REST proxy) base URLs, tried in order
    pub brokers: Vec<String>,
    /// Static fields merged into every message
    #[serde(alias = "MSG")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: String::new(),
            buffer_size: 1,
            debug: false,
            key: String::new(),
            producer_topic: String::new(),
            producer_timeout: 100,
            brokers: Vec::new(),
            fields: BTreeMap::new(),
        }
    }
}
