use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Layout of the human-readable timestamp stamped on every record
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Record severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Fatal = 4,
}

impl Level {
    /// Every level, least severe first
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Fatal,
    ];

    /// Label written into outgoing records
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Parse a configured level name, falling back to `default` when the
    /// value is empty or unrecognized.
    ///
    /// An unrecognized value is reported as a warning rather than an error so
    /// that one bad field never aborts configuration.
    pub fn parse_or(value: &str, default: Level) -> Level {
        if value.trim().is_empty() {
            return default;
        }
        match value.parse() {
            Ok(level) => level,
            Err(e) => {
                tracing::warn!(value = %value, fallback = %default, error = %e, "Unrecognized log level");
                default
            }
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not one of the known levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError(String);

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid log level '{}'", self.0)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// A single log event, built once per log call and shared read-only with
/// every sink
///
/// The timestamp is captured and formatted at construction; nothing about a
/// record changes afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    level: Level,
    created_at: DateTime<Local>,
    time: String,
    code: String,
    info: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, serde_json::Value>,
}

impl Record {
    /// Create a record stamped with the current local time
    pub fn new(level: Level, code: impl Into<String>, info: impl Into<String>) -> Self {
        Self::at(level, Local::now(), code, info)
    }

    /// Create a record stamped with an explicit time
    pub fn at(
        level: Level,
        created_at: DateTime<Local>,
        code: impl Into<String>,
        info: impl Into<String>,
    ) -> Self {
        Self {
            level,
            time: created_at.format(TIME_FORMAT).to_string(),
            created_at,
            code: code.into(),
            info: info.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach a supplemental field, consumed by sinks that emit structured
    /// payloads. Values that fail to serialize are skipped.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.fields.insert(key.into(), value);
        }
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Formatted creation time
    pub fn time(&self) -> &str {
        &self.time
    }

    /// Call-site tag, usually `file:line`
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Fully formatted message text
    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn fields(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.fields
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {} {}", self.time, self.level, self.code, self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_from_str_is_case_insensitive() {
        assert_eq!("DEBUG".parse::<Level>().unwrap(), Level::Debug);
        assert_eq!("Info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("warn".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!(" error ".parse::<Level>().unwrap(), Level::Error);
        assert_eq!("FATAL".parse::<Level>().unwrap(), Level::Fatal);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(Level::parse_or("", Level::Info), Level::Info);
        assert_eq!(Level::parse_or("nonsense", Level::Error), Level::Error);
        assert_eq!(Level::parse_or("fatal", Level::Debug), Level::Fatal);
    }

    #[test]
    fn test_level_u8_roundtrip_covers_table() {
        for level in Level::ALL {
            assert_eq!(Level::from_u8(level.as_u8()), Some(level));
        }
        assert_eq!(Level::from_u8(5), None);
    }

    #[test]
    fn test_record_formats_time_at_creation() {
        let at = Local.with_ymd_and_hms(2024, 1, 15, 8, 30, 5).unwrap();
        let record = Record::at(Level::Error, at, "main.rs:10", "disk full");

        assert_eq!(record.time(), "2024/01/15 08:30:05");
        assert_eq!(record.to_string(), "2024/01/15 08:30:05 [ERROR] main.rs:10 disk full");
    }

    #[test]
    fn test_record_fields() {
        let record = Record::new(Level::Info, "x.rs:1", "hello")
            .with_field("env", "staging")
            .with_field("attempt", 3);

        assert_eq!(record.fields().get("env"), Some(&serde_json::json!("staging")));
        assert_eq!(record.fields().get("attempt"), Some(&serde_json::json!(3)));
    }
}
