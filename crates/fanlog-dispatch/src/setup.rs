//! Build and register sinks from a [`Config`]

use crate::dispatcher::Dispatcher;
use fanlog_core::config::{sink_level, ConsoleConfig, FileConfig, KafkaConfig, LogHubConfig};
use fanlog_core::{Config, FanlogError, Sink, SinkError};
use fanlog_output::batched::default_source;
use fanlog_output::{
    BatchedSink, BatchedSinkConfig, ConsoleSink, FileSink, HttpLogStore,
    QueuedSink, QueuedSinkConfig, RestProducer,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Outcome of registering the sinks of a configuration
#[derive(Debug, Default)]
pub struct SetupReport {
    /// Number of sinks registered, including those whose init failed
    pub registered: usize,
    /// Sinks whose init failed, by [`Sink::label`]
    pub failed: Vec<(String, SinkError)>,
}

impl SetupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn console_sink(config: &ConsoleConfig) -> ConsoleSink {
    let sink = ConsoleSink::new().color(config.color);
    if let Some(level) = sink_level(&config.level) {
        sink.set_level(level);
    }
    sink
}

pub fn file_sink(config: &FileConfig) -> FileSink {
    let sink = FileSink::new(config.path_pattern.clone());
    if let Some(level) = sink_level(&config.level) {
        sink.set_level(level);
    }
    sink
}

/// Batched sink submitting to an HTTP log store
pub fn loghub_sink(config: &LogHubConfig) -> BatchedSink {
    let store = HttpLogStore::new(
        config.endpoint.clone(),
        config.project_name.clone(),
        config.store_name.clone(),
        Duration::from_millis(config.timeout_ms),
    )
    .with_access_key(
        config.access_key_id.clone(),
        config.access_key_secret.clone(),
    );

    let log_source = if config.log_source.trim().is_empty() {
        default_source()
    } else {
        config.log_source.clone()
    };

    BatchedSink::new(
        BatchedSinkConfig {
            level: sink_level(&config.level),
            log_name: config.log_name.clone(),
            log_source,
            capacity: config.buf_size,
            error_policy: config.flush_error_policy,
        },
        Arc::new(store),
    )
}

/// Queued sink delivering to a Kafka REST proxy
pub fn kafka_sink(config: &KafkaConfig) -> QueuedSink {
    let producer = RestProducer::new(
        config.brokers.clone(),
        Duration::from_millis(config.producer_timeout),
    );

    QueuedSink::new(
        QueuedSinkConfig {
            level: sink_level(&config.level),
            topic: config.producer_topic.clone(),
            key: Some(config.key.clone()).filter(|k| !k.is_empty()),
            capacity: config.buffer_size,
            debug: config.debug,
            fields: config.fields.clone(),
        },
        Arc::new(producer),
    )
}

/// Initialize and register every enabled sink, then apply the global level
///
/// A sink whose init fails is still registered: it drops or rejects its
/// writes and the failure is listed in the report.
pub fn register_from_config(dispatcher: &Dispatcher, config: &Config) -> SetupReport {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

    if config.console.enabled {
        sinks.push(Arc::new(console_sink(&config.console)));
    }
    if config.file.enabled {
        sinks.push(Arc::new(file_sink(&config.file)));
    }
    if config.loghub.enabled {
        sinks.push(Arc::new(loghub_sink(&config.loghub)));
    }
    for kafka in config.kafka.iter().filter(|k| k.enabled) {
        sinks.push(Arc::new(kafka_sink(kafka)));
    }

    let mut report = SetupReport::default();
    for sink in sinks {
        if let Err(e) = sink.init() {
            let label = sink.label();
            error!(sink = %label, error = %e, "Sink init failed");
            report.failed.push((label, e));
        }
        dispatcher.register(sink);
        report.registered += 1;
    }

    dispatcher.set_level(config.global_level());
    info!(
        sinks = report.registered,
        failed = report.failed.len(),
        level = %dispatcher.level(),
        "Logging configured"
    );
    report
}

/// Load a configuration file and register its sinks with the process-wide
/// dispatcher
pub fn setup_from_file(path: impl AsRef<Path>) -> Result<SetupReport, FanlogError> {
    let config = Config::from_file(path.as_ref())?;
    Ok(register_from_config(crate::global(), &config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanlog_core::Level;
    use tempfile::TempDir;

    #[test]
    fn test_register_from_config() {
        let dir = TempDir::new().unwrap();
        let pattern = dir.path().join("app-%Y%M%D.log");
        let toml = format!(
            r#"
[general]
level = "warning"

[console]
enabled = false

[file]
enabled = true
path_pattern = "{}"

[[kafka]]
enabled = true
level = "error"
producer_topic = "logs"

[[kafka]]
enabled = false
producer_topic = "ignored"
"#,
            pattern.display()
        );
        let config = Config::from_toml_str(&toml).unwrap();

        let dispatcher = Dispatcher::new();
        let report = register_from_config(&dispatcher, &config);

        // The broker list is empty, so the queued sink fails to start but is
        // still registered
        assert_eq!(report.registered, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "queued:logs");
        assert!(matches!(report.failed[0].1, SinkError::Config(_)));
        assert_eq!(dispatcher.sink_names(), vec!["file", "queued"]);
        assert_eq!(dispatcher.level(), Level::Warning);

        dispatcher.log(Level::Info, "setup.rs:1", format_args!("dropped"));
        dispatcher.log(Level::Error, "setup.rs:1", format_args!("kept"));
        dispatcher.close().unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let content = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("[ERROR] setup.rs:1 kept"));
    }

    #[test]
    fn test_loghub_without_endpoint_fails_init() {
        let config = Config::from_toml_str(
            r#"
[console]
enabled = false

[loghub]
enabled = true
level = "warn"
"#,
        )
        .unwrap();

        let dispatcher = Dispatcher::new();
        let report = register_from_config(&dispatcher, &config);
        assert!(!report.is_clean());
        assert_eq!(report.failed[0].0, "batched:fanlog");
        assert_eq!(dispatcher.sink_count(), 1);
    }

    #[test]
    fn test_failures_name_the_broker_topic() {
        let config = Config::from_toml_str(
            r#"
[console]
enabled = false

[[kafka]]
enabled = true
producer_topic = "orders"

[[kafka]]
enabled = true
producer_topic = "audit"
brokers = ["localhost:8082"]
"#,
        )
        .unwrap();

        let dispatcher = Dispatcher::new();
        let report = register_from_config(&dispatcher, &config);
        let labels: Vec<&str> = report.failed.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, vec!["queued:orders", "queued:audit"]);
        assert_eq!(dispatcher.sink_names(), vec!["queued", "queued"]);
    }

    #[test]
    fn test_sink_builders_apply_levels() {
        let console = console_sink(&ConsoleConfig {
            level: "error".to_string(),
            ..Default::default()
        });
        assert_eq!(console.level(), Some(Level::Error));

        let file = file_sink(&FileConfig::default());
        assert_eq!(file.level(), None);

        let kafka = kafka_sink(&KafkaConfig {
            level: "bogus".to_string(),
            producer_topic: "t".to_string(),
            ..Default::default()
        });
        assert_eq!(kafka.level(), None);

        let loghub = loghub_sink(&LogHubConfig {
            buf_size: 16,
            ..Default::default()
        });
        assert_eq!(loghub.capacity(), 16);
    }

    #[test]
    fn test_setup_from_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = setup_from_file(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(FanlogError::Config(_))));
    }
}
