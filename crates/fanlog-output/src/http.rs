//! HTTP transports for the remote sinks
//!
//! [`HttpLogStore`] pushes JSON batches to a log-analytics endpoint;
//! [`RestProducer`] publishes messages through a Kafka REST proxy.

use crate::transport::{LogGroup, LogStore, Producer, ProducerMessage};
use fanlog_core::{SinkError, TransportError};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::value::RawValue;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, error, info};

const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

fn build_client(timeout: Duration) -> Result<Client, SinkError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SinkError::Config(format!("Failed to create HTTP client: {}", e)))
}

fn map_request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<(), TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().unwrap_or_default();
    Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
    })
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Log-analytics store reached over HTTP
///
/// Each batch is POSTed as JSON to
/// `{endpoint}/projects/{project}/logstores/{store}`, authenticated with the
/// access key pair.
pub struct HttpLogStore {
    endpoint: String,
    project: String,
    store: String,
    access_key_id: String,
    access_key_secret: String,
    timeout: Duration,
    client: OnceLock<Client>,
}

impl HttpLogStore {
    pub fn new(
        endpoint: impl Into<String>,
        project: impl Into<String>,
        store: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            project: project.into(),
            store: store.into(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            timeout,
            client: OnceLock::new(),
        }
    }

    pub fn with_access_key(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.access_key_id = id.into();
        self.access_key_secret = secret.into();
        self
    }

    /// Full URL batches are pushed to
    pub fn url(&self) -> String {
        format!(
            "{}/projects/{}/logstores/{}",
            self.endpoint.trim_end_matches('/'),
            self.project,
            self.store
        )
    }
}

impl LogStore for HttpLogStore {
    fn open(&self) -> Result<(), SinkError> {
        if !is_http_url(&self.endpoint) {
            return Err(SinkError::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.project.is_empty() || self.store.is_empty() {
            return Err(SinkError::Config(
                "project_name and store_name are required".to_string(),
            ));
        }
        if self.client.get().is_none() {
            let _ = self.client.set(build_client(self.timeout)?);
        }
        info!(url = %self.url(), "Log store opened");
        Ok(())
    }

    fn put_logs(&self, group: &LogGroup) -> Result<(), TransportError> {
        let client = self
            .client
            .get()
            .ok_or_else(|| TransportError::Unavailable("log store not opened".to_string()))?;

        debug!(entries = group.logs.len(), topic = %group.topic, "Pushing batch");

        let mut request = client.post(self.url()).json(group);
        if !self.access_key_id.is_empty() {
            request = request.basic_auth(&self.access_key_id, Some(&self.access_key_secret));
        }

        let response = request.send().map_err(map_request_error)?;
        check_status(response).inspect_err(|e| {
            error!(error = %e, "Log store rejected batch");
        })
    }
}

/// Kafka producer speaking the REST proxy protocol
///
/// Brokers are REST proxy base URLs and are tried in order until one accepts
/// the message.
pub struct RestProducer {
    brokers: Vec<String>,
    timeout: Duration,
    client: OnceLock<Client>,
}

impl RestProducer {
    pub fn new(brokers: Vec<String>, timeout: Duration) -> Self {
        Self {
            brokers,
            timeout,
            client: OnceLock::new(),
        }
    }

    fn topic_url(broker: &str, topic: &str) -> String {
        format!("{}/topics/{}", broker.trim_end_matches('/'), topic)
    }

    /// Request body in the REST proxy's embedded-JSON format
    ///
    /// `message.value` is already a serialized JSON object and is embedded
    /// without being parsed into a tree.
    fn body(message: &ProducerMessage) -> Result<String, TransportError> {
        let value: &RawValue = serde_json::from_str(&message.value)
            .map_err(|e| TransportError::Unavailable(format!("invalid message payload: {}", e)))?;
        let envelope = RestEnvelope {
            records: [RestRecord {
                key: message.key.as_deref(),
                value,
            }],
        };
        serde_json::to_string(&envelope)
            .map_err(|e| TransportError::Unavailable(format!("failed to encode request: {}", e)))
    }
}

#[derive(Serialize)]
struct RestRecord<'a> {
    key: Option<&'a str>,
    value: &'a RawValue,
}

#[derive(Serialize)]
struct RestEnvelope<'a> {
    records: [RestRecord<'a>; 1],
}

impl Producer for RestProducer {
    fn open(&self) -> Result<(), SinkError> {
        if self.brokers.is_empty() {
            return Err(SinkError::Config("no brokers configured".to_string()));
        }
        if let Some(bad) = self.brokers.iter().find(|b| !is_http_url(b.trim())) {
            return Err(SinkError::Config(format!("invalid broker address '{}'", bad)));
        }
        if self.client.get().is_none() {
            let _ = self.client.set(build_client(self.timeout)?);
        }
        info!(brokers = ?self.brokers, "Producer connected");
        Ok(())
    }

    fn send(&self, message: &ProducerMessage) -> Result<(), TransportError> {
        let client = self
            .client
            .get()
            .ok_or_else(|| TransportError::Unavailable("producer not opened".to_string()))?;

        let body = Self::body(message)?;
        let mut last_error = TransportError::Unavailable("no brokers configured".to_string());

        for broker in &self.brokers {
            let result = client
                .post(Self::topic_url(broker.trim(), &message.topic))
                .header(CONTENT_TYPE, KAFKA_JSON_CONTENT_TYPE)
                .body(body.clone())
                .send()
                .map_err(map_request_error)
                .and_then(check_status);

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(broker = %broker, error = %e, "Broker refused message, trying next");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn message(key: Option<&str>) -> ProducerMessage {
        ProducerMessage {
            topic: "logs".to_string(),
            key: key.map(str::to_string),
            value: r#"{"level":"ERROR","message":"boom"}"#.to_string(),
            timestamp: Local::now(),
        }
    }

    #[test]
    fn test_log_store_url() {
        let store = HttpLogStore::new("https://logs.example.com/", "proj", "app", Duration::from_secs(1));
        assert_eq!(store.url(), "https://logs.example.com/projects/proj/logstores/app");
    }

    #[test]
    fn test_log_store_open_validates_config() {
        let store = HttpLogStore::new("logs.example.com", "proj", "app", Duration::from_secs(1));
        assert!(matches!(store.open(), Err(SinkError::Config(_))));

        let store = HttpLogStore::new("http://logs.example.com", "", "app", Duration::from_secs(1));
        assert!(matches!(store.open(), Err(SinkError::Config(_))));
    }

    #[test]
    fn test_put_logs_before_open_is_unavailable() {
        let store = HttpLogStore::new("http://127.0.0.1:9", "p", "s", Duration::from_millis(50));
        let group = LogGroup {
            topic: String::new(),
            source: String::new(),
            time: 0,
            logs: Vec::new(),
        };
        assert!(matches!(store.put_logs(&group), Err(TransportError::Unavailable(_))));
    }

    #[test]
    fn test_producer_open_rejects_blank_brokers() {
        let producer = RestProducer::new(Vec::new(), Duration::from_millis(30));
        assert!(matches!(producer.open(), Err(SinkError::Config(_))));

        let producer = RestProducer::new(vec!["".to_string()], Duration::from_millis(30));
        assert!(matches!(producer.open(), Err(SinkError::Config(_))));
    }

    #[test]
    fn test_producer_body() {
        let body = RestProducer::body(&message(Some("test"))).unwrap();
        assert_eq!(
            body,
            r#"{"records":[{"key":"test","value":{"level":"ERROR","message":"boom"}}]}"#
        );

        let parsed: serde_json::Value =
            serde_json::from_str(&RestProducer::body(&message(None)).unwrap()).unwrap();
        assert!(parsed["records"][0]["key"].is_null());
        assert_eq!(parsed["records"][0]["value"]["message"], "boom");
    }

    #[test]
    fn test_producer_body_escapes_key_and_rejects_bad_payload() {
        let body = RestProducer::body(&message(Some("a\"b"))).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["records"][0]["key"], "a\"b");

        let mut broken = message(None);
        broken.value = "{not json".to_string();
        assert!(matches!(
            RestProducer::body(&broken),
            Err(TransportError::Unavailable(_))
        ));
    }

    #[test]
    fn test_topic_url() {
        assert_eq!(
            RestProducer::topic_url("http://localhost:8082/", "kafka1"),
            "http://localhost:8082/topics/kafka1"
        );
    }
}
