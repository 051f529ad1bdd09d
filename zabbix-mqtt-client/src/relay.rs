//! Translation of MQTT messages into Zabbix metrics, and their submission.

use std::future::Future;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};
use zabbix_mqtt_common::{Metric, SenderError, SenderResponse, ZabbixSender};

use crate::mapping::{KeySpec, TopicMapping};

/// Reasons a message (or one of its fields) produced no metric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("invalid encoding: payload is not valid UTF-8")]
    InvalidEncoding,

    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("missing field '{field}' for item '{key}'")]
    MissingField { field: String, key: String },
}

impl TranslateError {
    /// Whether the whole message was dropped (as opposed to a single field).
    pub fn drops_message(&self) -> bool {
        !matches!(self, TranslateError::MissingField { .. })
    }
}

/// Metrics produced from one message, plus everything that was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub metrics: Vec<Metric>,
    pub errors: Vec<TranslateError>,
}

impl Translation {
    fn dropped(error: TranslateError) -> Self {
        Self {
            metrics: Vec::new(),
            errors: vec![error],
        }
    }
}

/// Render a JSON field as a metric value: strings verbatim, anything
/// else as compact JSON text.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate one message without logging.
pub fn translate_detailed(
    topic: &str,
    payload: &[u8],
    mapping: &TopicMapping,
    host: &str,
) -> Translation {
    let Ok(text) = std::str::from_utf8(payload) else {
        return Translation::dropped(TranslateError::InvalidEncoding);
    };

    let Some(spec) = mapping.get(topic) else {
        return Translation::dropped(TranslateError::UnknownTopic(topic.to_string()));
    };

    match spec {
        KeySpec::Single(key) => Translation {
            metrics: vec![Metric::new(host, key, text)],
            errors: Vec::new(),
        },
        KeySpec::Fields(fields) => {
            let object = match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(object)) => object,
                Ok(_) => {
                    return Translation::dropped(TranslateError::MalformedPayload(
                        "expected a JSON object".to_string(),
                    ));
                }
                Err(e) => {
                    return Translation::dropped(TranslateError::MalformedPayload(e.to_string()));
                }
            };

            let mut translation = Translation::default();
            for (field, key) in fields {
                match object.get(field) {
                    Some(value) => translation
                        .metrics
                        .push(Metric::new(host, key, render_value(value))),
                    None => translation.errors.push(TranslateError::MissingField {
                        field: field.clone(),
                        key: key.clone(),
                    }),
                }
            }
            translation
        }
    }
}

/// Translate one message into metrics, logging every drop at warning level.
///
/// Never fails: problems shrink (or empty) the returned list.
pub fn translate(topic: &str, payload: &[u8], mapping: &TopicMapping, host: &str) -> Vec<Metric> {
    let translation = translate_detailed(topic, payload, mapping, host);

    for error in &translation.errors {
        if error.drops_message() {
            warn!(topic = %topic, error = %error, "Dropping message");
        } else {
            warn!(topic = %topic, error = %error, "Skipping field");
        }
    }

    translation.metrics
}

/// Destination for translated metrics.
pub trait MetricsSender {
    fn send(
        &self,
        metrics: &[Metric],
    ) -> impl Future<Output = Result<SenderResponse, SenderError>> + Send;
}

impl MetricsSender for ZabbixSender {
    fn send(
        &self,
        metrics: &[Metric],
    ) -> impl Future<Output = Result<SenderResponse, SenderError>> + Send {
        ZabbixSender::send(self, metrics)
    }
}

/// Result of a submission attempt. None of these are fatal.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Nothing to send, no backend call made.
    Skipped,
    /// No Zabbix section configured.
    NoBackend,
    /// The server answered.
    Sent(SenderResponse),
    /// The send failed and the metrics were discarded.
    Failed(SenderError),
}

/// Submit metrics, best effort and at most once.
///
/// Errors are logged and swallowed. Nothing is retried or buffered.
pub async fn submit<S: MetricsSender>(metrics: &[Metric], sender: Option<&S>) -> SubmitOutcome {
    if metrics.is_empty() {
        return SubmitOutcome::Skipped;
    }

    let Some(sender) = sender else {
        let dropped: Vec<String> = metrics.iter().map(ToString::to_string).collect();
        warn!(metrics = ?dropped, "Not reporting to Zabbix: no backend configured");
        return SubmitOutcome::NoBackend;
    };

    match sender.send(metrics).await {
        Ok(response) => {
            if response.failed > 0 {
                warn!(
                    processed = response.processed,
                    failed = response.failed,
                    total = response.total,
                    "Zabbix did not accept every value"
                );
            } else {
                debug!(processed = response.processed, "Metrics submitted");
            }
            SubmitOutcome::Sent(response)
        }
        Err(e) => {
            warn!(error = %e, count = metrics.len(), "Failed to submit metrics to Zabbix");
            SubmitOutcome::Failed(e)
        }
    }
}

/// Counters for the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub metrics_produced: u64,
    pub metrics_sent: u64,
    pub submit_failures: u64,
}

/// Everything a message handler needs, built once at startup.
pub struct Relay<S = ZabbixSender> {
    mapping: TopicMapping,
    host: String,
    sender: Option<S>,
    stats: RwLock<RelayStats>,
}

impl<S: MetricsSender> Relay<S> {
    pub fn new(mapping: TopicMapping, host: impl Into<String>, sender: Option<S>) -> Self {
        Self {
            mapping,
            host: host.into(),
            sender,
            stats: RwLock::new(RelayStats::default()),
        }
    }

    pub fn mapping(&self) -> &TopicMapping {
        &self.mapping
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn sender(&self) -> Option<&S> {
        self.sender.as_ref()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RelayStats {
        self.stats.read().clone()
    }

    /// Handle one inbound message: translate, then submit.
    ///
    /// Returns once the submission has completed or failed.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> SubmitOutcome {
        trace!(topic = %topic, payload_len = payload.len(), "Received message");
        if let Ok(text) = std::str::from_utf8(payload) {
            debug!("{}: {}", topic, text);
        }

        let metrics = translate(topic, payload, &self.mapping, &self.host);

        {
            let mut stats = self.stats.write();
            stats.messages_received += 1;
            stats.metrics_produced += metrics.len() as u64;
            if metrics.is_empty() {
                stats.messages_dropped += 1;
            }
        }

        let outcome = submit(&metrics, self.sender.as_ref()).await;

        match &outcome {
            SubmitOutcome::Sent(_) => self.stats.write().metrics_sent += metrics.len() as u64,
            SubmitOutcome::Failed(_) => self.stats.write().submit_failures += 1,
            SubmitOutcome::Skipped | SubmitOutcome::NoBackend => {}
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn mapping(json: &str) -> TopicMapping {
        json5::from_str(json).unwrap()
    }

    /// Records every batch and answers with a canned result.
    #[derive(Default)]
    struct RecordingSender {
        batches: Mutex<Vec<Vec<Metric>>>,
        fail: bool,
    }

    impl MetricsSender for RecordingSender {
        async fn send(&self, metrics: &[Metric]) -> Result<SenderResponse, SenderError> {
            self.batches.lock().push(metrics.to_vec());
            if self.fail {
                return Err(SenderError::Protocol("connection reset".to_string()));
            }
            Ok(SenderResponse {
                processed: metrics.len() as u64,
                total: metrics.len() as u64,
                chunks: 1,
                ..SenderResponse::default()
            })
        }
    }

    #[test]
    fn test_single_key() {
        let mapping = mapping(r#"{"sensor/temp": "temp.key"}"#);
        let metrics = translate("sensor/temp", b"23.5", &mapping, "gw");

        assert_eq!(metrics, vec![Metric::new("gw", "temp.key", "23.5")]);
    }

    #[test]
    fn test_single_key_keeps_payload_verbatim() {
        let mapping = mapping(r#"{"sensor/raw": "raw.key"}"#);
        let payload = br#" {"not": "parsed"} "#;
        let metrics = translate("sensor/raw", payload, &mapping, "gw");

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].value, r#" {"not": "parsed"} "#);
    }

    #[test]
    fn test_field_map() {
        let mapping = mapping(r#"{"sensor/multi": {"t": "temp.key", "h": "hum.key"}}"#);
        let metrics = translate("sensor/multi", br#"{"t": "23.5", "h": "40"}"#, &mapping, "gw");

        assert_eq!(
            metrics,
            vec![
                Metric::new("gw", "temp.key", "23.5"),
                Metric::new("gw", "hum.key", "40"),
            ]
        );
    }

    #[test]
    fn test_field_map_follows_declaration_order() {
        let mapping = mapping(r#"{"s": {"z": "z.key", "a": "a.key"}}"#);
        let metrics = translate("s", br#"{"a": 1, "z": 2}"#, &mapping, "gw");

        let keys: Vec<&str> = metrics.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["z.key", "a.key"]);
    }

    #[test]
    fn test_field_map_missing_field() {
        let mapping = mapping(r#"{"sensor/multi": {"t": "temp.key", "h": "hum.key"}}"#);
        let translation =
            translate_detailed("sensor/multi", br#"{"t": "23.5"}"#, &mapping, "gw");

        assert_eq!(
            translation.metrics,
            vec![Metric::new("gw", "temp.key", "23.5")]
        );
        assert_eq!(
            translation.errors,
            vec![TranslateError::MissingField {
                field: "h".to_string(),
                key: "hum.key".to_string(),
            }]
        );
    }

    #[test]
    fn test_field_map_non_string_values() {
        let mapping = mapping(
            r#"{"s": {"n": "n.key", "f": "f.key", "b": "b.key", "z": "z.key", "o": "o.key"}}"#,
        );
        let payload = br#"{"n": 40, "f": 23.5, "b": true, "z": null, "o": {"x": [1, 2]}}"#;
        let metrics = translate("s", payload, &mapping, "gw");

        let values: Vec<&str> = metrics.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(values, vec!["40", "23.5", "true", "null", r#"{"x":[1,2]}"#]);
    }

    #[test]
    fn test_field_map_invalid_json() {
        let mapping = mapping(r#"{"sensor/multi": {"t": "temp.key"}}"#);
        let translation = translate_detailed("sensor/multi", b"23.5 degrees", &mapping, "gw");

        assert!(translation.metrics.is_empty());
        assert!(matches!(
            translation.errors.as_slice(),
            [TranslateError::MalformedPayload(_)]
        ));
        assert!(translate("sensor/multi", b"23.5 degrees", &mapping, "gw").is_empty());
    }

    #[test]
    fn test_field_map_json_not_object() {
        let mapping = mapping(r#"{"sensor/multi": {"t": "temp.key"}}"#);
        let translation = translate_detailed("sensor/multi", b"[1, 2]", &mapping, "gw");

        assert!(translation.metrics.is_empty());
        assert_eq!(
            translation.errors,
            vec![TranslateError::MalformedPayload(
                "expected a JSON object".to_string()
            )]
        );
    }

    #[test]
    fn test_unknown_topic() {
        let mapping = mapping(r#"{"sensor/temp": "temp.key"}"#);
        let translation = translate_detailed("sensor/other", b"1", &mapping, "gw");

        assert!(translation.metrics.is_empty());
        assert_eq!(
            translation.errors,
            vec![TranslateError::UnknownTopic("sensor/other".to_string())]
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let mapping = mapping(r#"{"sensor/temp": "temp.key"}"#);
        let translation = translate_detailed("sensor/temp", &[0xff, 0xfe, 0x00], &mapping, "gw");

        assert!(translation.metrics.is_empty());
        assert_eq!(translation.errors, vec![TranslateError::InvalidEncoding]);
    }

    #[test]
    #[traced_test]
    fn test_malformed_payload_logs_warning() {
        let mapping = mapping(r#"{"sensor/multi": {"t": "temp.key"}}"#);
        assert!(translate("sensor/multi", b"not json", &mapping, "gw").is_empty());

        assert!(logs_contain("WARN"));
        assert!(logs_contain("Dropping message"));
        assert!(logs_contain("malformed payload"));
    }

    #[test]
    #[traced_test]
    fn test_missing_field_logs_warning() {
        let mapping = mapping(r#"{"sensor/multi": {"t": "temp.key", "h": "hum.key"}}"#);
        let metrics = translate("sensor/multi", br#"{"t": "23.5"}"#, &mapping, "gw");

        assert_eq!(metrics.len(), 1);
        assert!(logs_contain("Skipping field"));
        assert!(logs_contain("missing field 'h' for item 'hum.key'"));
        assert!(!logs_contain("Dropping message"));
    }

    #[test]
    #[traced_test]
    fn test_unknown_topic_logs_warning() {
        let mapping = mapping(r#"{"sensor/temp": "temp.key"}"#);
        assert!(translate("sensor/other", b"1", &mapping, "gw").is_empty());

        assert!(logs_contain("Dropping message"));
        assert!(logs_contain("unknown topic 'sensor/other'"));
    }

    #[test]
    fn test_drops_message() {
        assert!(TranslateError::InvalidEncoding.drops_message());
        assert!(TranslateError::UnknownTopic("t".to_string()).drops_message());
        assert!(
            !TranslateError::MissingField {
                field: "f".to_string(),
                key: "k".to_string()
            }
            .drops_message()
        );
    }

    #[tokio::test]
    async fn test_submit_empty_makes_no_call() {
        let sender = RecordingSender::default();
        let outcome = submit(&[], Some(&sender)).await;

        assert!(matches!(outcome, SubmitOutcome::Skipped));
        assert!(sender.batches.lock().is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_submit_without_backend() {
        let outcome = submit::<RecordingSender>(&[Metric::new("gw", "k", "v")], None).await;

        assert!(matches!(outcome, SubmitOutcome::NoBackend));
        assert!(logs_contain("no backend configured"));
        assert!(logs_contain("gw:k=v"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_submit_failure_is_swallowed() {
        let sender = RecordingSender {
            fail: true,
            ..RecordingSender::default()
        };
        let outcome = submit(&[Metric::new("gw", "k", "v")], Some(&sender)).await;

        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        // Exactly one attempt, no retry.
        assert_eq!(sender.batches.lock().len(), 1);
        assert!(logs_contain("Failed to submit metrics to Zabbix"));
    }

    #[tokio::test]
    async fn test_handle_message_updates_stats() {
        let relay = Relay::new(
            mapping(r#"{"sensor/multi": {"t": "temp.key", "h": "hum.key"}, "sensor/temp": "temp.key"}"#),
            "gw",
            Some(RecordingSender::default()),
        );

        relay
            .handle_message("sensor/multi", br#"{"t": "23.5", "h": "40"}"#)
            .await;
        relay.handle_message("sensor/multi", b"garbage").await;
        relay.handle_message("sensor/temp", b"21").await;

        let stats = relay.stats();
        assert_eq!(stats.messages_received, 3);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.metrics_produced, 3);
        assert_eq!(stats.metrics_sent, 3);
        assert_eq!(stats.submit_failures, 0);

        let batches = relay.sender().unwrap().batches.lock().clone();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1], vec![Metric::new("gw", "temp.key", "21")]);
    }

    #[tokio::test]
    async fn test_handle_message_counts_failures() {
        let relay = Relay::new(
            mapping(r#"{"sensor/temp": "temp.key"}"#),
            "gw",
            Some(RecordingSender {
                fail: true,
                ..RecordingSender::default()
            }),
        );

        let outcome = relay.handle_message("sensor/temp", b"21").await;

        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert_eq!(relay.stats().submit_failures, 1);
        assert_eq!(relay.stats().metrics_sent, 0);
    }
}
