use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for transcoding
// ============================================================================
//
// Tracks:
// - Events serialized / deserialized per topic
// - Failures by operation and error kind
// - Encrypted payloads and payload sizes
//
// Metrics live in their own Registry; embedders expose it however they like.
// ============================================================================

pub const OP_SERIALIZE: &str = "serialize";
pub const OP_DESERIALIZE: &str = "deserialize";

pub struct TranscoderMetrics {
    registry: Registry,

    pub events_serialized: IntCounterVec,
    pub events_deserialized: IntCounterVec,
    pub transcoding_failures: IntCounterVec,
    pub encrypted_payloads: IntCounterVec,
    pub payload_bytes: HistogramVec,
}

impl TranscoderMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_serialized = IntCounterVec::new(
            Opts::new("events_serialized_total", "Total domain events serialized"),
            &["topic"],
        )?;
        registry.register(Box::new(events_serialized.clone()))?;

        let events_deserialized = IntCounterVec::new(
            Opts::new("events_deserialized_total", "Total stored events deserialized"),
            &["topic"],
        )?;
        registry.register(Box::new(events_deserialized.clone()))?;

        let transcoding_failures = IntCounterVec::new(
            Opts::new("transcoding_failures_total", "Total transcoding failures"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(transcoding_failures.clone()))?;

        let encrypted_payloads = IntCounterVec::new(
            Opts::new("encrypted_payloads_total", "Total payloads encrypted or decrypted"),
            &["operation"],
        )?;
        registry.register(Box::new(encrypted_payloads.clone()))?;

        let payload_bytes = HistogramVec::new(
            HistogramOpts::new("payload_bytes", "Stored payload size in bytes")
                .buckets(vec![64.0, 256.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0]),
            &["operation"],
        )?;
        registry.register(Box::new(payload_bytes.clone()))?;

        Ok(Self {
            registry,
            events_serialized,
            events_deserialized,
            transcoding_failures,
            encrypted_payloads,
            payload_bytes,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_serialized(&self, topic: &str, payload_len: usize, encrypted: bool) {
        self.events_serialized.with_label_values(&[topic]).inc();
        self.payload_bytes
            .with_label_values(&[OP_SERIALIZE])
            .observe(payload_len as f64);
        if encrypted {
            self.encrypted_payloads.with_label_values(&[OP_SERIALIZE]).inc();
        }
    }

    pub fn record_deserialized(&self, topic: &str, payload_len: usize, encrypted: bool) {
        self.events_deserialized.with_label_values(&[topic]).inc();
        self.payload_bytes
            .with_label_values(&[OP_DESERIALIZE])
            .observe(payload_len as f64);
        if encrypted {
            self.encrypted_payloads.with_label_values(&[OP_DESERIALIZE]).inc();
        }
    }

    /// `kind` is a `TranscodingError::kind()` label.
    pub fn record_failure(&self, operation: &str, kind: &str) {
        self.transcoding_failures.with_label_values(&[operation, kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = TranscoderMetrics::new().unwrap();
        metrics.record_serialized("m#Order.Created", 10, false);
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_serialized() {
        let metrics = TranscoderMetrics::new().unwrap();
        metrics.record_serialized("m#Order.Created", 120, true);

        let gathered = metrics.registry().gather();
        let serialized = gathered.iter().find(|m| m.name() == "events_serialized_total").unwrap();
        assert_eq!(serialized.metric[0].counter.value, Some(1.0));

        let encrypted = gathered.iter().find(|m| m.name() == "encrypted_payloads_total").unwrap();
        assert_eq!(encrypted.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_plaintext_is_not_counted_as_encrypted() {
        let metrics = TranscoderMetrics::new().unwrap();
        metrics.record_deserialized("m#Order.Created", 120, false);

        let gathered = metrics.registry().gather();
        assert!(gathered.iter().all(|m| m.name() != "encrypted_payloads_total"));
    }

    #[test]
    fn test_record_failure() {
        let metrics = TranscoderMetrics::new().unwrap();
        metrics.record_failure(OP_DESERIALIZE, "decryption");
        metrics.record_failure(OP_DESERIALIZE, "type_resolution");
        metrics.record_failure(OP_DESERIALIZE, "decryption");

        let gathered = metrics.registry().gather();
        let failures = gathered.iter().find(|m| m.name() == "transcoding_failures_total").unwrap();
        assert_eq!(failures.metric.len(), 2); // Two different kind labels
    }
}
