//! Kafka publisher
//!
//! Wraps an rdkafka [`FutureProducer`]. Each envelope becomes one record:
//! the envelope key is the record key, headers are copied in order and the
//! encoded body is the value. An empty body is published as a tombstone.

use super::BrokerSender;
use crate::config::KafkaConfig;
use crate::dispatch::Envelope;
use crate::error::{BridgeError, BridgeResult};
use crate::headers::Headers;
use crate::mime::MimeType;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, warn};

/// Publishes envelopes to a Kafka cluster
pub struct KafkaBroker {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl std::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("delivery_timeout", &self.delivery_timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaBroker {
    /// Create the producer. Connecting happens lazily on the first send.
    pub fn new(config: &KafkaConfig) -> BridgeResult<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("acks", &config.acks)
            .set("message.timeout.ms", config.delivery_timeout_ms.to_string());

        // Explicit properties win over the named settings
        for (key, value) in &config.properties {
            client_config.set(key, value);
        }

        let producer: FutureProducer = client_config.create().map_err(|e| {
            BridgeError::Config(format!("Failed to create Kafka producer: {}", e))
        })?;

        Ok(Self {
            producer,
            delivery_timeout: config.delivery_timeout(),
        })
    }
}

fn record_headers(headers: &Headers) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key,
                value: Some(value),
            })
        })
}

#[async_trait]
impl BrokerSender for KafkaBroker {
    async fn send(
        &self,
        topic: &str,
        binding_hint: Option<&str>,
        envelope: Envelope,
        content_type: &MimeType,
    ) -> bool {
        let payload = envelope.body.to_bytes();

        let mut record: FutureRecord<'_, str, [u8]> =
            FutureRecord::to(topic).headers(record_headers(&envelope.headers));
        if let Some(key) = envelope.key.as_deref() {
            record = record.key(key);
        }
        if !payload.is_empty() {
            record = record.payload(payload.as_slice());
        }

        match self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
        {
            Ok((partition, offset)) => {
                debug!(
                    topic = %topic,
                    binding = binding_hint.unwrap_or("-"),
                    content_type = %content_type,
                    partition,
                    offset,
                    "Event delivered"
                );
                true
            }
            Err((e, _)) => {
                warn!(
                    topic = %topic,
                    binding = binding_hint.unwrap_or("-"),
                    error = %e,
                    "Event delivery failed"
                );
                false
            }
        }
    }
}
