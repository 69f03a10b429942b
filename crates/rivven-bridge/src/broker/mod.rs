//! Broker publish interface
//!
//! The dispatcher hands fully prepared envelopes to a [`BrokerSender`],
//! which answers with a plain accepted / not-accepted flag.
//!
//! - [`KafkaBroker`] publishes to Kafka (`kafka` feature)
//! - [`LogBroker`] logs and accepts, for local runs without a cluster
//! - [`MemoryBroker`] captures envelopes for tests

#[cfg(feature = "kafka")]
mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;

use crate::dispatch::Envelope;
use crate::mime::MimeType;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[async_trait]
pub trait BrokerSender: Send + Sync {
    /// Submit an envelope; `true` when the broker accepted it
    async fn send(
        &self,
        topic: &str,
        binding_hint: Option<&str>,
        envelope: Envelope,
        content_type: &MimeType,
    ) -> bool;
}

/// Logs every envelope and accepts it
#[derive(Debug, Default)]
pub struct LogBroker;

#[async_trait]
impl BrokerSender for LogBroker {
    async fn send(
        &self,
        topic: &str,
        binding_hint: Option<&str>,
        envelope: Envelope,
        content_type: &MimeType,
    ) -> bool {
        info!(
            topic = %topic,
            binding = binding_hint.unwrap_or("-"),
            key = envelope.key.as_deref().unwrap_or("-"),
            content_type = %content_type,
            headers = envelope.headers.len(),
            bytes = envelope.body.len(),
            "Publishing event"
        );
        true
    }
}

/// A record captured by [`MemoryBroker`]
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub topic: String,
    pub binding_hint: Option<String>,
    pub content_type: MimeType,
    pub envelope: Envelope,
}

/// Keeps sent envelopes in memory; can be switched to reject everything.
///
/// Nothing is ever evicted, so this is meant for tests.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    sent: Mutex<Vec<SentRecord>>,
    rejecting: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Envelopes accepted so far
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

#[async_trait]
impl BrokerSender for MemoryBroker {
    async fn send(
        &self,
        topic: &str,
        binding_hint: Option<&str>,
        envelope: Envelope,
        content_type: &MimeType,
    ) -> bool {
        if self.rejecting.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().push(SentRecord {
            topic: topic.to_string(),
            binding_hint: binding_hint.map(str::to_string),
            content_type: content_type.clone(),
            envelope,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EnvelopeBody;
    use crate::headers::Headers;

    fn envelope() -> Envelope {
        Envelope {
            topic: "orders".to_string(),
            binding_hint: None,
            key: Some("k".to_string()),
            headers: Headers::new().with("content-type", "application/json"),
            body: EnvelopeBody::Bytes(b"{}".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_memory_broker_records_sends() {
        let broker = MemoryBroker::new();
        let json = MimeType::application_json();
        assert!(broker.send("orders", Some("out-0"), envelope(), &json).await);

        let sent = broker.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "orders");
        assert_eq!(sent[0].binding_hint.as_deref(), Some("out-0"));
        assert_eq!(sent[0].content_type, json);
    }

    #[tokio::test]
    async fn test_memory_broker_rejecting() {
        let broker = MemoryBroker::new();
        broker.set_rejecting(true);
        assert!(!broker.send("orders", None, envelope(), &MimeType::application_json()).await);
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_log_broker_accepts() {
        assert!(LogBroker.send("orders", None, envelope(), &MimeType::application_json()).await);
    }
}
