//! # Rivven Bridge
//!
//! HTTP-to-broker event bridge with content-type driven JSON / Avro
//! transcoding against a Confluent-compatible schema registry.
//!
//! ```text
//! publish:  EventRequest ──► CodecDispatcher ──► SchemaResolver ──► registry
//!                               │                    │
//!                               │             AvroEncoder (JSON → Avro)
//!                               ▼
//!                           Envelope ──► BrokerSender
//!
//! consume:  headers + bytes ──► ContentTypeResolver ──► PayloadDecoder
//!                                                        ├── application/json
//!                                                        └── application/*+avro
//!                                                              (wire format,
//!                                                               schema by id)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use rivven_bridge::{
//!     CodecDispatcher, DispatcherConfig, Encoding, EventRequest, LogBroker, MemoryRegistry,
//!     SchemaResolver,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(MemoryRegistry::new());
//! registry.register("com.acme.Order", r#"{"type":"record","name":"Order","fields":[{"name":"amount","type":"int"}]}"#);
//!
//! let dispatcher = CodecDispatcher::new(
//!     Arc::new(SchemaResolver::new(registry)),
//!     Arc::new(LogBroker),
//!     DispatcherConfig::default(),
//! );
//! let request = EventRequest::new("orders")
//!     .with_avro_source("com.acme.Order")
//!     .with_payload(r#"{"amount": 5}"#);
//! let status = dispatcher.dispatch(&request, Encoding::Avro).await?;
//! ```

pub mod avro;
pub mod broker;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod headers;
pub mod metrics;
pub mod mime;
pub mod registry;
pub mod resolver;
pub mod server;

pub use avro::{AvroDecoder, AvroEncoder, AvroSchema, BinaryRecord};
#[cfg(feature = "kafka")]
pub use broker::KafkaBroker;
pub use broker::{BrokerSender, LogBroker, MemoryBroker};
pub use config::BridgeConfig;
pub use decoder::{DecodedValue, PayloadDecoder};
pub use dispatch::{
    CodecDispatcher, DispatchStatus, DispatcherConfig, Encoding, Envelope, EnvelopeBody,
    EventRequest, Payload,
};
pub use error::{BridgeError, BridgeResult, RegistryError};
pub use headers::{ContentTypeResolver, Headers};
pub use metrics::BridgeMetrics;
pub use mime::MimeType;
pub use registry::{ExternalRegistry, MemoryRegistry, RegistryClient, SchemaId};
pub use resolver::{SchemaReference, SchemaResolver, SubjectLookup};
pub use server::BridgeServer;
