//! Schema registry access
//!
//! - [`RegistryClient`]: the read-only interface the resolver depends on
//! - [`ExternalRegistry`]: Confluent REST client
//! - [`MemoryRegistry`]: in-process registry for tests and local runs

pub mod client;
pub mod external;
pub mod memory;
pub mod types;

pub use client::RegistryClient;
pub use external::{ExternalRegistry, ExternalRegistryConfig};
pub use memory::MemoryRegistry;
pub use types::{SchemaId, SchemaType, SchemaVersion, Subject, SubjectSchema};
