//! Schema registry client interface
//!
//! The bridge only ever reads from the registry: the latest version of a
//! subject on the publish path, a schema by id on the consume path, and
//! (for the catalog-scan lookup) the latest schemas under a subject prefix.

use crate::error::RegistryResult;
use crate::registry::types::{SchemaId, Subject, SubjectSchema};
use async_trait::async_trait;

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Latest version registered under `subject`
    async fn get_latest_schema(&self, subject: &Subject) -> RegistryResult<SubjectSchema>;

    /// Raw schema text for a global schema id
    async fn get_schema_by_id(&self, id: SchemaId) -> RegistryResult<String>;

    /// Latest version of every subject whose name starts with `prefix`
    async fn list_latest_schemas(&self, prefix: &str) -> RegistryResult<Vec<SubjectSchema>>;
}
