//! In-process registry for tests and local development
//!
//! Assigns ids the way a Confluent registry does: ids are global, the same
//! schema text registered twice keeps its id, and each subject keeps an
//! ordered list of versions.

use crate::error::{RegistryError, RegistryResult};
use crate::registry::client::RegistryClient;
use crate::registry::types::{SchemaId, SchemaType, SchemaVersion, Subject, SubjectSchema};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// In-memory registry
pub struct MemoryRegistry {
    next_id: AtomicU32,
    /// Schemas by id
    schemas: DashMap<SchemaId, (SchemaType, String)>,
    /// Schema text -> id (deduplication)
    by_text: DashMap<String, SchemaId>,
    /// Subject -> ids, oldest first
    subjects: DashMap<String, Vec<SchemaId>>,
    /// Number of lookups served
    lookups: AtomicU64,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            schemas: DashMap::new(),
            by_text: DashMap::new(),
            subjects: DashMap::new(),
            lookups: AtomicU64::new(0),
        }
    }

    /// Register an Avro schema under `subject`, returning its id
    pub fn register(&self, subject: impl Into<Subject>, schema: &str) -> SchemaId {
        let id = self.insert_schema(SchemaType::Avro, schema);
        self.push_version(subject.into(), id);
        id
    }

    /// Register a schema under a caller-chosen id
    pub fn register_with_id(&self, subject: impl Into<Subject>, id: SchemaId, schema: &str) {
        self.schemas
            .insert(id, (SchemaType::Avro, schema.to_string()));
        self.by_text.insert(schema.to_string(), id);
        self.next_id.fetch_max(id.0 + 1, Ordering::SeqCst);
        self.push_version(subject.into(), id);
    }

    /// Number of read calls served so far
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    fn insert_schema(&self, schema_type: SchemaType, schema: &str) -> SchemaId {
        *self
            .by_text
            .entry(schema.to_string())
            .or_insert_with(|| {
                let id = SchemaId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
                self.schemas.insert(id, (schema_type, schema.to_string()));
                id
            })
            .value()
    }

    fn push_version(&self, subject: Subject, id: SchemaId) {
        let mut versions = self.subjects.entry(subject.0).or_default();
        if versions.last() != Some(&id) {
            versions.push(id);
        }
    }

    fn subject_schema(&self, subject: &str, versions: &[SchemaId]) -> Option<SubjectSchema> {
        let id = *versions.last()?;
        let entry = self.schemas.get(&id)?;
        let (schema_type, schema) = entry.value();
        Some(SubjectSchema {
            subject: Subject::new(subject),
            version: SchemaVersion::new(versions.len() as u32),
            id,
            schema_type: *schema_type,
            schema: schema.clone(),
        })
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn get_latest_schema(&self, subject: &Subject) -> RegistryResult<SubjectSchema> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.subjects
            .get(subject.as_str())
            .and_then(|versions| self.subject_schema(subject.as_str(), &versions))
            .ok_or_else(|| RegistryError::NotFound(format!("subject '{}'", subject)))
    }

    async fn get_schema_by_id(&self, id: SchemaId) -> RegistryResult<String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.schemas
            .get(&id)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| RegistryError::NotFound(format!("schema id {}", id)))
    }

    async fn list_latest_schemas(&self, prefix: &str) -> RegistryResult<Vec<SubjectSchema>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut schemas: Vec<SubjectSchema> = self
            .subjects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .filter_map(|entry| self.subject_schema(entry.key(), entry.value()))
            .collect();
        schemas.sort_by(|a, b| a.subject.0.cmp(&b.subject.0));
        Ok(schemas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = r#"{"type":"record","name":"User","fields":[{"name":"id","type":"long"}]}"#;
    const V2: &str = r#"{"type":"record","name":"User","fields":[{"name":"id","type":"long"},{"name":"name","type":"string","default":""}]}"#;

    #[tokio::test]
    async fn test_latest_version_wins() {
        let registry = MemoryRegistry::new();
        let id1 = registry.register("user", V1);
        let id2 = registry.register("user", V2);
        assert_ne!(id1, id2);

        let latest = registry
            .get_latest_schema(&Subject::new("user"))
            .await
            .unwrap();
        assert_eq!(latest.id, id2);
        assert_eq!(latest.version, SchemaVersion::new(2));
        assert_eq!(latest.schema, V2);
    }

    #[tokio::test]
    async fn test_same_schema_same_id() {
        let registry = MemoryRegistry::new();
        let a = registry.register("a", V1);
        let b = registry.register("b", V1);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_subject_lookup_is_case_sensitive() {
        let registry = MemoryRegistry::new();
        registry.register("User", V1);
        assert!(matches!(
            registry.get_latest_schema(&Subject::new("user")).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_with_id() {
        let registry = MemoryRegistry::new();
        registry.register_with_id("user", SchemaId::new(7), V1);
        assert_eq!(registry.get_schema_by_id(SchemaId::new(7)).await.unwrap(), V1);

        let next = registry.register("other", V2);
        assert_eq!(next, SchemaId::new(8));
        assert_eq!(registry.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let registry = MemoryRegistry::new();
        registry.register("com.acme.User", V1);
        registry.register("org.other.User", V2);

        let listed = registry.list_latest_schemas("com").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject, Subject::new("com.acme.User"));
    }
}
