//! Logical schema name to concrete Avro schema
//!
//! The resolver owns the one long-lived registry client of the process.
//! Every lookup is bounded by an optional timeout, and every registry or
//! parse failure comes back as [`BridgeError::SchemaResolution`] with the
//! original error attached as its source.
//!
//! An optional process-wide cache keeps schemas by logical name and by id.
//! Registry ids are immutable, so entries are never invalidated; concurrent
//! misses for the same key may each populate it (last writer wins).

use crate::avro::AvroSchema;
use crate::error::{BridgeError, BridgeResult, RegistryError, RegistryResult};
use crate::registry::{RegistryClient, SchemaId, SchemaType, Subject, SubjectSchema};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a logical name is turned into a registry lookup
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubjectLookup {
    /// The logical name is the subject; exact and case-sensitive
    #[default]
    Subject,
    /// Scan the latest schemas under `prefix` and match the Avro type name
    /// case-insensitively
    CatalogScan { prefix: String },
}

/// A resolved schema
#[derive(Debug, Clone)]
pub struct SchemaReference {
    pub logical_name: String,
    pub schema_id: SchemaId,
    pub schema: Arc<AvroSchema>,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct SchemaCache {
    by_name: DashMap<String, (SchemaId, Arc<AvroSchema>)>,
    by_id: DashMap<SchemaId, Arc<AvroSchema>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaCache {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SchemaResolver {
    registry: Arc<dyn RegistryClient>,
    lookup: SubjectLookup,
    cache: Option<SchemaCache>,
    timeout: Option<Duration>,
}

impl SchemaResolver {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self {
            registry,
            lookup: SubjectLookup::Subject,
            cache: None,
            timeout: None,
        }
    }

    pub fn with_lookup(mut self, lookup: SubjectLookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// Enable the process-wide schema cache
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(SchemaCache::default());
        self
    }

    /// Bound every registry round trip
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn lookup(&self) -> &SubjectLookup {
        &self.lookup
    }

    /// Resolve the latest schema for `logical_name`
    pub async fn resolve_schema(&self, logical_name: &str) -> BridgeResult<SchemaReference> {
        if logical_name.trim().is_empty() {
            return Err(BridgeError::InvalidRequest(
                "schema name must not be blank".to_string(),
            ));
        }

        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.by_name.get(logical_name) {
                cache.hit();
                let (schema_id, schema) = entry.value().clone();
                debug!(schema = %logical_name, schema_id = %schema_id, "Schema cache hit");
                return Ok(SchemaReference {
                    logical_name: logical_name.to_string(),
                    schema_id,
                    schema,
                });
            }
            cache.miss();
        }

        let (schema_id, schema) = self
            .fetch_by_name(logical_name)
            .await
            .map_err(|e| BridgeError::resolution(format!("schema '{}'", logical_name), e))?;
        let schema = Arc::new(schema);

        if let Some(cache) = &self.cache {
            cache
                .by_name
                .insert(logical_name.to_string(), (schema_id, schema.clone()));
            cache.by_id.insert(schema_id, schema.clone());
        }

        debug!(schema = %logical_name, schema_id = %schema_id, "Resolved schema");
        Ok(SchemaReference {
            logical_name: logical_name.to_string(),
            schema_id,
            schema,
        })
    }

    /// Resolve the writer schema for a wire-format id
    pub async fn resolve_by_id(&self, id: SchemaId) -> BridgeResult<Arc<AvroSchema>> {
        if let Some(cache) = &self.cache {
            if let Some(schema) = cache.by_id.get(&id) {
                cache.hit();
                return Ok(schema.value().clone());
            }
            cache.miss();
        }

        let raw = self
            .bounded(self.registry.get_schema_by_id(id))
            .await
            .map_err(|e| BridgeError::resolution(format!("schema id {}", id), e))?;
        let schema = AvroSchema::parse(&raw)
            .map(Arc::new)
            .map_err(|e| {
                BridgeError::resolution(
                    format!("schema id {}", id),
                    RegistryError::Parse(e.to_string()),
                )
            })?;

        if let Some(cache) = &self.cache {
            cache.by_id.insert(id, schema.clone());
        }
        debug!(schema_id = %id, "Resolved schema by id");
        Ok(schema)
    }

    /// Cache counters, `None` when caching is off
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| CacheStats {
            hits: cache.hits.load(Ordering::Relaxed),
            misses: cache.misses.load(Ordering::Relaxed),
            entries: cache.by_name.len() + cache.by_id.len(),
        })
    }

    async fn fetch_by_name(&self, logical_name: &str) -> RegistryResult<(SchemaId, AvroSchema)> {
        match &self.lookup {
            SubjectLookup::Subject => {
                let subject = Subject::new(logical_name);
                let found = self
                    .bounded(self.registry.get_latest_schema(&subject))
                    .await?;
                Ok((found.id, parse_avro(&found)?))
            }
            SubjectLookup::CatalogScan { prefix } => {
                let candidates = self
                    .bounded(self.registry.list_latest_schemas(prefix))
                    .await?;
                debug!(
                    prefix = %prefix,
                    candidates = candidates.len(),
                    "Scanning registry catalog"
                );
                for candidate in &candidates {
                    if candidate.schema_type != SchemaType::Avro {
                        continue;
                    }
                    match parse_avro(candidate) {
                        Ok(schema) if schema.matches_name(logical_name) => {
                            return Ok((candidate.id, schema));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(subject = %candidate.subject, error = %e, "Skipping unparsable schema");
                        }
                    }
                }
                Err(RegistryError::NotFound(format!(
                    "no schema named '{}' under prefix '{}'",
                    logical_name, prefix
                )))
            }
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = RegistryResult<T>>) -> RegistryResult<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RegistryError::Timeout(limit))?,
            None => call.await,
        }
    }
}

fn parse_avro(found: &SubjectSchema) -> RegistryResult<AvroSchema> {
    if found.schema_type != SchemaType::Avro {
        return Err(RegistryError::Parse(format!(
            "subject '{}' holds a {} schema",
            found.subject, found.schema_type
        )));
    }
    AvroSchema::parse(&found.schema).map_err(|e| RegistryError::Parse(e.to_string()))
}
