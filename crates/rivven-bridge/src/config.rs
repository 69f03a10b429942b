//! Bridge configuration
//!
//! Loaded from YAML after `${VAR}` / `${VAR:-default}` expansion. Every
//! field has a default, so an empty document (or a missing file) yields a
//! runnable configuration.
//!
//! ```yaml
//! server:
//!   port: 8080
//! registry:
//!   url: ${SCHEMA_REGISTRY_URL:-http://localhost:8081}
//!   timeout_ms: 5000
//!   cache: true
//! dispatch:
//!   overwrite_content_type: false
//!   bindings:
//!     avro: orders-avro-out
//! broker:
//!   kind: kafka
//!   kafka:
//!     bootstrap_servers: ${KAFKA_BOOTSTRAP_SERVERS:-localhost:9092}
//! ```

use crate::dispatch::DispatcherConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::mime::MimeType;
use crate::registry::ExternalRegistryConfig;
use crate::resolver::SubjectLookup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub dispatch: DispatchConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How logical names map to registry subjects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupMode {
    #[default]
    Subject,
    CatalogScan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Bound on every registry round trip
    pub timeout_ms: u64,
    /// Process-wide schema cache
    pub cache: bool,
    pub lookup: LookupMode,
    /// Catalog scan only
    pub subject_prefix: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            username: None,
            password: None,
            timeout_ms: 30_000,
            cache: false,
            lookup: LookupMode::Subject,
            subject_prefix: "com".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn subject_lookup(&self) -> SubjectLookup {
        match self.lookup {
            LookupMode::Subject => SubjectLookup::Subject,
            LookupMode::CatalogScan => SubjectLookup::CatalogScan {
                prefix: self.subject_prefix.clone(),
            },
        }
    }

    pub fn client_config(&self) -> ExternalRegistryConfig {
        let config = ExternalRegistryConfig::new(self.url.clone()).with_timeout(self.timeout());
        match (&self.username, &self.password) {
            (Some(user), password) => {
                config.with_basic_auth(user.clone(), password.clone().unwrap_or_default())
            }
            (None, _) => config,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    pub json: Option<String>,
    pub avro: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Replace a caller-supplied content type on the JSON path
    pub overwrite_content_type: bool,
    pub avro_content_type: String,
    pub bindings: BindingsConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            overwrite_content_type: true,
            avro_content_type: crate::mime::APPLICATION_AVRO_WILDCARD.to_string(),
            bindings: BindingsConfig::default(),
        }
    }
}

impl DispatchConfig {
    pub fn dispatcher_config(&self) -> BridgeResult<DispatcherConfig> {
        Ok(DispatcherConfig {
            overwrite_content_type: self.overwrite_content_type,
            avro_content_type: MimeType::parse(&self.avro_content_type)?,
            json_binding: self.bindings.json.clone(),
            avro_binding: self.bindings.avro.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    /// Publish to a Kafka cluster
    #[default]
    Kafka,
    /// Log each envelope and accept it
    Log,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    pub kafka: KafkaConfig,
}

/// Kafka producer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    /// `0`, `1` or `all`
    pub acks: String,
    /// Bound on a single delivery, retries included
    pub delivery_timeout_ms: u64,
    /// Extra librdkafka properties (`security.protocol`, `sasl.*`, ...)
    pub properties: BTreeMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "rivven-bridge".to_string(),
            acks: "all".to_string(),
            delivery_timeout_ms: 30_000,
            properties: BTreeMap::new(),
        }
    }
}

impl KafkaConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> BridgeResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::from_file(path)
    }

    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> BridgeResult<Self> {
        let expanded = expand_env_vars(content);
        // An empty document parses as null
        let config: Self = if expanded.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&expanded)
                .map_err(|e| BridgeError::Config(format!("Failed to parse config: {}", e)))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        let url = reqwest::Url::parse(&self.registry.url).map_err(|e| {
            BridgeError::Config(format!("registry.url '{}' is invalid: {}", self.registry.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "registry.url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.registry.timeout_ms == 0 {
            return Err(BridgeError::Config(
                "registry.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.registry.lookup == LookupMode::CatalogScan && self.registry.subject_prefix.is_empty() {
            warn!("Catalog scan without subject_prefix lists every subject");
        }

        if self.broker.kind == BrokerKind::Kafka {
            let kafka = &self.broker.kafka;
            if kafka.bootstrap_servers.trim().is_empty() {
                return Err(BridgeError::Config(
                    "broker.kafka.bootstrap_servers must not be empty".to_string(),
                ));
            }
            if kafka.delivery_timeout_ms == 0 {
                return Err(BridgeError::Config(
                    "broker.kafka.delivery_timeout_ms must be greater than 0".to_string(),
                ));
            }
            if !matches!(kafka.acks.as_str(), "0" | "1" | "all" | "-1") {
                return Err(BridgeError::Config(format!(
                    "broker.kafka.acks must be 0, 1 or all, got '{}'",
                    kafka.acks
                )));
            }
        }

        let avro = MimeType::parse(&self.dispatch.avro_content_type)
            .map_err(|e| BridgeError::Config(format!("dispatch.avro_content_type: {}", e)))?;
        if !avro.is_compatible_with(&MimeType::application_avro_wildcard()) {
            return Err(BridgeError::Config(format!(
                "dispatch.avro_content_type '{}' is not an Avro media type",
                avro
            )));
        }
        Ok(())
    }
}

const REDACTED: &str = "******";

fn is_secret_property(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("password") || key.contains("secret") || key.ends_with(".key")
}

impl BridgeConfig {
    /// Copy with credentials masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.registry.password.is_some() {
            config.registry.password = Some(REDACTED.to_string());
        }
        for (key, value) in config.broker.kafka.properties.iter_mut() {
            if is_secret_property(key) {
                *value = REDACTED.to_string();
            }
        }
        config
    }
}

/// Expand environment variables in the format ${VAR} or ${VAR:-default}
fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());
            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}
