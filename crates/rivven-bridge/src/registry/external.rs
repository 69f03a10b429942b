//! Confluent-compatible schema registry client
//!
//! Talks to any registry implementing the Confluent REST API (Confluent
//! Schema Registry, Apicurio in compatibility mode, rivven-schema). One
//! client is built at startup and shared; it holds a pooled HTTP client and
//! a request timeout.

use crate::error::{RegistryError, RegistryResult};
use crate::registry::client::RegistryClient;
use crate::registry::types::{SchemaId, SchemaType, SchemaVersion, Subject, SubjectSchema};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json, application/json";

/// Connection settings for an external registry
#[derive(Debug, Clone)]
pub struct ExternalRegistryConfig {
    /// Base URL, e.g. `http://localhost:8081`
    pub url: String,
    /// Basic auth username
    pub username: Option<String>,
    /// Basic auth password
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ExternalRegistryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Response from `GET /schemas/ids/{id}`
#[derive(Debug, Deserialize)]
struct GetSchemaResponse {
    schema: String,
}

/// Response from `GET /subjects/{subject}/versions/latest` and `GET /schemas`
#[derive(Debug, Deserialize)]
struct SubjectVersionResponse {
    subject: String,
    version: u32,
    id: u32,
    schema: String,
    #[serde(rename = "schemaType", default)]
    schema_type: Option<String>,
}

impl SubjectVersionResponse {
    fn into_subject_schema(self) -> SubjectSchema {
        let schema_type = self
            .schema_type
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(SchemaType::Avro);

        SubjectSchema {
            subject: Subject::new(self.subject),
            version: SchemaVersion::new(self.version),
            id: SchemaId::new(self.id),
            schema_type,
            schema: self.schema,
        }
    }
}

/// Error body returned by the registry
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_code: u32,
    #[serde(default)]
    message: String,
}

/// HTTP client for an external registry
pub struct ExternalRegistry {
    client: Client,
    base_url: Url,
}

impl ExternalRegistry {
    /// Create a new external registry client
    pub fn new(config: &ExternalRegistryConfig) -> RegistryResult<Self> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            use base64::Engine;
            use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

            let credentials = format!("{}:{}", username, password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

            let mut value = HeaderValue::from_str(&format!("Basic {}", encoded))
                .map_err(|e| RegistryError::Network(e.to_string()))?;
            value.set_sensitive(true);

            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        let base_url = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| RegistryError::Network(format!("invalid registry url '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Network(format!(
                "invalid registry url '{}'",
                config.url
            )));
        }

        Ok(Self { client, base_url })
    }

    /// Registry base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> RegistryResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Network(format!("invalid registry url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url, what: &str) -> RegistryResult<T> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body, what));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn parse_error(status: StatusCode, body: &str, what: &str) -> RegistryError {
    let parsed: Option<ErrorResponse> = serde_json::from_str(body).ok();
    let (error_code, message) = match parsed {
        Some(e) if !e.message.is_empty() => (e.error_code, e.message),
        Some(e) => (e.error_code, body.to_string()),
        None => (0, body.to_string()),
    };

    if status == StatusCode::NOT_FOUND {
        RegistryError::NotFound(format!("{} ({})", what, message))
    } else {
        RegistryError::Status {
            status: status.as_u16(),
            error_code,
            message,
        }
    }
}

#[async_trait]
impl RegistryClient for ExternalRegistry {
    async fn get_latest_schema(&self, subject: &Subject) -> RegistryResult<SubjectSchema> {
        let url = self.endpoint(&["subjects", subject.as_str(), "versions", "latest"])?;
        let response: SubjectVersionResponse =
            self.get(url, &format!("subject '{}'", subject)).await?;

        tracing::debug!(
            subject = %subject,
            schema_id = response.id,
            version = response.version,
            "Fetched latest schema"
        );

        Ok(response.into_subject_schema())
    }

    async fn get_schema_by_id(&self, id: SchemaId) -> RegistryResult<String> {
        let url = self.endpoint(&["schemas", "ids", &id.0.to_string()])?;
        let response: GetSchemaResponse = self.get(url, &format!("schema id {}", id)).await?;

        tracing::debug!(schema_id = %id, "Fetched schema by id");

        Ok(response.schema)
    }

    async fn list_latest_schemas(&self, prefix: &str) -> RegistryResult<Vec<SubjectSchema>> {
        let mut url = self.endpoint(&["schemas"])?;
        url.query_pairs_mut()
            .append_pair("subjectPrefix", prefix)
            .append_pair("deleted", "false")
            .append_pair("latestOnly", "true");

        let response: Vec<SubjectVersionResponse> = self
            .get(url, &format!("schemas with prefix '{}'", prefix))
            .await?;

        Ok(response
            .into_iter()
            .map(SubjectVersionResponse::into_subject_schema)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    const ORDER_SCHEMA: &str =
        r#"{"type":"record","name":"Order","namespace":"com.acme","fields":[{"name":"amount","type":"int"}]}"#;

    async fn latest(Path(subject): Path<String>) -> (AxumStatus, Json<serde_json::Value>) {
        if subject == "com.acme.Order" {
            (
                AxumStatus::OK,
                Json(json!({"subject": subject, "version": 3, "id": 7, "schema": ORDER_SCHEMA})),
            )
        } else {
            (
                AxumStatus::NOT_FOUND,
                Json(json!({"error_code": 40401, "message": "Subject not found."})),
            )
        }
    }

    async fn by_id(Path(id): Path<u32>) -> (AxumStatus, Json<serde_json::Value>) {
        match id {
            7 => (AxumStatus::OK, Json(json!({"schema": ORDER_SCHEMA}))),
            _ => (
                AxumStatus::NOT_FOUND,
                Json(json!({"error_code": 40403, "message": "Schema not found"})),
            ),
        }
    }

    async fn list(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
        assert_eq!(params.get("latestOnly").map(String::as_str), Some("true"));
        let prefix = params.get("subjectPrefix").cloned().unwrap_or_default();
        if "com.acme.Order".starts_with(&prefix) {
            Json(json!([{"subject": "com.acme.Order", "version": 3, "id": 7, "schema": ORDER_SCHEMA}]))
        } else {
            Json(json!([]))
        }
    }

    async fn broken() -> (AxumStatus, &'static str) {
        (AxumStatus::INTERNAL_SERVER_ERROR, "boom")
    }

    async fn authed(headers: HeaderMap) -> (AxumStatus, Json<serde_json::Value>) {
        // base64("user:secret")
        if headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some("Basic dXNlcjpzZWNyZXQ=")
        {
            (AxumStatus::OK, Json(json!({"schema": ORDER_SCHEMA})))
        } else {
            (AxumStatus::UNAUTHORIZED, Json(json!({"error_code": 40101, "message": "unauthorized"})))
        }
    }

    async fn spawn_registry() -> String {
        let app = Router::new()
            .route("/subjects/:subject/versions/latest", get(latest))
            .route("/schemas/ids/:id", get(by_id))
            .route("/schemas", get(list))
            .route("/broken/schemas/ids/:id", get(broken))
            .route("/auth/schemas/ids/:id", get(authed));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_latest_schema() {
        let url = spawn_registry().await;
        let registry = ExternalRegistry::new(&ExternalRegistryConfig::new(url)).unwrap();

        let schema = registry
            .get_latest_schema(&Subject::new("com.acme.Order"))
            .await
            .unwrap();
        assert_eq!(schema.id, SchemaId::new(7));
        assert_eq!(schema.version, SchemaVersion::new(3));
        assert_eq!(schema.schema_type, SchemaType::Avro);
        assert_eq!(schema.schema, ORDER_SCHEMA);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_not_found() {
        let url = spawn_registry().await;
        let registry = ExternalRegistry::new(&ExternalRegistryConfig::new(url)).unwrap();

        let err = registry
            .get_latest_schema(&Subject::new("com.acme.order"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert!(err.to_string().contains("Subject not found"));
    }

    #[tokio::test]
    async fn test_get_schema_by_id() {
        let url = spawn_registry().await;
        let registry = ExternalRegistry::new(&ExternalRegistryConfig::new(url)).unwrap();

        assert_eq!(
            registry.get_schema_by_id(SchemaId::new(7)).await.unwrap(),
            ORDER_SCHEMA
        );
        assert!(matches!(
            registry.get_schema_by_id(SchemaId::new(8)).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_latest_schemas() {
        let url = spawn_registry().await;
        let registry = ExternalRegistry::new(&ExternalRegistryConfig::new(url)).unwrap();

        let schemas = registry.list_latest_schemas("com").await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].subject, Subject::new("com.acme.Order"));

        assert!(registry.list_latest_schemas("org").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_keeps_status() {
        let url = spawn_registry().await;
        let registry =
            ExternalRegistry::new(&ExternalRegistryConfig::new(format!("{}/broken/", url))).unwrap();

        match registry.get_schema_by_id(SchemaId::new(1)).await {
            Err(RegistryError::Status {
                status, message, ..
            }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_basic_auth() {
        let url = spawn_registry().await;
        let config = ExternalRegistryConfig::new(format!("{}/auth", url))
            .with_basic_auth("user", "secret");
        let registry = ExternalRegistry::new(&config).unwrap();
        assert!(registry.get_schema_by_id(SchemaId::new(7)).await.is_ok());

        let anonymous =
            ExternalRegistry::new(&ExternalRegistryConfig::new(format!("{}/auth", url))).unwrap();
        assert!(matches!(
            anonymous.get_schema_by_id(SchemaId::new(7)).await,
            Err(RegistryError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_registry() {
        let config = ExternalRegistryConfig::new("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2));
        let registry = ExternalRegistry::new(&config).unwrap();
        assert!(matches!(
            registry.get_schema_by_id(SchemaId::new(1)).await,
            Err(RegistryError::Network(_))
        ));
    }

    #[test]
    fn test_invalid_url() {
        assert!(ExternalRegistry::new(&ExternalRegistryConfig::new("not a url")).is_err());
    }
}
