//! HTTP boundary
//!
//! `POST /json` and `POST /avro` accept an event request and publish it with
//! the matching encoding. Failures are rendered as JSON error bodies:
//!
//! ```json
//! {"code": "Bad Request", "error_code": 40007, "path": "/avro",
//!  "errors": [{"object": "eventRequest", "field": "avroSource",
//!              "rejected_value": null, "message": "must not be blank"}]}
//! ```

use crate::dispatch::{CodecDispatcher, DispatchStatus, Encoding, EventRequest};
use crate::error::{BridgeError, FieldViolation};
use crate::metrics::BridgeMetrics;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub struct ServerState {
    pub dispatcher: Arc<CodecDispatcher>,
    pub metrics: Arc<BridgeMetrics>,
}

pub struct BridgeServer {
    state: Arc<ServerState>,
}

impl BridgeServer {
    pub fn new(dispatcher: Arc<CodecDispatcher>, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            state: Arc::new(ServerState {
                dispatcher,
                metrics,
            }),
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/json", post(publish_json))
            .route("/avro", post(publish_avro))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Bridge listening on {}", addr);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct PublishResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    code: String,
    error_code: u32,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldViolation>>,
}

/// A bridge error bound to the request path
struct ApiError {
    path: String,
    error: BridgeError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = status
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string();
        let error_code = self.error.error_code();
        let body = match self.error {
            BridgeError::Validation(violations) => ErrorResponse {
                code,
                error_code,
                path: self.path,
                message: None,
                errors: Some(violations),
            },
            other => ErrorResponse {
                code,
                error_code,
                path: self.path,
                message: Some(other.to_string()),
                errors: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

async fn publish_json(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    publish(&state, Encoding::Json, uri, body).await
}

async fn publish_avro(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    publish(&state, Encoding::Avro, uri, body).await
}

async fn publish(
    state: &ServerState,
    encoding: Encoding,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    let path = uri.path().to_string();
    let request: EventRequest = serde_json::from_slice(&body).map_err(|e| ApiError {
        path: path.clone(),
        error: BridgeError::InvalidRequest(format!("malformed request body: {}", e)),
    })?;
    debug!(topic = %request.topic, encoding = %encoding, "Received event");

    let status = state
        .dispatcher
        .dispatch(&request, encoding)
        .await
        .map_err(|error| ApiError { path, error })?;

    let (code, label) = match status {
        DispatchStatus::Accepted => (StatusCode::ACCEPTED, "ACCEPTED"),
        DispatchStatus::InternalError => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
    };
    Ok((code, Json(PublishResponse { status: label })).into_response())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Registry and broker are only touched per request, so there is nothing to
/// warm up
async fn readiness_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler(State(state): State<Arc<ServerState>>) -> Response {
    if let Some(stats) = state.dispatcher.resolver().cache_stats() {
        state.metrics.observe_cache(stats);
    }
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avro::{wire_decode, AvroDecoder, AvroSchema};
    use crate::broker::MemoryBroker;
    use crate::dispatch::DispatcherConfig;
    use crate::registry::{MemoryRegistry, SchemaId};
    use crate::resolver::SchemaResolver;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    const ORDER: &str = r#"{"type":"record","name":"Order","namespace":"com.acme","fields":[{"name":"amount","type":"int"}]}"#;

    fn create_test_app() -> (Router, Arc<MemoryBroker>) {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register_with_id("com.acme.Order", SchemaId::new(7), ORDER);
        let broker = Arc::new(MemoryBroker::new());
        let metrics = Arc::new(BridgeMetrics::new().unwrap());
        let dispatcher = CodecDispatcher::new(
            Arc::new(SchemaResolver::new(registry).with_cache()),
            broker.clone(),
            DispatcherConfig::default(),
        )
        .with_metrics(metrics.clone());
        let server = BridgeServer::new(Arc::new(dispatcher), metrics);
        (server.router(), broker)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_publish_json() {
        let (app, broker) = create_test_app();
        let response = app
            .oneshot(post(
                "/json",
                json!({"topic": "orders", "payload": {"a": 1}, "headers": {"x-source": "test"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let sent = broker.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].envelope.body.to_bytes(), br#"{"a":1}"#.to_vec());
        assert_eq!(sent[0].envelope.headers.last_str("x-source"), Some("test"));
    }

    #[tokio::test]
    async fn test_publish_avro() {
        let (app, broker) = create_test_app();
        let response = app
            .oneshot(post(
                "/avro",
                json!({"id": "o-1", "topic": "orders", "avroSource": "com.acme.Order", "payload": "{\"amount\":\"5\"}"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let sent = broker.sent();
        assert_eq!(sent[0].envelope.key.as_deref(), Some("o-1"));
        let wire = sent[0].envelope.body.to_bytes();
        let (id, datum) = wire_decode(&wire).unwrap();
        assert_eq!(id, SchemaId::new(7));
        let schema = AvroSchema::parse(ORDER).unwrap();
        assert_eq!(AvroDecoder::decode(datum, &schema).unwrap(), json!({"amount": 5}));
    }

    #[tokio::test]
    async fn test_validation_error_body() {
        let (app, _) = create_test_app();
        let response = app
            .oneshot(post("/avro", json!({"topic": "orders", "payload": "{}"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["code"], "Bad Request");
        assert_eq!(body["path"], "/avro");
        assert_eq!(body["errors"][0]["field"], "avroSource");
        assert_eq!(body["errors"][0]["object"], "eventRequest");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_unknown_schema_is_bad_gateway() {
        let (app, _) = create_test_app();
        let response = app
            .oneshot(post(
                "/avro",
                json!({"topic": "orders", "avroSource": "com.acme.Invoice", "payload": "{}"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("com.acme.Invoice"));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (app, _) = create_test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broker_rejection_is_internal_error() {
        let (app, broker) = create_test_app();
        broker.set_rejecting(true);
        let response = app
            .oneshot(post("/json", json!({"topic": "orders"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["status"], "INTERNAL_SERVER_ERROR");
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _) = create_test_app();
        for uri in ["/health", "/health/live", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = create_test_app();
        app.clone()
            .oneshot(post("/json", json!({"topic": "orders", "payload": {"a": 1}})))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(r#"bridge_events_published_total{encoding="json",status="accepted"} 1"#));
        assert!(text.contains("bridge_schema_cache_hits 0"));
    }
}
