//! Outbound path: event request to broker envelope
//!
//! The routing layer picks the [`Encoding`]; the dispatcher validates the
//! request, transcodes the payload, sets the content type and hands the
//! [`Envelope`] to the broker. Broker-level failure is reported as
//! [`DispatchStatus::InternalError`], not as an error.

use crate::avro::{AvroEncoder, BinaryRecord};
use crate::broker::BrokerSender;
use crate::error::{BridgeError, BridgeResult, FieldViolation};
use crate::headers::{ContentTypeResolver, Headers, CONTENT_TYPE_ALIASES, CONTENT_TYPE_HEADER};
use crate::metrics::BridgeMetrics;
use crate::mime::MimeType;
use crate::registry::SchemaId;
use crate::resolver::SchemaResolver;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

/// Wire encoding selected by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Avro,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Avro => "avro",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "avro" => Ok(Encoding::Avro),
            other => Err(BridgeError::InvalidRequest(format!(
                "unknown encoding '{}'",
                other
            ))),
        }
    }
}

/// Event payload as submitted
///
/// On the JSON path every payload is published in its canonical JSON form,
/// so a string payload goes out quoted. On the Avro path a string payload
/// holds the record as JSON text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<JsonValue>", into = "Option<JsonValue>")]
pub enum Payload {
    #[default]
    Empty,
    Text(String),
    Json(JsonValue),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Empty => true,
            Payload::Text(text) => text.is_empty(),
            Payload::Json(_) => false,
        }
    }

    /// Canonical JSON text of the payload; empty when there is none
    pub fn to_json_bytes(&self) -> BridgeResult<Vec<u8>> {
        let rendered = match self {
            Payload::Empty => return Ok(Vec::new()),
            Payload::Text(text) => serde_json::to_vec(text),
            Payload::Json(value) => serde_json::to_vec(value),
        };
        rendered.map_err(|e| BridgeError::Encoding(e.to_string()))
    }
}

impl From<Option<JsonValue>> for Payload {
    fn from(value: Option<JsonValue>) -> Self {
        match value {
            None | Some(JsonValue::Null) => Payload::Empty,
            Some(JsonValue::String(text)) => Payload::Text(text),
            Some(other) => Payload::Json(other),
        }
    }
}

impl From<Payload> for Option<JsonValue> {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Empty => None,
            Payload::Text(text) => Some(JsonValue::String(text)),
            Payload::Json(value) => Some(value),
        }
    }
}

/// An event submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// Optional record key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub topic: String,

    /// Logical schema name; required for Avro
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avro_source: Option<String>,

    #[serde(default)]
    pub payload: Payload,

    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(custom(function = "headers_not_blank"))]
    pub headers: BTreeMap<String, String>,
}

const REQUEST_OBJECT: &str = "eventRequest";

impl EventRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_avro_source(mut self, source: impl Into<String>) -> Self {
        self.avro_source = Some(source.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Field validation plus the rules specific to `encoding`
    pub fn validate_for(&self, encoding: Encoding) -> BridgeResult<()> {
        let mut violations = match self.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => violations(&errors),
        };

        if encoding == Encoding::Avro
            && self.avro_source.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            violations.push(FieldViolation {
                object: REQUEST_OBJECT.to_string(),
                field: "avroSource".to_string(),
                rejected_value: self
                    .avro_source
                    .clone()
                    .map_or(JsonValue::Null, JsonValue::String),
                message: "must not be blank".to_string(),
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Validation(violations))
        }
    }
}

impl From<JsonValue> for Payload {
    fn from(value: JsonValue) -> Self {
        Payload::from(Some(value))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank(value: &str) -> ValidationError {
    let mut error = ValidationError::new("blank").with_message(Cow::from("must not be blank"));
    error.add_param(Cow::from("value"), &value);
    error
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(blank(value));
    }
    Ok(())
}

fn headers_not_blank(headers: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for (key, value) in headers {
        if key.trim().is_empty() {
            return Err(blank(key));
        }
        if value.trim().is_empty() {
            return Err(blank(value));
        }
    }
    Ok(())
}

fn violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut out: Vec<FieldViolation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldViolation {
                object: REQUEST_OBJECT.to_string(),
                field: field.to_string(),
                rejected_value: error
                    .params
                    .get("value")
                    .cloned()
                    .unwrap_or(JsonValue::Null),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string()),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

/// Envelope body
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    Bytes(Vec<u8>),
    Avro {
        schema_id: SchemaId,
        record: BinaryRecord,
    },
}

impl EnvelopeBody {
    /// Bytes as they go on the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            EnvelopeBody::Bytes(bytes) => bytes.clone(),
            EnvelopeBody::Avro { schema_id, record } => record.to_wire(*schema_id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EnvelopeBody::Bytes(bytes) => bytes.len(),
            EnvelopeBody::Avro { record, .. } => crate::avro::WIRE_HEADER_LEN + record.datum.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A message ready for the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub topic: String,
    pub binding_hint: Option<String>,
    pub key: Option<String>,
    pub headers: Headers,
    pub body: EnvelopeBody,
}

impl Envelope {
    pub fn content_type(&self) -> BridgeResult<MimeType> {
        ContentTypeResolver::resolve(&self.headers)
    }
}

/// Outward result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Accepted,
    InternalError,
}

impl DispatchStatus {
    pub fn http_status(&self) -> u16 {
        match self {
            DispatchStatus::Accepted => 202,
            DispatchStatus::InternalError => 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Replace a caller-supplied content type on the JSON path
    pub overwrite_content_type: bool,
    /// Content type stamped on Avro envelopes
    pub avro_content_type: MimeType,
    pub json_binding: Option<String>,
    pub avro_binding: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            overwrite_content_type: true,
            avro_content_type: MimeType::application_avro_wildcard(),
            json_binding: None,
            avro_binding: None,
        }
    }
}

pub struct CodecDispatcher {
    resolver: Arc<SchemaResolver>,
    broker: Arc<dyn BrokerSender>,
    config: DispatcherConfig,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl CodecDispatcher {
    pub fn new(
        resolver: Arc<SchemaResolver>,
        broker: Arc<dyn BrokerSender>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            resolver,
            broker,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    /// Build the envelope for `request` without publishing it
    pub async fn encode(&self, request: &EventRequest, encoding: Encoding) -> BridgeResult<Envelope> {
        request.validate_for(encoding)?;
        let mut headers = Headers::from(&request.headers);

        let (body, binding_hint) = match encoding {
            Encoding::Json => {
                if self.config.overwrite_content_type || !ContentTypeResolver::is_present(&headers) {
                    stamp_content_type(&mut headers, &MimeType::application_json());
                }
                (
                    EnvelopeBody::Bytes(request.payload.to_json_bytes()?),
                    self.config.json_binding.clone(),
                )
            }
            Encoding::Avro => {
                let source = request.avro_source.as_deref().unwrap_or_default();
                let reference = self.resolver.resolve_schema(source).await?;
                let record = match &request.payload {
                    Payload::Json(value) => AvroEncoder::encode_value(value, &reference.schema)?,
                    Payload::Text(text) => AvroEncoder::encode(text.as_bytes(), &reference.schema)?,
                    Payload::Empty => AvroEncoder::encode(&[], &reference.schema)?,
                };
                stamp_content_type(&mut headers, &self.config.avro_content_type);
                (
                    EnvelopeBody::Avro {
                        schema_id: reference.schema_id,
                        record,
                    },
                    self.config.avro_binding.clone(),
                )
            }
        };

        Ok(Envelope {
            topic: request.topic.clone(),
            binding_hint,
            key: request.id.clone(),
            headers,
            body,
        })
    }

    /// Encode and publish
    pub async fn dispatch(&self, request: &EventRequest, encoding: Encoding) -> BridgeResult<DispatchStatus> {
        let _timer = self
            .metrics
            .as_ref()
            .map(|m| m.start_timer(encoding.as_str()));

        // The envelope may keep a caller-supplied content type
        let prepared = self.encode(request, encoding).await.and_then(|envelope| {
            let content_type = envelope.content_type()?;
            Ok((envelope, content_type))
        });
        let (envelope, content_type) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(encoding.as_str(), e.kind());
                }
                return Err(e);
            }
        };
        let topic = envelope.topic.clone();
        let binding_hint = envelope.binding_hint.clone();

        let accepted = self
            .broker
            .send(&topic, binding_hint.as_deref(), envelope, &content_type)
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_published(encoding.as_str(), accepted);
        }

        if accepted {
            info!(topic = %topic, encoding = %encoding, "Event published");
            Ok(DispatchStatus::Accepted)
        } else {
            warn!(topic = %topic, encoding = %encoding, "Broker rejected event");
            Ok(DispatchStatus::InternalError)
        }
    }
}

fn stamp_content_type(headers: &mut Headers, content_type: &MimeType) {
    for alias in CONTENT_TYPE_ALIASES {
        headers.remove(alias);
    }
    headers.set(CONTENT_TYPE_HEADER, content_type.to_string());
}
