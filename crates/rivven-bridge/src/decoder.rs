//! Inbound decode path
//!
//! One entry point, dispatched on the record's content type:
//!
//! 1. resolve the content type from the headers
//! 2. `application/json` compatible: UTF-8 JSON
//! 3. `application/*+avro` compatible: wire format, writer schema by id
//! 4. anything else: [`BridgeError::UnsupportedContentType`]

use crate::avro::{wire_decode, AvroDecoder};
use crate::error::{BridgeError, BridgeResult};
use crate::headers::{ContentTypeResolver, HeaderLookup};
use crate::mime::MimeType;
use crate::registry::SchemaId;
use crate::resolver::SchemaResolver;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error};

/// A decoded record payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Json(JsonValue),
    Avro { schema_id: SchemaId, value: JsonValue },
}

impl DecodedValue {
    pub fn value(&self) -> &JsonValue {
        match self {
            DecodedValue::Json(value) | DecodedValue::Avro { value, .. } => value,
        }
    }

    pub fn into_value(self) -> JsonValue {
        match self {
            DecodedValue::Json(value) | DecodedValue::Avro { value, .. } => value,
        }
    }
}

/// Content-type driven payload decoder
pub struct PayloadDecoder {
    resolver: Arc<SchemaResolver>,
    json: MimeType,
    avro: MimeType,
}

impl PayloadDecoder {
    pub fn new(resolver: Arc<SchemaResolver>) -> Self {
        Self {
            resolver,
            json: MimeType::application_json(),
            avro: MimeType::application_avro_wildcard(),
        }
    }

    /// Decode a consumed record.
    ///
    /// The content type is resolved first, so a record without one fails
    /// with `MissingContentType` even when it has no payload. An absent
    /// payload (tombstone) decodes to `None`.
    pub async fn decode<H: HeaderLookup + ?Sized>(
        &self,
        topic: &str,
        headers: &H,
        bytes: Option<&[u8]>,
    ) -> BridgeResult<Option<DecodedValue>> {
        let content_type = ContentTypeResolver::resolve(headers)?;
        let Some(bytes) = bytes else {
            debug!(topic = %topic, content_type = %content_type, "Record has no payload");
            return Ok(None);
        };

        if content_type.is_compatible_with(&self.json) {
            debug!(topic = %topic, content_type = %content_type, "Decoding JSON payload");
            let value = serde_json::from_slice(bytes)
                .map_err(|e| BridgeError::Decoding(format!("invalid JSON payload: {}", e)))?;
            Ok(Some(DecodedValue::Json(value)))
        } else if content_type.is_compatible_with(&self.avro) {
            let (schema_id, datum) = wire_decode(bytes)?;
            debug!(
                topic = %topic,
                content_type = %content_type,
                schema_id = %schema_id,
                "Decoding Avro payload"
            );
            let schema = self.resolver.resolve_by_id(schema_id).await?;
            let value = AvroDecoder::decode(datum, &schema)?;
            Ok(Some(DecodedValue::Avro { schema_id, value }))
        } else {
            Err(BridgeError::UnsupportedContentType(content_type.to_string()))
        }
    }

    /// Header-less decoding is not supported; the content type decides the
    /// codec and only lives in the headers.
    pub fn decode_without_headers(
        &self,
        topic: &str,
        _bytes: Option<&[u8]>,
    ) -> BridgeResult<Option<DecodedValue>> {
        error!(topic = %topic, "Decode called without headers");
        Err(BridgeError::UnsupportedOperation(
            "decoding requires record headers",
        ))
    }
}
