//! Publish → consume round trips through the in-memory registry and broker
//!
//! Run with: cargo test -p rivven-bridge --test round_trip

use rivven_bridge::{
    BridgeError, CodecDispatcher, DecodedValue, DispatchStatus, DispatcherConfig, Encoding,
    EventRequest, Headers, MemoryBroker, MemoryRegistry, PayloadDecoder, RegistryError,
    SchemaResolver, SubjectLookup,
};
use serde_json::json;
use std::sync::Arc;

const ORDER: &str = r#"{
    "type": "record",
    "name": "Order",
    "namespace": "com.acme",
    "fields": [
        {"name": "id", "type": "string"},
        {"name": "amount", "type": "int"},
        {"name": "note", "type": ["null", "string"], "default": null},
        {"name": "lines", "type": {"type": "array", "items": {
            "type": "record", "name": "Line",
            "fields": [{"name": "sku", "type": "string"}, {"name": "qty", "type": "long"}]
        }}}
    ]
}"#;

struct Harness {
    registry: Arc<MemoryRegistry>,
    broker: Arc<MemoryBroker>,
    dispatcher: CodecDispatcher,
    decoder: PayloadDecoder,
}

fn harness(lookup: SubjectLookup, cached: bool) -> Harness {
    let registry = Arc::new(MemoryRegistry::new());
    let broker = Arc::new(MemoryBroker::new());

    let mut resolver = SchemaResolver::new(registry.clone()).with_lookup(lookup);
    if cached {
        resolver = resolver.with_cache();
    }
    let resolver = Arc::new(resolver);

    Harness {
        registry,
        broker: broker.clone(),
        dispatcher: CodecDispatcher::new(resolver.clone(), broker, DispatcherConfig::default()),
        decoder: PayloadDecoder::new(resolver),
    }
}

impl Harness {
    /// Decode the n-th published envelope the way a consumer would see it
    async fn consume(&self, n: usize) -> Result<Option<DecodedValue>, BridgeError> {
        let record = &self.broker.sent()[n];
        let bytes = record.envelope.body.to_bytes();
        self.decoder
            .decode(&record.topic, &record.envelope.headers, Some(&bytes))
            .await
    }
}

#[tokio::test]
async fn json_event_round_trips() {
    let h = harness(SubjectLookup::Subject, false);
    let request = EventRequest::new("orders")
        .with_id("o-1")
        .with_header("x-trace", "abc")
        .with_payload(json!({"id": "o-1", "amount": 5}));

    let status = h.dispatcher.dispatch(&request, Encoding::Json).await.unwrap();
    assert_eq!(status, DispatchStatus::Accepted);

    let decoded = h.consume(0).await.unwrap().unwrap();
    assert_eq!(decoded, DecodedValue::Json(json!({"id": "o-1", "amount": 5})));
    assert_eq!(h.broker.sent()[0].envelope.headers.last_str("x-trace"), Some("abc"));
}

#[tokio::test]
async fn avro_event_round_trips_with_coercion() {
    let h = harness(SubjectLookup::Subject, false);
    let id = h.registry.register("com.acme.Order", ORDER);

    let request = EventRequest::new("orders")
        .with_avro_source("com.acme.Order")
        .with_payload(
            r#"{"id": "o-2", "amount": "42", "lines": [{"sku": "A-1", "qty": 3}]}"#,
        );
    h.dispatcher.dispatch(&request, Encoding::Avro).await.unwrap();

    let sent = h.broker.sent();
    assert_eq!(sent[0].content_type.to_string(), "application/*+avro");
    assert_eq!(
        sent[0].envelope.headers.last_str("content-type"),
        Some("application/*+avro")
    );

    match h.consume(0).await.unwrap().unwrap() {
        DecodedValue::Avro { schema_id, value } => {
            assert_eq!(schema_id, id);
            assert_eq!(
                value,
                json!({
                    "id": "o-2",
                    "amount": 42,
                    "note": null,
                    "lines": [{"sku": "A-1", "qty": 3}]
                })
            );
        }
        other => panic!("expected Avro, got {:?}", other),
    }
}

#[tokio::test]
async fn catalog_scan_resolves_simple_name() {
    let h = harness(
        SubjectLookup::CatalogScan {
            prefix: "com".to_string(),
        },
        false,
    );
    h.registry.register("com.acme.orders-value", ORDER);

    let request = EventRequest::new("orders")
        .with_avro_source("order")
        .with_payload(json!({"id": "o-3", "amount": 1, "lines": []}));
    h.dispatcher.dispatch(&request, Encoding::Avro).await.unwrap();

    let decoded = h.consume(0).await.unwrap().unwrap();
    assert_eq!(decoded.value()["id"], "o-3");
}

#[tokio::test]
async fn cache_serves_both_directions() {
    let h = harness(SubjectLookup::Subject, true);
    h.registry.register("com.acme.Order", ORDER);

    for n in 0..3 {
        let request = EventRequest::new("orders")
            .with_avro_source("com.acme.Order")
            .with_payload(json!({"id": format!("o-{}", n), "amount": n, "lines": []}));
        h.dispatcher.dispatch(&request, Encoding::Avro).await.unwrap();
    }
    for n in 0..3 {
        h.consume(n).await.unwrap();
    }

    // one subject fetch; every id lookup hits the entry primed on publish
    assert_eq!(h.registry.lookup_count(), 1);
    let stats = h.dispatcher.resolver().cache_stats().unwrap();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 5);
}

#[tokio::test]
async fn consumer_rejects_foreign_content_type() {
    let h = harness(SubjectLookup::Subject, false);
    let headers = Headers::new().with("contentType", "text/plain");
    let err = h
        .decoder
        .decode("orders", &headers, Some(b"hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedContentType(ref ct) if ct == "text/plain"));
}

#[tokio::test]
async fn unknown_writer_schema_is_a_resolution_error() {
    let h = harness(SubjectLookup::Subject, false);
    let headers = Headers::new().with("content-type", "application/vnd.acme+avro");
    let wire = [0u8, 0, 0, 0, 99, 2];
    let err = h
        .decoder
        .decode("orders", &headers, Some(&wire))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::SchemaResolution {
            source: RegistryError::NotFound(_),
            ..
        }
    ));
}

#[tokio::test]
async fn tombstone_decodes_to_none() {
    let h = harness(SubjectLookup::Subject, false);
    let headers = Headers::new().with("Content-Type", "application/json");
    assert!(h.decoder.decode("orders", &headers, None).await.unwrap().is_none());
}
