//! Prometheus metrics for the bridge
//!
//! ## Counters
//! - `bridge_events_published_total{encoding,status}` - dispatch outcomes
//! - `bridge_publish_errors_total{encoding,kind}` - failures before the broker
//!
//! ## Gauges
//! - `bridge_schema_cache_hits` / `bridge_schema_cache_misses` - resolver cache
//!
//! ## Histograms
//! - `bridge_publish_duration_seconds{encoding}` - encode plus broker handoff

use crate::resolver::CacheStats;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

const DURATION_BUCKETS: [f64; 11] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

pub struct BridgeMetrics {
    registry: Registry,
    events_published: CounterVec,
    publish_errors: CounterVec,
    publish_duration: HistogramVec,
    cache_hits: Gauge,
    cache_misses: Gauge,
}

impl BridgeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let events_published = CounterVec::new(
            Opts::new(
                "bridge_events_published_total",
                "Events handed to the broker, by outcome",
            ),
            &["encoding", "status"],
        )?;

        let publish_errors = CounterVec::new(
            Opts::new(
                "bridge_publish_errors_total",
                "Events rejected before reaching the broker",
            ),
            &["encoding", "kind"],
        )?;

        let publish_duration = HistogramVec::new(
            HistogramOpts::new(
                "bridge_publish_duration_seconds",
                "Time spent encoding and publishing an event",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["encoding"],
        )?;

        let cache_hits = Gauge::new("bridge_schema_cache_hits", "Schema cache hits")?;
        let cache_misses = Gauge::new("bridge_schema_cache_misses", "Schema cache misses")?;

        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(publish_errors.clone()))?;
        registry.register(Box::new(publish_duration.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;

        Ok(Self {
            registry,
            events_published,
            publish_errors,
            publish_duration,
            cache_hits,
            cache_misses,
        })
    }

    /// Record a broker handoff
    pub fn record_published(&self, encoding: &str, accepted: bool) {
        self.events_published
            .with_label_values(&[encoding, if accepted { "accepted" } else { "rejected" }])
            .inc();
    }

    /// Record a failure raised before the broker was called
    pub fn record_error(&self, encoding: &str, kind: &str) {
        self.publish_errors
            .with_label_values(&[encoding, kind])
            .inc();
    }

    pub fn start_timer(&self, encoding: &str) -> PublishTimer<'_> {
        PublishTimer {
            metrics: self,
            encoding: encoding.to_string(),
            start: Instant::now(),
        }
    }

    /// Copy resolver cache counters into the gauges
    pub fn observe_cache(&self, stats: CacheStats) {
        self.cache_hits.set(stats.hits as f64);
        self.cache_misses.set(stats.misses as f64);
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Observes publish latency when dropped
pub struct PublishTimer<'a> {
    metrics: &'a BridgeMetrics,
    encoding: String,
    start: Instant,
}

impl Drop for PublishTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .publish_duration
            .with_label_values(&[self.encoding.as_str()])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = BridgeMetrics::new().unwrap();
        metrics.record_published("avro", true);
        metrics.record_published("json", false);
        metrics.record_error("avro", "schema_resolution");
        drop(metrics.start_timer("json"));
        metrics.observe_cache(CacheStats {
            hits: 3,
            misses: 1,
            entries: 2,
        });

        let output = metrics.render().unwrap();
        assert!(output.contains(r#"bridge_events_published_total{encoding="avro",status="accepted"} 1"#));
        assert!(output.contains(r#"bridge_events_published_total{encoding="json",status="rejected"} 1"#));
        assert!(output.contains(r#"bridge_publish_errors_total{encoding="avro",kind="schema_resolution"} 1"#));
        assert!(output.contains("bridge_publish_duration_seconds_count{encoding=\"json\"} 1"));
        assert!(output.contains("bridge_schema_cache_hits 3"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        BridgeMetrics::with_registry(registry.clone()).unwrap();
        assert!(BridgeMetrics::with_registry(registry).is_err());
    }
}
