//! Relay metrics.
//!
//! Plain atomic counters, exported as JSON on `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::registry::FanOut;

/// Relay metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Publish counters
    pub publishes_total: AtomicU64,
    pub publishes_accepted: AtomicU64,
    pub publishes_rejected: AtomicU64,
    pub publishes_malformed: AtomicU64,

    // Fan-out counters
    pub deliveries: AtomicU64,
    pub dropped_deliveries: AtomicU64,

    // WebSocket counters
    pub websocket_connections: AtomicU64,
    pub websocket_subscriptions: AtomicU64,
    pub handshake_failures: AtomicU64,
    pub handshake_timeouts: AtomicU64,

    // Publish latency (validation plus fan-out)
    pub total_latency_us: AtomicU64,
    pub latency_samples: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a publish that passed validation
    pub fn record_publish_accepted(&self, fan_out: FanOut) {
        self.publishes_total.fetch_add(1, Ordering::Relaxed);
        self.publishes_accepted.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(fan_out.delivered as u64, Ordering::Relaxed);
        self.dropped_deliveries
            .fetch_add(fan_out.dropped as u64, Ordering::Relaxed);
    }

    /// Record a publish that failed token validation or processing
    pub fn record_publish_rejected(&self) {
        self.publishes_total.fetch_add(1, Ordering::Relaxed);
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a publish body that was not a publish request
    pub fn record_publish_malformed(&self) {
        self.publishes_total.fetch_add(1, Ordering::Relaxed);
        self.publishes_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_latency(&self, latency_us: u64) {
        self.total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Record WebSocket connection
    pub fn record_ws_connect(&self) {
        self.websocket_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record WebSocket disconnection
    pub fn record_ws_disconnect(&self) {
        self.websocket_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a completed handshake
    pub fn record_ws_subscribe(&self) {
        self.websocket_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a subscription leaving the registry
    pub fn record_ws_unsubscribe(&self) {
        self.websocket_subscriptions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a rejected or malformed first message
    pub fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection that never sent its first message
    pub fn record_handshake_timeout(&self) {
        self.handshake_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average publish latency in microseconds
    pub fn average_publish_latency_us(&self) -> f64 {
        let total = self.total_latency_us.load(Ordering::Relaxed);
        let count = self.latency_samples.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "publishes": {
                "total": self.publishes_total.load(Ordering::Relaxed),
                "accepted": self.publishes_accepted.load(Ordering::Relaxed),
                "rejected": self.publishes_rejected.load(Ordering::Relaxed),
                "malformed": self.publishes_malformed.load(Ordering::Relaxed),
            },
            "fan_out": {
                "delivered": self.deliveries.load(Ordering::Relaxed),
                "dropped": self.dropped_deliveries.load(Ordering::Relaxed),
            },
            "websocket": {
                "connections": self.websocket_connections.load(Ordering::Relaxed),
                "subscriptions": self.websocket_subscriptions.load(Ordering::Relaxed),
                "handshake_failures": self.handshake_failures.load(Ordering::Relaxed),
                "handshake_timeouts": self.handshake_timeouts.load(Ordering::Relaxed),
            },
            "latency": {
                "average_publish_us": self.average_publish_latency_us(),
            }
        })
    }
}

/// Publish timing helper
pub struct PublishTimer {
    start: Instant,
    metrics: Arc<RelayMetrics>,
}

impl PublishTimer {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self) {
        let latency_us = self.start.elapsed().as_micros() as u64;
        self.metrics.record_publish_latency(latency_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_recording() {
        let metrics = RelayMetrics::new();

        metrics.record_publish_accepted(FanOut {
            delivered: 3,
            dropped: 1,
        });
        metrics.record_publish_rejected();
        metrics.record_publish_malformed();

        assert_eq!(metrics.publishes_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.publishes_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.publishes_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.publishes_malformed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deliveries.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.dropped_deliveries.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_average_latency() {
        let metrics = RelayMetrics::new();

        metrics.record_publish_latency(100);
        metrics.record_publish_latency(200);
        metrics.record_publish_latency(300);

        assert!((metrics.average_publish_latency_us() - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_websocket_metrics() {
        let metrics = RelayMetrics::new();

        metrics.record_ws_connect();
        metrics.record_ws_connect();
        metrics.record_ws_subscribe();
        metrics.record_handshake_failure();
        metrics.record_handshake_timeout();

        assert_eq!(metrics.websocket_connections.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.websocket_subscriptions.load(Ordering::Relaxed), 1);

        metrics.record_ws_disconnect();
        metrics.record_ws_unsubscribe();

        assert_eq!(metrics.websocket_connections.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.websocket_subscriptions.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_json_export() {
        let metrics = Arc::new(RelayMetrics::new());
        metrics.record_publish_accepted(FanOut {
            delivered: 2,
            dropped: 0,
        });
        PublishTimer::new(Arc::clone(&metrics)).finish();

        let json = metrics.to_json();
        assert_eq!(json["publishes"]["total"], 1);
        assert_eq!(json["fan_out"]["delivered"], 2);
        assert_eq!(metrics.latency_samples.load(Ordering::Relaxed), 1);
    }
}
