//! Middleware stack for the relay.
//!
//! Layer order: Request → Tracing → CORS → Body limit → Handler

pub mod cors;
pub mod metrics;
pub mod tracing;

pub use cors::create_cors_layer;
pub use metrics::{PublishTimer, RelayMetrics};
pub use self::tracing::TracingLayer;
