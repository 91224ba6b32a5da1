//! Domain types for the relay.
//!
//! Wire messages, the token codec, configuration and error handling. Nothing
//! in here touches sockets or the registry.

pub mod config;
pub mod error;
pub mod ids;
pub mod token;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, CorsConfig, RelayConfig};
pub use error::{AuthError, GatewayError, RelayError, RelayResult};
pub use ids::SubscriptionId;
pub use token::{
    content_digest, current_timestamp_ms, message_size, SignatureScheme, TokenCodec,
};
pub use types::*;
