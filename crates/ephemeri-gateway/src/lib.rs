// Allow missing docs for internal items
#![allow(missing_docs)]

//! Ephemeri relay - real-time publish/subscribe over HTTP and WebSocket.
//!
//! Publishers `POST /publish` a signed message to one channel. Subscribers
//! open a WebSocket, declare their channels once in a signed subscribe
//! request, and then receive every message published to those channels for
//! as long as the socket stays open. Nothing is stored.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         EPHEMERI RELAY                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐                     ┌───────────────┐         │
//! │  │ POST /publish │                     │  GET / (ws)   │         │
//! │  └───────┬───────┘                     └───────┬───────┘         │
//! │          │                                     │                 │
//! │  ┌───────┴─────────────────────────────────────┴───────┐         │
//! │  │        Middleware: Tracing → CORS → Body limit       │         │
//! │  └───────┬─────────────────────────────────────┬───────┘         │
//! │          │                                     │                 │
//! │  ┌───────┴───────┐   ┌─────────────┐   ┌───────┴───────┐         │
//! │  │    Publish    │──►│ Token Codec │◄──│  Connection   │         │
//! │  │   Endpoint    │   └─────────────┘   │   Handler     │         │
//! │  └───────┬───────┘                     └───────┬───────┘         │
//! │          │ publish                     add/remove                │
//! │  ┌───────┴─────────────────────────────────────┴───────┐         │
//! │  │               Subscription Registry                  │         │
//! │  │        channel name → Channel → subscribers          │         │
//! │  └──────────────────────────┬──────────────────────────┘         │
//! └─────────────────────────────┼────────────────────────────────────┘
//!                               ▼
//!                  per-connection mpsc sender
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ephemeri_gateway::{RelayConfig, RelayService};
//!
//! let config = RelayConfig::from_env()?;
//! let service = RelayService::new(config)?;
//! service.start(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```
//!
//! # Security
//!
//! - Every publish and subscribe carries a token signed with the shared
//!   secret, bound to a timestamp and to its content
//! - Tokens older or newer than the skew window (60s) are rejected
//! - Signatures are compared in constant time
//! - Subscribers get 2s to authenticate before the socket is closed

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod middleware;
pub mod publish;
pub mod registry;
pub mod service;
pub mod ws;

// Re-exports for public API
pub use domain::config::{ConfigError, RelayConfig};
pub use domain::error::{AuthError, GatewayError, RelayError, RelayResult};
pub use domain::token::{SignatureScheme, TokenCodec};
pub use domain::types::*;
pub use domain::SubscriptionId;
pub use middleware::RelayMetrics;
pub use publish::PublishEndpoint;
pub use registry::{FanOut, Subscription, SubscriptionRegistry};
pub use service::RelayService;
pub use ws::ConnectionHandler;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
