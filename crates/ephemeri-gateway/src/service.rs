//! Relay service - main entry point.
//!
//! One HTTP listener carries everything:
//!
//! | Route          | Purpose                              |
//! |----------------|--------------------------------------|
//! | `GET /` (ws)   | Subscriber connection                |
//! | `POST /publish`| Publish a message to one channel     |
//! | `GET /health`  | Liveness                             |
//! | `GET /metrics` | Counters and registry sizes as JSON  |

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::info;

use crate::domain::config::RelayConfig;
use crate::domain::error::GatewayError;
use crate::domain::{ServerMessage, TokenCodec};
use crate::middleware::{create_cors_layer, PublishTimer, RelayMetrics, TracingLayer};
use crate::publish::PublishEndpoint;
use crate::registry::SubscriptionRegistry;
use crate::ws::{ConnectionConfig, ConnectionHandler};

/// Service name reported by `/health`
pub const SERVICE_NAME: &str = "ephemeri-relay";

/// Relay service state
pub struct RelayService {
    config: RelayConfig,
    registry: Arc<SubscriptionRegistry>,
    codec: Arc<TokenCodec>,
    metrics: Arc<RelayMetrics>,
}

impl RelayService {
    /// Create a new relay service
    pub fn new(config: RelayConfig) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let codec = Arc::new(config.token_codec());

        Ok(Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            codec,
            metrics: Arc::new(RelayMetrics::new()),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get the subscription registry
    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        let state = AppState {
            publisher: Arc::new(PublishEndpoint::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.codec),
                Arc::clone(&self.metrics),
            )),
            registry: Arc::clone(&self.registry),
            codec: Arc::clone(&self.codec),
            metrics: Arc::clone(&self.metrics),
            connection: ConnectionConfig {
                handshake_timeout: self.config.websocket.handshake_timeout,
                max_message_size: self.config.websocket.max_message_size,
            },
        };

        let middleware = ServiceBuilder::new()
            .layer(TracingLayer::new())
            .layer(create_cors_layer(&self.config.cors))
            .layer(DefaultBodyLimit::max(self.config.limits.max_request_size));

        Router::new()
            .route("/", get(handle_ws_upgrade))
            .route("/publish", post(handle_publish))
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_snapshot))
            .layer(middleware)
            .with_state(state)
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(addr = %addr, "Relay listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        info!("Relay stopped");
        Ok(())
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    publisher: Arc<PublishEndpoint>,
    registry: Arc<SubscriptionRegistry>,
    codec: Arc<TokenCodec>,
    metrics: Arc<RelayMetrics>,
    connection: ConnectionConfig,
}

/// Upgrade to a subscriber connection
async fn handle_ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let handler = ConnectionHandler::new(
        state.registry,
        state.codec,
        state.metrics,
        state.connection,
    );
    ws.on_upgrade(move |socket| handler.handle(socket))
}

/// Handle `POST /publish`
async fn handle_publish(State(state): State<AppState>, body: Bytes) -> Response {
    let timer = PublishTimer::new(Arc::clone(&state.metrics));
    let result = state.publisher.handle_body(&body);
    timer.finish();

    match result {
        Ok(_) => Json(ServerMessage::PublishResponse).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": crate::VERSION,
    }))
}

/// Metrics endpoint
async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let mut snapshot = state.metrics.to_json();
    snapshot["registry"] = serde_json::json!({
        "subscriptions": state.registry.subscription_count(),
        "channels": state.registry.channel_count(),
    });
    Json(snapshot)
}
