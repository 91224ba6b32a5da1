//! Subscriber connection lifecycle.
//!
//! ```text
//! AwaitingFirstMessage ──subscribe ok──► Subscribed ──close/error──► Closed
//!          │                                                           ▲
//!          └──timeout / invalid / rejected ────────────────────────────┘
//! ```
//!
//! The first frame must be a valid subscribe request, received before the
//! handshake deadline. After that the connection only carries outbound
//! `pubsubMessage` frames; inbound frames are accepted and ignored. Every
//! protocol violation closes the socket with 1008 and a short reason.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{
    AuthError, ClientMessage, ServerMessage, SubscribeRequest, SubscriptionId, TokenCodec,
};
use crate::middleware::RelayMetrics;
use crate::registry::{Subscription, SubscriptionRegistry};

/// Default time allowed for the subscribe request (2s)
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default maximum message size (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

pub const CLOSE_NO_INITIAL_MESSAGE: &str = "No initial message received";
pub const CLOSE_INVALID_INITIAL_MESSAGE: &str = "Invalid initial message";
pub const CLOSE_SUBSCRIBE_FAILED: &str = "Failed to handle subscribe";
pub const CLOSE_MESSAGE_FAILED: &str = "Failed to handle message";
pub const CLOSE_MESSAGE_TOO_LARGE: &str = "Message too large";

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Per-connection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub handshake_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingFirstMessage,
    Subscribed,
    Closed,
}

/// Why a connection never reached `Subscribed`
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("no initial message within {0:?}")]
    Timeout(Duration),

    #[error("invalid initial message: {0}")]
    InvalidMessage(String),

    #[error("message too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("subscribe rejected: {0}")]
    Rejected(#[from] AuthError),

    #[error("connection closed before subscribing")]
    Disconnected,
}

impl HandshakeError {
    /// Reason sent in the 1008 close frame, `None` if the peer is gone.
    pub fn close_reason(&self) -> Option<&'static str> {
        match self {
            HandshakeError::Timeout(_) => Some(CLOSE_NO_INITIAL_MESSAGE),
            HandshakeError::InvalidMessage(_) => Some(CLOSE_INVALID_INITIAL_MESSAGE),
            HandshakeError::TooLarge { .. } => Some(CLOSE_MESSAGE_TOO_LARGE),
            HandshakeError::Rejected(_) => Some(CLOSE_SUBSCRIBE_FAILED),
            HandshakeError::Disconnected => None,
        }
    }
}

/// Decode the first frame of a connection.
pub fn parse_subscribe_request(text: &str) -> Result<SubscribeRequest, HandshakeError> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::SubscribeRequest(request)) => Ok(request),
        Ok(ClientMessage::PublishRequest(_)) => Err(HandshakeError::InvalidMessage(
            "expected subscribeRequest, got publishRequest".into(),
        )),
        Err(e) => Err(HandshakeError::InvalidMessage(e.to_string())),
    }
}

/// Inbound frame after the handshake. Content is reserved and ignored, but
/// it must still be JSON.
fn check_inbound(text: &str) -> Result<(), &'static str> {
    serde_json::from_str::<serde::de::IgnoredAny>(text)
        .map(|_| ())
        .map_err(|_| CLOSE_MESSAGE_FAILED)
}

/// Unregisters the subscription and updates gauges however the connection
/// task ends, including cancellation.
struct ConnectionGuard {
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<RelayMetrics>,
    subscription_id: SubscriptionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.registry.remove(&self.subscription_id) {
            self.metrics.record_ws_unsubscribe();
        }
        self.metrics.record_ws_disconnect();
    }
}

/// Subscriber connection handler
pub struct ConnectionHandler {
    registry: Arc<SubscriptionRegistry>,
    codec: Arc<TokenCodec>,
    metrics: Arc<RelayMetrics>,
    config: ConnectionConfig,
    subscription_id: SubscriptionId,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        codec: Arc<TokenCodec>,
        metrics: Arc<RelayMetrics>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            registry,
            codec,
            metrics,
            config,
            subscription_id: SubscriptionId::generate(),
            state: ConnectionState::AwaitingFirstMessage,
        }
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        &self.subscription_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(
            subscription_id = %self.subscription_id,
            from = ?self.state,
            to = ?next,
            "Connection state change"
        );
        self.state = next;
    }

    /// Drive one connection until it closes.
    pub async fn handle(mut self, socket: WebSocket) {
        self.metrics.record_ws_connect();
        let _guard = ConnectionGuard {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            subscription_id: self.subscription_id.clone(),
        };

        info!(
            subscription_id = %self.subscription_id,
            "New subscriber connection"
        );

        let (mut sink, mut stream) = socket.split();

        let request = match self.read_subscribe_request(&mut stream).await {
            Ok(request) => request,
            Err(e) => {
                self.fail_handshake(&mut sink, e).await;
                return;
            }
        };

        let mut outbound = match self.subscribe(&mut sink, request).await {
            Ok(rx) => rx,
            Err(e) => {
                self.fail_handshake(&mut sink, e).await;
                return;
            }
        };

        self.run_subscribed(&mut sink, &mut stream, &mut outbound)
            .await;

        self.transition(ConnectionState::Closed);
        info!(
            subscription_id = %self.subscription_id,
            "Subscriber connection closed"
        );
    }

    /// Wait for the first data frame. Control frames do not count and do not
    /// move the deadline.
    async fn read_subscribe_request(
        &self,
        stream: &mut WsStream,
    ) -> Result<SubscribeRequest, HandshakeError> {
        let deadline = tokio::time::Instant::now() + self.config.handshake_timeout;

        loop {
            let next = tokio::time::timeout_at(deadline, stream.next())
                .await
                .map_err(|_| HandshakeError::Timeout(self.config.handshake_timeout))?;

            match next {
                Some(Ok(Message::Text(text))) => {
                    self.check_size(text.len())?;
                    return parse_subscribe_request(&text);
                }
                Some(Ok(Message::Binary(data))) => {
                    self.check_size(data.len())?;
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| HandshakeError::InvalidMessage(e.to_string()))?;
                    return parse_subscribe_request(text);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(HandshakeError::Disconnected),
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket error during handshake");
                    return Err(HandshakeError::Disconnected);
                }
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<(), HandshakeError> {
        if size > self.config.max_message_size {
            return Err(HandshakeError::TooLarge {
                size,
                max: self.config.max_message_size,
            });
        }
        Ok(())
    }

    /// Validate the request, acknowledge it and register the subscription.
    async fn subscribe(
        &mut self,
        sink: &mut WsSink,
        request: SubscribeRequest,
    ) -> Result<mpsc::UnboundedReceiver<Arc<str>>, HandshakeError> {
        self.codec.verify_subscribe(&request)?;

        let ack = serde_json::to_string(&ServerMessage::SubscribeResponse)
            .map_err(|e| HandshakeError::InvalidMessage(e.to_string()))?;
        if sink.send(Message::Text(ack)).await.is_err() {
            return Err(HandshakeError::Disconnected);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let channels = request.channels;
        info!(
            subscription_id = %self.subscription_id,
            channels = ?channels,
            "Subscriber registered"
        );
        self.registry.add(Subscription::new(
            self.subscription_id.clone(),
            channels,
            tx,
        ));
        self.metrics.record_ws_subscribe();
        self.transition(ConnectionState::Subscribed);

        Ok(rx)
    }

    async fn fail_handshake(&mut self, sink: &mut WsSink, error: HandshakeError) {
        match &error {
            HandshakeError::Timeout(_) => {
                self.metrics.record_handshake_timeout();
                info!(
                    subscription_id = %self.subscription_id,
                    "Connection closed due to no initial message"
                );
            }
            HandshakeError::Disconnected => {
                debug!(
                    subscription_id = %self.subscription_id,
                    "Connection closed before subscribing"
                );
            }
            _ => {
                self.metrics.record_handshake_failure();
                warn!(
                    subscription_id = %self.subscription_id,
                    reason = %error,
                    "Rejected subscriber handshake"
                );
            }
        }

        if let Some(reason) = error.close_reason() {
            close_with_policy_violation(sink, reason).await;
        }
        self.transition(ConnectionState::Closed);
    }

    async fn run_subscribed(
        &self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        outbound: &mut mpsc::UnboundedReceiver<Arc<str>>,
    ) {
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                        // Peer is gone; the message is dropped.
                        debug!(
                            subscription_id = %self.subscription_id,
                            error = %e,
                            "Failed to deliver message"
                        );
                        break;
                    }
                }
                inbound = stream.next() => {
                    let verdict = match inbound {
                        Some(Ok(Message::Text(text))) => self.handle_inbound(text.as_bytes()),
                        Some(Ok(Message::Binary(data))) => self.handle_inbound(&data),
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(()),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            debug!(
                                subscription_id = %self.subscription_id,
                                error = %e,
                                "WebSocket error"
                            );
                            break;
                        }
                    };
                    if let Err(reason) = verdict {
                        warn!(
                            subscription_id = %self.subscription_id,
                            reason = reason,
                            "Closing subscriber after bad message"
                        );
                        close_with_policy_violation(sink, reason).await;
                        break;
                    }
                }
            }
        }
    }

    fn handle_inbound(&self, data: &[u8]) -> Result<(), &'static str> {
        if data.len() > self.config.max_message_size {
            return Err(CLOSE_MESSAGE_TOO_LARGE);
        }
        let text = std::str::from_utf8(data).map_err(|_| CLOSE_MESSAGE_FAILED)?;
        check_inbound(text)?;
        debug!(
            subscription_id = %self.subscription_id,
            "Ignoring message from subscriber"
        );
        Ok(())
    }
}

async fn close_with_policy_violation(sink: &mut WsSink, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_subscribe() {
        let text = r#"{"type":"subscribeRequest","channels":["a"],"subscribeToken":"t","tokenSignature":"s"}"#;
        let request = parse_subscribe_request(text).unwrap();
        assert_eq!(request.channels, vec!["a"]);
        assert_eq!(request.subscribe_token, "t");
    }

    #[test]
    fn test_parse_rejects_publish_as_first_message() {
        let text = r#"{"type":"publishRequest","publishToken":"t","tokenSignature":"s","messageJson":"{}"}"#;
        let err = parse_subscribe_request(text).unwrap_err();
        assert_eq!(err.close_reason(), Some(CLOSE_INVALID_INITIAL_MESSAGE));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_subscribe_request("not json"),
            Err(HandshakeError::InvalidMessage(_))
        ));
        assert!(matches!(
            parse_subscribe_request(r#"{"type":"subscribeRequest","channels":["a"]}"#),
            Err(HandshakeError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_close_reasons() {
        assert_eq!(
            HandshakeError::Timeout(DEFAULT_HANDSHAKE_TIMEOUT).close_reason(),
            Some(CLOSE_NO_INITIAL_MESSAGE)
        );
        assert_eq!(
            HandshakeError::from(AuthError::ChannelMismatch).close_reason(),
            Some(CLOSE_SUBSCRIBE_FAILED)
        );
        assert_eq!(
            HandshakeError::TooLarge { size: 2, max: 1 }.close_reason(),
            Some(CLOSE_MESSAGE_TOO_LARGE)
        );
        assert_eq!(HandshakeError::Disconnected.close_reason(), None);
    }

    #[test]
    fn test_inbound_after_subscribe() {
        assert!(check_inbound(r#"{"type":"anything"}"#).is_ok());
        assert!(check_inbound("[1,2]").is_ok());
        assert_eq!(check_inbound("{oops"), Err(CLOSE_MESSAGE_FAILED));
    }

    #[test]
    fn test_new_handler_state() {
        let handler = ConnectionHandler::new(
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(TokenCodec::new("k", Default::default())),
            Arc::new(RelayMetrics::new()),
            ConnectionConfig::default(),
        );
        assert_eq!(handler.state(), ConnectionState::AwaitingFirstMessage);
        assert_eq!(handler.subscription_id().as_str().len(), 16);
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let id = SubscriptionId::from("guarded");
        let (tx, _rx) = mpsc::unbounded_channel();

        metrics.record_ws_connect();
        registry.add(Subscription::new(id.clone(), vec!["a".into()], tx));
        metrics.record_ws_subscribe();

        drop(ConnectionGuard {
            registry: Arc::clone(&registry),
            metrics: Arc::clone(&metrics),
            subscription_id: id.clone(),
        });

        assert!(!registry.contains(&id));
        let snapshot = metrics.to_json();
        assert_eq!(snapshot["websocket"]["connections"], 0);
        assert_eq!(snapshot["websocket"]["subscriptions"], 0);
    }
}
