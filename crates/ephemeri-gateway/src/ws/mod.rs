//! WebSocket subscriber connections.
//!
//! One task per connection: handshake with deadline, registration in the
//! [`SubscriptionRegistry`](crate::registry::SubscriptionRegistry), then
//! outbound delivery until the socket closes.

pub mod handler;

pub use handler::{
    parse_subscribe_request, ConnectionConfig, ConnectionHandler, ConnectionState,
    HandshakeError, CLOSE_INVALID_INITIAL_MESSAGE, CLOSE_MESSAGE_FAILED, CLOSE_MESSAGE_TOO_LARGE,
    CLOSE_NO_INITIAL_MESSAGE, CLOSE_SUBSCRIBE_FAILED, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_MAX_MESSAGE_SIZE,
};
