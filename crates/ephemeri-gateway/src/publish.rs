//! Publish endpoint.
//!
//! A publish is validated in full before anything is delivered: either the
//! message reaches every current subscriber of its channel or nobody.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{
    current_timestamp_ms, ClientMessage, PublishRequest, PubsubMessage, RelayError, RelayResult,
    TokenCodec,
};
use crate::middleware::RelayMetrics;
use crate::registry::{FanOut, SubscriptionRegistry};

/// Decode a `POST /publish` body.
pub fn parse_publish_request(body: &[u8]) -> RelayResult<PublishRequest> {
    match serde_json::from_slice::<ClientMessage>(body)? {
        ClientMessage::PublishRequest(request) => Ok(request),
        ClientMessage::SubscribeRequest(_) => Err(RelayError::MalformedRequest(
            "expected publishRequest, got subscribeRequest".into(),
        )),
    }
}

/// Validates publish calls and hands accepted messages to the registry.
pub struct PublishEndpoint {
    registry: Arc<SubscriptionRegistry>,
    codec: Arc<TokenCodec>,
    metrics: Arc<RelayMetrics>,
}

impl PublishEndpoint {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        codec: Arc<TokenCodec>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            registry,
            codec,
            metrics,
        }
    }

    /// Handle a raw request body.
    pub fn handle_body(&self, body: &[u8]) -> RelayResult<FanOut> {
        let request = parse_publish_request(body).inspect_err(|_| {
            self.metrics.record_publish_malformed();
        })?;
        self.handle(&request)
    }

    /// Handle a decoded request against the current clock.
    pub fn handle(&self, request: &PublishRequest) -> RelayResult<FanOut> {
        self.handle_at(request, current_timestamp_ms())
    }

    /// Handle a decoded request as of `now_ms`, which is also the receipt
    /// timestamp stamped on the delivered message.
    pub fn handle_at(&self, request: &PublishRequest, now_ms: u64) -> RelayResult<FanOut> {
        let token = match self.codec.verify_publish_at(request, now_ms) {
            Ok(token) => token,
            Err(e) => {
                self.metrics.record_publish_rejected();
                return Err(e.into());
            }
        };

        let message = PubsubMessage {
            channel: token.channel,
            timestamp: now_ms,
            message_json: request.message_json.clone(),
        };

        let fan_out = match self.registry.publish(&message.channel, &message) {
            Ok(fan_out) => fan_out,
            Err(e) => {
                self.metrics.record_publish_rejected();
                warn!(channel = %message.channel, error = %e, "Failed to encode message");
                return Err(RelayError::Internal(e.to_string()));
            }
        };

        self.metrics.record_publish_accepted(fan_out);
        debug!(
            channel = %message.channel,
            delivered = fan_out.delivered,
            "Publish accepted"
        );
        Ok(fan_out)
    }
}
