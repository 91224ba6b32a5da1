//! Wire types for the publish endpoint and the subscription socket.
//!
//! Every message carries a `type` discriminator in camelCase, e.g.
//! `{"type":"subscribeRequest", ...}`. Field names are camelCase as well.

use serde::{Deserialize, Serialize};

/// Messages a client sends, either as the `POST /publish` body or as the
/// first frame on the subscription socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    SubscribeRequest(SubscribeRequest),
    PublishRequest(PublishRequest),
}

/// Handshake request: the channel list plus a token signed over that list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub channels: Vec<String>,
    pub subscribe_token: String,
    pub token_signature: String,
}

/// Publish call. `message_json` is already serialized by the publisher and
/// is relayed untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub publish_token: String,
    pub token_signature: String,
    pub message_json: String,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Handshake accepted.
    SubscribeResponse,
    /// Publish accepted and fanned out.
    PublishResponse,
    /// One published message delivered to a subscriber.
    PubsubMessage {
        channel: String,
        message: PubsubMessage,
    },
}

/// A published message as it travels from the publish endpoint to every
/// subscriber of its channel. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "message", rename_all = "camelCase")]
pub struct PubsubMessage {
    pub channel: String,
    /// Server receipt time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub message_json: String,
}

/// Signed content of a publish token.
///
/// Field order matters: it is the order clients serialize in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishTokenObject {
    pub timestamp: u64,
    pub channel: String,
    pub message_size: u64,
    pub message_sha1: String,
}

/// Signed content of a subscribe token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeTokenObject {
    pub timestamp: u64,
    pub channels: Vec<String>,
}
