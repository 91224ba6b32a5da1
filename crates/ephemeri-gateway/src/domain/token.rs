//! Token codec: signed, time-bounded publish and subscribe tokens.
//!
//! A token is a JSON string built by the client. The signature proves the
//! client holds the shared secret; the token content binds the request to a
//! point in time and to either a channel list or one exact payload.
//!
//! ## Contract
//!
//! ```text
//! subscribeToken = JSON({ timestamp, channels })
//! publishToken   = JSON({ timestamp, channel, messageSize, messageSha1 })
//! tokenSignature = hex(sha1(token + secret))          (scheme "sha1")
//!                = hex(hmac_sha256(secret, token))    (scheme "hmac-sha256")
//! ```
//!
//! Verification order mirrors what deployed clients observe: signature first,
//! then token shape, then the content checks.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::error::AuthError;
use super::types::{
    PublishRequest, PublishTokenObject, SubscribeRequest, SubscribeTokenObject,
};

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew between token and server, in milliseconds.
pub const DEFAULT_MAX_SKEW_MS: u64 = 60_000;

/// Keyed digest used to sign tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// `sha1(payload + secret)`, what existing clients send.
    #[default]
    Sha1,
    /// HMAC-SHA-256 keyed with the secret.
    HmacSha256,
}

impl FromStr for SignatureScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "hmac-sha256" => Ok(Self::HmacSha256),
            other => Err(format!("unknown signature scheme: {other}")),
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => f.write_str("sha1"),
            Self::HmacSha256 => f.write_str("hmac-sha256"),
        }
    }
}

/// Signs and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    scheme: SignatureScheme,
    max_skew_ms: u64,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("max_skew_ms", &self.max_skew_ms)
            .finish()
    }
}

impl TokenCodec {
    pub fn new(secret: impl Into<String>, scheme: SignatureScheme) -> Self {
        Self {
            secret: secret.into(),
            scheme,
            max_skew_ms: DEFAULT_MAX_SKEW_MS,
        }
    }

    /// Override the accepted timestamp window.
    pub fn with_max_skew(mut self, max_skew_ms: u64) -> Self {
        self.max_skew_ms = max_skew_ms;
        self
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn max_skew_ms(&self) -> u64 {
        self.max_skew_ms
    }

    /// Hex signature of `payload`.
    pub fn sign(&self, payload: &str) -> String {
        match self.scheme {
            SignatureScheme::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(payload.as_bytes());
                hasher.update(self.secret.as_bytes());
                hex::encode(hasher.finalize())
            }
            SignatureScheme::HmacSha256 => {
                let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                    .expect("HMAC can take key of any size");
                mac.update(payload.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }

    /// Recompute the signature of `payload` and compare in constant time.
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        constant_time_compare(&self.sign(payload), signature)
    }

    /// Validate a publish request against the current clock.
    pub fn verify_publish(&self, req: &PublishRequest) -> Result<PublishTokenObject, AuthError> {
        self.verify_publish_at(req, current_timestamp_ms())
    }

    /// Validate a publish request as of `now_ms`.
    ///
    /// On success the decoded token is returned; its `channel` is where the
    /// message goes.
    pub fn verify_publish_at(
        &self,
        req: &PublishRequest,
        now_ms: u64,
    ) -> Result<PublishTokenObject, AuthError> {
        if !self.verify(&req.publish_token, &req.token_signature) {
            return Err(AuthError::InvalidSignature);
        }

        let token: PublishTokenObject = serde_json::from_str(&req.publish_token)
            .map_err(|e| AuthError::MalformedToken(e.to_string()))?;

        self.check_timestamp(token.timestamp, now_ms)?;

        let actual = message_size(&req.message_json);
        if token.message_size != actual {
            return Err(AuthError::MessageSizeMismatch {
                expected: token.message_size,
                actual,
            });
        }

        if !constant_time_compare(&content_digest(&req.message_json), &token.message_sha1) {
            return Err(AuthError::MessageDigestMismatch);
        }

        Ok(token)
    }

    /// Validate a subscribe request against the current clock.
    pub fn verify_subscribe(
        &self,
        req: &SubscribeRequest,
    ) -> Result<SubscribeTokenObject, AuthError> {
        self.verify_subscribe_at(req, current_timestamp_ms())
    }

    /// Validate a subscribe request as of `now_ms`.
    pub fn verify_subscribe_at(
        &self,
        req: &SubscribeRequest,
        now_ms: u64,
    ) -> Result<SubscribeTokenObject, AuthError> {
        if !self.verify(&req.subscribe_token, &req.token_signature) {
            return Err(AuthError::InvalidSignature);
        }

        let token: SubscribeTokenObject = serde_json::from_str(&req.subscribe_token)
            .map_err(|e| AuthError::MalformedToken(e.to_string()))?;

        // Same names in the same order.
        if token.channels != req.channels {
            return Err(AuthError::ChannelMismatch);
        }

        self.check_timestamp(token.timestamp, now_ms)?;

        Ok(token)
    }

    /// Build a signed publish request for `message_json` on `channel`.
    pub fn build_publish_request(
        &self,
        channel: &str,
        message_json: &str,
        now_ms: u64,
    ) -> serde_json::Result<PublishRequest> {
        let token = PublishTokenObject {
            timestamp: now_ms,
            channel: channel.to_string(),
            message_size: message_size(message_json),
            message_sha1: content_digest(message_json),
        };
        let publish_token = serde_json::to_string(&token)?;
        Ok(PublishRequest {
            token_signature: self.sign(&publish_token),
            publish_token,
            message_json: message_json.to_string(),
        })
    }

    /// Build a signed subscribe request for `channels`.
    pub fn build_subscribe_request(
        &self,
        channels: &[String],
        now_ms: u64,
    ) -> serde_json::Result<SubscribeRequest> {
        let token = SubscribeTokenObject {
            timestamp: now_ms,
            channels: channels.to_vec(),
        };
        let subscribe_token = serde_json::to_string(&token)?;
        Ok(SubscribeRequest {
            channels: channels.to_vec(),
            token_signature: self.sign(&subscribe_token),
            subscribe_token,
        })
    }

    fn check_timestamp(&self, timestamp: u64, now: u64) -> Result<(), AuthError> {
        if now.abs_diff(timestamp) > self.max_skew_ms {
            return Err(AuthError::TimestampOutOfRange { timestamp, now });
        }
        Ok(())
    }
}

/// SHA-1 hex digest of a payload, as carried in `messageSha1`.
pub fn content_digest(payload: &str) -> String {
    hex::encode(Sha1::digest(payload.as_bytes()))
}

/// Payload length as JavaScript clients measure it (UTF-16 code units).
pub fn message_size(payload: &str) -> u64 {
    payload.encode_utf16().count() as u64
}

/// Milliseconds since the Unix epoch. Returns 0 if the clock is before 1970.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Constant-time string comparison.
///
/// Both inputs are padded to the longer length with different fill bytes, so
/// unequal lengths never compare equal and the loop length does not leak
/// where the first mismatch is.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    let max_len = std::cmp::max(a.len(), b.len());
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const NOW: u64 = 1_700_000_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, SignatureScheme::Sha1)
    }

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sha1_signature_matches_contract() {
        // sha1("abc" + "test-secret")
        let expected = content_digest("abctest-secret");
        assert_eq!(codec().sign("abc"), expected);
        assert_eq!(expected.len(), 40);
    }

    #[test]
    fn test_known_sha1_digest() {
        assert_eq!(
            content_digest("abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_hmac_scheme_differs_and_verifies() {
        let hmac = TokenCodec::new(SECRET, SignatureScheme::HmacSha256);
        let sig = hmac.sign("payload");
        assert_eq!(sig.len(), 64);
        assert_ne!(sig, codec().sign("payload"));
        assert!(hmac.verify("payload", &sig));
        assert!(!codec().verify("payload", &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let other = TokenCodec::new("other", SignatureScheme::Sha1);
        let sig = other.sign("payload");
        assert!(!codec().verify("payload", &sig));
    }

    #[test]
    fn test_valid_publish_accepted() {
        let req = codec()
            .build_publish_request("news", r#"{"x":1}"#, NOW)
            .unwrap();
        let token = codec().verify_publish_at(&req, NOW + 1_000).unwrap();
        assert_eq!(token.channel, "news");
        assert_eq!(token.message_size, 7);
    }

    #[test]
    fn test_publish_bad_signature() {
        let mut req = codec().build_publish_request("news", "{}", NOW).unwrap();
        req.token_signature = "0".repeat(40);
        assert_eq!(
            codec().verify_publish_at(&req, NOW),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_publish_malformed_token_is_distinct() {
        let c = codec();
        let publish_token = r#"{"timestamp":1}"#.to_string();
        let req = PublishRequest {
            token_signature: c.sign(&publish_token),
            publish_token,
            message_json: "{}".into(),
        };
        assert!(matches!(
            c.verify_publish_at(&req, NOW),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_publish_wrong_size_rejected_with_valid_signature() {
        let c = codec();
        let token = PublishTokenObject {
            timestamp: NOW,
            channel: "news".into(),
            message_size: 99,
            message_sha1: content_digest("{}"),
        };
        let publish_token = serde_json::to_string(&token).unwrap();
        let req = PublishRequest {
            token_signature: c.sign(&publish_token),
            publish_token,
            message_json: "{}".into(),
        };
        assert_eq!(
            c.verify_publish_at(&req, NOW),
            Err(AuthError::MessageSizeMismatch {
                expected: 99,
                actual: 2
            })
        );
    }

    #[test]
    fn test_publish_wrong_digest_rejected_with_valid_signature() {
        let c = codec();
        let mut req = c.build_publish_request("news", "[1]", NOW).unwrap();
        // Same length, different content.
        req.message_json = "[2]".into();
        assert_eq!(
            c.verify_publish_at(&req, NOW),
            Err(AuthError::MessageDigestMismatch)
        );
    }

    #[test]
    fn test_timestamp_window_both_directions() {
        let c = codec();
        let req = c.build_publish_request("news", "{}", NOW).unwrap();

        assert!(c.verify_publish_at(&req, NOW + 60_000).is_ok());
        assert!(c.verify_publish_at(&req, NOW - 60_000).is_ok());
        assert!(matches!(
            c.verify_publish_at(&req, NOW + 60_001),
            Err(AuthError::TimestampOutOfRange { .. })
        ));
        assert!(matches!(
            c.verify_publish_at(&req, NOW - 60_001),
            Err(AuthError::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn test_custom_skew() {
        let c = codec().with_max_skew(1_000);
        let req = c.build_subscribe_request(&channels(&["a"]), NOW).unwrap();
        assert!(c.verify_subscribe_at(&req, NOW + 1_000).is_ok());
        assert!(c.verify_subscribe_at(&req, NOW + 1_001).is_err());
    }

    #[test]
    fn test_valid_subscribe_accepted() {
        let c = codec();
        let req = c
            .build_subscribe_request(&channels(&["a", "b"]), NOW)
            .unwrap();
        let token = c.verify_subscribe_at(&req, NOW).unwrap();
        assert_eq!(token.channels, channels(&["a", "b"]));
    }

    #[test]
    fn test_subscribe_channel_content_mismatch() {
        let c = codec();
        let mut req = c
            .build_subscribe_request(&channels(&["a", "b"]), NOW)
            .unwrap();
        req.channels = channels(&["a", "c"]);
        assert_eq!(
            c.verify_subscribe_at(&req, NOW),
            Err(AuthError::ChannelMismatch)
        );
    }

    #[test]
    fn test_subscribe_channel_order_mismatch() {
        let c = codec();
        let mut req = c
            .build_subscribe_request(&channels(&["a", "b"]), NOW)
            .unwrap();
        req.channels = channels(&["b", "a"]);
        assert_eq!(
            c.verify_subscribe_at(&req, NOW),
            Err(AuthError::ChannelMismatch)
        );
    }

    #[test]
    fn test_subscribe_stale_token() {
        let c = codec();
        let req = c.build_subscribe_request(&channels(&["a"]), NOW).unwrap();
        assert!(matches!(
            c.verify_subscribe_at(&req, NOW + 120_000),
            Err(AuthError::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn test_message_size_counts_utf16_units() {
        assert_eq!(message_size("abc"), 3);
        // U+00E9 is two UTF-8 bytes, one UTF-16 unit.
        assert_eq!(message_size("\u{e9}"), 1);
        // U+1F600 is a surrogate pair.
        assert_eq!(message_size("\u{1F600}"), 2);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(!constant_time_compare("", "a"));
    }

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("sha1".parse::<SignatureScheme>().unwrap(), SignatureScheme::Sha1);
        assert_eq!(
            "HMAC-SHA256".parse::<SignatureScheme>().unwrap(),
            SignatureScheme::HmacSha256
        );
        assert!("md5".parse::<SignatureScheme>().is_err());
        assert_eq!(SignatureScheme::HmacSha256.to_string(), "hmac-sha256");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains(SECRET));
    }
}
