//! Subscriptions and the registry that indexes them by channel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{PubsubMessage, ServerMessage, SubscriptionId};

use super::channel::Channel;

/// Outbound half of a subscriber connection. Frames are JSON text.
pub type FrameSender = mpsc::UnboundedSender<Arc<str>>;

/// One live subscriber connection.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    channels: Vec<String>,
    sender: FrameSender,
}

impl Subscription {
    pub fn new(id: SubscriptionId, channels: Vec<String>, sender: FrameSender) -> Self {
        Self {
            id,
            channels,
            sender,
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Queue a frame for this subscriber. Returns `false` once the
    /// connection has gone away; the frame is then dropped.
    pub fn deliver(&self, frame: Arc<str>) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Subscribers the frame was queued for
    pub delivered: usize,
    /// Subscribers whose connection was already gone
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    subscriptions: HashMap<SubscriptionId, Arc<Subscription>>,
    channels: HashMap<String, Channel>,
}

impl RegistryInner {
    fn detach(&mut self, subscription: &Subscription) {
        for name in subscription.channels() {
            if let Some(channel) = self.channels.get_mut(name) {
                channel.remove(subscription.id());
            }
        }
    }
}

/// All active subscriptions plus the channel index derived from them.
///
/// Invariant: a subscription is listed under exactly the channels it
/// declared. Mutations take the write lock; fan-out takes the read lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription under each of its channels. A subscription
    /// with the same id is replaced.
    pub fn add(&self, subscription: Subscription) {
        let subscription = Arc::new(subscription);
        let mut inner = self.inner.write();

        if let Some(previous) = inner
            .subscriptions
            .insert(subscription.id().clone(), Arc::clone(&subscription))
        {
            inner.detach(&previous);
        }

        for name in subscription.channels() {
            inner
                .channels
                .entry(name.clone())
                .or_insert_with(|| Channel::new(name.clone()))
                .add(Arc::clone(&subscription));
        }

        debug!(
            subscription_id = %subscription.id(),
            channels = ?subscription.channels(),
            "Registered subscription"
        );
    }

    /// Unregister a subscription. Returns `false` if it was not registered.
    pub fn remove(&self, id: &SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        match inner.subscriptions.remove(id) {
            Some(subscription) => {
                inner.detach(&subscription);
                debug!(subscription_id = %id, "Removed subscription");
                true
            }
            None => false,
        }
    }

    /// Fan a message out to every subscriber of `channel`.
    ///
    /// The frame is encoded once and shared. Publishing to a channel nobody
    /// ever subscribed to is a no-op.
    pub fn publish(&self, channel: &str, message: &PubsubMessage) -> serde_json::Result<FanOut> {
        let inner = self.inner.read();
        let Some(target) = inner.channels.get(channel) else {
            debug!(channel = %channel, "Publish to unknown channel");
            return Ok(FanOut::default());
        };

        let frame: Arc<str> = serde_json::to_string(&ServerMessage::PubsubMessage {
            channel: channel.to_string(),
            message: message.clone(),
        })?
        .into();

        let fan_out = target.publish(&frame);
        debug!(
            channel = %channel,
            delivered = fan_out.delivered,
            dropped = fan_out.dropped,
            "Fanned out message"
        );
        Ok(fan_out)
    }

    /// Number of registered subscriptions
    pub fn subscription_count(&self) -> usize {
        self.inner.read().subscriptions.len()
    }

    /// Number of channels ever subscribed to
    pub fn channel_count(&self) -> usize {
        self.inner.read().channels.len()
    }

    /// Subscribers currently under `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .read()
            .channels
            .get(channel)
            .map(Channel::len)
            .unwrap_or(0)
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.inner.read().subscriptions.contains_key(id)
    }
}
