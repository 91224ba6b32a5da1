//! One named channel and the subscribers currently listening to it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::SubscriptionId;

use super::subscription::{FanOut, Subscription};

/// Subscribers of one channel name.
///
/// Channels are created on first subscribe and kept after their last
/// subscriber leaves, so the channel map grows with the number of distinct
/// names ever seen.
#[derive(Debug)]
pub struct Channel {
    name: String,
    subscribers: HashMap<SubscriptionId, Arc<Subscription>>,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace the subscriber with this id.
    pub fn add(&mut self, subscription: Arc<Subscription>) {
        self.subscribers
            .insert(subscription.id().clone(), subscription);
    }

    /// Returns `false` if the id was not subscribed.
    pub fn remove(&mut self, id: &SubscriptionId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Hand an encoded frame to every subscriber.
    pub fn publish(&self, frame: &Arc<str>) -> FanOut {
        let mut fan_out = FanOut::default();
        for subscription in self.subscribers.values() {
            if subscription.deliver(Arc::clone(frame)) {
                fan_out.delivered += 1;
            } else {
                fan_out.dropped += 1;
            }
        }
        fan_out
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.subscribers.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn subscriber(id: &str) -> (Arc<Subscription>, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Subscription::new(SubscriptionId::from(id), vec!["news".into()], tx);
        (Arc::new(sub), rx)
    }

    #[test]
    fn test_add_and_remove() {
        let mut channel = Channel::new("news");
        let (sub, _rx) = subscriber("s1");
        channel.add(Arc::clone(&sub));
        assert_eq!(channel.len(), 1);
        assert!(channel.contains(sub.id()));

        assert!(channel.remove(sub.id()));
        assert!(!channel.remove(sub.id()));
        assert!(channel.is_empty());
        assert_eq!(channel.name(), "news");
    }

    #[test]
    fn test_publish_counts_closed_receivers_as_dropped() {
        let mut channel = Channel::new("news");
        let (open, mut open_rx) = subscriber("open");
        let (closed, closed_rx) = subscriber("closed");
        drop(closed_rx);
        channel.add(open);
        channel.add(closed);

        let frame: Arc<str> = Arc::from("hello");
        let fan_out = channel.publish(&frame);

        assert_eq!(fan_out.delivered, 1);
        assert_eq!(fan_out.dropped, 1);
        assert_eq!(open_rx.try_recv().unwrap().as_ref(), "hello");
    }
}
