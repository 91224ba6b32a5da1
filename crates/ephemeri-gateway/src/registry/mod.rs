//! Subscription registry and per-channel fan-out.
//!
//! ```text
//! publish("a", msg) ──► SubscriptionRegistry ──► Channel "a" ──► sender(S1)
//!                                                            └─► sender(S2)
//! ```
//!
//! The registry owns every live [`Subscription`] and a channel index derived
//! from their channel lists. Both maps sit behind one lock, so adding or
//! removing a subscription's whole channel list is atomic with respect to
//! publishes.

pub mod channel;
pub mod subscription;

pub use channel::Channel;
pub use subscription::{FanOut, Subscription, SubscriptionRegistry};
