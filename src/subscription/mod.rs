//! Subscriptions: live handles onto a view.
//!
//! Subscriptions form a tree. A derived subscription delegates `close` and
//! `done` to its parent, so closing always happens at the root and
//! termination flows down as each level's event stream ends.

use std::fmt;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheReader;
use crate::event::Event;
use crate::object::Object;
use crate::signal::Signal;

/// Filtering subscription worker.
pub mod filter;

pub use filter::FilterSubscription;

/// Unique identifier for a subscription, used in logs and registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live, filtered mirror of a set of objects.
///
/// The event stream is bounded. Events that do not fit are dropped, so
/// consumers that must never miss a change should reconcile periodically
/// against [`Subscription::cache`].
pub trait Subscription<T: Object>: Send + Sync {
    /// Read handle on the current view.
    fn cache(&self) -> CacheReader<T>;

    /// Fires once the view has completed its first sync.
    fn ready(&self) -> Signal;

    /// Stream of changes to the view. Ends when the subscription terminates.
    fn events(&self) -> Receiver<Event<T>>;

    /// Fires when the subscription is closed.
    fn done(&self) -> Signal;

    /// Release the subscription.
    fn close(&self);
}
