//! Controllers: shareable views that hand out subscriptions.
//!
//! A controller publishes one view to many subscribers and can spawn new,
//! independently filtered views of itself without going back to the
//! transport.

use std::sync::Arc;

use crate::cache::CacheReader;
use crate::config::ViewConfig;
use crate::error::ViewResult;
use crate::filter::Filter;
use crate::object::Object;
use crate::signal::Signal;
use crate::subscription::{FilterSubscription, Subscription, SubscriptionId};

/// Subscriber fan-out worker.
pub mod publisher;

pub use publisher::{Publisher, PublisherSubscription};

/// A view that can be subscribed to and cloned with a new filter.
pub trait Controller<T: Object>: Send + Sync {
    /// Read handle on the current view.
    fn cache(&self) -> CacheReader<T>;

    /// Fires once the view has completed its first sync.
    fn ready(&self) -> Signal;

    /// Fires when the view is closed.
    fn done(&self) -> Signal;

    /// Close the view and everything derived from it.
    fn close(&self);

    /// Configuration new subscriptions and derived views inherit.
    fn config(&self) -> &ViewConfig;

    /// New event stream over this view.
    ///
    /// # Errors
    /// Fails if the view is closed or its worker is gone.
    fn subscribe(&self) -> ViewResult<Arc<dyn Subscription<T>>>;

    /// New view over this one with an independent filter.
    ///
    /// # Errors
    /// Fails if subscribing fails or a worker cannot be started.
    fn clone_with_filter(&self, filter: Filter<T>) -> ViewResult<FilterController<T>> {
        let parent = self.subscribe()?;
        FilterController::new(parent, filter, self.config())
    }
}

/// A controller whose filter can be replaced while live.
pub struct FilterController<T: Object> {
    subscription: Arc<FilterSubscription<T>>,
    publisher: Arc<Publisher<T>>,
}

impl<T: Object> Clone for FilterController<T> {
    fn clone(&self) -> Self {
        Self {
            subscription: Arc::clone(&self.subscription),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<T: Object> FilterController<T> {
    /// Filter `parent` and publish the result.
    ///
    /// `parent` is closed if the view cannot be started.
    ///
    /// # Errors
    /// Returns `Spawn` if a worker thread cannot be started.
    pub fn new(parent: Arc<dyn Subscription<T>>, filter: Filter<T>, cfg: &ViewConfig) -> ViewResult<Self> {
        let subscription = match FilterSubscription::new(Arc::clone(&parent), filter, cfg) {
            Ok(sub) => Arc::new(sub),
            Err(err) => {
                parent.close();
                return Err(err);
            }
        };

        let source: Arc<dyn Subscription<T>> = subscription.clone();
        let publisher = match Publisher::new(source, cfg) {
            Ok(publisher) => Arc::new(publisher),
            Err(err) => {
                subscription.close();
                return Err(err);
            }
        };

        Ok(Self {
            subscription,
            publisher,
        })
    }

    /// Replace the view's filter. See [`FilterSubscription::refilter`].
    pub fn refilter(&self, filter: Filter<T>) {
        self.subscription.refilter(filter);
    }

    /// Identifier of the underlying filter subscription.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Number of live subscribers to this view.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    /// Events dropped by this view, both when filtering and when fanning
    /// out to subscribers.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.subscription.dropped_events() + self.publisher.dropped_events()
    }

    /// Fires when the filtering worker has exited.
    #[must_use]
    pub fn stopped(&self) -> Signal {
        self.subscription.stopped()
    }
}

impl<T: Object> Controller<T> for FilterController<T> {
    fn cache(&self) -> CacheReader<T> {
        self.publisher.cache()
    }

    fn ready(&self) -> Signal {
        self.publisher.ready()
    }

    fn done(&self) -> Signal {
        self.publisher.done()
    }

    fn close(&self) {
        self.publisher.close();
    }

    fn config(&self) -> &ViewConfig {
        self.publisher.config()
    }

    fn subscribe(&self) -> ViewResult<Arc<dyn Subscription<T>>> {
        self.publisher.subscribe()
    }
}
