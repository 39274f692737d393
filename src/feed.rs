//! Transport-facing root of a subscription tree.
//!
//! The watch/list transport owns a [`Feed`] and pushes the authoritative
//! list and change stream into it. The paired [`FeedSubscription`] is the
//! root view every controller and derived subscription is built on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::cache::{Cache, CacheReader};
use crate::config::ViewConfig;
use crate::error::{ViewError, ViewResult};
use crate::event::Event;
use crate::filter::Filter;
use crate::object::Object;
use crate::signal::{signal, Signal, Trigger};
use crate::subscription::filter::distribute;
use crate::subscription::{Subscription, SubscriptionId};

#[derive(Debug)]
struct Shared<T> {
    id: SubscriptionId,
    out_tx: Mutex<Option<Sender<Event<T>>>>,
    ready: Trigger,
    done: Trigger,
    done_signal: Signal,
    dropped_events: AtomicU64,
}

impl<T> Shared<T> {
    fn close(&self) {
        if self.done_signal.is_fired() {
            return;
        }
        self.done.fire();
        match self.out_tx.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        tracing::debug!(subscription = %self.id, "feed closed");
    }
}

/// Writer side of a root view, owned by the transport.
///
/// Dropping the feed closes it.
pub struct Feed<T: Object> {
    cache: Cache<T>,
    shared: Arc<Shared<T>>,
    synced: bool,
}

impl<T: Object> Feed<T> {
    /// Create a feed and its root subscription.
    #[must_use]
    pub fn new(cfg: &ViewConfig) -> (Self, Arc<FeedSubscription<T>>) {
        let cache = Cache::new(Filter::all());
        let (out_tx, out_rx) = bounded::<Event<T>>(cfg.capacity());
        let (ready, ready_signal) = signal();
        let (done, done_signal) = signal();

        let shared = Arc::new(Shared {
            id: SubscriptionId::new(),
            out_tx: Mutex::new(Some(out_tx)),
            ready,
            done,
            done_signal: done_signal.clone(),
            dropped_events: AtomicU64::new(0),
        });

        let sub = Arc::new(FeedSubscription {
            shared: Arc::clone(&shared),
            cache: cache.reader(),
            events: out_rx,
            ready: ready_signal,
            done: done_signal,
        });

        (
            Self {
                cache,
                shared,
                synced: false,
            },
            sub,
        )
    }

    /// Load the initial authoritative list and mark the view ready.
    ///
    /// Only the first call has an effect.
    ///
    /// # Errors
    /// Returns `Closed` if the feed has been closed.
    pub fn sync(&mut self, list: Vec<T>) -> ViewResult<()> {
        self.ensure_open()?;
        if self.synced {
            tracing::warn!(subscription = %self.shared.id, "feed already synced; ignoring list");
            return Ok(());
        }
        self.cache.sync(list);
        self.synced = true;
        self.shared.ready.fire();
        tracing::debug!(subscription = %self.shared.id, objects = self.cache.known_len(), "feed synced");
        Ok(())
    }

    /// Apply one authoritative change and publish its effect.
    ///
    /// # Errors
    /// Returns `Closed` if the feed has been closed.
    pub fn apply(&mut self, evt: Event<T>) -> ViewResult<()> {
        self.ensure_open()?;
        tracing::trace!(
            subscription = %self.shared.id,
            kind = ?evt.event_type(),
            key = %evt.key(),
            version = evt.object().resource_version().unwrap_or("-"),
            "feed event"
        );
        let events = self.cache.update(evt);
        let guard = self
            .shared
            .out_tx
            .lock()
            .map_err(|_| ViewError::internal("poisoned lock: feed sender"))?;
        if let Some(tx) = guard.as_ref() {
            distribute(self.shared.id, tx, &self.shared.dropped_events, events);
        }
        Ok(())
    }

    /// Close the feed: fires done and ends the event stream.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Events dropped because the root queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> ViewResult<()> {
        if self.shared.done_signal.is_fired() {
            return Err(ViewError::closed("feed"));
        }
        Ok(())
    }
}

impl<T: Object> Drop for Feed<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Root subscription backed by a [`Feed`].
pub struct FeedSubscription<T: Object> {
    shared: Arc<Shared<T>>,
    cache: CacheReader<T>,
    events: Receiver<Event<T>>,
    ready: Signal,
    done: Signal,
}

impl<T: Object> FeedSubscription<T> {
    /// Identifier used in logs.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }
}

impl<T: Object> Subscription<T> for FeedSubscription<T> {
    fn cache(&self) -> CacheReader<T> {
        self.cache.clone()
    }

    fn ready(&self) -> Signal {
        self.ready.clone()
    }

    fn events(&self) -> Receiver<Event<T>> {
        self.events.clone()
    }

    fn done(&self) -> Signal {
        self.done.clone()
    }

    fn close(&self) {
        self.shared.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKey;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Node(&'static str, u32);

    impl Object for Node {
        fn key(&self) -> ObjectKey {
            ObjectKey::cluster(self.0)
        }
    }

    #[test]
    fn sync_fires_ready_once() {
        let (mut feed, sub) = Feed::new(&ViewConfig::default());
        assert!(!sub.ready().is_fired());

        feed.sync(vec![Node("a", 1)]).unwrap();
        assert!(sub.ready().is_fired());

        feed.sync(vec![Node("b", 1)]).unwrap();
        assert_eq!(sub.cache().list().unwrap(), vec![Node("a", 1)]);
    }

    #[test]
    fn apply_publishes_effective_events() {
        let (mut feed, sub) = Feed::new(&ViewConfig::default());
        feed.sync(vec![Node("a", 1)]).unwrap();

        // A create for a known object is reported as an update.
        feed.apply(Event::Create(Node("a", 2))).unwrap();
        feed.apply(Event::Delete(Node("missing", 0))).unwrap();
        feed.apply(Event::Delete(Node("a", 2))).unwrap();

        let events = sub.events();
        assert_eq!(events.try_recv().unwrap(), Event::Update(Node("a", 2)));
        assert_eq!(events.try_recv().unwrap(), Event::Delete(Node("a", 2)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops() {
        let cfg = ViewConfig {
            event_capacity: 1,
            ..ViewConfig::default()
        };
        let (mut feed, _sub) = Feed::new(&cfg);
        feed.sync(Vec::new()).unwrap();
        feed.apply(Event::Create(Node("a", 1))).unwrap();
        feed.apply(Event::Create(Node("b", 1))).unwrap();
        assert_eq!(feed.dropped_events(), 1);
    }

    #[test]
    fn close_from_subscription_ends_stream() {
        let (mut feed, sub) = Feed::new(&ViewConfig::default());
        sub.close();
        assert!(sub.done().wait_timeout(Duration::from_secs(1)));
        assert!(sub.events().recv_timeout(Duration::from_millis(50)).is_err());
        assert!(feed.apply(Event::Create(Node("a", 1))).unwrap_err().is_closed());
        assert!(feed.sync(Vec::new()).is_err());
    }

    #[test]
    fn dropping_feed_closes() {
        let (feed, sub) = Feed::<Node>::new(&ViewConfig::default());
        drop(feed);
        assert!(sub.done().is_fired());
    }
}
