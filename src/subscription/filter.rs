//! Filtering subscription worker.
//!
//! A [`FilterSubscription`] re-derives its own view from a parent
//! subscription. One dedicated thread owns the view's cache and waits on
//! three mailboxes: the parent's ready signal (consumed once), refilter
//! requests, and the parent's event stream. Outbound events go to a
//! bounded queue with `try_send` and are dropped when the consumer lags.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, never, select, Receiver, Sender, TrySendError};

use crate::cache::{Cache, CacheReader};
use crate::config::ViewConfig;
use crate::error::{ViewError, ViewResult};
use crate::event::Event;
use crate::filter::Filter;
use crate::object::Object;
use crate::signal::{signal, Signal, Trigger};

use super::{Subscription, SubscriptionId};

/// A subscription whose view is a filtered copy of its parent's, with a
/// filter that can be replaced while live.
pub struct FilterSubscription<T: Object> {
    id: SubscriptionId,
    parent: Arc<dyn Subscription<T>>,
    refilter_tx: Sender<Filter<T>>,
    events: Receiver<Event<T>>,
    cache: CacheReader<T>,
    ready: Signal,
    // Held so an unsynced subscription never reports ready when its worker exits.
    _ready_trigger: Arc<Trigger>,
    stopped: Signal,
    dropped_events: Arc<AtomicU64>,
}

impl<T: Object> FilterSubscription<T> {
    /// Start a filtered subscription over `parent`.
    ///
    /// # Errors
    /// Returns `Spawn` if the worker thread cannot be started.
    pub fn new(parent: Arc<dyn Subscription<T>>, filter: Filter<T>, cfg: &ViewConfig) -> ViewResult<Self> {
        let id = SubscriptionId::new();
        let cache = Cache::new(filter);
        let reader = cache.reader();

        let (refilter_tx, refilter_rx) = bounded::<Filter<T>>(0);
        let (out_tx, out_rx) = bounded::<Event<T>>(cfg.capacity());
        let (ready_trigger, ready) = signal();
        let ready_trigger = Arc::new(ready_trigger);
        let (stop_trigger, stopped) = signal();
        let dropped_events = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            id,
            parent: Arc::clone(&parent),
            cache,
            refilter_rx,
            out_tx,
            ready: Arc::clone(&ready_trigger),
            dropped_events: Arc::clone(&dropped_events),
            _stop: stop_trigger,
        };

        let name = cfg.thread_name("filter");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run())
            .map_err(|source| ViewError::Spawn { name, source })?;

        Ok(Self {
            id,
            parent,
            refilter_tx,
            events: out_rx,
            cache: reader,
            ready,
            _ready_trigger: ready_trigger,
            stopped,
            dropped_events,
        })
    }

    /// Identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Replace the active filter.
    ///
    /// Blocks until the worker accepts the request or the subscription is
    /// done. Requests made after `done` has fired are ignored.
    pub fn refilter(&self, filter: Filter<T>) {
        let done = self.done();
        if done.is_fired() {
            tracing::debug!(subscription = %self.id, filter = %filter, "refilter ignored: subscription done");
            return;
        }

        select! {
            send(self.refilter_tx, filter) -> res => {
                if res.is_err() {
                    tracing::debug!(subscription = %self.id, "refilter ignored: worker stopped");
                }
            }
            recv(done.receiver()) -> _ => {
                tracing::debug!(subscription = %self.id, "refilter ignored: subscription done");
            }
        }
    }

    /// Events dropped because the outbound queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Fires when the worker thread has exited.
    #[must_use]
    pub fn stopped(&self) -> Signal {
        self.stopped.clone()
    }
}

impl<T: Object> Subscription<T> for FilterSubscription<T> {
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
        self.parent.done()
    }

    fn close(&self) {
        self.parent.close();
    }
}

struct Worker<T: Object> {
    id: SubscriptionId,
    parent: Arc<dyn Subscription<T>>,
    cache: Cache<T>,
    refilter_rx: Receiver<Filter<T>>,
    out_tx: Sender<Event<T>>,
    ready: Arc<Trigger>,
    dropped_events: Arc<AtomicU64>,
    _stop: Trigger,
}

impl<T: Object> Worker<T> {
    fn run(self) {
        let Self {
            id,
            parent,
            mut cache,
            refilter_rx,
            out_tx,
            ready,
            dropped_events,
            _stop,
        } = self;

        tracing::trace!(subscription = %id, filter = %cache.filter(), "filter subscription started");

        let parent_ready = parent.ready();
        let parent_events = parent.events();
        let no_ready = never::<()>();
        let no_refilter = never::<Filter<T>>();

        let mut ready_pending = true;
        let mut refilter_open = true;

        loop {
            let ready_rx = if ready_pending { parent_ready.receiver() } else { &no_ready };
            let filter_rx = if refilter_open { &refilter_rx } else { &no_refilter };

            select! {
                recv(ready_rx) -> _ => {
                    ready_pending = false;
                    match parent.cache().list() {
                        Ok(list) => {
                            cache.sync(list);
                            ready.fire();
                            tracing::debug!(subscription = %id, members = cache.reader().len().unwrap_or(0), "filter subscription ready");
                        }
                        Err(err) => {
                            tracing::error!(subscription = %id, error = %err, "parent cache list failed; closing parent");
                            parent.close();
                        }
                    }
                }
                recv(filter_rx) -> msg => {
                    let Ok(filter) = msg else {
                        refilter_open = false;
                        continue;
                    };
                    let list = match parent.cache().list() {
                        Ok(list) => list,
                        Err(err) => {
                            tracing::error!(subscription = %id, error = %err, "parent cache list failed; closing parent");
                            parent.close();
                            continue;
                        }
                    };
                    tracing::debug!(subscription = %id, filter = %filter, "refilter");
                    distribute(id, &out_tx, &dropped_events, cache.refilter(list, filter));
                }
                recv(parent_events) -> msg => {
                    let Ok(evt) = msg else {
                        break;
                    };
                    distribute(id, &out_tx, &dropped_events, cache.update(evt));
                }
            }
        }

        tracing::trace!(subscription = %id, "filter subscription stopped");
    }
}

/// Offer each event to the bounded outbound queue, dropping on overflow.
pub(crate) fn distribute<T>(
    id: SubscriptionId,
    out_tx: &Sender<Event<T>>,
    dropped_events: &AtomicU64,
    events: Vec<Event<T>>,
) {
    for evt in events {
        match out_tx.try_send(evt) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(subscription = %id, dropped, "event buffer overrun; dropping event");
            }
            // Nobody is listening anymore.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
