//! Publisher worker.
//!
//! A [`Publisher`] owns one source subscription and fans its events out to
//! any number of registered subscribers. Registrations travel over an
//! unbounded control mailbox and are acknowledged; events are offered to
//! each subscriber's bounded stream with `try_send` and never block the
//! worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender, TrySendError};

use crate::cache::CacheReader;
use crate::config::ViewConfig;
use crate::error::{ViewError, ViewResult};
use crate::event::Event;
use crate::object::Object;
use crate::signal::{signal, Signal, Trigger};
use crate::subscription::{Subscription, SubscriptionId};

use super::Controller;

#[derive(Debug)]
pub(crate) enum ControlMsg<T> {
    Register {
        id: SubscriptionId,
        stream_tx: Sender<Event<T>>,
        done: Trigger,
        reply: Sender<()>,
    },
    Unregister {
        id: SubscriptionId,
    },
}

struct SubscriberEntry<T> {
    tx: Sender<Event<T>>,
    done: Trigger,
}

/// Fan-out of one view to many subscribers.
///
/// The publisher's own cache, ready and done are those of its source.
/// Closing the publisher closes the source; when the source's stream ends,
/// every subscriber is done.
pub struct Publisher<T: Object> {
    id: SubscriptionId,
    source: Arc<dyn Subscription<T>>,
    cfg: ViewConfig,
    control_tx: Sender<ControlMsg<T>>,
    subscribers: Arc<AtomicUsize>,
    dropped_events: Arc<AtomicU64>,
    stopped: Signal,
}

impl<T: Object> Publisher<T> {
    /// Start publishing `source`.
    ///
    /// # Errors
    /// Returns `Spawn` if the worker thread cannot be started.
    pub fn new(source: Arc<dyn Subscription<T>>, cfg: &ViewConfig) -> ViewResult<Self> {
        let id = SubscriptionId::new();
        let (control_tx, control_rx) = unbounded::<ControlMsg<T>>();
        let subscribers = Arc::new(AtomicUsize::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));
        let (stop_trigger, stopped) = signal();

        let thread_source = Arc::clone(&source);
        let thread_subscribers = Arc::clone(&subscribers);
        let thread_dropped = Arc::clone(&dropped_events);
        let name = cfg.thread_name("publisher");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _stop = stop_trigger;
                worker_loop(id, thread_source, thread_subscribers, thread_dropped, control_rx);
            })
            .map_err(|source| ViewError::Spawn { name, source })?;

        Ok(Self {
            id,
            source,
            cfg: cfg.clone(),
            control_tx,
            subscribers,
            dropped_events,
            stopped,
        })
    }

    /// Register a new subscriber and obtain its stream.
    ///
    /// The subscriber only sees events published after registration; its
    /// cache is the publisher's, so listing it right after `ready` gives a
    /// consistent starting point.
    ///
    /// # Errors
    /// Returns `Closed` if the source is done, `Disconnected` if the worker
    /// has exited.
    pub fn register(&self) -> ViewResult<Arc<PublisherSubscription<T>>> {
        if self.source.done().is_fired() {
            return Err(ViewError::closed("publisher"));
        }

        let id = SubscriptionId::new();
        let (stream_tx, stream_rx) = bounded::<Event<T>>(self.cfg.capacity());
        let (done_trigger, done) = signal();
        let (reply_tx, reply_rx) = bounded::<()>(1);

        self.control_tx
            .send(ControlMsg::Register {
                id,
                stream_tx,
                done: done_trigger,
                reply: reply_tx,
            })
            .map_err(|_| ViewError::disconnected("publisher_control"))?;

        // Wait for the worker to acknowledge before handing out the stream.
        reply_rx
            .recv()
            .map_err(|_| ViewError::disconnected("publisher_control"))?;

        Ok(Arc::new(PublisherSubscription {
            id,
            source: Arc::clone(&self.source),
            events: stream_rx,
            done,
            control_tx: self.control_tx.clone(),
            unregistered: AtomicBool::new(false),
        }))
    }

    /// Identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Events dropped because a subscriber's stream was full.
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

impl<T: Object> Controller<T> for Publisher<T> {
    fn cache(&self) -> CacheReader<T> {
        self.source.cache()
    }

    fn ready(&self) -> Signal {
        self.source.ready()
    }

    fn done(&self) -> Signal {
        self.source.done()
    }

    fn close(&self) {
        self.source.close();
    }

    fn config(&self) -> &ViewConfig {
        &self.cfg
    }

    fn subscribe(&self) -> ViewResult<Arc<dyn Subscription<T>>> {
        let sub: Arc<dyn Subscription<T>> = self.register()?;
        Ok(sub)
    }
}

/// One subscriber's handle on a [`Publisher`].
///
/// Closing (or dropping) it unregisters from the publisher; its done signal
/// then fires and its stream ends.
pub struct PublisherSubscription<T: Object> {
    id: SubscriptionId,
    source: Arc<dyn Subscription<T>>,
    events: Receiver<Event<T>>,
    done: Signal,
    control_tx: Sender<ControlMsg<T>>,
    unregistered: AtomicBool,
}

impl<T: Object> PublisherSubscription<T> {
    /// The registration id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Non-blocking, idempotent unregistration.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.control_tx.send(ControlMsg::Unregister { id: self.id });
    }
}

impl<T: Object> Subscription<T> for PublisherSubscription<T> {
    fn cache(&self) -> CacheReader<T> {
        self.source.cache()
    }

    fn ready(&self) -> Signal {
        self.source.ready()
    }

    fn events(&self) -> Receiver<Event<T>> {
        self.events.clone()
    }

    fn done(&self) -> Signal {
        self.done.clone()
    }

    fn close(&self) {
        self.unsubscribe();
    }
}

impl<T: Object> Drop for PublisherSubscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn worker_loop<T: Object>(
    id: SubscriptionId,
    source: Arc<dyn Subscription<T>>,
    subscribers: Arc<AtomicUsize>,
    dropped_events: Arc<AtomicU64>,
    control_rx: Receiver<ControlMsg<T>>,
) {
    tracing::trace!(publisher = %id, "publisher started");

    let mut subs: HashMap<SubscriptionId, SubscriberEntry<T>> = HashMap::new();
    let source_events = source.events();
    let no_control = never::<ControlMsg<T>>();
    let mut control_open = true;

    loop {
        let control = if control_open { &control_rx } else { &no_control };

        select! {
            recv(control) -> msg => {
                match msg {
                    Ok(ControlMsg::Register { id: sub_id, stream_tx, done, reply }) => {
                        subs.insert(sub_id, SubscriberEntry { tx: stream_tx, done });
                        subscribers.store(subs.len(), Ordering::Relaxed);
                        tracing::debug!(publisher = %id, subscription = %sub_id, subscribers = subs.len(), "subscriber registered");
                        let _ = reply.send(());
                    }
                    Ok(ControlMsg::Unregister { id: sub_id }) => {
                        if let Some(entry) = subs.remove(&sub_id) {
                            entry.done.fire();
                            subscribers.store(subs.len(), Ordering::Relaxed);
                            tracing::debug!(publisher = %id, subscription = %sub_id, subscribers = subs.len(), "subscriber unregistered");
                        }
                    }
                    Err(_) => {
                        // Every handle is gone; nobody can observe the view anymore.
                        control_open = false;
                        source.close();
                    }
                }
            }
            recv(source_events) -> msg => {
                let Ok(evt) = msg else {
                    break;
                };
                for (sub_id, entry) in &subs {
                    match entry.tx.try_send(evt.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            let dropped = dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                            tracing::warn!(publisher = %id, subscription = %sub_id, dropped, "event buffer overrun; dropping event");
                        }
                        Err(TrySendError::Disconnected(_)) => {}
                    }
                }
            }
        }
    }

    for (_, entry) in subs.drain() {
        entry.done.fire();
    }
    subscribers.store(0, Ordering::Relaxed);
    tracing::trace!(publisher = %id, "publisher stopped");
}
