use std::sync::Arc;
use std::thread;

use crossbeam_channel::select;

use crate::controller::Controller;
use crate::error::{ViewError, ViewResult};
use crate::event::Event;
use crate::object::Object;
use crate::signal::{signal, Signal};
use crate::subscription::{Subscription, SubscriptionId};

use super::Handler;

/// Drives a [`Handler`] from one subscription of a controller.
///
/// Closing or dropping the monitor closes its subscription; the driver
/// thread then drains and exits, firing [`Monitor::done`].
pub struct Monitor<T: Object> {
    id: SubscriptionId,
    subscription: Arc<dyn Subscription<T>>,
    done: Signal,
}

impl<T: Object> Monitor<T> {
    /// Subscribe to `controller` and start dispatching to `handler`.
    ///
    /// # Errors
    /// Fails if the controller cannot be subscribed to or the driver thread
    /// cannot be started. Nothing is left running on failure.
    pub fn new<C, H>(controller: &C, handler: H) -> ViewResult<Self>
    where
        C: Controller<T> + ?Sized,
        H: Handler<T>,
    {
        let subscription = controller.subscribe()?;
        let id = SubscriptionId::new();
        let (done_trigger, done) = signal();

        let thread_sub = Arc::clone(&subscription);
        let name = controller.config().thread_name("monitor");
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let _done = done_trigger;
            drive(id, thread_sub.as_ref(), handler);
        });

        if let Err(source) = spawned {
            subscription.close();
            return Err(ViewError::Spawn { name, source });
        }

        tracing::debug!(monitor = %id, "monitor started");
        Ok(Self {
            id,
            subscription,
            done,
        })
    }

    /// Identifier used in logs.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop monitoring. Idempotent.
    pub fn close(&self) {
        self.subscription.close();
    }

    /// Fires when the driver thread has exited.
    #[must_use]
    pub fn done(&self) -> Signal {
        self.done.clone()
    }
}

impl<T: Object> Drop for Monitor<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn drive<T: Object, H: Handler<T>>(id: SubscriptionId, sub: &dyn Subscription<T>, mut handler: H) {
    tracing::trace!(monitor = %id, "monitor driver started");

    let ready = sub.ready();
    let done = sub.done();
    let is_ready = select! {
        recv(ready.receiver()) -> _ => !done.is_fired(),
        recv(done.receiver()) -> _ => false,
    };
    if !is_ready {
        tracing::trace!(monitor = %id, "monitor closed before ready");
        return;
    }

    match sub.cache().list() {
        Ok(objs) => handler.on_initialize(&objs),
        Err(err) => {
            tracing::error!(monitor = %id, error = %err, "initial cache list failed; closing monitor");
            sub.close();
            return;
        }
    }

    for evt in sub.events() {
        match &evt {
            Event::Create(obj) => handler.on_create(obj),
            Event::Update(obj) => handler.on_update(obj),
            Event::Delete(obj) => handler.on_delete(obj),
        }
    }

    tracing::trace!(monitor = %id, "monitor driver stopped");
}
