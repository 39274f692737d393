//! Views whose membership follows another view.
//!
//! [`join`] derives a view of `T` objects whose filter is recomputed from
//! the live contents of a driving view of `D` objects, e.g. the pods
//! selected by a set of services.

use std::thread;

use crossbeam_channel::select;

use crate::cache::CacheReader;
use crate::controller::{Controller, FilterController};
use crate::error::{ViewError, ViewResult};
use crate::filter::Filter;
use crate::monitor::{Handler, Monitor};
use crate::object::Object;

struct JoinHandler<D: Object, T: Object, F> {
    derived: FilterController<T>,
    driving: CacheReader<D>,
    relate: F,
}

impl<D, T, F> JoinHandler<D, T, F>
where
    D: Object,
    T: Object,
    F: Fn(&[D]) -> Filter<T> + Send + Sync + 'static,
{
    fn recompute(&self, objs: &[D]) {
        let filter = (self.relate)(objs);
        tracing::debug!(subscription = %self.derived.id(), drivers = objs.len(), filter = %filter, "join recompute");
        self.derived.refilter(filter);
    }

    fn recompute_from_cache(&self) {
        match self.driving.list() {
            Ok(objs) => self.recompute(&objs),
            // Keep the previous filter; the next driving change retries.
            Err(err) => {
                tracing::error!(subscription = %self.derived.id(), error = %err, "driving cache list failed; keeping stale filter");
            }
        }
    }
}

impl<D, T, F> Handler<D> for JoinHandler<D, T, F>
where
    D: Object,
    T: Object,
    F: Fn(&[D]) -> Filter<T> + Send + Sync + 'static,
{
    fn on_initialize(&mut self, objs: &[D]) {
        self.recompute(objs);
    }

    fn on_create(&mut self, _obj: &D) {
        self.recompute_from_cache();
    }

    fn on_update(&mut self, _obj: &D) {
        self.recompute_from_cache();
    }

    fn on_delete(&mut self, _obj: &D) {
        self.recompute_from_cache();
    }
}

/// Derive a view of `target` whose filter is `relate(driving objects)`,
/// recomputed on every change to `driving`.
///
/// The returned controller starts unfiltered and narrows once `driving` is
/// ready. Closing it also stops the driving-side monitor.
///
/// # Errors
/// Fails if either side cannot be subscribed to or a worker thread cannot
/// be started. The derived view is closed on failure.
pub fn join<D, T, DC, TC, F>(driving: &DC, target: &TC, relate: F) -> ViewResult<FilterController<T>>
where
    D: Object,
    T: Object,
    DC: Controller<D> + ?Sized,
    TC: Controller<T> + ?Sized,
    F: Fn(&[D]) -> Filter<T> + Send + Sync + 'static,
{
    let derived = target.clone_with_filter(Filter::all())?;

    let handler = JoinHandler {
        derived: derived.clone(),
        driving: driving.cache(),
        relate,
    };
    let monitor = match Monitor::new(driving, handler) {
        Ok(monitor) => monitor,
        Err(err) => {
            tracing::error!(subscription = %derived.id(), error = %err, "join monitor failed to start");
            derived.close();
            return Err(err);
        }
    };

    let derived_done = derived.done();
    let monitor_done = monitor.done();
    let name = driving.config().thread_name("join");
    let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
        select! {
            recv(derived_done.receiver()) -> _ => {}
            recv(monitor_done.receiver()) -> _ => {}
        }
        monitor.close();
    });

    if let Err(source) = spawned {
        tracing::error!(subscription = %derived.id(), error = %source, "join supervisor failed to start");
        derived.close();
        return Err(ViewError::Spawn { name, source });
    }

    Ok(derived)
}
