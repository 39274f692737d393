//! Typed change callbacks.

use crate::object::Object;

/// Callbacks driven by a [`Monitor`](super::Monitor). Every method defaults
/// to a no-op.
pub trait Handler<T: Object>: Send + 'static {
    /// Called once with the full view when it becomes ready.
    fn on_initialize(&mut self, _objs: &[T]) {}

    /// An object entered the view.
    fn on_create(&mut self, _obj: &T) {}

    /// An object in the view changed.
    fn on_update(&mut self, _obj: &T) {}

    /// An object left the view.
    fn on_delete(&mut self, _obj: &T) {}
}

type ListFn<T> = Box<dyn FnMut(&[T]) + Send>;
type ObjFn<T> = Box<dyn FnMut(&T) + Send>;

/// Handler assembled from optional closures.
///
/// ```rust,ignore
/// let handler = Callbacks::new()
///     .on_initialize(|pods: &[Pod]| println!("{} pods", pods.len()))
///     .on_delete(|pod: &Pod| println!("gone: {}", pod.key()));
/// ```
pub struct Callbacks<T> {
    initialize: Option<ListFn<T>>,
    create: Option<ObjFn<T>>,
    update: Option<ObjFn<T>>,
    delete: Option<ObjFn<T>>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            initialize: None,
            create: None,
            update: None,
            delete: None,
        }
    }
}

#[allow(missing_docs)]
impl<T: Object> Callbacks<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_initialize(mut self, f: impl FnMut(&[T]) + Send + 'static) -> Self {
        self.initialize = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_create(mut self, f: impl FnMut(&T) + Send + 'static) -> Self {
        self.create = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_update(mut self, f: impl FnMut(&T) + Send + 'static) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_delete(mut self, f: impl FnMut(&T) + Send + 'static) -> Self {
        self.delete = Some(Box::new(f));
        self
    }

    /// Route every change kind to the same closure.
    #[must_use]
    pub fn on_change(self, f: impl FnMut(&T) + Clone + Send + 'static) -> Self {
        self.on_create(f.clone()).on_update(f.clone()).on_delete(f)
    }
}

impl<T: Object> Handler<T> for Callbacks<T> {
    fn on_initialize(&mut self, objs: &[T]) {
        if let Some(f) = self.initialize.as_mut() {
            f(objs);
        }
    }

    fn on_create(&mut self, obj: &T) {
        if let Some(f) = self.create.as_mut() {
            f(obj);
        }
    }

    fn on_update(&mut self, obj: &T) {
        if let Some(f) = self.update.as_mut() {
            f(obj);
        }
    }

    fn on_delete(&mut self, obj: &T) {
        if let Some(f) = self.delete.as_mut() {
            f(obj);
        }
    }
}
