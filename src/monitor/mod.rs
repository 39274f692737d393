//! Handler-driven observation of a controller.
//!
//! A [`Monitor`] subscribes to a controller and feeds its view to a
//! [`Handler`] from a dedicated thread: the full listing once the view is
//! ready, then every change event until the subscription ends.

/// Monitor driver thread.
pub mod driver;
/// Handler trait and closure-based handler.
pub mod handler;

pub use driver::Monitor;
pub use handler::{Callbacks, Handler};
