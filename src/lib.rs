//! # kview - live, filtered views of cluster objects
//!
//! kview keeps client-side mirrors of sets of remote objects and lets views
//! be re-filtered or derived from one another without going back to the
//! source of truth.
//!
//! ## Core Concepts
//!
//! - **Feed**: the transport-facing root view, written by a watch/list client
//! - **Subscription**: a cache, a ready signal, a bounded event stream and a
//!   done signal
//! - **Controller**: a view that hands out subscriptions and filtered clones
//!   of itself
//! - **Monitor**: drives a [`Handler`] from a controller's events
//! - **Join**: a view whose filter is recomputed from another view
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kview::{join, Controller, Feed, Filter, Publisher, ViewConfig};
//!
//! let cfg = ViewConfig::default();
//! let (mut services_feed, services_root) = Feed::<Service>::new(&cfg);
//! let (mut pods_feed, pods_root) = Feed::<Pod>::new(&cfg);
//! let services = Publisher::new(services_root, &cfg)?;
//! let pods = Publisher::new(pods_root, &cfg)?;
//!
//! // Pods selected by any live service.
//! let selected = join(&services, &pods, |svcs: &[Service]| {
//!     Filter::any_of(svcs.iter().map(|s| Filter::labels(s.selector.clone())))
//! })?;
//!
//! services_feed.sync(list_services()?)?;
//! pods_feed.sync(list_pods()?)?;
//! for evt in selected.subscribe()?.events() {
//!     println!("{:?} {}", evt.event_type(), evt.key());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Leaf types
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod object;
pub mod signal;

// Views and their plumbing
pub mod cache;
pub mod controller;
pub mod feed;
pub mod subscription;

// Consumers
pub mod join;
pub mod monitor;

pub use cache::{Cache, CacheReader};
pub use config::ViewConfig;
pub use controller::{Controller, FilterController, Publisher, PublisherSubscription};
pub use error::{ViewError, ViewResult};
pub use event::{Event, EventType};
pub use feed::{Feed, FeedSubscription};
pub use filter::Filter;
pub use join::join;
pub use monitor::{Callbacks, Handler, Monitor};
pub use object::{Object, ObjectKey};
pub use signal::Signal;
pub use subscription::{FilterSubscription, Subscription, SubscriptionId};
