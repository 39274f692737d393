//! Predicates over objects.
//!
//! A [`Filter`] decides view membership. Filters must be pure: evaluating
//! the same filter over the same list always yields the same members, which
//! is what lets a cache recompute its contents locally on refilter.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::object::{Object, ObjectKey};

type Predicate<T> = dyn Fn(&T) -> bool + Send + Sync;

/// Cloneable, thread-safe object predicate with a description for logs.
pub struct Filter<T> {
    predicate: Arc<Predicate<T>>,
    description: Cow<'static, str>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            description: self.description.clone(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.description).finish()
    }
}

impl<T> fmt::Display for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<T: 'static> Filter<T> {
    /// Wrap a closure.
    pub fn new<F>(description: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    /// Matches every object.
    #[must_use]
    pub fn all() -> Self {
        Self::new("all", |_| true)
    }

    /// Matches nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::new("none", |_| false)
    }

    /// Evaluate the predicate.
    #[inline]
    pub fn matches(&self, obj: &T) -> bool {
        (self.predicate)(obj)
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Both filters must match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let description = format!("({self} && {other})");
        Self::new(description, move |o| self.matches(o) && other.matches(o))
    }

    /// Either filter may match.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let description = format!("({self} || {other})");
        Self::new(description, move |o| self.matches(o) || other.matches(o))
    }

    /// Inverts the filter.
    #[must_use]
    pub fn not(self) -> Self {
        let description = format!("!{self}");
        Self::new(description, move |o| !self.matches(o))
    }

    /// Matches if any of `filters` matches. An empty set matches nothing.
    pub fn any_of(filters: impl IntoIterator<Item = Self>) -> Self {
        let filters: Vec<Self> = filters.into_iter().collect();
        if filters.is_empty() {
            return Self::none();
        }
        let description = format!(
            "any({})",
            filters
                .iter()
                .map(Filter::description)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self::new(description, move |o| filters.iter().any(|f| f.matches(o)))
    }
}

impl<T: Object> Filter<T> {
    /// Matches objects whose key is in `keys`.
    pub fn keys(keys: impl IntoIterator<Item = ObjectKey>) -> Self {
        let keys: BTreeSet<ObjectKey> = keys.into_iter().collect();
        let description = format!("keys[{}]", keys.len());
        Self::new(description, move |o: &T| keys.contains(&o.key()))
    }

    /// Matches objects in `namespace`.
    pub fn namespace(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let description = format!("namespace={namespace}");
        Self::new(description, move |o: &T| o.key().namespace == namespace)
    }

    /// Equality-based label selector: every pair in `selector` must be
    /// present on the object. An empty selector matches every object.
    #[must_use]
    pub fn labels(selector: BTreeMap<String, String>) -> Self {
        let description = format!(
            "labels[{}]",
            selector
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        );
        Self::new(description, move |o: &T| {
            if selector.is_empty() {
                return true;
            }
            let Some(labels) = o.labels() else {
                return false;
            };
            selector.iter().all(|(k, v)| labels.get(k) == Some(v))
        })
    }
}
