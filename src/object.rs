//! Object identity.
//!
//! Views are agnostic to object schemas. Anything that can name itself with
//! an [`ObjectKey`] can be cached, filtered and joined.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of an object: namespace plus name.
///
/// Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace, empty for cluster-scoped objects.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object.
    #[must_use]
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// An immutable, uniquely keyed record held in a view.
///
/// A newer version of an object replaces the old one wholesale; cached
/// objects are never mutated in place.
pub trait Object: Clone + Send + Sync + 'static {
    /// Stable identity.
    fn key(&self) -> ObjectKey;

    /// Labels used by label filters. Objects without labels never match a
    /// non-empty label selector.
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        None
    }

    /// Opaque version string assigned by the source of truth.
    fn resource_version(&self) -> Option<&str> {
        None
    }
}
