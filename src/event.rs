//! Change events.

use serde::{Deserialize, Serialize};

use crate::object::{Object, ObjectKey};

/// Kind of change carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Object entered the view.
    Create,
    /// Object changed and is still in the view.
    Update,
    /// Object left the view.
    Delete,
}

/// A change to one object. `Delete` carries the last known version.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<T> {
    #[allow(missing_docs)]
    Create(T),
    #[allow(missing_docs)]
    Update(T),
    #[allow(missing_docs)]
    Delete(T),
}

impl<T> Event<T> {
    /// The event's kind.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Create(_) => EventType::Create,
            Self::Update(_) => EventType::Update,
            Self::Delete(_) => EventType::Delete,
        }
    }

    /// The object the event refers to.
    #[must_use]
    pub const fn object(&self) -> &T {
        match self {
            Self::Create(o) | Self::Update(o) | Self::Delete(o) => o,
        }
    }

    /// Consume the event, returning its object.
    #[must_use]
    pub fn into_object(self) -> T {
        match self {
            Self::Create(o) | Self::Update(o) | Self::Delete(o) => o,
        }
    }
}

impl<T: Object> Event<T> {
    /// Key of the object the event refers to.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.object().key()
    }
}
