//! Port Values
//!
//! A [`Value`] is the payload slot of an [`Output`](super::Output). It is
//! either `Undefined` or `Defined(T)`. Inputs never hold a copy of it; they
//! resolve through their output to the one slot that owns the data.

/// A typed slot whose contents may be undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<T> {
    /// No value has been published, or the last one was marked stale.
    Undefined,

    /// The most recently published value.
    Defined(T),
}

impl<T> Value<T> {
    /// Returns `true` if the slot holds a value.
    pub fn is_defined(&self) -> bool {
        matches!(self, Value::Defined(_))
    }

    /// Borrow the contained value, if any.
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Value::Defined(value) => Some(value),
            Value::Undefined => None,
        }
    }

    /// Convert to an `Option`, mapping undefined to `None`.
    pub fn into_option(self) -> Option<T> {
        self.into()
    }

    /// Clear the slot, returning the previous contents.
    pub fn take(&mut self) -> Value<T> {
        std::mem::take(self)
    }
}

impl<T> Default for Value<T> {
    fn default() -> Self {
        Value::Undefined
    }
}

impl<T> From<Option<T>> for Value<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Value::Defined(value),
            None => Value::Undefined,
        }
    }
}

impl<T> From<Value<T>> for Option<T> {
    fn from(value: Value<T>) -> Self {
        match value {
            Value::Defined(value) => Some(value),
            Value::Undefined => None,
        }
    }
}
