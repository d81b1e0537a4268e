//! # Non-cancelling service context.
//!
//! [`ServiceContext`] is a read-only bag of typed values handed to every
//! service through its metadata. It has no cancellation state at all:
//! consumers can read values but cannot observe or trigger cancellation.
//! Use it for request-scoped data (deployment name, region, shared clients),
//! never for lifecycle control; lifecycle travels over the tunnel.
//!
//! ## Example
//! ```rust
//! use flowvisor::ServiceContext;
//!
//! #[derive(Debug, PartialEq)]
//! struct Region(&'static str);
//!
//! let ctx = ServiceContext::new().with_value(Region("eu-west"));
//! assert_eq!(ctx.get::<Region>(), Some(&Region("eu-west")));
//! assert!(ctx.get::<u32>().is_none());
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Values = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Read-only value bag, cheap to clone.
///
/// Builder methods return a new context; an existing context is never mutated,
/// so every clone held by a service stays stable.
#[derive(Clone, Default)]
pub struct ServiceContext {
    values: Arc<Values>,
}

impl ServiceContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context with `value` stored under its type, replacing any previous value of that type.
    #[must_use]
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut values: Values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            values: Arc::new(values),
        }
    }

    /// Returns the value of type `T`, if present.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_value_does_not_touch_original() {
        let base = ServiceContext::new().with_value(7u32);
        let derived = base.with_value(9u32).with_value("name");

        assert_eq!(base.get::<u32>(), Some(&7));
        assert_eq!(base.len(), 1);
        assert_eq!(derived.get::<u32>(), Some(&9));
        assert_eq!(derived.get::<&str>(), Some(&"name"));
        assert_eq!(derived.len(), 2);
    }

    #[test]
    fn test_missing_value() {
        let ctx = ServiceContext::new();
        assert!(ctx.is_empty());
        assert!(ctx.get::<String>().is_none());
    }
}
