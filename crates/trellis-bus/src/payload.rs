//! Type-erased message payload.
//!
//! Messages carry an arbitrary value without the bus knowing its type.
//! A payload is empty, a *direct* value, or an explicitly *shared*
//! value; either form lives behind an `Arc` so that a payload can be
//! cloned cheaply (relays and repeated publishing depend on this).
//!
//! Retrieval comes in four grades:
//!
//! | Accessor | Succeeds when |
//! |----------|---------------|
//! | [`value_ref`](Payload::value_ref) | direct value of exactly `T` |
//! | [`get`](Payload::get) | direct **or** shared value of `T` |
//! | [`get_mut`](Payload::get_mut) | direct, sole-owner value of `T` |
//! | [`take`](Payload::take) | direct, sole-owner value of `T` |
//!
//! Cloning a direct payload shares its allocation; mutable access and
//! move-out become available again once the clones are gone.

use std::any::Any;
use std::sync::Arc;

use crate::error::BadCast;

type AnyValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
enum Inner {
    Empty,
    /// A value the sender handed over. May be mutated or moved out
    /// while uniquely owned.
    Value(AnyValue),
    /// A reference the sender kept. Read-only by contract.
    Shared(AnyValue),
}

/// The type-erased value carried by a message.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_bus::Payload;
///
/// let mut direct = Payload::new(13_i32);
/// assert_eq!(direct.get::<i32>(), Some(&13));
/// assert_eq!(direct.take::<i32>().ok(), Some(13));
/// assert!(direct.is_empty());
///
/// let shared = Payload::shared(Arc::new("big".to_string()));
/// assert_eq!(shared.get::<String>().map(String::as_str), Some("big"));
/// assert!(shared.clone().take::<String>().is_err());
/// ```
pub struct Payload(Inner);

impl Payload {
    /// Creates an empty payload.
    #[must_use]
    pub fn empty() -> Payload {
        Payload(Inner::Empty)
    }

    /// Wraps a direct value.
    #[must_use]
    pub fn new<T: Send + Sync + 'static>(value: T) -> Payload {
        Payload(Inner::Value(Arc::new(value)))
    }

    /// Wraps a shared reference to a value the sender keeps.
    ///
    /// Use this to pass large values by reference; receivers see them
    /// through [`get`](Self::get) but cannot mutate or take them.
    #[must_use]
    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Payload {
        Payload(Inner::Shared(value))
    }

    /// Returns `true` if no value is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.0, Inner::Empty)
    }

    /// Exact-type view of a direct value.
    #[must_use]
    pub fn value_ref<T: 'static>(&self) -> Option<&T> {
        match &self.0 {
            Inner::Value(value) => value.downcast_ref(),
            _ => None,
        }
    }

    /// View of the value, following shared indirection.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        match &self.0 {
            Inner::Empty => None,
            Inner::Value(value) | Inner::Shared(value) => value.downcast_ref(),
        }
    }

    /// Mutable view of a direct value, available only while this
    /// payload is the sole owner of its allocation.
    #[must_use]
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match &mut self.0 {
            Inner::Value(value) => Arc::get_mut(value)?.downcast_mut(),
            _ => None,
        }
    }

    /// Moves the value out, leaving the payload empty.
    ///
    /// Fails (leaving the payload untouched) when the stored type is
    /// not `T`, the value is shared, or clones of this payload still
    /// exist.
    pub fn take<T: Send + Sync + 'static>(&mut self) -> Result<T, BadCast> {
        let bad_cast = BadCast {
            expected: std::any::type_name::<T>(),
        };
        match std::mem::replace(&mut self.0, Inner::Empty) {
            Inner::Empty => Err(bad_cast),
            Inner::Shared(value) => {
                self.0 = Inner::Shared(value);
                Err(bad_cast)
            }
            Inner::Value(value) => match value.downcast::<T>() {
                Ok(typed) => match Arc::try_unwrap(typed) {
                    Ok(inner) => Ok(inner),
                    Err(still_shared) => {
                        self.0 = Inner::Value(still_shared);
                        Err(bad_cast)
                    }
                },
                Err(original) => {
                    self.0 = Inner::Value(original);
                    Err(bad_cast)
                }
            },
        }
    }
}

impl Clone for Payload {
    fn clone(&self) -> Payload {
        Payload(self.0.clone())
    }
}

impl Default for Payload {
    fn default() -> Payload {
        Payload::empty()
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Inner::Empty => f.write_str("Payload::Empty"),
            Inner::Value(_) => f.write_str("Payload::Value"),
            Inner::Shared(_) => f.write_str("Payload::Shared"),
        }
    }
}
