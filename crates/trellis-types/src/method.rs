//! Request methods and method sets.
//!
//! Requests on the bus carry a [`Method`] where HTTP would carry a
//! request line. The per-method predicates follow HTTP conventions and
//! drive the typed service bindings (method gating, OPTIONS handling).

use serde::{Deserialize, Serialize};

/// An HTTP-style request method.
///
/// | Method | Safe | Idempotent | Cacheable |
/// |--------|------|------------|-----------|
/// | `Get` | yes | yes | yes |
/// | `Head` | yes | yes | yes |
/// | `Options` | yes | yes | no |
/// | `Trace` | yes | yes | no |
/// | `Put` | no | yes | no |
/// | `Delete` | no | yes | no |
/// | `Post` | no | no | yes |
/// | `Patch` | no | no | no |
/// | `Connect` | no | no | no |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Method {
    Get = 0,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Connect,
    Trace,
}

impl Method {
    /// Every valid method, in declaration order.
    pub const ALL: [Method; 9] = [
        Method::Get,
        Method::Head,
        Method::Post,
        Method::Put,
        Method::Delete,
        Method::Patch,
        Method::Options,
        Method::Connect,
        Method::Trace,
    ];

    /// Returns `true` if the method has no side effects by convention.
    #[must_use]
    pub const fn is_safe(self) -> bool {
        matches!(
            self,
            Method::Get | Method::Head | Method::Options | Method::Trace
        )
    }

    /// Returns `true` if repeating the request has the same effect as
    /// issuing it once.
    #[must_use]
    pub const fn is_idempotent(self) -> bool {
        matches!(
            self,
            Method::Get
                | Method::Head
                | Method::Put
                | Method::Delete
                | Method::Options
                | Method::Trace
        )
    }

    /// Returns `true` if responses to this method may be cached.
    #[must_use]
    pub const fn is_cacheable(self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Post)
    }

    /// Returns `true` if a request body is expected with this method.
    #[must_use]
    pub const fn allow_request_body(self) -> bool {
        !matches!(self, Method::Head | Method::Delete | Method::Trace)
    }

    /// Returns `true` if a response body is expected for this method.
    #[must_use]
    pub const fn allow_response_body(self) -> bool {
        !matches!(self, Method::Head)
    }

    /// Returns `true` if it makes sense to issue this method without
    /// any way to receive a response.
    #[must_use]
    pub const fn allow_no_response(self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch | Method::Delete)
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }

    /// Parses a canonical method name (exact, upper-case).
    #[must_use]
    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "PATCH" => Some(Method::Patch),
            "OPTIONS" => Some(Method::Options),
            "CONNECT" => Some(Method::Connect),
            "TRACE" => Some(Method::Trace),
            _ => None,
        }
    }

    /// Numeric code stored in a message's `code` field.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Recovers a method from a message code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Method> {
        match code {
            0 => Some(Method::Get),
            1 => Some(Method::Head),
            2 => Some(Method::Post),
            3 => Some(Method::Put),
            4 => Some(Method::Delete),
            5 => Some(Method::Patch),
            6 => Some(Method::Options),
            7 => Some(Method::Connect),
            8 => Some(Method::Trace),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of methods, stored as a bitmask.
///
/// Used by the service bindings to gate which methods a handler
/// accepts and to answer `OPTIONS` requests.
///
/// # Example
///
/// ```
/// use trellis_types::{Method, MethodSet};
///
/// let set = MethodSet::new() + Method::Get + Method::Post;
/// assert!(set.contains(Method::Get));
/// assert!(!set.contains(Method::Delete));
/// assert_eq!(set.to_string(), "GET, POST");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSet(u16);

impl MethodSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> MethodSet {
        MethodSet(0)
    }

    /// Creates a set containing every method.
    #[must_use]
    pub const fn all() -> MethodSet {
        MethodSet((1 << Method::ALL.len()) - 1)
    }

    /// Returns `true` if the set contains no methods.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Adds a method to the set.
    pub fn insert(&mut self, method: Method) {
        self.0 |= 1 << method.code();
    }

    /// Removes a method from the set.
    pub fn remove(&mut self, method: Method) {
        self.0 &= !(1 << method.code());
    }

    /// Returns `true` if the set contains the method.
    #[must_use]
    pub const fn contains(self, method: Method) -> bool {
        self.0 & (1 << method.code()) != 0
    }

    /// Iterates the contained methods in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Method> {
        Method::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl From<Method> for MethodSet {
    fn from(method: Method) -> Self {
        MethodSet::new() + method
    }
}

impl std::ops::Add<Method> for MethodSet {
    type Output = MethodSet;

    fn add(mut self, method: Method) -> MethodSet {
        self.insert(method);
        self
    }
}

impl std::ops::Sub<Method> for MethodSet {
    type Output = MethodSet;

    fn sub(mut self, method: Method) -> MethodSet {
        self.remove(method);
        self
    }
}

impl std::ops::Add<Method> for Method {
    type Output = MethodSet;

    fn add(self, other: Method) -> MethodSet {
        MethodSet::from(self) + other
    }
}

impl std::fmt::Display for MethodSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for method in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(method.as_str())?;
            first = false;
        }
        if first {
            f.write_str("(none)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_methods() {
        assert!(Method::Get.is_safe());
        assert!(Method::Head.is_safe());
        assert!(Method::Options.is_safe());
        assert!(Method::Trace.is_safe());
        assert!(!Method::Post.is_safe());
        assert!(!Method::Put.is_safe());
        assert!(!Method::Delete.is_safe());
    }

    #[test]
    fn idempotent_methods() {
        assert!(Method::Put.is_idempotent());
        assert!(Method::Delete.is_idempotent());
        assert!(!Method::Post.is_idempotent());
        assert!(!Method::Patch.is_idempotent());
    }

    #[test]
    fn cacheable_methods() {
        assert!(Method::Get.is_cacheable());
        assert!(Method::Post.is_cacheable());
        assert!(!Method::Put.is_cacheable());
    }

    #[test]
    fn body_rules() {
        assert!(!Method::Head.allow_request_body());
        assert!(!Method::Delete.allow_request_body());
        assert!(Method::Post.allow_request_body());
        assert!(!Method::Head.allow_response_body());
        assert!(Method::Get.allow_response_body());
    }

    #[test]
    fn no_response_rules() {
        assert!(Method::Post.allow_no_response());
        assert!(Method::Delete.allow_no_response());
        assert!(!Method::Get.allow_no_response());
        assert!(!Method::Options.allow_no_response());
    }

    #[test]
    fn parse_roundtrip() {
        for method in Method::ALL {
            assert_eq!(Method::parse(method.as_str()), Some(method));
        }
        assert_eq!(Method::parse("get"), None);
        assert_eq!(Method::parse(""), None);
        assert_eq!(Method::parse("BREW"), None);
    }

    #[test]
    fn code_roundtrip() {
        for method in Method::ALL {
            assert_eq!(Method::from_code(method.code()), Some(method));
        }
        assert_eq!(Method::from_code(999), None);
    }

    #[test]
    fn set_insert_remove_contains() {
        let mut set = MethodSet::new();
        assert!(set.is_empty());

        set.insert(Method::Get);
        set.insert(Method::Post);
        assert!(set.contains(Method::Get));
        assert!(set.contains(Method::Post));
        assert!(!set.contains(Method::Delete));

        set.remove(Method::Get);
        assert!(!set.contains(Method::Get));
        assert!(set.contains(Method::Post));
    }

    #[test]
    fn set_operators() {
        let set = Method::Get + Method::Put;
        assert!(set.contains(Method::Get));
        assert!(set.contains(Method::Put));

        let smaller = set - Method::Get;
        assert!(!smaller.contains(Method::Get));
        assert!(smaller.contains(Method::Put));
    }

    #[test]
    fn set_all_contains_everything() {
        let all = MethodSet::all();
        for method in Method::ALL {
            assert!(all.contains(method));
        }
    }

    #[test]
    fn set_iter_order() {
        let set = Method::Post + Method::Get;
        let methods: Vec<Method> = set.iter().collect();
        assert_eq!(methods, vec![Method::Get, Method::Post]);
    }

    #[test]
    fn set_display() {
        assert_eq!(MethodSet::new().to_string(), "(none)");
        assert_eq!((Method::Get + Method::Post).to_string(), "GET, POST");
    }
}
