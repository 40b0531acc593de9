//! Unified error interface.
//!
//! Every error type in the workspace implements [`ErrorCode`] so
//! callers can branch on stable machine-readable codes and decide on
//! retries without matching concrete enum variants across crates.
//!
//! # Code Format
//!
//! - UPPER_SNAKE_CASE
//! - Prefixed with the owning layer: `BUS_`, `PAYLOAD_`, `CONVERT_`
//! - Stable once defined (API contract)
//!
//! # Example
//!
//! ```
//! use trellis_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LookupError {
//!     Missing,
//!     Busy,
//! }
//!
//! impl ErrorCode for LookupError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Missing => "LOOKUP_MISSING",
//!             Self::Busy => "LOOKUP_BUSY",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Busy)
//!     }
//! }
//!
//! assert_eq!(LookupError::Busy.code(), "LOOKUP_BUSY");
//! assert!(LookupError::Busy.is_recoverable());
//! ```

/// Stable machine-readable error classification.
pub trait ErrorCode {
    /// Returns the machine-readable code for this error.
    ///
    /// Codes are UPPER_SNAKE_CASE, prefixed by layer, and never change
    /// once published.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    ///
    /// `true` means the condition is transient (the missing service may
    /// be registered, the contended slot may free up); `false` means
    /// the caller must change something first.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error's code follows workspace conventions.
///
/// # Panics
///
/// Panics with a descriptive message when the code is empty, lacks the
/// expected prefix, or is not UPPER_SNAKE_CASE. Intended for tests.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Asserts conventions for every variant of an error enum at once.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl ErrorCode for TestError {
        fn code(&self) -> &'static str {
            match self {
                Self::Transient => "TEST_TRANSIENT",
                Self::Permanent => "TEST_PERMANENT",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    #[test]
    fn trait_basics() {
        assert_eq!(TestError::Transient.code(), "TEST_TRANSIENT");
        assert!(TestError::Transient.is_recoverable());
        assert!(!TestError::Permanent.is_recoverable());
    }

    #[test]
    fn assert_all_variants() {
        assert_error_codes(&[TestError::Transient, TestError::Permanent], "TEST_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn wrong_prefix_panics() {
        assert_error_code(&TestError::Transient, "OTHER_");
    }

    #[test]
    fn snake_case_check() {
        assert!(is_upper_snake_case("BUS_NO_SUCH_TOPIC"));
        assert!(is_upper_snake_case("A_1"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("lower"));
        assert!(!is_upper_snake_case("_LEADING"));
        assert!(!is_upper_snake_case("TRAILING_"));
        assert!(!is_upper_snake_case("DOUBLE__UNDER"));
    }
}
