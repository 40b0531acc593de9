//! Message vocabulary for the trellis bus.
//!
//! This crate provides the shared types that messages and receivers are
//! built from in the trellis architecture.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  trellis-types  : Status, Method, flag sets, ErrorCode  ◄── │
//! │  trellis-coop   : cooperative wait-free containers          │
//! │  trellis-bus    : resource trie, messages, routing          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Messages on the bus borrow HTTP's vocabulary: a request carries a
//! [`Method`], events and responses carry a [`Status`]. Both sides of
//! a delivery also exchange three small flag sets:
//!
//! | Set | Owner | Meaning |
//! |-----|-------|---------|
//! | [`Features`] | runtime | what already happened to a message |
//! | [`Filtering`] | sender | properties receivers may ignore by mask |
//! | [`Handling`] | sender | constraints the handler must satisfy |
//!
//! # Example
//!
//! ```
//! use trellis_types::{Method, MethodSet, Status, Filtering};
//!
//! assert!(Method::Get.is_safe());
//! assert!(Status::NO_CONTENT.is_success());
//!
//! let allowed = MethodSet::new() + Method::Get + Method::Post;
//! assert!(allowed.contains(Method::Get));
//!
//! let default = Filtering::DEFAULT_MESSAGE;
//! assert!(default.contains(Filtering::REGULAR));
//! ```

mod error;
mod flags;
mod method;
mod status;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use flags::{Features, Filtering, Handling};
pub use method::{Method, MethodSet};
pub use status::Status;
