//! The global resource root and the free-function facade.
//!
//! Most applications route everything through one process-wide trie.
//! The facade mirrors the [`Topic`]/[`TopicPath`] API as free
//! functions taking a path, resolved against that shared root.
//!
//! # Teardown
//!
//! The root is initialised lazily on first use and is never torn down:
//! registered receivers keep their nodes alive, and the root itself
//! outlives every user. Unregistration is always per-receiver, by
//! dropping the handle.
//!
//! # Example
//!
//! ```
//! use trellis_bus::{global, Payload};
//! use trellis_types::Status;
//!
//! let _sub = global::subscribe("doc/example/prints", |event| {
//!     assert_eq!(event.get::<&str>(), Some(&"hello"));
//!     Ok(())
//! });
//! global::publish("doc/example/prints", Status::OK, Payload::new("hello")).unwrap();
//! ```

use std::sync::{Arc, OnceLock};

use trellis_types::{Method, Status};

use crate::client::ClientRef;
use crate::error::{RouteError, StatusError};
use crate::message::{Event, Request};
use crate::node::ResourceNode;
use crate::payload::Payload;
use crate::receiver::{Service, Subscription};
use crate::topic::{Topic, TopicPath};

/// The shared root node. Empty id, `/` separator.
pub(crate) fn root_node() -> &'static Arc<ResourceNode> {
    static ROOT: OnceLock<Arc<ResourceNode>> = OnceLock::new();
    ROOT.get_or_init(|| ResourceNode::new_root("", '/'))
}

/// The global root as a topic.
#[must_use]
pub fn root() -> Topic {
    Topic::from_node(root_node().clone())
}

/// Resolves `path` eagerly against the global root, creating missing
/// nodes.
#[must_use]
pub fn topic(path: &str) -> Topic {
    root().child(path)
}

/// Addresses `path` lazily against the global root, creating nothing.
#[must_use]
pub fn topic_path(path: &str) -> TopicPath {
    TopicPath::new(root_node(), path)
}

/// Looks up an existing topic.
///
/// # Errors
///
/// [`RouteError::NoSuchTopic`] when any segment of the path has no
/// live node.
pub fn find(path: &str) -> Result<Topic, RouteError> {
    root_node()
        .find(path)
        .map(Topic::from_node)
        .ok_or_else(|| RouteError::NoSuchTopic(path.to_owned()))
}

/// Subscribes to `path` (created if missing). See [`Topic::subscribe`].
#[must_use]
pub fn subscribe(
    path: &str,
    handler: impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
) -> Arc<Subscription> {
    topic(path).subscribe(handler)
}

/// Serves `path` (created if missing). See [`Topic::serve`].
#[must_use]
pub fn serve(
    path: &str,
    handler: impl Fn(&mut Request) -> Result<(), StatusError> + Send + Sync + 'static,
) -> Option<Arc<Service>> {
    topic(path).serve(handler)
}

/// Publishes an event to `path` without realising it.
pub fn publish(path: &str, status: Status, payload: Payload) -> Result<(), RouteError> {
    topic_path(path).publish(status, payload)
}

/// Issues a request to `path` without realising it.
pub fn request(
    path: &str,
    client: impl Into<ClientRef>,
    method: Method,
    payload: Payload,
) -> Result<(), RouteError> {
    topic_path(path).request(client, method, payload)
}

/// Issues a `GET` to `path`.
pub fn get(path: &str, client: impl Into<ClientRef>) -> Result<(), RouteError> {
    request(path, client, Method::Get, Payload::empty())
}

/// Issues a `PUT` to `path`.
pub fn put(path: &str, client: impl Into<ClientRef>, payload: Payload) -> Result<(), RouteError> {
    request(path, client, Method::Put, payload)
}

/// Issues a `POST` to `path`.
pub fn post(path: &str, client: impl Into<ClientRef>, payload: Payload) -> Result<(), RouteError> {
    request(path, client, Method::Post, payload)
}

/// Issues a `PATCH` to `path`.
pub fn patch(path: &str, client: impl Into<ClientRef>, payload: Payload) -> Result<(), RouteError> {
    request(path, client, Method::Patch, payload)
}

/// Issues a `DELETE` to `path`.
pub fn delete(path: &str, client: impl Into<ClientRef>) -> Result<(), RouteError> {
    request(path, client, Method::Delete, Payload::empty())
}
