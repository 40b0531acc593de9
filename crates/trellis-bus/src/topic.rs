//! Topic addressing.
//!
//! Two interchangeable value types name a location in the resource
//! trie:
//!
//! - [`Topic`] holds a direct strong reference to a resource node.
//!   Constructing one from a path *creates* the missing nodes (eager).
//! - [`TopicPath`] holds the nearest *existing* node plus the complete
//!   path as a string (lazy). Messages carry this type, so merely
//!   addressing a topic never realises it; leaf resources in REST-ish
//!   paths are often ephemeral ids that should only come into being
//!   when something is actually registered there.
//!
//! Both types share the navigation API (`id`, `path`, `parent`,
//! `child`, `/` operator, `is_ancestor_of`) and the messaging API
//! (`subscribe`, `serve`, `publish`, `request`). For a `Topic` the
//! parent of the root is `None`; for a `TopicPath` the root is its own
//! parent.

use std::sync::Arc;

use tracing::debug;
use trellis_types::{Method, Status};

use crate::client::ClientRef;
use crate::error::{RouteError, StatusError};
use crate::message::{Event, Request};
use crate::node::ResourceNode;
use crate::path;
use crate::payload::Payload;
use crate::receiver::{ReceiverPolicy, Service, Subscription};

/// An eagerly resolved location in the resource trie.
///
/// Holding a `Topic` keeps its node (and, through parent ownership,
/// the whole path down from the root) alive. Use it to pin resources
/// for registration; use [`TopicPath`] inside messages.
#[derive(Clone)]
pub struct Topic {
    node: Arc<ResourceNode>,
}

impl Topic {
    /// Wraps an existing node.
    #[must_use]
    pub fn from_node(node: Arc<ResourceNode>) -> Topic {
        Topic { node }
    }

    /// The underlying resource node.
    #[must_use]
    pub fn node(&self) -> &Arc<ResourceNode> {
        &self.node
    }

    /// This topic's leaf identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.node.id()
    }

    /// Full path from the root.
    #[must_use]
    pub fn path(&self) -> &str {
        self.node.path()
    }

    /// The parent topic; `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Topic> {
        self.node.parent().cloned().map(Topic::from_node)
    }

    /// Descends to `sub`, creating missing nodes. `sub` may span
    /// several segments.
    #[must_use]
    pub fn child(&self, sub: &str) -> Topic {
        Topic::from_node(self.node.get(sub))
    }

    /// Descends to `sub` only if every node on the way exists.
    #[must_use]
    pub fn find(&self, sub: &str) -> Option<Topic> {
        self.node.find(sub).map(Topic::from_node)
    }

    /// Returns `true` if `other` lies in this topic's subtree. A topic
    /// counts as its own ancestor.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Topic) -> bool {
        let mut current = other.node.clone();
        loop {
            if Arc::ptr_eq(&self.node, &current) {
                return true;
            }
            match current.parent().cloned() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// No-op; a `Topic` is always fully resolved. Mirrors
    /// [`TopicPath::resolve`].
    pub fn resolve(&mut self) -> &mut Topic {
        self
    }

    /// No-op; a `Topic` is always realised. Mirrors
    /// [`TopicPath::realize`].
    pub fn realize(&mut self) -> Topic {
        self.clone()
    }

    /// Registers an event handler with the default subscriber policy.
    ///
    /// The subscriber sees every event published to this topic and,
    /// when the event is recursive, to any descendant. Dropping the
    /// returned handle unregisters it.
    #[must_use]
    pub fn subscribe(
        &self,
        handler: impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Arc<Subscription> {
        self.subscribe_with(ReceiverPolicy::subscriber(), handler)
    }

    /// Registers an event handler with an explicit policy.
    #[must_use]
    pub fn subscribe_with(
        &self,
        policy: ReceiverPolicy,
        handler: impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Arc<Subscription> {
        let subscription = self.node.emplace_subscriber(Subscription::new(
            self.node.clone(),
            policy,
            Box::new(handler),
        ));
        debug!(topic = self.path(), "subscription registered");
        self.announce(Payload::new(subscription.clone()));
        subscription
    }

    /// Registers a request handler with the default service policy.
    ///
    /// Only one service may be live per topic: returns `None` when the
    /// slot is occupied (or contended at this instant). Dropping the
    /// returned handle unregisters it.
    #[must_use]
    pub fn serve(
        &self,
        handler: impl Fn(&mut Request) -> Result<(), StatusError> + Send + Sync + 'static,
    ) -> Option<Arc<Service>> {
        self.serve_with(ReceiverPolicy::service(), Box::new(handler))
    }

    /// Registers an already-boxed request handler, as produced by the
    /// [`bind`](crate::bind) combinators, with the default policy.
    #[must_use]
    pub fn serve_boxed(&self, handler: crate::receiver::ServiceFn) -> Option<Arc<Service>> {
        self.serve_with(ReceiverPolicy::service(), handler)
    }

    /// Registers a request handler with an explicit policy.
    #[must_use]
    pub fn serve_with(
        &self,
        policy: ReceiverPolicy,
        handler: crate::receiver::ServiceFn,
    ) -> Option<Arc<Service>> {
        let service = self
            .node
            .try_emplace_service(Service::new(self.node.clone(), policy, handler))?;
        debug!(topic = self.path(), "service registered");
        self.announce(Payload::new(service.clone()));
        Some(service)
    }

    /// The currently registered service, if any.
    #[must_use]
    pub fn current_service(&self) -> Option<Arc<Service>> {
        self.node.service()
    }

    /// Publishes an event with default filtering.
    pub fn publish(&self, status: Status, payload: Payload) -> Result<(), RouteError> {
        Event::new(self, status).with_payload(payload).publish()
    }

    /// Issues a request, routing the eventual response to `client`.
    pub fn request(
        &self,
        client: impl Into<ClientRef>,
        method: Method,
        payload: Payload,
    ) -> Result<(), RouteError> {
        Request::new(client, self, method)
            .with_payload(payload)
            .issue()
    }

    /// Issues a `GET`.
    pub fn get(&self, client: impl Into<ClientRef>) -> Result<(), RouteError> {
        self.request(client, Method::Get, Payload::empty())
    }

    /// Issues a `PUT` with a payload.
    pub fn put(&self, client: impl Into<ClientRef>, payload: Payload) -> Result<(), RouteError> {
        self.request(client, Method::Put, payload)
    }

    /// Issues a `POST` with a payload.
    pub fn post(&self, client: impl Into<ClientRef>, payload: Payload) -> Result<(), RouteError> {
        self.request(client, Method::Post, payload)
    }

    /// Issues a `PATCH` with a payload.
    pub fn patch(&self, client: impl Into<ClientRef>, payload: Payload) -> Result<(), RouteError> {
        self.request(client, Method::Patch, payload)
    }

    /// Issues a `DELETE`.
    pub fn delete(&self, client: impl Into<ClientRef>) -> Result<(), RouteError> {
        self.request(client, Method::Delete, Payload::empty())
    }

    /// Publishes the receiver-created announcement. Failures only
    /// matter to watchers, so they are logged and swallowed.
    fn announce(&self, payload: Payload) {
        let mut event = Event::new(self, Status::CREATED)
            .with_payload(payload)
            .with_filtering(
                trellis_types::Filtering::ANNOUNCE_RECEIVER | trellis_types::Filtering::RECURSIVE,
            );
        if let Err(error) = event.publish() {
            debug!(topic = self.path(), %error, "receiver announcement dropped");
        }
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Topic) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Topic {}

impl std::ops::Div<&str> for &Topic {
    type Output = Topic;

    fn div(self, sub: &str) -> Topic {
        self.child(sub)
    }
}

impl std::ops::Div<&str> for Topic {
    type Output = Topic;

    fn div(self, sub: &str) -> Topic {
        self.child(sub)
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Topic").field(&self.path()).finish()
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// A lazily resolved location in the resource trie.
///
/// Holds a strong reference to the deepest node that existed when the
/// reference was last resolved, plus the complete canonical path.
/// Messages carry this type; sending to a path whose nodes don't exist
/// is valid and simply finds no receivers (or, recursively, finds the
/// existing ancestors).
#[derive(Clone)]
pub struct TopicPath {
    /// Deepest node known to exist on `path`. `nearest.path()` is
    /// always a canonical prefix of `path`.
    nearest: Arc<ResourceNode>,
    /// The complete canonical path.
    path: String,
}

impl TopicPath {
    /// Addresses `subpath` below an existing node.
    #[must_use]
    pub fn new(base: &Arc<ResourceNode>, subpath: &str) -> TopicPath {
        let mut path = base.path().to_owned();
        path::join_into(&mut path, subpath, base.separator());
        let mut topic_path = TopicPath {
            nearest: base.clone(),
            path,
        };
        topic_path.resolve();
        topic_path
    }

    /// Addresses an existing node exactly.
    #[must_use]
    pub fn from_node(node: Arc<ResourceNode>) -> TopicPath {
        TopicPath {
            path: node.path().to_owned(),
            nearest: node,
        }
    }

    /// The complete path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The leaf identifier: the last path segment.
    #[must_use]
    pub fn id(&self) -> &str {
        if self.path.is_empty() {
            return self.nearest.id();
        }
        path::last_segment(&self.path, self.separator())
    }

    /// Separator character of the underlying trie.
    #[must_use]
    pub fn separator(&self) -> char {
        self.nearest.separator()
    }

    /// The parent location. The root is its own parent.
    #[must_use]
    pub fn parent(&self) -> TopicPath {
        if !self.is_resolved() {
            // The leaf is unrealised; the parent is just a shorter path.
            let parent_path = path::parent_of(&self.path, self.separator());
            let mut parent = TopicPath {
                nearest: self.nearest.clone(),
                path: {
                    let mut canonical = String::new();
                    path::join_into(&mut canonical, parent_path, self.separator());
                    canonical
                },
            };
            parent.resolve();
            return parent;
        }
        match self.nearest.parent() {
            Some(node) => TopicPath::from_node(node.clone()),
            None => self.clone(),
        }
    }

    /// Descends to `sub` without realising anything.
    #[must_use]
    pub fn child(&self, sub: &str) -> TopicPath {
        let mut path = self.path.clone();
        path::join_into(&mut path, sub, self.separator());
        TopicPath {
            nearest: self.nearest.clone(),
            path,
        }
    }

    /// Returns `true` if `other`'s path lies within this one. A topic
    /// counts as its own ancestor.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &TopicPath) -> bool {
        let sep = self.separator();
        let mut mine = path::Segments::with_separator(&self.path, sep);
        let mut theirs = path::Segments::with_separator(&other.path, sep);
        loop {
            match (mine.next(), theirs.next()) {
                (None, _) => return true,
                (Some(_), None) => return false,
                (Some(a), Some(b)) if a == b => {}
                _ => return false,
            }
        }
    }

    /// Returns `true` if every node on the path currently exists and
    /// `nearest` is the destination itself.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.nearest.path().len() >= self.path.len()
    }

    /// The path segments beyond the resolved node.
    fn unresolved(&self) -> &str {
        if self.is_resolved() {
            return "";
        }
        self.path[self.nearest.path().len()..].trim_start_matches(self.separator())
    }

    /// Advances the resolved node as far as existing children permit.
    ///
    /// Purely a performance affair: dispatch re-walks the unresolved
    /// remainder every time regardless.
    pub fn resolve(&mut self) -> &mut TopicPath {
        let (node, _) = self.resolution();
        self.nearest = node;
        self
    }

    /// Creates every missing node on the path and returns the
    /// destination as an eager [`Topic`].
    pub fn realize(&mut self) -> Topic {
        let destination = self.nearest.get(self.unresolved());
        self.nearest = destination.clone();
        Topic::from_node(destination)
    }

    /// Realises the destination without mutating this reference.
    #[must_use]
    pub fn to_topic(&self) -> Topic {
        self.clone().realize()
    }

    /// Walks the unresolved remainder: the deepest existing node, and
    /// whether it is the destination itself.
    pub(crate) fn resolution(&self) -> (Arc<ResourceNode>, bool) {
        let mut node = self.nearest.clone();
        for segment in path::Segments::with_separator(self.unresolved(), self.separator()) {
            match node.try_child(segment) {
                Some(child) => node = child,
                None => return (node, false),
            }
        }
        (node, true)
    }

    /// Registers an event handler, realising the topic first. See
    /// [`Topic::subscribe`].
    #[must_use]
    pub fn subscribe(
        &self,
        handler: impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Arc<Subscription> {
        self.to_topic().subscribe(handler)
    }

    /// Registers a request handler, realising the topic first. See
    /// [`Topic::serve`].
    #[must_use]
    pub fn serve(
        &self,
        handler: impl Fn(&mut Request) -> Result<(), StatusError> + Send + Sync + 'static,
    ) -> Option<Arc<Service>> {
        self.to_topic().serve(handler)
    }

    /// The service at the destination, if the destination exists and
    /// has one.
    #[must_use]
    pub fn current_service(&self) -> Option<Arc<Service>> {
        let (node, resolved) = self.resolution();
        resolved.then(|| node.service()).flatten()
    }

    /// Publishes an event with default filtering, without realising
    /// the destination.
    pub fn publish(&self, status: Status, payload: Payload) -> Result<(), RouteError> {
        Event::new(self.clone(), status)
            .with_payload(payload)
            .publish()
    }

    /// Issues a request without realising the destination.
    pub fn request(
        &self,
        client: impl Into<ClientRef>,
        method: Method,
        payload: Payload,
    ) -> Result<(), RouteError> {
        Request::new(client, self.clone(), method)
            .with_payload(payload)
            .issue()
    }
}

impl From<Topic> for TopicPath {
    fn from(topic: Topic) -> TopicPath {
        TopicPath::from_node(topic.node.clone())
    }
}

impl From<&Topic> for TopicPath {
    fn from(topic: &Topic) -> TopicPath {
        TopicPath::from_node(topic.node.clone())
    }
}

impl From<&str> for TopicPath {
    fn from(path: &str) -> TopicPath {
        TopicPath::new(crate::global::root_node(), path)
    }
}

impl From<String> for TopicPath {
    fn from(path: String) -> TopicPath {
        TopicPath::from(path.as_str())
    }
}

impl std::ops::Div<&str> for &TopicPath {
    type Output = TopicPath;

    fn div(self, sub: &str) -> TopicPath {
        self.child(sub)
    }
}

impl std::fmt::Debug for TopicPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicPath")
            .field("path", &self.path)
            .field("resolved_to", &self.nearest.path())
            .finish()
    }
}

impl std::fmt::Display for TopicPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}
