//! The message model.
//!
//! Three message kinds flow through the bus, all sharing one core:
//!
//! | Kind | Code | Destination | Consumed by |
//! |------|------|-------------|-------------|
//! | [`Event`] | [`Status`] | a topic | subscribers |
//! | [`Request`] | [`Method`] | a topic | exactly one service |
//! | [`Response`] | [`Status`] | the *request's* topic | the request's client |
//!
//! The shared [`Message`] core carries the destination, the flag sets,
//! a process-unique id and the type-erased [`Payload`]. The kind
//! wrappers add the typed code and the kind-specific operations
//! (`publish`, `issue`, `respond`) and deref to the core.
//!
//! Events and requests may be re-sent: `publish` and `issue` can be
//! called repeatedly on the same value. Each issuance of a request
//! yields at most one response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;
use trellis_types::{Features, Filtering, Handling, Method, Status};

use crate::client::{Client, ClientRef};
use crate::dispatch;
use crate::error::RouteError;
use crate::payload::Payload;
use crate::topic::TopicPath;

/// Process-unique message identifier.
///
/// Monotonically increasing from a shared counter. Ids identify
/// duplicate deliveries under retry; they say nothing about ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(u64);

impl MessageId {
    /// Allocates the next id.
    #[must_use]
    pub fn next() -> MessageId {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        MessageId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw 64-bit value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

/// The core shared by every message kind.
#[derive(Debug)]
pub struct Message {
    /// State recorded by the runtime (sent, responded).
    pub features: Features,
    /// Properties receivers match against their ignore masks.
    pub filtering: Filtering,
    /// Constraints on whoever handles this message.
    pub requirements: Handling,
    /// Destination; lazy, so addressing a topic does not create it.
    pub topic: TopicPath,
    id: MessageId,
    payload: Payload,
}

impl Message {
    fn new(topic: TopicPath) -> Message {
        Message {
            features: Features::empty(),
            filtering: Filtering::DEFAULT_MESSAGE,
            requirements: Handling::empty(),
            topic,
            id: MessageId::next(),
            payload: Payload::empty(),
        }
    }

    /// This message's process-unique id.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// The carried payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Mutable access to the carried payload.
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Shorthand for [`Payload::get`] on the carried payload.
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.payload.get()
    }

    /// Returns `true` if this message propagates along the parent
    /// chain of its destination.
    #[must_use]
    pub fn recursive(&self) -> bool {
        self.filtering.contains(Filtering::RECURSIVE)
    }

    /// Sets the recursive filtering bit.
    pub fn set_recursive(&mut self) {
        self.filtering |= Filtering::RECURSIVE;
    }

    /// Clears the recursive filtering bit.
    pub fn set_non_recursive(&mut self) {
        self.filtering -= Filtering::RECURSIVE;
    }
}

/// A status-carrying broadcast, consumed by subscribers.
#[derive(Debug)]
pub struct Event {
    message: Message,
    status: Status,
}

impl Event {
    /// Creates an event with an empty payload and default filtering.
    #[must_use]
    pub fn new(topic: impl Into<TopicPath>, status: Status) -> Event {
        Event {
            message: Message::new(topic.into()),
            status,
        }
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Event {
        self.message.payload = payload;
        self
    }

    /// Replaces the filtering bits.
    #[must_use]
    pub fn with_filtering(mut self, filtering: Filtering) -> Event {
        self.message.filtering = filtering;
        self
    }

    /// Replaces the handling requirements.
    #[must_use]
    pub fn with_requirements(mut self, requirements: Handling) -> Event {
        self.message.requirements = requirements;
        self
    }

    /// The event's status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Publishes this event to its destination. May be called
    /// repeatedly.
    pub fn publish(&mut self) -> Result<(), RouteError> {
        dispatch::publish(self)?;
        self.message.features |= Features::DID_SEND;
        Ok(())
    }
}

impl std::ops::Deref for Event {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl std::ops::DerefMut for Event {
    fn deref_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

/// A method-carrying message expecting a response, consumed by exactly
/// one service.
pub struct Request {
    message: Message,
    method: Method,
    client: Option<Arc<Client>>,
}

impl Request {
    /// Composes a request. Nothing is sent until
    /// [`issue`](Self::issue) is called.
    #[must_use]
    pub fn new(client: impl Into<ClientRef>, topic: impl Into<TopicPath>, method: Method) -> Request {
        Request {
            message: Message::new(topic.into()),
            method,
            client: client.into().into_inner(),
        }
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Request {
        self.message.payload = payload;
        self
    }

    /// Replaces the filtering bits.
    #[must_use]
    pub fn with_filtering(mut self, filtering: Filtering) -> Request {
        self.message.filtering = filtering;
        self
    }

    /// Replaces the handling requirements.
    #[must_use]
    pub fn with_requirements(mut self, requirements: Handling) -> Request {
        self.message.requirements = requirements;
        self
    }

    /// The request's method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Issues this request to its destination service. May be called
    /// repeatedly; each issuance yields at most one response.
    pub fn issue(&mut self) -> Result<(), RouteError> {
        dispatch::issue(self)
    }

    /// Issues this request with no way to respond, discarding any
    /// previously bound client.
    pub fn push(&mut self) -> Result<(), RouteError> {
        self.client = None;
        self.issue()
    }

    /// Responds to this request. Usually called by the handling
    /// service.
    ///
    /// Only the first response per issuance is delivered; later calls
    /// are dropped with a warning. A request without a client silently
    /// discards the response.
    pub fn respond(&mut self, status: Status, payload: Payload) {
        if self.message.features.contains(Features::DID_RESPOND) {
            warn!(
                topic = self.message.topic.path(),
                %status,
                "duplicate response dropped"
            );
            return;
        }
        self.message.features |= Features::DID_RESPOND;
        if let Some(client) = &self.client {
            let response = Response::new(self.message.topic.clone(), status, payload);
            client.deliver(response);
        }
    }

    /// Responds `200 OK` with a payload.
    pub fn respond_ok(&mut self, payload: Payload) {
        self.respond(Status::OK, payload);
    }

    /// Responds `201 Created`.
    pub fn respond_created(&mut self, payload: Payload) {
        self.respond(Status::CREATED, payload);
    }

    /// Responds `204 No Content`.
    pub fn respond_no_content(&mut self) {
        self.respond(Status::NO_CONTENT, Payload::empty());
    }

    /// Responds `404 Not Found`.
    pub fn respond_not_found(&mut self) {
        self.respond(Status::NOT_FOUND, Payload::empty());
    }

    /// Responds `405 Method Not Allowed`.
    pub fn respond_method_not_allowed(&mut self) {
        self.respond(Status::METHOD_NOT_ALLOWED, Payload::empty());
    }

    /// Responds `410 Gone`.
    pub fn respond_gone(&mut self) {
        self.respond(Status::GONE, Payload::empty());
    }

    /// Responds `415 Unsupported Media Type`.
    pub fn respond_unsupported_media_type(&mut self) {
        self.respond(Status::UNSUPPORTED_MEDIA_TYPE, Payload::empty());
    }

    /// Responds `500 Internal Server Error`.
    pub fn respond_internal_server_error(&mut self) {
        self.respond(Status::INTERNAL_SERVER_ERROR, Payload::empty());
    }

    /// Responds `501 Not Implemented`.
    pub fn respond_not_implemented(&mut self) {
        self.respond(Status::NOT_IMPLEMENTED, Payload::empty());
    }

    /// Returns `true` if a client is bound to receive the response.
    #[must_use]
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }
}

impl std::ops::Deref for Request {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl std::ops::DerefMut for Request {
    fn deref_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("topic", &self.message.topic.path())
            .field("id", &self.message.id)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

/// The reply to a request, delivered through the request's client.
///
/// Structurally an event; its topic is the topic the request was
/// addressed to.
#[derive(Debug)]
pub struct Response {
    message: Message,
    status: Status,
}

impl Response {
    /// Builds a response addressed to a request's topic.
    #[must_use]
    pub fn new(topic: TopicPath, status: Status, payload: Payload) -> Response {
        let mut message = Message::new(topic);
        message.payload = payload;
        Response { message, status }
    }

    /// The response's status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Consumes the response, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.message.payload
    }
}

impl std::ops::Deref for Response {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl std::ops::DerefMut for Response {
    fn deref_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}
