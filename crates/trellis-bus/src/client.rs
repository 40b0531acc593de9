//! Response delivery.
//!
//! A [`Client`] is the channel a response travels back through. The
//! interchangeable forms mirror how callers want to wait:
//!
//! | Form | Behaviour |
//! |------|-----------|
//! | [`ClientRef::none`] | response silently discarded |
//! | [`ClientRef::callback`] | a closure runs per response |
//! | [`ClientRef::channel`] | a one-shot channel completes exactly once |
//!
//! The one-shot form is how the synchronous core interoperates with any
//! async host: the returned `tokio::sync::oneshot::Receiver` can be
//! awaited, or drained with `try_recv`/`blocking_recv` from plain
//! threads. Dropping the receiver cancels cleanly: the response is
//! discarded on delivery.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use trellis_types::Handling;

use crate::message::Response;
use crate::receiver::ReceiverPolicy;

enum Responder {
    Callback(Box<dyn Fn(Response) + Send + Sync>),
    Channel(Mutex<Option<oneshot::Sender<Response>>>),
}

/// A receiver of responses, bound to requests at issue time.
///
/// One client may serve many requests; the channel form completes on
/// the first response only, the callback form runs for each.
pub struct Client {
    policy: ReceiverPolicy,
    responder: Responder,
}

impl Client {
    /// Creates a callback client with the default client policy.
    #[must_use]
    pub fn new(callback: impl Fn(Response) + Send + Sync + 'static) -> Arc<Client> {
        Client::with_policy(ReceiverPolicy::client(), callback)
    }

    /// Creates a callback client with an explicit policy.
    #[must_use]
    pub fn with_policy(
        policy: ReceiverPolicy,
        callback: impl Fn(Response) + Send + Sync + 'static,
    ) -> Arc<Client> {
        Arc::new(Client {
            policy,
            responder: Responder::Callback(Box::new(callback)),
        })
    }

    /// Creates a one-shot client. The paired receiver completes on the
    /// first response delivered through this client.
    ///
    /// The client declares the `REALTIME` capability: completing a
    /// one-shot channel never blocks.
    #[must_use]
    pub fn channel() -> (Arc<Client>, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let client = Arc::new(Client {
            policy: ReceiverPolicy::client().with_capability(Handling::REALTIME),
            responder: Responder::Channel(Mutex::new(Some(tx))),
        });
        (client, rx)
    }

    /// This client's receiver policy.
    #[must_use]
    pub fn policy(&self) -> &ReceiverPolicy {
        &self.policy
    }

    pub(crate) fn deliver(&self, response: Response) {
        if !self.policy.accepts(response.filtering) {
            debug!(topic = response.topic.path(), "client ignored response");
            return;
        }
        match &self.responder {
            Responder::Callback(callback) => callback(response),
            Responder::Channel(sender) => {
                let Some(tx) = sender.lock().take() else {
                    debug!(
                        topic = response.topic.path(),
                        "one-shot client already completed; response dropped"
                    );
                    return;
                };
                if tx.send(response).is_err() {
                    debug!("response receiver dropped; response discarded");
                }
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.responder {
            Responder::Callback(_) => "callback",
            Responder::Channel(_) => "channel",
        };
        f.debug_struct("Client").field("kind", &kind).finish()
    }
}

/// Zero or one [`Client`], as passed to the request API.
///
/// Mirrors the interchangeable construction forms: build one from
/// nothing, a callback, a one-shot channel, or an existing client.
#[derive(Clone, Default)]
pub struct ClientRef(Option<Arc<Client>>);

impl ClientRef {
    /// No response channel; any response is discarded.
    #[must_use]
    pub fn none() -> ClientRef {
        ClientRef(None)
    }

    /// A callback client.
    #[must_use]
    pub fn callback(callback: impl Fn(Response) + Send + Sync + 'static) -> ClientRef {
        ClientRef(Some(Client::new(callback)))
    }

    /// A one-shot client plus its receiver.
    #[must_use]
    pub fn channel() -> (ClientRef, oneshot::Receiver<Response>) {
        let (client, rx) = Client::channel();
        (ClientRef(Some(client)), rx)
    }

    /// Returns `true` if no client is bound.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn into_inner(self) -> Option<Arc<Client>> {
        self.0
    }
}

impl From<Arc<Client>> for ClientRef {
    fn from(client: Arc<Client>) -> ClientRef {
        ClientRef(Some(client))
    }
}

impl From<Option<Arc<Client>>> for ClientRef {
    fn from(client: Option<Arc<Client>>) -> ClientRef {
        ClientRef(client)
    }
}

impl std::fmt::Debug for ClientRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(client) => client.fmt(f),
            None => f.write_str("ClientRef::None"),
        }
    }
}
