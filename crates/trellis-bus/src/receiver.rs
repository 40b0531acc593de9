//! Receivers: the policy masks and the service/subscription records.
//!
//! Every party that can take a message (service, subscription,
//! client) carries a [`ReceiverPolicy`]: an *ignore mask* of filtering bits
//! that make it skip a message, and a *capability mask* of handling
//! bits it knows how to satisfy.
//!
//! Services and subscriptions are cooperative members of their resource
//! node: each holds a strong node reference, while the node only refers
//! back weakly. Dropping the last handle returned by `serve`/`subscribe`
//! unregisters the receiver and releases its share of the node.

use std::sync::Arc;

use parking_lot::RwLock;
use trellis_types::{Filtering, Handling};

use crate::error::StatusError;
use crate::message::{Event, Request};
use crate::node::ResourceNode;
use crate::topic::{Topic, TopicPath};

/// Ignore and capability masks shared by all receiver kinds.
///
/// A message is accepted iff its filtering bits don't intersect the
/// ignore mask. A message's requirements minus the capability mask are
/// the *unhandled* requirements; any left over aborts delivery unless
/// an [interceptor](set_handling_interceptor) approves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverPolicy {
    /// Filtering bits that make this receiver skip a message.
    pub ignore: Filtering,
    /// Handling bits this receiver can satisfy.
    pub capability: Handling,
}

impl ReceiverPolicy {
    /// Default policy for subscribers: skip bus broadcasts, accept
    /// recursive traffic.
    #[must_use]
    pub fn subscriber() -> ReceiverPolicy {
        ReceiverPolicy {
            ignore: Filtering::DEFAULT_SUBSCRIBER_IGNORE,
            capability: Handling::empty(),
        }
    }

    /// Default policy for services: as subscribers, plus skip
    /// recursive traffic from sub-resources.
    #[must_use]
    pub fn service() -> ReceiverPolicy {
        ReceiverPolicy {
            ignore: Filtering::DEFAULT_SERVICE_IGNORE,
            capability: Handling::empty(),
        }
    }

    /// Default policy for clients: skip nothing.
    #[must_use]
    pub fn client() -> ReceiverPolicy {
        ReceiverPolicy {
            ignore: Filtering::DEFAULT_CLIENT_IGNORE,
            capability: Handling::empty(),
        }
    }

    /// Replaces the ignore mask.
    #[must_use]
    pub fn with_ignore(mut self, ignore: Filtering) -> ReceiverPolicy {
        self.ignore = ignore;
        self
    }

    /// Replaces the capability mask.
    #[must_use]
    pub fn with_capability(mut self, capability: Handling) -> ReceiverPolicy {
        self.capability = capability;
        self
    }

    /// Returns `true` if a message with these filtering bits is
    /// accepted.
    #[must_use]
    pub fn accepts(&self, filtering: Filtering) -> bool {
        (filtering & self.ignore).is_empty()
    }

    /// Returns the requirement bits this receiver cannot satisfy.
    #[must_use]
    pub fn unhandled(&self, requirements: Handling) -> Handling {
        requirements - self.capability
    }
}

/// Handler signature for services.
pub type ServiceFn = Box<dyn Fn(&mut Request) -> Result<(), StatusError> + Send + Sync>;

/// Handler signature for subscribers.
pub type SubscriberFn = Box<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// A registered request handler.
///
/// At most one service is live per node at a time; the handle returned
/// by `serve` is the sole owner and dropping it frees the node's
/// service slot.
pub struct Service {
    node: Arc<ResourceNode>,
    policy: ReceiverPolicy,
    func: ServiceFn,
}

impl Service {
    pub(crate) fn new(node: Arc<ResourceNode>, policy: ReceiverPolicy, func: ServiceFn) -> Service {
        Service { node, policy, func }
    }

    /// The topic this service is registered at.
    #[must_use]
    pub fn topic(&self) -> Topic {
        Topic::from_node(self.node.clone())
    }

    /// This service's receiver policy.
    #[must_use]
    pub fn policy(&self) -> &ReceiverPolicy {
        &self.policy
    }

    pub(crate) fn call(&self, request: &mut Request) -> Result<(), StatusError> {
        (self.func)(request)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("topic", &self.node.path())
            .field("policy", &self.policy)
            .finish()
    }
}

/// A registered event handler.
///
/// Any number of subscriptions may be live per node. The handle
/// returned by `subscribe` is the sole owner; dropping it unregisters
/// the subscriber.
pub struct Subscription {
    node: Arc<ResourceNode>,
    policy: ReceiverPolicy,
    func: SubscriberFn,
}

impl Subscription {
    pub(crate) fn new(
        node: Arc<ResourceNode>,
        policy: ReceiverPolicy,
        func: SubscriberFn,
    ) -> Subscription {
        Subscription { node, policy, func }
    }

    /// The topic this subscription is registered at.
    #[must_use]
    pub fn topic(&self) -> Topic {
        Topic::from_node(self.node.clone())
    }

    pub(crate) fn node(&self) -> &Arc<ResourceNode> {
        &self.node
    }

    /// This subscription's receiver policy.
    #[must_use]
    pub fn policy(&self) -> &ReceiverPolicy {
        &self.policy
    }

    pub(crate) fn call(&self, event: &Event) -> anyhow::Result<()> {
        (self.func)(event)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.node.path())
            .field("policy", &self.policy)
            .finish()
    }
}

type HandlingInterceptor = dyn Fn(&TopicPath, Handling) -> bool + Send + Sync;

static INTERCEPTOR: RwLock<Option<Box<HandlingInterceptor>>> = RwLock::new(None);

/// Installs a process-wide hook consulted when a message requires a
/// capability its receiver lacks.
///
/// The hook receives the message's destination and the missing bits;
/// returning `true` lets delivery proceed anyway. Without a hook, such
/// deliveries fail with `HandlingUnavailable`.
pub fn set_handling_interceptor(
    interceptor: impl Fn(&TopicPath, Handling) -> bool + Send + Sync + 'static,
) {
    *INTERCEPTOR.write() = Some(Box::new(interceptor));
}

/// Removes the handling interceptor.
pub fn clear_handling_interceptor() {
    *INTERCEPTOR.write() = None;
}

/// Checks unhandled requirement bits against the interceptor.
pub(crate) fn handling_available(topic: &TopicPath, missing: Handling) -> bool {
    if missing.is_empty() {
        return true;
    }
    match INTERCEPTOR.read().as_ref() {
        Some(interceptor) => interceptor(topic, missing),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_accepts_recursive_and_regular() {
        let policy = ReceiverPolicy::subscriber();
        assert!(policy.accepts(Filtering::REGULAR));
        assert!(policy.accepts(Filtering::REGULAR | Filtering::RECURSIVE));
        assert!(!policy.accepts(Filtering::ANNOUNCE_RECEIVER));
        assert!(!policy.accepts(Filtering::SUBSCRIBER_EXCEPTION));
    }

    #[test]
    fn service_rejects_recursive() {
        let policy = ReceiverPolicy::service();
        assert!(policy.accepts(Filtering::REGULAR));
        assert!(!policy.accepts(Filtering::REGULAR | Filtering::RECURSIVE));
    }

    #[test]
    fn client_accepts_everything() {
        let policy = ReceiverPolicy::client();
        assert!(policy.accepts(Filtering::REGULAR));
        assert!(policy.accepts(Filtering::ANNOUNCE_RECEIVER | Filtering::RECURSIVE));
    }

    #[test]
    fn unhandled_is_set_difference() {
        let policy =
            ReceiverPolicy::service().with_capability(Handling::IMMEDIATE | Handling::NO_COPYING);
        assert!(policy.unhandled(Handling::IMMEDIATE).is_empty());
        assert_eq!(
            policy.unhandled(Handling::IMMEDIATE | Handling::REALTIME),
            Handling::REALTIME
        );
    }

    #[test]
    fn custom_ignore_mask() {
        let watching_exceptions = ReceiverPolicy::subscriber()
            .with_ignore(Filtering::DEFAULT_SUBSCRIBER_IGNORE - Filtering::SUBSCRIBER_EXCEPTION);
        assert!(watching_exceptions.accepts(Filtering::SUBSCRIBER_EXCEPTION));
        assert!(!watching_exceptions.accepts(Filtering::ANNOUNCE_RECEIVER));
    }
}
