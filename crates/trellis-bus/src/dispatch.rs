//! Routing and dispatch.
//!
//! The traversal rules, shared by events and requests:
//!
//! - The destination is resolved lazily from the message's
//!   [`TopicPath`]. A destination that doesn't exist is reachable only
//!   by recursive messages, which then start at the nearest existing
//!   ancestor.
//! - The `RECURSIVE` filtering bit is *cleared* while a message is
//!   examined at its exact destination node and *set* at ancestors.
//!   Receivers that ignore `RECURSIVE` therefore only reject traffic
//!   arriving from sub-resources.
//! - Ancestor traversal is leaf-first. Ordering between receivers on
//!   one node is unspecified.
//!
//! Events visit every accepting subscriber on the way; a subscriber
//! failure is re-published as a `SUBSCRIBER_EXCEPTION` event and never
//! reaches the publisher. Requests stop at the first accepting
//! service; the service's failure status (or `204 No Content` when the
//! handler simply never responded) always comes back to the client.

use std::sync::Arc;

use tracing::{trace, warn};
use trellis_types::{Features, Filtering, Status};

use crate::error::RouteError;
use crate::message::{Event, Request};
use crate::payload::Payload;
use crate::receiver::{handling_available, Service, Subscription};
use crate::topic::TopicPath;

/// Delivers an event to every accepting subscriber at its destination
/// and, if recursive, each ancestor up to the root.
pub(crate) fn publish(event: &Event) -> Result<(), RouteError> {
    let (start, resolved) = event.topic.resolution();
    let recursive = event.recursive();
    if !resolved && !recursive {
        // The destination was never realised and the event doesn't
        // propagate: nobody can see it.
        trace!(topic = event.topic.path(), "event to unrealised topic dropped");
        return Ok(());
    }

    let base = event.filtering - Filtering::RECURSIVE;
    let mut node = start;
    let mut at_destination = resolved;
    loop {
        let local_filtering = if at_destination {
            base
        } else {
            base | Filtering::RECURSIVE
        };
        for subscription in node.subscriptions() {
            if !subscription.policy().accepts(local_filtering) {
                continue;
            }
            let missing = subscription.policy().unhandled(event.requirements);
            if !handling_available(&event.topic, missing) {
                return Err(RouteError::HandlingUnavailable {
                    topic: event.topic.path().to_owned(),
                    missing,
                });
            }
            trace!(
                topic = event.topic.path(),
                node = node.path(),
                id = %event.id(),
                "delivering event"
            );
            if let Err(error) = subscription.call(event) {
                report_subscriber_failure(event, &subscription, error);
            }
        }
        if !recursive {
            break;
        }
        at_destination = false;
        let Some(parent) = node.parent().cloned() else {
            break;
        };
        node = parent;
    }
    Ok(())
}

/// Re-publishes a subscriber failure as a `SUBSCRIBER_EXCEPTION` event
/// carrying the error.
///
/// Normally the report goes to the failing subscriber's own topic. If
/// the event being handled was itself an exception report, the new
/// report goes to the *parent* topic instead: an exception handler
/// that fails must not be re-entered with its own failure.
fn report_subscriber_failure(event: &Event, subscription: &Subscription, error: anyhow::Error) {
    warn!(
        topic = subscription.node().path(),
        %error,
        "subscriber failed"
    );
    let nested = event.filtering.contains(Filtering::SUBSCRIBER_EXCEPTION);
    let (report_topic, filtering) = if nested {
        let Some(parent) = subscription.node().parent() else {
            // A failing exception handler on the root: nowhere further
            // up to report to.
            return;
        };
        (
            TopicPath::from_node(parent.clone()),
            Filtering::SUBSCRIBER_EXCEPTION | Filtering::RECURSIVE,
        )
    } else {
        (
            TopicPath::from_node(subscription.node().clone()),
            Filtering::SUBSCRIBER_EXCEPTION,
        )
    };
    let mut report = Event::new(report_topic, Status::INTERNAL_SERVER_ERROR)
        .with_payload(Payload::new(error))
        .with_filtering(filtering)
        .with_requirements(event.requirements);
    if let Err(error) = report.publish() {
        warn!(%error, "subscriber failure report dropped");
    }
}

/// Finds the service that will handle a request with the given
/// filtering: the destination's own service if it accepts, else (for
/// recursive requests) the first accepting service up the ancestor
/// chain.
pub(crate) fn find_service(topic: &TopicPath, filtering: Filtering) -> Option<Arc<Service>> {
    let (start, resolved) = topic.resolution();
    let recursive = filtering.contains(Filtering::RECURSIVE);
    if !resolved && !recursive {
        return None;
    }

    let base = filtering - Filtering::RECURSIVE;
    let mut node = start;
    let mut at_destination = resolved;
    loop {
        let local_filtering = if at_destination {
            base
        } else {
            base | Filtering::RECURSIVE
        };
        if let Some(service) = node.service() {
            if service.policy().accepts(local_filtering) {
                return Some(service);
            }
        }
        if !recursive {
            return None;
        }
        at_destination = false;
        node = node.parent()?.clone();
    }
}

/// Routes a request to its accepting service and guarantees a
/// response.
pub(crate) fn issue(request: &mut Request) -> Result<(), RouteError> {
    // Each issuance gets a fresh response slot.
    request.features -= Features::DID_RESPOND;

    let Some(service) = find_service(&request.topic, request.filtering) else {
        return Err(RouteError::ServiceNotFound(request.topic.path().to_owned()));
    };
    let missing = service.policy().unhandled(request.requirements);
    if !handling_available(&request.topic, missing) {
        return Err(RouteError::HandlingUnavailable {
            topic: request.topic.path().to_owned(),
            missing,
        });
    }

    trace!(
        topic = request.topic.path(),
        service = service.topic().path(),
        method = %request.method(),
        id = %request.id(),
        "dispatching request"
    );
    if let Err(failure) = service.call(request) {
        if let Some(source) = &failure.source {
            warn!(
                topic = request.topic.path(),
                status = %failure.status,
                %source,
                "service failed"
            );
        }
        request.respond(failure.status, Payload::empty());
    }

    // A service that never responded still owes the client an answer.
    if !request.features.contains(Features::DID_RESPOND) {
        request.respond_no_content();
    }
    request.features |= Features::DID_SEND;
    Ok(())
}
