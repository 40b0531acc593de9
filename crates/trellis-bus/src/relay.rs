//! Relays: receivers that forward messages to another topic.
//!
//! An event relay is a subscription that republishes whatever it
//! receives onto a destination topic, preserving status, filtering and
//! requirements. A request relay is a service that rewrites a
//! request's destination and re-issues it, so the response flows back
//! to the original client.
//!
//! Both reject construction when the destination lies inside the
//! source subtree: forwarded recursive traffic would climb back
//! through the source and loop forever.

use std::sync::Arc;

use trellis_types::Status;

use crate::dispatch;
use crate::error::{RouteError, StatusError};
use crate::message::Event;
use crate::receiver::{Service, Subscription};
use crate::topic::{Topic, TopicPath};

fn loop_check(source: &Topic, destination: &Topic) -> Result<(), RouteError> {
    if source.is_ancestor_of(destination) {
        return Err(RouteError::RelayLoop {
            source_topic: source.path().to_owned(),
            destination: destination.path().to_owned(),
        });
    }
    Ok(())
}

/// Republishes events arriving at `source` onto `destination`.
///
/// The relay lives as long as the returned subscription handle.
///
/// # Errors
///
/// [`RouteError::RelayLoop`] when `destination` is `source` or one of
/// its descendants.
pub fn relay_events(source: &Topic, destination: &Topic) -> Result<Arc<Subscription>, RouteError> {
    loop_check(source, destination)?;
    let forward_to = TopicPath::from(destination);
    Ok(source.subscribe(move |event| {
        let mut forwarded = Event::new(forward_to.clone(), event.status())
            .with_payload(event.payload().clone())
            .with_filtering(event.filtering)
            .with_requirements(event.requirements);
        forwarded.publish()?;
        Ok(())
    }))
}

/// Re-issues requests arriving at `source` against `destination`.
///
/// The response reaches the original client and names the destination
/// topic, exactly as if the caller had addressed it directly. A
/// destination without an accepting service is answered with
/// `502 Bad Gateway`.
///
/// # Errors
///
/// [`RouteError::RelayLoop`] when `destination` is `source` or one of
/// its descendants. Returns `Ok(None)` when `source` already has a
/// service.
pub fn relay_requests(
    source: &Topic,
    destination: &Topic,
) -> Result<Option<Arc<Service>>, RouteError> {
    loop_check(source, destination)?;
    let forward_to = TopicPath::from(destination);
    Ok(source.serve(move |request| {
        request.topic = forward_to.clone();
        match dispatch::issue(request) {
            Ok(()) => Ok(()),
            Err(RouteError::ServiceNotFound(_)) => Err(StatusError::new(Status::BAD_GATEWAY)),
            Err(other) => Err(StatusError::with_source(Status::BAD_GATEWAY, other.into())),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ResourceNode;
    use crate::payload::Payload;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use trellis_types::ErrorCode;

    fn root() -> Topic {
        Topic::from_node(ResourceNode::new_root("", '/'))
    }

    #[test]
    fn event_relay_forwards() {
        let root = root();
        let source = root.child("in");
        let destination = root.child("out");

        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let _listener = destination.subscribe(move |event| {
            assert_eq!(event.get::<i32>(), Some(&9));
            assert_eq!(event.status(), Status::OK);
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        let _relay = relay_events(&source, &destination).expect("no loop");
        source.publish(Status::OK, Payload::new(9_i32)).expect("ok");
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn event_relay_rejects_descendant_destination() {
        let root = root();
        let source = root.child("zone");
        let inside = root.child("zone/inner");

        let err = relay_events(&source, &inside).expect_err("loop");
        assert_eq!(err.code(), "BUS_RELAY_LOOP");

        let err = relay_events(&source, &source).expect_err("self loop");
        assert_eq!(err.code(), "BUS_RELAY_LOOP");
    }

    #[test]
    fn event_relay_to_ancestor_is_allowed() {
        let root = root();
        let source = root.child("deep/leaf");
        let destination = root.child("deep");
        assert!(relay_events(&source, &destination).is_ok());
    }

    #[test]
    fn request_relay_rejects_descendant_destination() {
        let root = root();
        let source = root.child("proxy");
        let inside = root.child("proxy/backend");
        let err = relay_requests(&source, &inside).expect_err("loop");
        assert_eq!(err.code(), "BUS_RELAY_LOOP");
    }

    #[test]
    fn request_relay_bad_gateway_without_upstream() {
        let root = root();
        let source = root.child("proxy");
        let destination = root.child("void");
        let _relay = relay_requests(&source, &destination)
            .expect("no loop")
            .expect("slot free");

        let (client, mut rx) = crate::client::ClientRef::channel();
        source.post(client, Payload::empty()).expect("relay accepts");
        let response = rx.try_recv().expect("responded");
        assert_eq!(response.status(), Status::BAD_GATEWAY);
    }

    #[test]
    fn request_relay_occupied_slot() {
        let root = root();
        let source = root.child("proxy");
        let destination = root.child("real");
        let _existing = source.serve(|request| {
            request.respond_no_content();
            Ok(())
        });
        assert!(relay_requests(&source, &destination)
            .expect("no loop")
            .is_none());
    }
}
