//! Subtree traversal and receiver discovery.
//!
//! The `visit_*` functions walk a subtree once, up to a depth limit.
//! The `discover_*` functions combine that initial scan with a
//! subscription to the bus's `ANNOUNCE_RECEIVER` broadcasts, so the
//! callback sees both the receivers that already exist and every one
//! registered later, which is the pattern gateways use to mirror the
//! local bus onto some other medium.
//!
//! # Locking caveat
//!
//! Traversal read-locks the child table of each node it descends
//! through. A callback that mutates the traversed subtree (creating or
//! linking nodes under it) may deadlock. Keep callbacks short and
//! non-structural.
//!
//! # Redundancy caveat
//!
//! A receiver registered concurrently with the initial scan may be
//! reported twice (once by the scan, once by its announcement), and a
//! `discover_subscriptions` watcher reports its own registration.
//! Callbacks must tolerate duplicates.

use std::sync::Arc;

use trellis_types::Filtering;

use crate::receiver::{ReceiverPolicy, Service, Subscription};
use crate::topic::Topic;

/// Default traversal depth: effectively the whole subtree.
pub const FULL_DEPTH: usize = 255;

/// Visits `topic` and its descendants, up to `depth` generations below
/// it.
pub fn visit_resources(topic: &Topic, depth: usize, callback: &mut dyn FnMut(&Topic)) {
    callback(topic);
    if depth == 0 {
        return;
    }
    topic.node().visit_children(|_, child| {
        visit_resources(&Topic::from_node(child.clone()), depth - 1, callback);
    });
}

/// Visits every live service in the subtree.
pub fn visit_services(topic: &Topic, depth: usize, callback: &mut dyn FnMut(Arc<Service>)) {
    visit_resources(topic, depth, &mut |resource| {
        if let Some(service) = resource.current_service() {
            callback(service);
        }
    });
}

/// Visits every live subscription in the subtree.
pub fn visit_subscriptions(topic: &Topic, depth: usize, callback: &mut dyn FnMut(Arc<Subscription>)) {
    visit_resources(topic, depth, &mut |resource| {
        for subscription in resource.node().subscriptions() {
            callback(subscription);
        }
    });
}

/// Ignore mask for announcement watchers: skip ordinary application
/// traffic, let the bus broadcasts through.
fn watcher_policy() -> ReceiverPolicy {
    ReceiverPolicy::subscriber().with_ignore(Filtering::REGULAR)
}

/// Reports every existing service under `root`, then every service
/// created later, until the returned subscription is dropped.
#[must_use]
pub fn discover_services(
    root: &Topic,
    callback: impl Fn(Arc<Service>) + Send + Sync + 'static,
) -> Arc<Subscription> {
    let callback = Arc::new(callback);
    let watching = callback.clone();
    let watcher = root.subscribe_with(watcher_policy(), move |event| {
        if event.filtering.contains(Filtering::ANNOUNCE_RECEIVER) {
            if let Some(service) = event.get::<Arc<Service>>() {
                (*watching)(service.clone());
            }
        }
        Ok(())
    });
    visit_services(root, FULL_DEPTH, &mut |service| (*callback)(service));
    watcher
}

/// Reports every existing subscription under `root`, then every
/// subscription created later, until the returned subscription is
/// dropped.
#[must_use]
pub fn discover_subscriptions(
    root: &Topic,
    callback: impl Fn(Arc<Subscription>) + Send + Sync + 'static,
) -> Arc<Subscription> {
    let callback = Arc::new(callback);
    let watching = callback.clone();
    let watcher = root.subscribe_with(watcher_policy(), move |event| {
        if event.filtering.contains(Filtering::ANNOUNCE_RECEIVER) {
            if let Some(subscription) = event.get::<Arc<Subscription>>() {
                (*watching)(subscription.clone());
            }
        }
        Ok(())
    });
    visit_subscriptions(root, FULL_DEPTH, &mut |subscription| (*callback)(subscription));
    watcher
}
