//! End-to-end scenarios exercising the full bus surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trellis_bus::bind::expecting;
use trellis_bus::convert::{convert, define_conversion};
use trellis_bus::relay::relay_requests;
use trellis_bus::{ClientRef, Payload, ResourceNode, Response, Topic};
use trellis_types::{ErrorCode, Status};

fn fresh_root() -> Topic {
    Topic::from_node(ResourceNode::new_root("", '/'))
}

/// Collects response statuses delivered to a callback client.
fn status_sink() -> (ClientRef, Arc<Mutex<Vec<Status>>>) {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let client = ClientRef::callback(move |response: Response| {
        sink.lock().expect("no poison").push(response.status());
    });
    (client, statuses)
}

// Scenario A: a void service answers an empty POST with the default
// "204 No Content" and an empty payload.
#[test]
fn void_service_defaults_to_no_content() {
    let root = fresh_root();
    let topic = root.child("test/void");

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let _service = topic
        .serve(move |_request| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .expect("slot free");

    let payloads = Arc::new(Mutex::new(Vec::new()));
    let sink = payloads.clone();
    let client = ClientRef::callback(move |response: Response| {
        sink.lock()
            .expect("no poison")
            .push((response.status(), response.payload().is_empty()));
    });

    topic.post(client, Payload::empty()).expect("service exists");

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(
        *payloads.lock().expect("no poison"),
        vec![(Status::NO_CONTENT, true)]
    );
}

// Scenario B: a typed service observes its int payload and rejects a
// missing one with "415 Unsupported Media Type".
#[test]
fn typed_service_observes_int_and_rejects_empty() {
    let root = fresh_root();
    let topic = root.child("test/int");

    let observed = Arc::new(Mutex::new(Vec::new()));
    let seen = observed.clone();
    let _service = topic
        .serve_boxed(expecting::<i32, _>(move |_method, value| {
            seen.lock().expect("no poison").push(*value);
            Ok(Status::NO_CONTENT)
        }))
        .expect("slot free");

    let (client, statuses) = status_sink();
    topic
        .post(client.clone(), Payload::new(13_i32))
        .expect("service exists");
    topic.post(client, Payload::empty()).expect("service exists");

    assert_eq!(*observed.lock().expect("no poison"), vec![13]);
    assert_eq!(
        *statuses.lock().expect("no poison"),
        vec![Status::NO_CONTENT, Status::UNSUPPORTED_MEDIA_TYPE]
    );
}

// Scenario C: a request relay forwards to the real service; the
// response reaches the original client and names the *destination*
// topic.
#[test]
fn request_relay_forwards_and_response_names_destination() {
    let root = fresh_root();
    let proxy = root.child("test/proxy");
    let real = root.child("test/method");

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let _service = real
        .serve(move |_request| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .expect("slot free");

    let _relay = relay_requests(&proxy, &real)
        .expect("no loop")
        .expect("slot free");

    let answered = Arc::new(Mutex::new(Vec::new()));
    let sink = answered.clone();
    let client = ClientRef::callback(move |response: Response| {
        sink.lock()
            .expect("no poison")
            .push((response.status(), response.topic.path().to_owned()));
    });

    proxy.post(client, Payload::empty()).expect("relay accepts");

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(
        *answered.lock().expect("no poison"),
        vec![(Status::NO_CONTENT, "test/method".to_owned())]
    );
}

// Scenario D: a recursive subscription on "apple" hears events under
// apple/* exactly once each and nothing from other subtrees.
#[test]
fn recursive_subscription_covers_subtree_only() {
    let root = fresh_root();
    let apple = root.child("apple");
    let apple_1 = root.child("apple/1");
    let _apple_2 = root.child("apple/2");
    let banana_3 = root.child("banana/3");

    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let _subscription = apple.subscribe(move |_event| {
        seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    apple_1.publish(Status::OK, Payload::empty()).expect("ok");
    assert_eq!(count.load(Ordering::Relaxed), 1);

    banana_3.publish(Status::OK, Payload::empty()).expect("ok");
    assert_eq!(count.load(Ordering::Relaxed), 1);
}

// Scenario E: conversion rules work through the global registry and
// disappear with their handles.
#[test]
fn conversion_rules_register_and_expire() {
    let int_to_string = define_conversion(|x: &i32| x.to_string());
    let _string_to_int = define_conversion(|s: &String| s.parse::<i32>().unwrap_or(0));

    assert_eq!(convert::<String>(&5).as_deref(), Ok("5"));
    assert_eq!(convert::<i32>(&"5".to_string()), Ok(5));

    drop(int_to_string);
    let err = convert::<String>(&5).expect_err("rule expired");
    assert_eq!(err.code(), "CONVERT_NO_RULE");
    // The reverse direction is untouched.
    assert_eq!(convert::<i32>(&"7".to_string()), Ok(7));
}

// Scenario F: a throwing subscriber triggers a SUBSCRIBER_EXCEPTION
// event carrying the error; publishing returns cleanly.
#[test]
fn subscriber_failure_is_republished() {
    use trellis_bus::ReceiverPolicy;
    use trellis_types::Filtering;

    let root = fresh_root();
    let x = root.child("x");

    let _failing = x.subscribe(|_event| Err(anyhow::anyhow!("boom")));

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let _watcher = x.subscribe_with(
        ReceiverPolicy::subscriber()
            .with_ignore(Filtering::DEFAULT_SUBSCRIBER_IGNORE - Filtering::SUBSCRIBER_EXCEPTION),
        move |event| {
            if event.filtering.contains(Filtering::SUBSCRIBER_EXCEPTION) {
                let message = event
                    .get::<anyhow::Error>()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                sink.lock()
                    .expect("no poison")
                    .push((event.status(), message));
            }
            Ok(())
        },
    );

    x.publish(Status::OK, Payload::empty()).expect("publishes cleanly");

    assert_eq!(
        *reports.lock().expect("no poison"),
        vec![(Status::INTERNAL_SERVER_ERROR, "boom".to_owned())]
    );
}

// A failing exception handler reports to the parent topic instead of
// re-entering itself.
#[test]
fn failing_exception_handler_reports_to_parent() {
    use trellis_bus::ReceiverPolicy;
    use trellis_types::Filtering;

    let root = fresh_root();
    let leaf = root.child("tree/leaf");
    let branch = root.child("tree");

    let _failing = leaf.subscribe(|_event| Err(anyhow::anyhow!("primary failure")));

    let watch_exceptions = || {
        ReceiverPolicy::subscriber()
            .with_ignore(Filtering::DEFAULT_SUBSCRIBER_IGNORE - Filtering::SUBSCRIBER_EXCEPTION)
    };

    // The exception handler itself fails too.
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let counted = handler_calls.clone();
    let _bad_handler = leaf.subscribe_with(watch_exceptions(), move |event| {
        if event.filtering.contains(Filtering::SUBSCRIBER_EXCEPTION) {
            counted.fetch_add(1, Ordering::Relaxed);
            return Err(anyhow::anyhow!("handler failure"));
        }
        Ok(())
    });

    // The parent hears about the handler's failure.
    let parent_reports = Arc::new(AtomicUsize::new(0));
    let counted = parent_reports.clone();
    let _parent_watcher = branch.subscribe_with(watch_exceptions(), move |event| {
        if event.filtering.contains(Filtering::SUBSCRIBER_EXCEPTION) {
            counted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    });

    leaf.publish(Status::OK, Payload::empty()).expect("publishes cleanly");

    // The bad handler ran exactly once: its own failure skipped it and
    // went to the parent.
    assert_eq!(handler_calls.load(Ordering::Relaxed), 1);
    assert!(parent_reports.load(Ordering::Relaxed) >= 1);
}

// One-shot clients complete their future exactly once, and awaiting
// works from an async host.
#[tokio::test]
async fn channel_client_completes_future() {
    let root = fresh_root();
    let topic = root.child("async/echo");

    let _service = topic
        .serve(|request| {
            let value = request.get::<u32>().copied().unwrap_or(0);
            request.respond_ok(Payload::new(value + 1));
            Ok(())
        })
        .expect("slot free");

    let (client, rx) = ClientRef::channel();
    topic.post(client, Payload::new(41_u32)).expect("service exists");

    let response = rx.await.expect("completed exactly once");
    assert_eq!(response.status(), Status::OK);
    assert_eq!(response.get::<u32>(), Some(&42));
}

// Dropping the receiver before the response arrives discards the
// response without error.
#[test]
fn dropped_receiver_is_silent_cancellation() {
    let root = fresh_root();
    let topic = root.child("cancelled");
    let _service = topic
        .serve(|request| {
            request.respond_ok(Payload::empty());
            Ok(())
        })
        .expect("slot free");

    let (client, rx) = ClientRef::channel();
    drop(rx);
    topic.post(client, Payload::empty()).expect("still issues");
}

// A service handler failing with a status delivers that status as the
// response.
#[test]
fn service_status_error_becomes_response() {
    let root = fresh_root();
    let topic = root.child("teapot");
    let _service = topic
        .serve(|_request| Err(Status::IM_A_TEAPOT.into()))
        .expect("slot free");

    let (client, statuses) = status_sink();
    topic.post(client, Payload::empty()).expect("service exists");
    assert_eq!(
        *statuses.lock().expect("no poison"),
        vec![Status::IM_A_TEAPOT]
    );
}

// Structured payloads pass through untouched; the bus never inspects
// them.
#[test]
fn json_payload_roundtrip() {
    let root = fresh_root();
    let topic = root.child("config");

    let _service = topic
        .serve(|request| {
            let doc = request
                .get::<serde_json::Value>()
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let name = doc["name"].as_str().unwrap_or("unknown").to_owned();
            request.respond_ok(Payload::new(serde_json::json!({ "hello": name })));
            Ok(())
        })
        .expect("slot free");

    let (client, mut rx) = ClientRef::channel();
    topic
        .put(client, Payload::new(serde_json::json!({ "name": "trellis" })))
        .expect("service exists");

    let response = rx.try_recv().expect("responded");
    let doc = response.get::<serde_json::Value>().expect("json payload");
    assert_eq!(doc["hello"], "trellis");
}

// Shared payloads pass large values by reference; every subscriber
// sees the same allocation.
#[test]
fn shared_payload_is_not_copied() {
    let root = fresh_root();
    let topic = root.child("blob");

    let blob = Arc::new(vec![7_u8; 4096]);
    let expected = blob.as_ptr() as usize;
    let observed = Arc::new(Mutex::new(Vec::new()));

    let sink = observed.clone();
    let _sub = topic.subscribe(move |event| {
        let seen = event.get::<Vec<u8>>().expect("typed payload");
        sink.lock()
            .expect("no poison")
            .push(seen.as_ptr() as usize == expected);
        Ok(())
    });

    topic
        .publish(Status::OK, Payload::shared(blob.clone()))
        .expect("ok");

    // The subscriber saw the very bytes the publisher kept.
    assert_eq!(*observed.lock().expect("no poison"), vec![true]);
}
