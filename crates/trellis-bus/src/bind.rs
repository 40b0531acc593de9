//! Typed service adapters.
//!
//! A raw service handler works on the whole [`Request`]. These
//! combinators wrap typed, narrower handlers and take care of the
//! boundary chores:
//!
//! - [`expecting`] casts the payload, answering
//!   `415 Unsupported Media Type` when the cast fails;
//! - [`methods`] gates the allowed method set, answering `OPTIONS`
//!   with the set and `405 Method Not Allowed` otherwise;
//! - [`with_object`] locks a weak handler object per call, answering
//!   `410 Gone` once the object is dead.
//!
//! Combinators compose inside-out:
//!
//! ```
//! use trellis_bus::bind::{expecting, methods};
//! use trellis_bus::global;
//! use trellis_types::{Method, MethodSet, Status};
//!
//! let handler = methods(
//!     MethodSet::from(Method::Post),
//!     expecting::<i32, _>(|_method, value| {
//!         println!("got {value}");
//!         Ok(Status::NO_CONTENT)
//!     }),
//! );
//! let _service = global::topic("doc/counter").serve_boxed(handler);
//! ```

use std::sync::Weak;

use trellis_types::{Method, MethodSet, Status};

use crate::error::StatusError;
use crate::message::Request;
use crate::payload::Payload;
use crate::receiver::ServiceFn;

/// Wraps a handler that expects a payload of type `T`.
///
/// The handler returns the status to respond with; an empty or
/// differently-typed payload is answered with
/// `415 Unsupported Media Type` without invoking the handler.
pub fn expecting<T, F>(handler: F) -> ServiceFn
where
    T: 'static,
    F: Fn(Method, &T) -> Result<Status, StatusError> + Send + Sync + 'static,
{
    Box::new(move |request: &mut Request| {
        let method = request.method();
        let outcome = request.get::<T>().map(|value| handler(method, value));
        match outcome {
            Some(result) => {
                let status = result?;
                request.respond(status, Payload::empty());
            }
            None => request.respond_unsupported_media_type(),
        }
        Ok(())
    })
}

/// Gates `inner` behind an allowed method set.
///
/// `OPTIONS` is answered directly with the allowed set (plus
/// `OPTIONS` itself); any other method outside the set is answered
/// with `405 Method Not Allowed`.
pub fn methods(allowed: MethodSet, inner: ServiceFn) -> ServiceFn {
    Box::new(move |request: &mut Request| {
        let method = request.method();
        if method == Method::Options {
            request.respond_ok(Payload::new(allowed + Method::Options));
            Ok(())
        } else if !allowed.contains(method) {
            request.respond_method_not_allowed();
            Ok(())
        } else {
            inner(request)
        }
    })
}

/// Dispatches to a method of a weakly-held object.
///
/// The weak reference is locked on every call; once the object is
/// gone, requests are answered with `410 Gone` while the service
/// handle itself may outlive it.
pub fn with_object<S, F>(object: Weak<S>, handler: F) -> ServiceFn
where
    S: Send + Sync + 'static,
    F: Fn(&S, &mut Request) -> Result<(), StatusError> + Send + Sync + 'static,
{
    Box::new(move |request: &mut Request| match object.upgrade() {
        Some(strong) => handler(&strong, request),
        None => {
            request.respond_gone();
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientRef;
    use crate::message::Response;
    use crate::node::ResourceNode;
    use crate::topic::Topic;
    use std::sync::{Arc, Mutex};

    fn fresh_topic(path: &str) -> Topic {
        Topic::from_node(ResourceNode::new_root("", '/')).child(path)
    }

    fn capture() -> (ClientRef, Arc<Mutex<Vec<Status>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let client = ClientRef::callback(move |response: Response| {
            sink.lock().expect("no poison").push(response.status());
        });
        (client, seen)
    }

    #[test]
    fn expecting_passes_typed_payload() {
        let topic = fresh_topic("typed");
        let observed = Arc::new(Mutex::new(None));
        let inner = observed.clone();
        let _svc = topic.serve_boxed(expecting::<i32, _>(move |_method, value| {
            *inner.lock().expect("no poison") = Some(*value);
            Ok(Status::NO_CONTENT)
        }));

        let (client, seen) = capture();
        topic.post(client, Payload::new(13_i32)).expect("service exists");

        assert_eq!(*observed.lock().expect("no poison"), Some(13));
        assert_eq!(*seen.lock().expect("no poison"), vec![Status::NO_CONTENT]);
    }

    #[test]
    fn expecting_rejects_missing_payload() {
        let topic = fresh_topic("typed");
        let _svc = topic.serve_boxed(expecting::<i32, _>(|_, _| Ok(Status::NO_CONTENT)));

        let (client, seen) = capture();
        topic.post(client, Payload::empty()).expect("service exists");
        assert_eq!(
            *seen.lock().expect("no poison"),
            vec![Status::UNSUPPORTED_MEDIA_TYPE]
        );
    }

    #[test]
    fn expecting_rejects_wrong_type() {
        let topic = fresh_topic("typed");
        let _svc = topic.serve_boxed(expecting::<i32, _>(|_, _| Ok(Status::NO_CONTENT)));

        let (client, seen) = capture();
        topic
            .post(client, Payload::new("not an int"))
            .expect("service exists");
        assert_eq!(
            *seen.lock().expect("no poison"),
            vec![Status::UNSUPPORTED_MEDIA_TYPE]
        );
    }

    #[test]
    fn methods_gate_and_options() {
        let topic = fresh_topic("gated");
        let _svc = topic.serve_boxed(methods(
            MethodSet::from(Method::Post),
            Box::new(|request| {
                request.respond_ok(Payload::empty());
                Ok(())
            }),
        ));

        let (client, seen) = capture();
        topic.post(client.clone(), Payload::empty()).expect("ok");
        topic.delete(client.clone()).expect("ok");
        topic
            .request(client, Method::Options, Payload::empty())
            .expect("ok");

        assert_eq!(
            *seen.lock().expect("no poison"),
            vec![Status::OK, Status::METHOD_NOT_ALLOWED, Status::OK]
        );
    }

    #[test]
    fn options_reports_allowed_set() {
        let topic = fresh_topic("gated");
        let allowed = Method::Post + Method::Put;
        let _svc = topic.serve_boxed(methods(
            allowed,
            Box::new(|request| {
                request.respond_no_content();
                Ok(())
            }),
        ));

        let reported = Arc::new(Mutex::new(None));
        let sink = reported.clone();
        let client = ClientRef::callback(move |response: Response| {
            *sink.lock().expect("no poison") = response.get::<MethodSet>().copied();
        });
        topic
            .request(client, Method::Options, Payload::empty())
            .expect("service exists");

        let set = reported.lock().expect("no poison").expect("options answered");
        assert!(set.contains(Method::Post));
        assert!(set.contains(Method::Put));
        assert!(set.contains(Method::Options));
        assert!(!set.contains(Method::Delete));
    }

    #[test]
    fn with_object_responds_gone_after_drop() {
        let topic = fresh_topic("owned");
        let object = Arc::new(42_i32);
        let _svc = topic.serve_boxed(with_object(
            Arc::downgrade(&object),
            |value: &i32, request| {
                assert_eq!(*value, 42);
                request.respond_ok(Payload::empty());
                Ok(())
            },
        ));

        let (client, seen) = capture();
        topic.post(client.clone(), Payload::empty()).expect("ok");
        drop(object);
        topic.post(client, Payload::empty()).expect("ok");

        assert_eq!(
            *seen.lock().expect("no poison"),
            vec![Status::OK, Status::GONE]
        );
    }
}
