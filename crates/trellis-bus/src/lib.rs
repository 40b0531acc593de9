//! In-process message bus over a hierarchical resource namespace.
//!
//! Trellis unifies two messaging patterns, publish/subscribe (events)
//! and request/response (services), over one tree of *resources*
//! addressed by slash-delimited paths, with HTTP's methods and status
//! codes as the shared vocabulary.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        resource trie                         │
//! │                                                              │
//! │   ""  ──── "sensors" ──── "sensors/door"                     │
//! │                    │          · 1 service slot               │
//! │                    │          · N subscribers                │
//! │                    └───── "sensors/motion"                   │
//! │                                                              │
//! │   Event    ──► every accepting subscriber, leaf-first up     │
//! │   Request  ──► exactly one accepting service                 │
//! │   Response ──► the client bound to the request               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything is owned cooperatively: subscriptions and services own
//! their node, nodes own their parents, and the handles returned by
//! `subscribe`/`serve` are the *sole* owners of the receivers. Dropping
//! a handle unregisters the receiver; a node disappears with its last
//! member. There is no explicit removal anywhere.
//!
//! # Addressing
//!
//! [`Topic`] pins a node eagerly; [`TopicPath`] addresses one lazily
//! and is what messages carry; REST-ish leaf resources (ids, keys)
//! only come into being when something registers there.
//!
//! # Example
//!
//! ```
//! use trellis_bus::{global, ClientRef, Payload};
//! use trellis_types::Status;
//!
//! // A service answering POSTs under "store/items".
//! let _service = global::serve("doc/store/items", |request| {
//!     let item = request.get::<String>().cloned().unwrap_or_default();
//!     request.respond_created(Payload::new(format!("stored {item}")));
//!     Ok(())
//! });
//!
//! // A subscriber watching the same subtree.
//! let _audit = global::subscribe("doc/store", |event| {
//!     println!("store event: {}", event.status());
//!     Ok(())
//! });
//!
//! // Request/response.
//! let (client, mut rx) = ClientRef::channel();
//! global::post("doc/store/items", client, Payload::new("apples".to_string())).unwrap();
//! assert_eq!(rx.try_recv().unwrap().status(), Status::CREATED);
//!
//! // Publish; the subscriber sees it because events recurse upward.
//! global::publish("doc/store/items", Status::OK, Payload::empty()).unwrap();
//! ```
//!
//! # Concurrency
//!
//! The hot paths (subscribe, publish, issue, iterate) are wait-free,
//! built on the cooperative containers in `trellis-coop`; the only
//! blocking synchronisation is the reader/writer lock inside each
//! node's child table. Dispatch is synchronous and sequential per
//! call; async hosts interoperate through one-shot response channels
//! ([`ClientRef::channel`]).

pub mod bind;
mod client;
pub mod convert;
mod dispatch;
pub mod discover;
mod error;
pub mod global;
mod message;
mod node;
pub mod path;
mod payload;
mod receiver;
pub mod relay;
mod topic;

pub use client::{Client, ClientRef};
pub use error::{BadCast, RouteError, StatusError};
pub use message::{Event, Message, MessageId, Request, Response};
pub use node::ResourceNode;
pub use payload::Payload;
pub use receiver::{
    clear_handling_interceptor, set_handling_interceptor, ReceiverPolicy, Service, ServiceFn,
    SubscriberFn, Subscription,
};
pub use topic::{Topic, TopicPath};

// The vocabulary crate, re-exported for one-stop imports.
pub use trellis_types as types;
