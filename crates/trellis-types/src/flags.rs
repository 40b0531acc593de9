//! Message flag sets.
//!
//! Three 16-bit sets travel with every message:
//!
//! - [`Features`]: state the runtime records as the message moves
//!   (sent, responded). Never set by application code.
//! - [`Filtering`]: properties of the message. Each receiver carries
//!   an *ignore mask*; a message is delivered only if its filtering
//!   bits don't intersect that mask.
//! - [`Handling`]: constraints the message places on whoever handles
//!   it. A receiver that hasn't declared a required capability cannot
//!   take the message.
//!
//! # Bit layout
//!
//! Filtering bits 15..8 are reserved for the bus, bits 7..0 for the
//! application. Under the default ignore mask (`0x7F00`) receivers skip
//! the bus-internal broadcasts (announcements, exception reports,
//! logging) while still seeing recursive traffic; services opt out of
//! recursive traffic on top of that.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// State recorded on a message by the runtime.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Features: u16 {
        /// The message has been dispatched at least once.
        const DID_SEND = 1 << 8;
        /// A response has been produced for the current issuance.
        const DID_RESPOND = 1 << 9;
    }
}

bitflags! {
    /// Properties of a message, matched against receiver ignore masks.
    ///
    /// | Flag | Default behaviour |
    /// |------|-------------------|
    /// | [`RECURSIVE`](Self::RECURSIVE) | subscribers accept, services ignore |
    /// | [`ANNOUNCE_RECEIVER`](Self::ANNOUNCE_RECEIVER) | ignored |
    /// | [`SUBSCRIBER_EXCEPTION`](Self::SUBSCRIBER_EXCEPTION) | ignored |
    /// | [`LOGGING`](Self::LOGGING) | ignored |
    /// | [`INTERNAL`](Self::INTERNAL) | accepted |
    /// | [`REMOTE`](Self::REMOTE) | accepted |
    /// | [`REGULAR`](Self::REGULAR) | accepted |
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Filtering: u16 {
        /// The message propagates along the parent chain of its
        /// destination. Recursive requests stop at the first accepting
        /// service; recursive events continue to the root.
        ///
        /// Dispatch clears this bit while examining the exact
        /// destination node and sets it at ancestors, so ignoring
        /// `RECURSIVE` only rejects traffic arriving from
        /// sub-resources.
        const RECURSIVE = 1 << 15;

        /// Published by the bus when a service or subscription is
        /// created. The payload is the new receiver handle.
        const ANNOUNCE_RECEIVER = 1 << 14;

        /// Published by the bus when a subscriber fails. The payload
        /// is the captured error.
        const SUBSCRIBER_EXCEPTION = 1 << 13;

        /// Application hint: noise most subscribers don't want.
        const LOGGING = 1 << 8;

        /// Application hint: must not leave the process boundary.
        const INTERNAL = 1 << 7;

        /// Application hint: originated outside the process boundary.
        const REMOTE = 1 << 6;

        /// An ordinary application message. Set and accepted by
        /// default.
        const REGULAR = 1 << 0;
    }
}

impl Filtering {
    /// Default filtering applied to newly constructed messages.
    pub const DEFAULT_MESSAGE: Filtering = Filtering::REGULAR.union(Filtering::RECURSIVE);

    /// Base ignore mask shared by receivers: bus broadcasts and
    /// logging are skipped, recursive traffic is not.
    pub const DEFAULT_IGNORE: Filtering = Filtering::ANNOUNCE_RECEIVER
        .union(Filtering::SUBSCRIBER_EXCEPTION)
        .union(Filtering::LOGGING);

    /// Default ignore mask for subscribers.
    pub const DEFAULT_SUBSCRIBER_IGNORE: Filtering = Filtering::DEFAULT_IGNORE;

    /// Default ignore mask for services: as subscribers, plus
    /// recursive traffic from sub-resources.
    pub const DEFAULT_SERVICE_IGNORE: Filtering =
        Filtering::DEFAULT_IGNORE.union(Filtering::RECURSIVE);

    /// Default ignore mask for clients: nothing.
    pub const DEFAULT_CLIENT_IGNORE: Filtering = Filtering::empty();
}

bitflags! {
    /// Constraints a message places on its handler.
    ///
    /// A receiver that has not declared a matching capability cannot
    /// handle the message; dispatch reports `HandlingUnavailable`
    /// unless the host has installed an interceptor.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Handling: u16 {
        /// The payload must not be copied.
        const NO_COPYING = 1 << 15;
        /// The payload must not be moved out.
        const NO_MOVING = 1 << 14;
        /// The response may not be deferred.
        const IMMEDIATE = 1 << 11;
        /// The handler must be non-blocking.
        const REALTIME = 1 << 10;
    }
}
