//! # Events emitted by the controller and the bridges.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Registry events**: registration and metadata replacement
//! - **Delivery events**: broadcasts and per-service forwarding
//! - **Reply events**: how a service answered a signal
//! - **Liveness events**: polling limits and dead clients
//!
//! ## Ordering guarantees
//! Each event carries a global, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use flowvisor::{Event, EventKind, Signal};
//!
//! let ev = Event::new(EventKind::SignalForwarded)
//!     .with_service("billing")
//!     .with_signal(Signal::GracefulShutdown);
//!
//! assert_eq!(ev.kind, EventKind::SignalForwarded);
//! assert_eq!(ev.service.as_deref(), Some("billing"));
//! assert_eq!(ev.signal, Some(Signal::GracefulShutdown));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::protocol::{Directive, ReplyCode, Signal};
use crate::sid::Sid;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry ===
    /// A service was registered.
    ///
    /// Sets: `sid`, `service`
    ServiceRegistered,

    /// Stored metadata of a service was replaced.
    ///
    /// Sets: `sid`
    MetadataReplaced,

    /// A service's management task returned.
    ///
    /// Sets: `sid`, `service`, `reason` (error label, if it failed)
    ServiceExited,

    // === Delivery ===
    /// A termination signal was observed by the shutdown listener.
    ShutdownRequested,

    /// A directive was pushed through the broadcast registry.
    ///
    /// Sets: `directive`, `delivered` (number of live entries reached)
    DirectiveBroadcast,

    /// A directive could not be handed to a service's bridge.
    ///
    /// Sets: `sid`, `directive`, `reason`
    DeliveryFailed,

    /// A bridge forwarded a signal to its service.
    ///
    /// Sets: `sid`, `service`, `signal`
    SignalForwarded,

    /// A bridge sent a `Status` probe to a pending service.
    ///
    /// Sets: `sid`, `service`, `probes` (probes sent so far for this message)
    StatusProbed,

    // === Replies ===
    /// Service replied `Ok`.
    ///
    /// Sets: `sid`, `service`, `signal`, `reply`, `probes`
    ReplyOk,

    /// Service replied `Error`.
    ///
    /// Sets: `sid`, `service`, `signal`, `reply`, `probes`
    ClientsideError,

    /// Service replied `Unimplemented`.
    ///
    /// Sets: `sid`, `service`, `signal`, `reply`, `probes`
    ClientsideUnimplemented,

    /// Service replied with a code outside the protocol.
    ///
    /// Sets: `sid`, `service`, `signal`, `reply`, `probes`
    UnknownReply,

    // === Liveness ===
    /// Polling exceeded the configured limit; message abandoned.
    ///
    /// Sets: `sid`, `service`, `signal`, `probes`, `reason`
    PollingExhausted,

    /// No reply within the dead-client timeout; bridge stopped.
    ///
    /// Sets: `sid`, `service`, `signal`, `reason`
    DeadClient,
}

/// Protocol event with optional payload.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Service the event is about.
    pub sid: Option<Sid>,
    /// Display name of that service.
    pub service: Option<Arc<str>>,
    /// Directive being delivered.
    pub directive: Option<Directive>,
    /// Signal in flight.
    pub signal: Option<Signal>,
    /// Raw reply received.
    pub reply: Option<ReplyCode>,
    /// `Status` probes sent for the current message.
    pub probes: Option<u32>,
    /// Number of entries a broadcast reached.
    pub delivered: Option<usize>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event with the current timestamp and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            sid: None,
            service: None,
            directive: None,
            signal: None,
            reply: None,
            probes: None,
            delivered: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_sid(mut self, sid: Sid) -> Self {
        self.sid = Some(sid);
        self
    }

    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    #[inline]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = Some(directive);
        self
    }

    #[inline]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    #[inline]
    pub fn with_reply(mut self, reply: ReplyCode) -> Self {
        self.reply = Some(reply);
        self
    }

    #[inline]
    pub fn with_probes(mut self, probes: u32) -> Self {
        self.probes = Some(probes);
        self
    }

    #[inline]
    pub fn with_delivered(mut self, delivered: usize) -> Self {
        self.delivered = Some(delivered);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Returns `true` for replies that end a message without success.
    #[inline]
    pub fn is_reply_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ClientsideError
                | EventKind::ClientsideUnimplemented
                | EventKind::UnknownReply
                | EventKind::PollingExhausted
        )
    }
}
