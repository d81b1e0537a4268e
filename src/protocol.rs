//! # Flow protocol: the fixed vocabulary spoken over every tunnel.
//!
//! The protocol has two stages:
//!
//! 1. The controller sends a primary signal ([`Signal`]):
//!    - [`Signal::GracefulShutdown`]
//!    - [`Signal::MetadataUpdated`]
//!    - [`Signal::WaitFor`] (always followed by [`Signal::Continue`])
//!    - [`Signal::Continue`]
//!    - [`Signal::Status`] (only while the service keeps replying [`Reply::Pending`])
//! 2. The service answers with exactly one [`Reply`].
//!
//! ## Exchange
//! ```text
//! controller                         service
//!     │── Signal ──────────────────────►│
//!     │◄────────────────────── Pending ─│
//!     │   (sleep STATUS_INTERVAL)       │
//!     │── Status ──────────────────────►│
//!     │◄────────────────────── Pending ─│
//!     │   ...                           │
//!     │── Status ──────────────────────►│
//!     │◄─────────── Ok/Error/Unimplemented
//! ```
//!
//! ## Rules
//! - Every stage-1 signal receives exactly one terminal reply.
//! - Each `Pending` triggers exactly one `Status` probe.
//! - Replies travel as raw [`ReplyCode`]s; codes outside [`Reply`] are
//!   reported as unknown replies by the bridge.

use std::fmt;
use std::time::Duration;

/// Silence after which a service is declared dead.
pub const DEAD_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cadence of [`Signal::Status`] probes while a service replies [`Reply::Pending`].
pub const STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Buffer depth of each direction of a tunnel.
pub const TUNNEL_CAPACITY: usize = 1;

/// Buffer depth of each per-service delivery channel in the broadcast registry.
pub const DELIVERY_CAPACITY: usize = 1;

/// Stage 1: signals sent from the controller to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Signal {
    /// The process is shutting down; finish work and reply.
    GracefulShutdown = 0,
    /// Sent only when the service's metadata was replaced.
    MetadataUpdated = 1,
    /// Pause; guaranteed to be followed by [`Signal::Continue`].
    WaitFor = 2,
    /// Resume; guaranteed to be sent right after [`Signal::WaitFor`].
    Continue = 3,
    /// Liveness probe, sent every [`STATUS_INTERVAL`] while the service is pending.
    Status = 4,
}

impl Signal {
    /// Numeric wire code of the signal.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Signal::GracefulShutdown => "graceful_shutdown",
            Signal::MetadataUpdated => "metadata_updated",
            Signal::WaitFor => "wait_for",
            Signal::Continue => "continue",
            Signal::Status => "status",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Stage 2: replies sent from a service back to the controller.
///
/// Success replies live in the `2xx` range, client-side failures in `4xx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Reply {
    /// Message handled.
    Ok = 200,
    /// Still working; the controller will probe with [`Signal::Status`].
    Pending = 201,
    /// Client-side error while handling the message.
    Error = 400,
    /// Default reply for signals the service does not handle.
    Unimplemented = 401,
}

impl Reply {
    /// Raw code carried on the reply channel.
    #[inline]
    pub fn code(self) -> ReplyCode {
        ReplyCode(self as u16)
    }

    /// Returns `true` for every reply except [`Reply::Pending`].
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Reply::Pending)
    }

    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Reply::Ok => "ok",
            Reply::Pending => "pending",
            Reply::Error => "error",
            Reply::Unimplemented => "unimplemented",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Raw stage-2 value as it travels over the tunnel.
///
/// The high-level tunnel API only produces codes of known [`Reply`]s; the
/// low-level API may send anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyCode(pub u16);

impl From<Reply> for ReplyCode {
    fn from(reply: Reply) -> Self {
        reply.code()
    }
}

impl TryFrom<ReplyCode> for Reply {
    type Error = ReplyCode;

    fn try_from(code: ReplyCode) -> Result<Self, ReplyCode> {
        match code.0 {
            200 => Ok(Reply::Ok),
            201 => Ok(Reply::Pending),
            400 => Ok(Reply::Error),
            401 => Ok(Reply::Unimplemented),
            _ => Err(code),
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a controller may push to services through the broadcast registry.
///
/// [`Signal::Status`] and [`Signal::Continue`] are never pushed directly: the
/// bridge produces them itself as part of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Forwarded as [`Signal::GracefulShutdown`].
    GracefulShutdown,
    /// Forwarded as [`Signal::MetadataUpdated`].
    MetadataUpdated,
    /// Forwarded as [`Signal::WaitFor`] immediately followed by [`Signal::Continue`].
    WaitFor,
}

impl Directive {
    /// Signals the bridge forwards for this directive, in order.
    pub fn signals(self) -> &'static [Signal] {
        match self {
            Directive::GracefulShutdown => &[Signal::GracefulShutdown],
            Directive::MetadataUpdated => &[Signal::MetadataUpdated],
            Directive::WaitFor => &[Signal::WaitFor, Signal::Continue],
        }
    }

    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Directive::GracefulShutdown => "graceful_shutdown",
            Directive::MetadataUpdated => "metadata_updated",
            Directive::WaitFor => "wait_for",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
