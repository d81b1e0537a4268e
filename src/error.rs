//! Error types used by the flowvisor controller, bridges, tunnels and services.
//!
//! - [`ControllerError`] - returned to callers of the controller API.
//! - [`ConfigError`] - invalid configuration values.
//! - [`ProtocolError`] - protocol anomalies observed by a bridge (logged, never propagated).
//! - [`TunnelError`] - failures of the service-facing tunnel half.
//! - [`ServiceError`] - returned by a service's management task.
//!
//! Every enum provides `as_label` for logs.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::ReplyCode;
use crate::sid::Sid;

/// # Errors returned by the controller API.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControllerError {
    /// No metadata is stored under the given identifier.
    #[error("metadata not found for service {sid}")]
    MetadataNotFound {
        /// The identifier that was looked up.
        sid: Sid,
    },

    /// The configuration was produced for a different controller.
    #[error("configuration key {found:?} does not match controller key {expected:?}")]
    ConfigKeyMismatch {
        /// Key compiled into this controller.
        expected: &'static str,
        /// Key carried by the supplied configuration.
        found: String,
    },

    /// Configuration (or a per-registration override) failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registration requires a running tokio runtime.
    #[error("no tokio runtime available to spawn service tasks")]
    NoRuntime,
}

impl ControllerError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use flowvisor::ControllerError;
    ///
    /// let err = ControllerError::NoRuntime;
    /// assert_eq!(err.as_label(), "controller_no_runtime");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ControllerError::MetadataNotFound { .. } => "metadata_not_found",
            ControllerError::ConfigKeyMismatch { .. } => "config_key_mismatch",
            ControllerError::Config(_) => "config_invalid",
            ControllerError::NoRuntime => "controller_no_runtime",
        }
    }
}

/// # Invalid configuration values.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment variable could not be parsed.
    #[error("cannot parse environment variable {var}={value:?}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// # Protocol anomalies observed by a bridge.
///
/// All variants except [`ProtocolError::DeadClient`] end only the current
/// message; `DeadClient` ends the bridge itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Service replied [`Reply::Error`](crate::Reply::Error).
    #[error("clientside error")]
    ClientsideError,

    /// Service replied [`Reply::Unimplemented`](crate::Reply::Unimplemented).
    #[error("clientside unimplemented")]
    ClientsideUnimplemented,

    /// Service replied with a code outside the protocol.
    #[error("unknown reply code {code}")]
    UnknownReply {
        /// The raw code received.
        code: ReplyCode,
    },

    /// The service stopped answering: either no reply arrived within the
    /// dead-client timeout, or the service dropped its tunnel.
    #[error("client treated as dead ({cause}, timeout {timeout:?})")]
    DeadClient {
        /// Dead-client timeout in force for the wait.
        timeout: Duration,
        /// `timeout` or `tunnel_closed`.
        cause: &'static str,
    },

    /// Service kept replying `Pending` past the configured polling limit.
    #[error("client kept pending for {elapsed:?}, polling abandoned")]
    PollingExhausted {
        /// Time spent polling for this message.
        elapsed: Duration,
    },
}

impl ProtocolError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::ClientsideError => "clientside_error",
            ProtocolError::ClientsideUnimplemented => "clientside_unimplemented",
            ProtocolError::UnknownReply { .. } => "unknown_reply",
            ProtocolError::DeadClient { .. } => "dead_client",
            ProtocolError::PollingExhausted { .. } => "polling_exhausted",
        }
    }

    /// Indicates whether the error ends the bridge (as opposed to one message).
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::DeadClient { .. })
    }
}

/// # Failures of the service-facing half of a tunnel.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelError {
    /// The bridge is gone; no more messages will arrive and replies go nowhere.
    #[error("tunnel closed")]
    Closed,
}

/// # Errors returned by a service's management task.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Management logic failed.
    #[error("service failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The tunnel was closed under the service.
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
}

impl ServiceError {
    /// Convenience constructor for [`ServiceError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        ServiceError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use flowvisor::ServiceError;
    ///
    /// assert_eq!(ServiceError::fail("boom").as_label(), "service_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Fail { .. } => "service_failed",
            ServiceError::Tunnel(_) => "service_tunnel_closed",
        }
    }
}
