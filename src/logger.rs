//! # Per-service logger handle.
//!
//! [`ServiceLogger`] is a cheap, cloneable handle over a [`tracing::Span`]
//! carrying the service's `sid` and `service` name. Every record emitted
//! through it (including the bridge's protocol diagnostics) is attributed to
//! that service. The backend that actually renders records is whatever
//! `tracing` subscriber the process installed (see the `logging` feature).

use std::fmt;

use tracing::{Span, debug, error, info};

use crate::sid::Sid;

/// Logger handed to a service through its metadata.
#[derive(Clone, Debug)]
pub struct ServiceLogger {
    span: Span,
}

impl ServiceLogger {
    pub(crate) fn new(sid: Sid, service: &str) -> Self {
        Self {
            span: tracing::info_span!("service", sid = %sid, service = %service),
        }
    }

    /// The span every record of this service is emitted in.
    ///
    /// Useful to instrument the service's own futures.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.span.in_scope(|| debug!("{msg}"));
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.span.in_scope(|| info!("{msg}"));
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.span.in_scope(|| error!("{msg}"));
    }

    /// Logs at error level with `fatal = true`.
    ///
    /// Does not terminate the process; aborting is the caller's decision.
    pub fn fatal(&self, msg: impl fmt::Display) {
        self.span.in_scope(|| error!(fatal = true, "{msg}"));
    }
}
