//! # Termination signals and the shutdown broadcaster.
//!
//! [`wait_for_termination`] completes on the next termination signal;
//! [`run_listener`] turns every such signal into one
//! [`Directive::GracefulShutdown`] broadcast.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]
//!
//! ## Rules
//! - The listener keeps running after a broadcast: a second signal triggers a
//!   second broadcast. Well-behaved services treat repeated shutdowns as idempotent.
//! - The listener stops only when its token is cancelled.

use std::sync::Weak;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::controller::Controller;
use crate::events::{Event, EventKind};
use crate::protocol::Directive;

/// Termination signal listener, registered once and awaited repeatedly.
#[cfg(unix)]
pub(crate) struct Termination {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Termination {
    pub(crate) fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    /// Completes on the next `SIGINT` or `SIGTERM`; returns its name.
    pub(crate) async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }
}

/// Termination signal listener, registered once and awaited repeatedly.
#[cfg(not(unix))]
pub(crate) struct Termination;

#[cfg(not(unix))]
impl Termination {
    pub(crate) fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub(crate) async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL_C",
            Err(_) => std::future::pending().await,
        }
    }
}

/// Waits for a single termination signal.
///
/// Each call creates independent signal listeners.
/// Returns `Err` if signal registration fails.
pub async fn wait_for_termination() -> std::io::Result<()> {
    let mut term = Termination::new()?;
    term.recv().await;
    Ok(())
}

/// Broadcasts `GracefulShutdown` on every termination signal until `token` is cancelled.
///
/// Holds the controller weakly so that the listener never keeps it alive.
pub(crate) async fn run_listener(controller: Weak<Controller>, token: CancellationToken) {
    let mut term = match Termination::new() {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "cannot register termination signal handlers");
            return;
        }
    };

    loop {
        let name = tokio::select! {
            _ = token.cancelled() => break,
            name = term.recv() => name,
        };

        let Some(controller) = controller.upgrade() else {
            break;
        };
        info!(signal = name, "termination signal received, broadcasting graceful shutdown");
        controller
            .bus()
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(name));

        let report = controller.broadcast(Directive::GracefulShutdown).await;
        if !report.is_complete() {
            warn!(
                delivered = report.delivered,
                failed = report.failed.len(),
                busy = report.busy.len(),
                "graceful shutdown did not reach every service"
            );
        }
    }
}
