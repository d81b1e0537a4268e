//! # Bridge: the protocol engine of one registration.
//!
//! A bridge owns the controller-facing half of a tunnel and the receiving end
//! of the service's delivery channel. It turns every delivered [`Directive`]
//! into one or more signal/reply exchanges and watches the service's liveness.
//!
//! ## States
//! ```text
//!            directive
//!   Idle ───────────────► AwaitingReply ──── Ok / Error / Unimplemented / unknown ──► Idle
//!    ▲                        │    │
//!    │                Pending │    │ no reply within dead_client_timeout
//!    │                        ▼    ▼
//!    │   terminal reply   Polling ───────────────────────────────────────────► Dead
//!    └────────────────────  │  ▲         no reply within dead_client_timeout
//!                           │  │ Pending
//!                           └──┘ sleep(status_interval), send Status
//! ```
//!
//! ## Rules
//! - Messages are strictly sequential: the next signal is forwarded only after
//!   the previous one got its terminal reply.
//! - Every wait (first reply, each reply to a `Status` probe) gets a fresh
//!   deadline of `dead_client_timeout`; no timer outlives its wait.
//! - `Pending` replies are polled in a loop, optionally bounded by `max_polling`.
//! - Error, unimplemented and unknown replies are logged and end the message only.
//! - A missed deadline (or a vanished service) ends the bridge with
//!   [`ProtocolError::DeadClient`]; the registry entry is marked dead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

use crate::core::broadcast::{BridgeState, StateCell};
use crate::error::{ProtocolError, TunnelError};
use crate::events::{Bus, Event, EventKind};
use crate::logger::ServiceLogger;
use crate::protocol::{Directive, Reply, ReplyCode, Signal};
use crate::sid::Sid;
use crate::tunnel::BridgeEnd;

/// Timing parameters of a bridge, taken from the registration's configuration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BridgeParams {
    /// Maximum silence while awaiting any reply.
    pub dead_client_timeout: Duration,
    /// Delay between a `Pending` reply and the next `Status` probe.
    pub status_interval: Duration,
    /// Optional bound on polling a single message.
    pub max_polling: Option<Duration>,
}

/// Drives the protocol for one registered service.
pub(crate) struct Bridge {
    sid: Sid,
    service: Arc<str>,
    deliveries: mpsc::Receiver<Directive>,
    tunnel: BridgeEnd,
    state: Arc<StateCell>,
    params: BridgeParams,
    logger: ServiceLogger,
    bus: Bus,
}

impl Bridge {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sid: Sid,
        service: Arc<str>,
        deliveries: mpsc::Receiver<Directive>,
        tunnel: BridgeEnd,
        state: Arc<StateCell>,
        params: BridgeParams,
        logger: ServiceLogger,
        bus: Bus,
    ) -> Self {
        Self {
            sid,
            service,
            deliveries,
            tunnel,
            state,
            params,
            logger,
            bus,
        }
    }

    /// Runs until the service is declared dead or the registry goes away.
    ///
    /// Returns `Err(ProtocolError::DeadClient)` on liveness failure and `Ok(())`
    /// when the delivery channel closes (controller dropped).
    pub(crate) async fn run(mut self) -> Result<(), ProtocolError> {
        let res = self.serve().await;
        self.state.set(BridgeState::Dead);
        res
    }

    async fn serve(&mut self) -> Result<(), ProtocolError> {
        while let Some(directive) = self.deliveries.recv().await {
            for &signal in directive.signals() {
                self.exchange(signal).await?;
            }
        }
        Ok(())
    }

    /// Forwards one signal and resolves it to a terminal reply.
    async fn exchange(&mut self, signal: Signal) -> Result<(), ProtocolError> {
        self.state.set(BridgeState::AwaitingReply);
        self.bus
            .publish(self.event(EventKind::SignalForwarded).with_signal(signal));
        let mut code = self.round_trip(signal, signal).await?;

        let mut probes: u32 = 0;
        let mut polling_since: Option<Instant> = None;

        while Reply::try_from(code) == Ok(Reply::Pending) {
            let since = *polling_since.get_or_insert_with(Instant::now);
            if let Some(limit) = self.params.max_polling {
                let elapsed = since.elapsed();
                if elapsed >= limit {
                    self.polling_exhausted(signal, probes, elapsed);
                    self.state.set(BridgeState::Idle);
                    return Ok(());
                }
            }

            self.state.set(BridgeState::Polling);
            time::sleep(self.params.status_interval).await;
            probes += 1;
            self.bus.publish(
                self.event(EventKind::StatusProbed)
                    .with_signal(signal)
                    .with_probes(probes),
            );
            code = self.round_trip(Signal::Status, signal).await?;
        }

        self.classify(signal, code, probes);
        self.state.set(BridgeState::Idle);
        Ok(())
    }

    /// Sends `outgoing` and waits for one reply under a fresh deadline.
    ///
    /// `origin` is the signal the exchange started with, used for reporting.
    async fn round_trip(
        &mut self,
        outgoing: Signal,
        origin: Signal,
    ) -> Result<ReplyCode, ProtocolError> {
        let timeout = self.params.dead_client_timeout;
        let deadline = Instant::now() + timeout;
        let tunnel = &mut self.tunnel;

        let exchange = async move {
            tunnel.forward(outgoing).await?;
            tunnel.recv_reply().await.ok_or(TunnelError::Closed)
        };

        let res = time::timeout_at(deadline, exchange).await;
        match res {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(TunnelError::Closed)) => Err(self.dead_client(origin, timeout, "tunnel_closed")),
            Err(_elapsed) => Err(self.dead_client(origin, timeout, "timeout")),
        }
    }

    /// Logs and reports a terminal reply.
    fn classify(&self, signal: Signal, code: ReplyCode, probes: u32) {
        let (kind, anomaly) = match Reply::try_from(code) {
            Ok(Reply::Ok) => (EventKind::ReplyOk, None),
            Ok(Reply::Error) => (EventKind::ClientsideError, Some(ProtocolError::ClientsideError)),
            Ok(Reply::Unimplemented) => (
                EventKind::ClientsideUnimplemented,
                Some(ProtocolError::ClientsideUnimplemented),
            ),
            Ok(Reply::Pending) | Err(_) => (
                EventKind::UnknownReply,
                Some(ProtocolError::UnknownReply { code }),
            ),
        };

        self.logger.span().in_scope(|| match &anomaly {
            None => debug!(%signal, probes, "reply ok"),
            Some(e @ ProtocolError::ClientsideUnimplemented) => {
                info!(%signal, probes, label = e.as_label(), "{e}")
            }
            Some(e) => error!(%signal, %code, probes, label = e.as_label(), "{e}"),
        });

        let mut ev = self
            .event(kind)
            .with_signal(signal)
            .with_reply(code)
            .with_probes(probes);
        if let Some(e) = anomaly {
            ev = ev.with_reason(e.as_label());
        }
        self.bus.publish(ev);
    }

    fn polling_exhausted(&self, signal: Signal, probes: u32, elapsed: Duration) {
        let err = ProtocolError::PollingExhausted { elapsed };
        self.logger
            .span()
            .in_scope(|| error!(%signal, probes, label = err.as_label(), "{err}"));
        self.bus.publish(
            self.event(EventKind::PollingExhausted)
                .with_signal(signal)
                .with_probes(probes)
                .with_reason(err.to_string()),
        );
    }

    fn dead_client(&self, signal: Signal, timeout: Duration, cause: &'static str) -> ProtocolError {
        let err = ProtocolError::DeadClient { timeout, cause };
        self.state.set(BridgeState::Dead);
        self.logger
            .span()
            .in_scope(|| error!(%signal, cause, label = err.as_label(), "{err}"));
        self.bus.publish(
            self.event(EventKind::DeadClient)
                .with_signal(signal)
                .with_reason(cause),
        );
        err
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_sid(self.sid)
            .with_service(Arc::clone(&self.service))
    }
}
