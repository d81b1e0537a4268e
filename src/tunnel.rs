//! # Tunnel: private channel pair between a bridge and one service.
//!
//! ```text
//!            BridgeEnd (controller side)            ControlTunnel (service side)
//!   forward(Signal) ──► [ signals, cap 1 ] ──► read_message() → (Signal, Replier)
//!   recv_reply()    ◄── [ replies, cap 1 ] ◄── Replier::reply(Reply)
//! ```
//!
//! Both directions are deliberately shallow (capacity 1): the tunnel is a
//! handshake, not a queue.
//!
//! ## High-level API
//! [`ControlTunnel::read_message`] waits for the next signal and returns it
//! together with a [`Replier`]. The replier mutably borrows the tunnel, so the
//! next read is impossible until this one was answered (or the replier was
//! dropped, which leaves the bridge waiting until its dead-client timeout).
//! [`Replier::reply`] consumes the replier: at most one reply per read.
//!
//! ## Low-level API
//! [`ControlTunnel::into_raw`] hands out the raw channels. Useful for
//! stage-1-only listeners or stage-2-only senders, but the caller becomes
//! responsible for answering every signal exactly once.

use tokio::sync::mpsc;

use crate::error::TunnelError;
use crate::protocol::{Reply, ReplyCode, Signal};

/// Creates a connected tunnel whose directions buffer `capacity` messages each.
pub(crate) fn pair(capacity: usize) -> (BridgeEnd, ControlTunnel) {
    let capacity = capacity.max(1);
    let (signal_tx, signal_rx) = mpsc::channel(capacity);
    let (reply_tx, reply_rx) = mpsc::channel(capacity);
    (
        BridgeEnd {
            signals: signal_tx,
            replies: reply_rx,
        },
        ControlTunnel {
            signals: signal_rx,
            replies: reply_tx,
        },
    )
}

/// Controller-facing half, owned exclusively by the bridge.
#[derive(Debug)]
pub(crate) struct BridgeEnd {
    signals: mpsc::Sender<Signal>,
    replies: mpsc::Receiver<ReplyCode>,
}

impl BridgeEnd {
    /// Forwards a signal; waits while the service has not read the previous one.
    pub(crate) async fn forward(&self, signal: Signal) -> Result<(), TunnelError> {
        self.signals
            .send(signal)
            .await
            .map_err(|_| TunnelError::Closed)
    }

    /// Waits for the next raw reply; `None` once the service side is gone.
    pub(crate) async fn recv_reply(&mut self) -> Option<ReplyCode> {
        self.replies.recv().await
    }
}

/// Service-facing half, handed to the service's management task.
#[derive(Debug)]
pub struct ControlTunnel {
    signals: mpsc::Receiver<Signal>,
    replies: mpsc::Sender<ReplyCode>,
}

impl ControlTunnel {
    /// Waits for the next signal from the controller.
    ///
    /// Returns the signal and the [`Replier`] that must answer it.
    /// Fails with [`TunnelError::Closed`] once the bridge has stopped.
    pub async fn read_message(&mut self) -> Result<(Signal, Replier<'_>), TunnelError> {
        let signal = self.signals.recv().await.ok_or(TunnelError::Closed)?;
        Ok((
            signal,
            Replier {
                signal,
                replies: &self.replies,
            },
        ))
    }

    /// Answers every signal with `handler(signal)` until the bridge stops.
    ///
    /// Returns `Ok(())` when the tunnel closes.
    pub async fn serve<F>(&mut self, mut handler: F) -> Result<(), TunnelError>
    where
        F: FnMut(Signal) -> Reply,
    {
        loop {
            let (signal, replier) = match self.read_message().await {
                Ok(msg) => msg,
                Err(TunnelError::Closed) => return Ok(()),
            };
            replier.reply(handler(signal)).await?;
        }
    }

    /// **Low-level API.** Splits the tunnel into its raw channels.
    ///
    /// The one-reply-per-signal discipline is no longer enforced; every signal
    /// read from [`RawTunnel::signals`] must still get exactly one reply on
    /// [`RawTunnel::replies`], or the bridge will declare the service dead.
    pub fn into_raw(self) -> RawTunnel {
        RawTunnel {
            signals: self.signals,
            replies: self.replies,
        }
    }
}

/// One-shot answer to a single signal, bound to the tunnel it was read from.
#[must_use = "every signal needs exactly one reply, or the bridge declares the service dead"]
#[derive(Debug)]
pub struct Replier<'a> {
    signal: Signal,
    replies: &'a mpsc::Sender<ReplyCode>,
}

impl Replier<'_> {
    /// The signal this replier answers.
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Sends the reply, consuming the replier.
    pub async fn reply(self, reply: Reply) -> Result<(), TunnelError> {
        self.replies
            .send(reply.code())
            .await
            .map_err(|_| TunnelError::Closed)
    }
}

/// Raw channels behind a [`ControlTunnel`].
#[derive(Debug)]
pub struct RawTunnel {
    /// Stage-1 signals from the bridge.
    pub signals: mpsc::Receiver<Signal>,
    /// Stage-2 replies to the bridge; any code may be sent.
    pub replies: mpsc::Sender<ReplyCode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_then_reply() {
        let (mut bridge, mut tunnel) = pair(1);

        bridge.forward(Signal::GracefulShutdown).await.expect("open");
        let (signal, replier) = tunnel.read_message().await.expect("open");
        assert_eq!(signal, Signal::GracefulShutdown);
        assert_eq!(replier.signal(), Signal::GracefulShutdown);
        replier.reply(Reply::Ok).await.expect("open");

        assert_eq!(bridge.recv_reply().await, Some(ReplyCode(200)));
    }

    #[tokio::test]
    async fn test_read_fails_after_bridge_dropped() {
        let (bridge, mut tunnel) = pair(1);
        drop(bridge);
        assert!(matches!(
            tunnel.read_message().await,
            Err(TunnelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_forward_fails_after_service_dropped() {
        let (mut bridge, tunnel) = pair(1);
        drop(tunnel);
        assert_eq!(
            bridge.forward(Signal::Status).await,
            Err(TunnelError::Closed)
        );
        assert_eq!(bridge.recv_reply().await, None);
    }

    #[tokio::test]
    async fn test_raw_tunnel_sends_any_code() {
        let (mut bridge, tunnel) = pair(1);
        let mut raw = tunnel.into_raw();

        bridge.forward(Signal::MetadataUpdated).await.expect("open");
        assert_eq!(raw.signals.recv().await, Some(Signal::MetadataUpdated));
        raw.replies.send(ReplyCode(999)).await.expect("open");
        assert_eq!(bridge.recv_reply().await, Some(ReplyCode(999)));
    }

    #[tokio::test]
    async fn test_serve_answers_until_closed() {
        let (mut bridge, mut tunnel) = pair(1);
        let service = tokio::spawn(async move {
            tunnel
                .serve(|signal| match signal {
                    Signal::Status => Reply::Unimplemented,
                    _ => Reply::Ok,
                })
                .await
        });

        bridge.forward(Signal::WaitFor).await.expect("open");
        assert_eq!(bridge.recv_reply().await, Some(Reply::Ok.code()));
        bridge.forward(Signal::Status).await.expect("open");
        assert_eq!(bridge.recv_reply().await, Some(Reply::Unimplemented.code()));

        drop(bridge);
        assert_eq!(service.await.expect("join"), Ok(()));
    }
}
