//! # Event bus for protocol observability.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that bridges can report what
//! happens on their tunnel without ever waiting on an observer.
//!
//! ```text
//! Publishers (many):                    Observers (any):
//!   Bridge 1 ──┐
//!   Bridge 2 ──┼──────► Bus ───────► Controller::subscribe() receivers
//!   Bridge N ──┤  (broadcast chan)
//!   Controller ┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: never delays the protocol.
//! - **Bounded**: slow receivers get `RecvError::Lagged(n)` and skip `n` events.
//! - **No persistence**: events published with no receivers are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for protocol events; cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes to all current receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
