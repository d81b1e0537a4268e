//! # Broadcast registry: one delivery channel per registered service.
//!
//! The registry is an append-only arena. Each entry holds the sending half of
//! a service's delivery channel and the state cell its bridge updates.
//! Entries are never removed: a dead bridge flips its cell to
//! [`BridgeState::Dead`] and is skipped from then on, so indices stay stable.
//!
//! ## Architecture
//! ```text
//! register() ──write lock──► [ entry 0 | entry 1 | entry 2 (dead) | entry 3 ]
//!                                  │
//! broadcast() ──read lock──► snapshot (live entries, cloned) ── lock released
//!                                  │
//!                   join_all(send to every snapshot entry)
//!                      ├─ Ok           → delivered
//!                      ├─ Closed       → entry marked dead, failed
//!                      └─ still full after delivery timeout → busy
//! ```
//!
//! ## Rules
//! - Writers (registration) hold the write lock only to push an entry.
//! - Readers copy a snapshot and release the lock before sending, so a
//!   broadcast never tears and never blocks registration.
//! - A send waits at most `delivery_timeout` for buffer space.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::protocol::Directive;
use crate::sid::Sid;

/// Protocol state of one bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    /// No message in flight.
    Idle = 0,
    /// Signal forwarded, waiting for a reply.
    AwaitingReply = 1,
    /// Last reply was `Pending`; probing with `Status`.
    Polling = 2,
    /// Timed out; the bridge has stopped for good.
    Dead = 3,
}

impl BridgeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => BridgeState::Idle,
            1 => BridgeState::AwaitingReply,
            2 => BridgeState::Polling,
            _ => BridgeState::Dead,
        }
    }
}

/// State cell shared between a bridge (writer) and the registry (readers).
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(BridgeState::Idle as u8)))
    }

    pub(crate) fn get(&self) -> BridgeState {
        BridgeState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Sets the state; `Dead` is terminal and never overwritten.
    pub(crate) fn set(&self, state: BridgeState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != BridgeState::Dead as u8).then_some(state as u8)
            });
    }

    pub(crate) fn is_live(&self) -> bool {
        self.get() != BridgeState::Dead
    }
}

/// Outcome of pushing one directive through the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Entries whose delivery channel accepted the directive.
    pub delivered: usize,
    /// Entries skipped because their bridge was already dead.
    pub skipped_dead: usize,
    /// Entries whose bridge stopped before accepting the directive.
    pub failed: Vec<Sid>,
    /// Entries whose channel stayed full for the whole delivery timeout.
    pub busy: Vec<Sid>,
}

impl BroadcastReport {
    /// Returns `true` if every live entry accepted the directive.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.busy.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    sid: Sid,
    tx: mpsc::Sender<Directive>,
    state: Arc<StateCell>,
}

enum Delivery {
    Delivered,
    Closed(Sid),
    Busy(Sid),
}

/// Append-only arena of delivery channels.
#[derive(Debug)]
pub(crate) struct BroadcastRegistry {
    entries: RwLock<Vec<Entry>>,
    delivery_timeout: Duration,
}

impl BroadcastRegistry {
    const INITIAL_CAPACITY: usize = 16;

    pub(crate) fn new(delivery_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::with_capacity(Self::INITIAL_CAPACITY)),
            delivery_timeout,
        }
    }

    /// Appends an entry and returns its stable index.
    pub(crate) fn append(
        &self,
        sid: Sid,
        tx: mpsc::Sender<Directive>,
        state: Arc<StateCell>,
    ) -> usize {
        let mut entries = self.entries.write();
        entries.push(Entry { sid, tx, state });
        entries.len() - 1
    }

    /// Number of entries ever registered, dead ones included.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Number of entries whose bridge is still running.
    pub(crate) fn live_len(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.state.is_live())
            .count()
    }

    pub(crate) fn state_of(&self, sid: &Sid) -> Option<BridgeState> {
        self.entries
            .read()
            .iter()
            .find(|e| &e.sid == sid)
            .map(|e| e.state.get())
    }

    /// Sends `directive` to every live entry.
    pub(crate) async fn broadcast(&self, directive: Directive) -> BroadcastReport {
        let (live, skipped_dead) = {
            let entries = self.entries.read();
            let live: Vec<Entry> = entries
                .iter()
                .filter(|e| e.state.is_live())
                .cloned()
                .collect();
            let skipped = entries.len() - live.len();
            (live, skipped)
        };

        let outcomes = join_all(live.iter().map(|e| self.deliver(e, directive))).await;

        let mut report = BroadcastReport {
            skipped_dead,
            ..BroadcastReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Closed(sid) => report.failed.push(sid),
                Delivery::Busy(sid) => report.busy.push(sid),
            }
        }
        report
    }

    /// Sends `directive` to one entry; `None` if `sid` was never registered.
    pub(crate) async fn send_to(&self, sid: &Sid, directive: Directive) -> Option<BroadcastReport> {
        let entry = self
            .entries
            .read()
            .iter()
            .find(|e| &e.sid == sid)
            .cloned()?;

        let mut report = BroadcastReport::default();
        if !entry.state.is_live() {
            report.skipped_dead = 1;
            return Some(report);
        }
        match self.deliver(&entry, directive).await {
            Delivery::Delivered => report.delivered = 1,
            Delivery::Closed(sid) => report.failed.push(sid),
            Delivery::Busy(sid) => report.busy.push(sid),
        }
        Some(report)
    }

    async fn deliver(&self, entry: &Entry, directive: Directive) -> Delivery {
        match tokio::time::timeout(self.delivery_timeout, entry.tx.send(directive)).await {
            Ok(Ok(())) => Delivery::Delivered,
            Ok(Err(_closed)) => {
                entry.state.set(BridgeState::Dead);
                Delivery::Closed(entry.sid)
            }
            Err(_elapsed) => Delivery::Busy(entry.sid),
        }
    }
}
