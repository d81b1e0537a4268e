//! Protocol events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** the controller,
//! bridges and the shutdown listener publish to.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Controller` (registration, broadcasts, metadata updates),
//!   bridges (forwarding, replies, probes, dead clients), shutdown listener.
//! - **Consumers**: anything holding a receiver from [`Controller::subscribe`](crate::Controller::subscribe).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
