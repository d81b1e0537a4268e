//! Control plane core: registration, protocol bridges and fan-out.
//!
//! The only public API from this module is [`Controller`] (with its
//! [`ControllerBuilder`]) plus the types it reports with.
//!
//! Internal modules:
//! - [`controller`]: registers services, stores metadata, broadcasts directives;
//! - [`bridge`]: per-service protocol engine (forward, poll, classify);
//! - [`broadcast`]: append-only registry of delivery channels;
//! - [`shutdown`]: termination signals turned into graceful-shutdown broadcasts;
//! - [`builder`]: controller construction.

mod bridge;
mod broadcast;
mod builder;
mod controller;
mod shutdown;

pub use broadcast::{BridgeState, BroadcastReport};
pub use builder::ControllerBuilder;
pub use controller::Controller;
pub use shutdown::wait_for_termination;
