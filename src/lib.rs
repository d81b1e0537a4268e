//! # flowvisor
//!
//! **Flowvisor** is an in-process control plane for long-running async services.
//!
//! Services register with a [`Controller`]. Each registration gets a unique
//! identifier ([`Sid`]), stored metadata ([`ServiceMetadata`]) and a private
//! [`ControlTunnel`]. The controller pushes lifecycle directives (graceful
//! shutdown, metadata updated, wait-for/continue) to every service and runs a
//! small request/reply protocol with each of them, detecting services that
//! stop answering.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Manageable  │   │  Manageable  │   │  Manageable  │
//!     │ (service #1) │   │ (service #2) │   │ (service #3) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ register         ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Controller                                                       │
//! │  - MetadataStore     (Sid → config, logger, context)              │
//! │  - BroadcastRegistry (append-only delivery channels + states)     │
//! │  - Bus               (protocol events)                            │
//! │  - signal listener   (SIGINT/SIGTERM → GracefulShutdown)          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼ Directive        ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Bridge    │   │    Bridge    │   │    Bridge    │
//!     │ (forward,    │   │ (forward,    │   │ (forward,    │
//!     │  poll, judge)│   │  poll, judge)│   │  poll, judge)│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼ tunnel           ▼                  ▼
//!     ControlTunnel      ControlTunnel      ControlTunnel
//!     (manage task)      (manage task)      (manage task)
//! ```
//!
//! ### Exchange
//! ```text
//! Bridge receives Directive ──► for each Signal of the directive:
//!   ├─► forward Signal, wait ≤ dead_client_timeout
//!   │       ├─ Ok            ─► done
//!   │       ├─ Error         ─► ClientsideError logged, done
//!   │       ├─ Unimplemented ─► ClientsideUnimplemented logged, done
//!   │       ├─ other code    ─► UnknownReply logged, done
//!   │       ├─ Pending       ─► sleep status_interval, send Status, repeat
//!   │       └─ silence       ─► DeadClient, bridge exits
//!   └─► back to Idle
//! ```
//!
//! ## Features
//! | Area              | Description                                                | Key types / traits                          |
//! |-------------------|------------------------------------------------------------|---------------------------------------------|
//! | **Control plane** | Register services, look up metadata, broadcast directives. | [`Controller`], [`ControllerBuilder`]       |
//! | **Services**      | Implement the management task, or wrap a closure.          | [`Manageable`], [`ServiceFn`], [`ServiceRef`] |
//! | **Protocol**      | Fixed signal and reply vocabulary.                         | [`Signal`], [`Reply`], [`Directive`]        |
//! | **Tunnel**        | Service side of the per-service channel pair.              | [`ControlTunnel`], [`Replier`]              |
//! | **Events**        | Observe registrations, exchanges and anomalies.            | [`Event`], [`EventKind`]                    |
//! | **Errors**        | Typed errors for API callers, services and the protocol.   | [`ControllerError`], [`ProtocolError`]      |
//! | **Configuration** | Timing knobs, log settings, per-registration overrides.    | [`Config`], [`RegisterOptions`]             |
//!
//! ## Optional features
//! - `logging`: exposes [`logging::init`](crate::logging::init), a `tracing-subscriber` setup driven by [`LogConfig`].
//!
//! ## Example
//! ```rust
//! use flowvisor::{Config, ControlTunnel, Controller, Directive, Reply, ServiceError, ServiceFn, ServiceRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = Controller::builder(Config::default())
//!         .with_signal_listener(false)
//!         .build()?;
//!
//!     let worker: ServiceRef = ServiceFn::arc("worker", |mut tunnel: ControlTunnel| async move {
//!         tunnel.serve(|_signal| Reply::Ok).await?;
//!         Ok::<_, ServiceError>(())
//!     });
//!
//!     let sid = controller.register(worker)?;
//!     let meta = controller.metadata(sid)?;
//!     assert_eq!(meta.config().dead_client_timeout, flowvisor::DEAD_CLIENT_TIMEOUT);
//!
//!     let report = controller.broadcast(Directive::GracefulShutdown).await;
//!     assert!(report.is_complete());
//!     Ok(())
//! }
//! ```
mod config;
mod context;
mod core;
mod error;
mod events;
mod logger;
mod metadata;
mod protocol;
mod service;
mod sid;
mod tunnel;

// ---- Public re-exports ----

pub use config::{CONFIG_KEY, Config, LogConfig, LogTarget};
pub use context::ServiceContext;
pub use core::{
    BridgeState, BroadcastReport, Controller, ControllerBuilder, wait_for_termination,
};
pub use error::{ConfigError, ControllerError, ProtocolError, ServiceError, TunnelError};
pub use events::{Bus, Event, EventKind};
pub use logger::ServiceLogger;
pub use metadata::ServiceMetadata;
pub use protocol::{
    DEAD_CLIENT_TIMEOUT, Directive, Reply, ReplyCode, STATUS_INTERVAL, Signal,
};
pub use service::{Manageable, RegisterOptions, ServiceFn, ServiceRef};
pub use sid::Sid;
pub use tunnel::{ControlTunnel, RawTunnel, Replier};

// Optional: process-wide log output from `LogConfig`.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub mod logging;
