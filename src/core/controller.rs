//! # Controller: registration, metadata lookup and directive fan-out.
//!
//! The [`Controller`] owns the metadata store, the broadcast registry and the
//! event bus. Every registration gets a fresh identifier, metadata, tunnel
//! and delivery channel, and starts two tasks: the bridge (owned by the
//! controller) and the service's own management task.
//!
//! ## Registration
//! ```text
//! register(service) / register_opt(service, options)
//!   ├─► runtime available?                        (else NoRuntime)
//!   ├─► options.apply(config) + validate          (else Config error)
//!   │        (nothing has been touched up to here)
//!   └─► registration lock
//!         ├─► allocate Sid (unique in the store)
//!         ├─► build ServiceMetadata { config, logger, context }
//!         ├─► tunnel::pair()  +  delivery channel
//!         ├─► BroadcastRegistry::append(sid, delivery_tx, state)
//!         ├─► MetadataStore::store(sid, metadata)
//!         ├─► spawn Bridge::run(delivery_rx, bridge_end)
//!         └─► spawn service.manage(control_tunnel)
//! ```
//!
//! ## Fan-out
//! ```text
//! broadcast(directive) ─► BroadcastRegistry (snapshot of live entries)
//!                           ├─► delivery chan ─► Bridge 0 ─► tunnel ─► controller itself
//!                           ├─► delivery chan ─► Bridge 1 ─► tunnel ─► service 1
//!                           └─► delivery chan ─► Bridge N ─► tunnel ─► service N
//! ```
//!
//! The controller registers itself at construction with a manager that
//! replies `Ok` to everything, so the registry is never empty and the
//! controller exercises its own protocol path.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{CONFIG_KEY, Config};
use crate::context::ServiceContext;
use crate::core::bridge::{Bridge, BridgeParams};
use crate::core::broadcast::{BridgeState, BroadcastRegistry, BroadcastReport, StateCell};
use crate::core::builder::ControllerBuilder;
use crate::error::{ControllerError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::logger::ServiceLogger;
use crate::metadata::{MetadataStore, ServiceMetadata};
use crate::protocol::{DELIVERY_CAPACITY, Directive, Reply, TUNNEL_CAPACITY};
use crate::service::{RegisterOptions, ServiceFn, ServiceRef};
use crate::sid::Sid;
use crate::tunnel::{self, ControlTunnel};

/// Name under which the controller registers itself.
const SELF_NAME: &str = "flowvisor";

/// Registers services, stores their metadata and fans directives out to them.
pub struct Controller {
    config: Arc<Config>,
    context: ServiceContext,
    metadata: MetadataStore,
    broadcast: BroadcastRegistry,
    /// Serializes registration bookkeeping (Sid allocation, store, append).
    registration: Mutex<()>,
    bus: Bus,
    self_sid: OnceLock<Sid>,
    signal_token: CancellationToken,
}

impl Controller {
    /// Returns a builder for a controller using `config`.
    pub fn builder(config: Config) -> ControllerBuilder {
        ControllerBuilder::new(config)
    }

    /// Builds a controller with default settings and the signal listener enabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Arc<Self>, ControllerError> {
        ControllerBuilder::new(config).build()
    }

    pub(crate) fn new_internal(config: Config, context: ServiceContext, bus: Bus) -> Self {
        let delivery_timeout = config.dead_client_timeout;
        Self {
            config: Arc::new(config),
            context,
            metadata: MetadataStore::new(),
            broadcast: BroadcastRegistry::new(delivery_timeout),
            registration: Mutex::new(()),
            bus,
            self_sid: OnceLock::new(),
            signal_token: CancellationToken::new(),
        }
    }

    /// Validates the configuration key and values.
    pub(crate) fn check_config(config: &Config) -> Result<(), ControllerError> {
        if config.key != CONFIG_KEY {
            return Err(ControllerError::ConfigKeyMismatch {
                expected: CONFIG_KEY,
                found: config.key.clone(),
            });
        }
        config.validate()?;
        Ok(())
    }

    /// Registers the controller itself with a manager that answers `Ok` to every signal.
    pub(crate) fn register_self(&self) -> Result<Sid, ControllerError> {
        let manager: ServiceRef = ServiceFn::arc(SELF_NAME, |mut tunnel: ControlTunnel| async move {
            tunnel.serve(|_signal| Reply::Ok).await?;
            Ok::<_, ServiceError>(())
        });
        let sid = self.register(manager)?;
        let _ = self.self_sid.set(sid);
        Ok(sid)
    }

    pub(crate) fn signal_token(&self) -> &CancellationToken {
        &self.signal_token
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registers a service and starts its bridge and management task.
    ///
    /// Returns the new service identifier; keep it to look up metadata.
    ///
    /// Registering the same [`ServiceRef`] again is **not** an error: it creates
    /// a fully independent registration (new identifier, tunnel and bridge)
    /// and runs [`Manageable::manage`](crate::Manageable::manage) once more.
    /// State shared between those runs is the service's responsibility.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, service: ServiceRef) -> Result<Sid, ControllerError> {
        self.register_opt(service, RegisterOptions::default())
    }

    /// Registers a service with per-registration overrides.
    ///
    /// With `RegisterOptions::default()` this is identical to [`register`](Self::register).
    /// Overrides are validated before anything is registered; an invalid
    /// override leaves no trace.
    pub fn register_opt(
        &self,
        service: ServiceRef,
        options: RegisterOptions,
    ) -> Result<Sid, ControllerError> {
        let runtime = Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;
        let config = if options.overrides_nothing() {
            Arc::clone(&self.config)
        } else {
            Arc::new(options.apply(&self.config)?)
        };
        let name: Arc<str> = Arc::from(options.name.as_deref().unwrap_or(service.name()));
        let params = BridgeParams {
            dead_client_timeout: config.dead_client_timeout,
            status_interval: config.status_interval,
            max_polling: config.max_polling,
        };

        let sid = {
            let _guard = self.registration.lock();

            let mut sid = Sid::new();
            while self.metadata.contains(&sid) {
                sid = Sid::new();
            }

            let logger = ServiceLogger::new(sid, &name);
            let metadata = ServiceMetadata::new(config, logger.clone(), self.context.clone());
            let (bridge_end, control) = tunnel::pair(TUNNEL_CAPACITY);
            let (delivery_tx, delivery_rx) = mpsc::channel::<Directive>(DELIVERY_CAPACITY);
            let state = StateCell::new();

            self.broadcast.append(sid, delivery_tx, Arc::clone(&state));
            self.metadata.store(sid, metadata);

            let bridge = Bridge::new(
                sid,
                Arc::clone(&name),
                delivery_rx,
                bridge_end,
                state,
                params,
                logger.clone(),
                self.bus.clone(),
            );
            runtime.spawn(bridge.run().instrument(logger.span().clone()));
            runtime.spawn(manage(
                service,
                control,
                sid,
                Arc::clone(&name),
                logger,
                self.bus.clone(),
            ));
            sid
        };

        self.bus.publish(
            Event::new(EventKind::ServiceRegistered)
                .with_sid(sid)
                .with_service(name),
        );
        Ok(sid)
    }

    /// Returns the metadata stored for `sid`, or [`ControllerError::MetadataNotFound`].
    pub fn metadata(&self, sid: Sid) -> Result<ServiceMetadata, ControllerError> {
        self.metadata.load(&sid)
    }

    /// Pushes `directive` to every live bridge, including the controller's own.
    ///
    /// Each live bridge receives the directive exactly once per call.
    pub async fn broadcast(&self, directive: Directive) -> BroadcastReport {
        let report = self.broadcast.broadcast(directive).await;
        self.report_delivery(directive, &report);
        self.bus.publish(
            Event::new(EventKind::DirectiveBroadcast)
                .with_directive(directive)
                .with_delivered(report.delivered),
        );
        report
    }

    /// Replaces the metadata of `sid` with a new configuration snapshot and
    /// sends [`Signal::MetadataUpdated`](crate::Signal::MetadataUpdated) to that service only.
    ///
    /// The stored value is replaced, never mutated; readers holding the old
    /// metadata keep a consistent snapshot. Timing values of the running
    /// bridge stay as they were at registration.
    pub async fn update_metadata(
        &self,
        sid: Sid,
        config: Config,
    ) -> Result<BroadcastReport, ControllerError> {
        Self::check_config(&config)?;
        {
            let _guard = self.registration.lock();
            let current = self.metadata.load(&sid)?;
            self.metadata.store(sid, current.with_config(Arc::new(config)));
            current.logger().info("metadata replaced");
        }
        self.bus
            .publish(Event::new(EventKind::MetadataReplaced).with_sid(sid));

        let report = self
            .broadcast
            .send_to(&sid, Directive::MetadataUpdated)
            .await
            .unwrap_or_default();
        self.report_delivery(Directive::MetadataUpdated, &report);
        Ok(report)
    }

    fn report_delivery(&self, directive: Directive, report: &BroadcastReport) {
        for (sid, reason) in report
            .failed
            .iter()
            .map(|sid| (sid, "bridge_stopped"))
            .chain(report.busy.iter().map(|sid| (sid, "delivery_timeout")))
        {
            tracing::warn!(%sid, %directive, reason, "directive not delivered");
            self.bus.publish(
                Event::new(EventKind::DeliveryFailed)
                    .with_sid(*sid)
                    .with_directive(directive)
                    .with_reason(reason),
            );
        }
    }

    /// Protocol state of the bridge serving `sid`.
    pub fn bridge_state(&self, sid: Sid) -> Option<BridgeState> {
        self.broadcast.state_of(&sid)
    }

    /// Number of registrations so far, the controller's own included.
    pub fn registered_count(&self) -> usize {
        self.broadcast.len()
    }

    /// Number of registrations whose bridge is still running.
    pub fn live_count(&self) -> usize {
        self.broadcast.live_len()
    }

    /// Identifier of the controller's own registration.
    pub fn self_sid(&self) -> Option<Sid> {
        self.self_sid.get().copied()
    }

    /// Configuration the controller was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receiver of protocol events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops the termination signal listener, if one was started.
    pub fn stop_signal_listener(&self) {
        self.signal_token.cancel();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.signal_token.cancel();
    }
}

/// Runs a service's management task and reports how it ended.
async fn manage(
    service: ServiceRef,
    tunnel: ControlTunnel,
    sid: Sid,
    name: Arc<str>,
    logger: ServiceLogger,
    bus: Bus,
) {
    let res = service.manage(tunnel).instrument(logger.span().clone()).await;

    let mut ev = Event::new(EventKind::ServiceExited)
        .with_sid(sid)
        .with_service(name);
    match res {
        Ok(()) => logger.debug("management task finished"),
        Err(e) => {
            logger.error(format_args!("management task failed: {e}"));
            ev = ev.with_reason(e.as_label());
        }
    }
    bus.publish(ev);
}
