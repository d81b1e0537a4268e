use std::sync::Arc;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::error::ControllerError;
use crate::events::Bus;

use super::{controller::Controller, shutdown};

/// Builder for constructing a Controller with optional features.
pub struct ControllerBuilder {
    cfg: Config,
    context: ServiceContext,
    signal_listener: bool,
    bus_capacity: usize,
}

impl ControllerBuilder {
    const DEFAULT_BUS_CAPACITY: usize = 1024;

    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            context: ServiceContext::new(),
            signal_listener: true,
            bus_capacity: Self::DEFAULT_BUS_CAPACITY,
        }
    }

    /// Sets the base context handed to every registered service.
    pub fn with_context(mut self, context: ServiceContext) -> Self {
        self.context = context;
        self
    }

    /// Enables or disables the termination signal listener (enabled by default).
    ///
    /// When enabled, every `SIGINT`/`SIGTERM` (Ctrl-C elsewhere) broadcasts
    /// [`Directive::GracefulShutdown`](crate::Directive::GracefulShutdown).
    pub fn with_signal_listener(mut self, enabled: bool) -> Self {
        self.signal_listener = enabled;
        self
    }

    /// Sets the event bus capacity; values below 1 are clamped to 1.
    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity.max(1);
        self
    }

    /// Builds the controller, registers it as its own first service and
    /// starts the signal listener if enabled.
    ///
    /// Fails with:
    /// - [`ControllerError::ConfigKeyMismatch`] if `cfg.key` is not [`CONFIG_KEY`](crate::CONFIG_KEY);
    /// - [`ControllerError::Config`] if a value is out of range;
    /// - [`ControllerError::NoRuntime`] outside a tokio runtime.
    pub fn build(self) -> Result<Arc<Controller>, ControllerError> {
        Controller::check_config(&self.cfg)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;

        let bus = Bus::new(self.bus_capacity);
        let controller = Arc::new(Controller::new_internal(self.cfg, self.context, bus));
        let sid = controller.register_self()?;
        tracing::debug!(%sid, "controller registered");

        if self.signal_listener {
            runtime.spawn(shutdown::run_listener(
                Arc::downgrade(&controller),
                controller.signal_token().clone(),
            ));
        }
        Ok(controller)
    }
}
