//! # Registrable services.
//!
//! - [`Manageable`] - anything that can be registered on a [`Controller`](crate::Controller)
//! - [`ServiceFn`] - closure-backed implementation
//! - [`ServiceRef`] - shared handle (`Arc<dyn Manageable>`) passed to `register`
//! - [`RegisterOptions`] - per-registration overrides
//!
//! A service exposes one operation: a management task that receives its
//! [`ControlTunnel`] and runs until the process ends or the task errors.
//!
//! ## Repeated registration
//! Registering the same [`ServiceRef`] twice is legal: each registration gets
//! its own identifier, tunnel and bridge, and [`Manageable::manage`] runs once
//! per registration. Any state shared between those runs is the service's own
//! responsibility; non-idempotent handling or unsynchronized shared state will
//! misbehave.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ConfigError, ServiceError};
use crate::tunnel::ControlTunnel;

/// # A service that can be registered on the controller.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use flowvisor::{ControlTunnel, Manageable, Reply, ServiceError, Signal};
///
/// struct Cache;
///
/// #[async_trait]
/// impl Manageable for Cache {
///     fn name(&self) -> &str { "cache" }
///
///     async fn manage(&self, mut tunnel: ControlTunnel) -> Result<(), ServiceError> {
///         loop {
///             let (signal, replier) = tunnel.read_message().await?;
///             let reply = match signal {
///                 Signal::GracefulShutdown => Reply::Ok, // flush, then acknowledge
///                 _ => Reply::Unimplemented,
///             };
///             replier.reply(reply).await?;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Manageable: Send + Sync + 'static {
    /// Human-readable name used in logs and events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Management task; receives the service side of a fresh tunnel.
    async fn manage(&self, tunnel: ControlTunnel) -> Result<(), ServiceError>;
}

/// Shared handle to a registrable service.
pub type ServiceRef = Arc<dyn Manageable>;

/// Closure-backed service.
///
/// Wraps `F: Fn(ControlTunnel) -> Fut`; every registration calls `F` again
/// and gets a fresh future.
///
/// ## Example
/// ```rust
/// use flowvisor::{ControlTunnel, Reply, ServiceError, ServiceFn, ServiceRef};
///
/// let svc: ServiceRef = ServiceFn::arc("echo", |mut tunnel: ControlTunnel| async move {
///     tunnel.serve(|_signal| Reply::Ok).await?;
///     Ok::<_, ServiceError>(())
/// });
/// assert_eq!(svc.name(), "echo");
/// ```
#[derive(Debug)]
pub struct ServiceFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ServiceFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the service and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Manageable for ServiceFn<F>
where
    F: Fn(ControlTunnel) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn manage(&self, tunnel: ControlTunnel) -> Result<(), ServiceError> {
        (self.f)(tunnel).await
    }
}

/// Per-registration overrides applied on top of the controller's [`Config`].
///
/// `RegisterOptions::default()` overrides nothing, which makes
/// [`Controller::register_opt`](crate::Controller::register_opt) behave exactly like
/// [`Controller::register`](crate::Controller::register).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Display name; defaults to [`Manageable::name`].
    pub name: Option<String>,
    /// Overrides [`Config::dead_client_timeout`].
    pub dead_client_timeout: Option<Duration>,
    /// Overrides [`Config::status_interval`].
    pub status_interval: Option<Duration>,
    /// Overrides [`Config::max_polling`] with a bound.
    pub max_polling: Option<Duration>,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_dead_client_timeout(mut self, timeout: Duration) -> Self {
        self.dead_client_timeout = Some(timeout);
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = Some(interval);
        self
    }

    pub fn with_max_polling(mut self, limit: Duration) -> Self {
        self.max_polling = Some(limit);
        self
    }

    /// Returns `true` if no configuration value is overridden.
    pub fn overrides_nothing(&self) -> bool {
        self.dead_client_timeout.is_none()
            && self.status_interval.is_none()
            && self.max_polling.is_none()
    }

    /// Produces the validated configuration for one registration.
    pub(crate) fn apply(&self, base: &Config) -> Result<Config, ConfigError> {
        let cfg = Config {
            dead_client_timeout: self.dead_client_timeout.unwrap_or(base.dead_client_timeout),
            status_interval: self.status_interval.unwrap_or(base.status_interval),
            max_polling: self.max_polling.or(base.max_polling),
            ..base.clone()
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
