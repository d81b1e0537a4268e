//! # Per-service metadata and its concurrent store.
//!
//! [`ServiceMetadata`] bundles what a service may read about itself:
//! a configuration snapshot, a logger and a non-cancelling context.
//! [`MetadataStore`] maps [`Sid`]s to metadata; it is sharded, so lookups of
//! different services never contend with each other or with registration.
//!
//! ## Rules
//! - Metadata is never mutated in place; an update replaces the stored value.
//! - Entries are never evicted; they live as long as the controller.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::Config;
use crate::context::ServiceContext;
use crate::error::ControllerError;
use crate::logger::ServiceLogger;
use crate::sid::Sid;

const STORE_PREALLOC: usize = 16;

/// Metadata of one registered service.
#[derive(Clone, Debug)]
pub struct ServiceMetadata {
    config: Arc<Config>,
    logger: ServiceLogger,
    context: ServiceContext,
}

impl ServiceMetadata {
    pub(crate) fn new(config: Arc<Config>, logger: ServiceLogger, context: ServiceContext) -> Self {
        Self {
            config,
            logger,
            context,
        }
    }

    /// Configuration snapshot taken at registration (or at the last update).
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the configuration snapshot.
    pub fn config_arc(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Logger bound to this service.
    pub fn logger(&self) -> &ServiceLogger {
        &self.logger
    }

    /// Read-only value bag; carries no cancellation.
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Returns a copy with the configuration replaced.
    pub(crate) fn with_config(&self, config: Arc<Config>) -> Self {
        Self {
            config,
            logger: self.logger.clone(),
            context: self.context.clone(),
        }
    }
}

/// Concurrent map from [`Sid`] to [`ServiceMetadata`].
#[derive(Debug)]
pub(crate) struct MetadataStore {
    entries: DashMap<Sid, ServiceMetadata>,
}

impl MetadataStore {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::with_capacity(STORE_PREALLOC),
        }
    }

    /// Stores metadata, replacing any previous value under `sid`.
    pub(crate) fn store(&self, sid: Sid, metadata: ServiceMetadata) {
        self.entries.insert(sid, metadata);
    }

    /// Returns a clone of the metadata, or [`ControllerError::MetadataNotFound`].
    pub(crate) fn load(&self, sid: &Sid) -> Result<ServiceMetadata, ControllerError> {
        self.entries
            .get(sid)
            .map(|entry| entry.value().clone())
            .ok_or(ControllerError::MetadataNotFound { sid: *sid })
    }

    pub(crate) fn contains(&self, sid: &Sid) -> bool {
        self.entries.contains_key(sid)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(sid: Sid) -> ServiceMetadata {
        ServiceMetadata::new(
            Arc::new(Config::default()),
            ServiceLogger::new(sid, "test"),
            ServiceContext::new(),
        )
    }

    #[test]
    fn test_load_missing() {
        let store = MetadataStore::new();
        let sid = Sid::new();
        assert!(matches!(
            store.load(&sid),
            Err(ControllerError::MetadataNotFound { sid: missing }) if missing == sid
        ));
    }

    #[test]
    fn test_store_replaces() {
        let store = MetadataStore::new();
        let sid = Sid::new();
        store.store(sid, metadata(sid));

        let cfg = Config {
            max_polling: Some(std::time::Duration::from_secs(1)),
            ..Config::default()
        };
        let replaced = store
            .load(&sid)
            .map(|md| md.with_config(Arc::new(cfg.clone())))
            .expect("stored");
        store.store(sid, replaced);

        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&sid).expect("stored").config(), &cfg);
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(MetadataStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let sid = Sid::new();
                        store.store(sid, metadata(sid));
                        assert!(store.contains(&sid));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("writer thread");
        }
        assert_eq!(store.len(), 400);
    }
}
