//! Application-owned registry of connection sources
//!
//! Ensures only one source exists per distinct [`SourceConfig`]. The registry
//! is an ordinary value: the application creates it, shares it, and calls
//! [`SourceRegistry::shutdown`] when its lifecycle ends.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{RegistryError, SourceError, SourceResult};
use crate::traits::{ConnectionSource, SourceFactory};

struct RegistryState<S> {
    sources: HashMap<SourceConfig, Arc<S>>,
    closed: bool,
}

/// One connection source per configuration, built on demand by a factory.
///
/// The lock is held across `SourceFactory::create`: two threads asking for
/// the same configuration never build two sources.
pub struct SourceRegistry<F: SourceFactory> {
    factory: F,
    state: Mutex<RegistryState<F::Source>>,
}

impl<F: SourceFactory> SourceRegistry<F> {
    /// Create an empty registry that builds sources with `factory`
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            state: Mutex::new(RegistryState {
                sources: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Return the source for `config`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Closed` after [`shutdown`](Self::shutdown), or
    /// the validation/factory error if the source cannot be created.
    pub fn get_or_create(&self, config: &SourceConfig) -> SourceResult<Arc<F::Source>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SourceError::Closed);
        }
        if let Some(source) = state.sources.get(config) {
            return Ok(Arc::clone(source));
        }

        config.validate()?;
        let source = Arc::new(self.factory.create(config)?);
        state.sources.insert(config.clone(), Arc::clone(&source));
        debug!(target: "sqlexec::registry", url = %config.url, "Connection source created");
        Ok(source)
    }

    /// Whether a source has been created for `config`
    pub fn contains(&self, config: &SourceConfig) -> bool {
        self.state.lock().sources.contains_key(config)
    }

    /// Number of live sources
    pub fn len(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Whether the registry holds no sources
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the source for `config` without closing it.
    ///
    /// The caller takes over responsibility for closing the returned source.
    pub fn remove(&self, config: &SourceConfig) -> Option<Arc<F::Source>> {
        self.state.lock().sources.remove(config)
    }

    /// Close every source and refuse further lookups.
    ///
    /// All sources are closed even if some fail. Calling this again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns a `RegistryError` listing each source that failed to close.
    pub fn shutdown(&self) -> Result<(), RegistryError> {
        let sources: Vec<(SourceConfig, Arc<F::Source>)> = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.sources.drain().collect()
        };

        let mut failures = Vec::new();
        for (config, source) in sources {
            if let Err(e) = source.close() {
                warn!(target: "sqlexec::registry", url = %config.url, error = %e, "Failed to close connection source");
                failures.push((config.url, e));
            }
        }

        info!(target: "sqlexec::registry", failed = failures.len(), "Source registry shut down");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError { failures })
        }
    }
}

impl<F: SourceFactory> Drop for SourceRegistry<F> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
