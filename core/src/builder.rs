//! Builder API for ergonomic breaker configuration

use crate::{
    BreakerStatus,
    breaker::{Breaker, BreakerObserver},
    config::FuseConfig,
    errors::CircuitError,
    fuse::Fuse,
};
use std::sync::Arc;

/// Builder for creating breakers with fluent API
pub struct BreakerBuilder {
    name: String,
    fuse: Box<dyn Fuse>,
    initial_status: BreakerStatus,
    observers: Vec<BreakerObserver>,
}

impl BreakerBuilder {
    /// Create a new builder for a breaker with the given name and fuse
    pub fn new(name: impl Into<String>, fuse: impl Fuse + 'static) -> Self {
        Self::from_boxed(name, Box::new(fuse))
    }

    /// Create a builder from an already boxed fuse
    pub fn from_boxed(name: impl Into<String>, fuse: Box<dyn Fuse>) -> Self {
        Self {
            name: name.into(),
            fuse,
            initial_status: BreakerStatus::On,
            observers: Vec::new(),
        }
    }

    /// Create a builder whose fuse is built from `config`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the config does not validate.
    pub fn with_config(name: impl Into<String>, config: &FuseConfig) -> Result<Self, CircuitError> {
        Ok(Self::from_boxed(name, config.build()?))
    }

    /// Set the status the breaker starts in (default `On`)
    ///
    /// `TrippedOff` cannot be forced and is treated like `Off`.
    pub fn initial_status(mut self, status: BreakerStatus) -> Self {
        self.initial_status = status;
        self
    }

    /// Start the breaker switched off
    pub fn off(self) -> Self {
        self.initial_status(BreakerStatus::Off)
    }

    /// Set callback for breaker status changes
    ///
    /// Registered after the initial status is applied, so it never sees
    /// construction.
    pub fn on_status_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Breaker) + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(f));
        self
    }

    /// Build the breaker
    pub fn build(self) -> Breaker {
        Breaker::assemble(self.name, self.fuse, self.initial_status, self.observers)
    }
}

impl std::fmt::Debug for BreakerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerBuilder")
            .field("name", &self.name)
            .field("fuse", &self.fuse.kind())
            .field("initial_status", &self.initial_status)
            .field("observers", &self.observers.len())
            .finish()
    }
}
