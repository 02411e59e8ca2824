//! # Controllers
//!
//! Controller actions are looked up by `(controller, method)` at dispatch
//! time through an explicit [`ControllerRegistry`].

use crate::error::{Error, Result};
use crate::handler::Handler;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Exposes named methods as handlers
pub trait Controller: Send + Sync {
    /// Handler for `method`, if the controller exposes it
    fn action(&self, method: &str) -> Option<Handler>;
}

/// A controller backed by a method-name → handler table
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, Handler>,
}

impl MethodTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `handler` as `name`
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.methods.insert(name.into(), handler);
        self
    }
}

impl Controller for MethodTable {
    fn action(&self, method: &str) -> Option<Handler> {
        self.methods.get(method).cloned()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.methods.keys()).finish()
    }
}

/// Registered controllers by identifier
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `controller` under `name`, replacing any previous one
    pub fn register<C: Controller + 'static>(&mut self, name: impl Into<String>, controller: C) {
        self.controllers.insert(name.into(), Arc::new(controller));
    }

    /// Whether a controller is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    /// Resolve `controller`'s `method` into a handler
    ///
    /// # Errors
    ///
    /// `Error::ControllerNotFound` if either the controller or its method is
    /// missing.
    pub fn resolve(&self, controller: &str, method: &str) -> Result<Handler> {
        self.controllers
            .get(controller)
            .and_then(|c| c.action(method))
            .ok_or_else(|| Error::ControllerNotFound {
                controller: controller.to_string(),
                method: method.to_string(),
            })
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.controllers.keys()).finish()
    }
}
