//! # Configuration
//!
//! [`RouterConfig`] carries what the router reads at bootstrap (the
//! middleware alias table and error-page settings). [`ServerConfig`] holds
//! the HTTP entry point's listener settings.

use crate::error::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Router bootstrap settings
///
/// ```json
/// {
///   "middleware": { "timing": "TimingMiddleware", "auth": "app::Authenticate" },
///   "error_view": "errors",
///   "debug": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Middleware alias → type identifier
    pub middleware: BTreeMap<String, String>,
    /// View name handed to the error renderer
    pub error_view: String,
    /// Expose failure detail on internal-error pages
    pub debug: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            middleware: BTreeMap::new(),
            error_view: "errors".to_string(),
            debug: false,
        }
    }
}

impl RouterConfig {
    /// Parse a JSON document; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// `Error::BadRequest` if the document is not valid JSON for this shape.
    pub fn from_json(json: &str) -> Result<Self> {
        crate::json::parse_json(json)
    }

    /// Add an alias
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>, type_id: impl Into<String>) -> Self {
        self.middleware.insert(alias.into(), type_id.into());
        self
    }
}

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}
