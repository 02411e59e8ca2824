//! # Error Handling
//!
//! Centralized error types for the Waypoint routing core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Every variant declares an HTTP status via [`Error::status_code`]; the
//! [`ErrorClassifier`](crate::classifier::ErrorClassifier) is the only place
//! that turns that status into a user-visible page.

use crate::router::Method;
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Result type alias for Waypoint operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Waypoint runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    Bind {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No template matched the path, for this method or any other
    #[error("The requested resource was not found: {method} {path}")]
    RouteNotFound {
        /// Request method
        method: Method,
        /// The path that wasn't matched
        path: String,
    },

    /// The path is registered, but only under other methods
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        /// Request method
        method: Method,
        /// Request path
        path: String,
        /// Methods that do accept this path
        allowed: Vec<Method>,
    },

    /// The request method is outside the supported verb set
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod {
        /// Raw method token
        method: String,
    },

    /// Path matched a route but a parameter constraint did not hold
    #[error("Bad request: {message}")]
    BadRequest {
        /// Description of the failed constraint
        message: String,
    },

    /// Raised by middleware/actions when credentials are missing or invalid
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Reason
        message: String,
    },

    /// Raised by middleware/actions when access is denied
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Reason
        message: String,
    },

    /// Raised when a client exceeds its request budget
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// Reason
        message: String,
    },

    /// Controller-style action points at a controller or method that isn't registered
    #[error("Controller [{controller}] or its method [{method}] not found.")]
    ControllerNotFound {
        /// Controller identifier
        controller: String,
        /// Method name
        method: String,
    },

    /// Request body/query validation failed
    #[error("{0}")]
    ValidationFailed(ValidationErrors),

    /// Arbitrary status raised by application code
    #[error("{message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message
        message: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Middleware alias neither registered nor a known middleware type
    #[error("Middleware alias or type [{identifier}] not defined or does not exist.")]
    MiddlewareNotFound {
        /// The alias or type identifier
        identifier: String,
    },

    /// A middleware identifier did not resolve to a middleware implementation at request time
    #[error("Middleware [{identifier}] does not resolve to a registered middleware.")]
    InvalidMiddleware {
        /// The offending identifier
        identifier: String,
    },

    /// Route action has an unusable shape
    #[error("Invalid action format: {action}")]
    InvalidAction {
        /// Textual form of the action
        action: String,
    },

    /// Reverse lookup for an unknown route name
    #[error("Route '{name}' not found.")]
    NamedRouteNotFound {
        /// Requested route name
        name: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// Anything else raised by application code
    #[error("Internal error: {message}")]
    Internal {
        /// Message
        message: String,
    },
}

impl Error {
    /// HTTP status code this failure declares
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::ValidationFailed(_) => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::RouteNotFound { .. } | Self::ControllerNotFound { .. } => 404,
            Self::MethodNotAllowed { .. } | Self::UnsupportedMethod { .. } => 405,
            Self::PayloadTooLarge { .. } => 413,
            Self::RateLimited { .. } => 429,
            Self::Status { status, .. } => *status,
            Self::Bind { .. }
            | Self::InvalidRoutePattern { .. }
            | Self::MiddlewareNotFound { .. }
            | Self::InvalidMiddleware { .. }
            | Self::InvalidAction { .. }
            | Self::NamedRouteNotFound { .. }
            | Self::Hyper(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::Internal { .. } => 500,
        }
    }

    /// Whether this is a programmer/configuration error rather than a client error.
    ///
    /// These are raised while defining routes or while resolving a route's
    /// middleware/action, and should fail loudly instead of being retried.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRoutePattern { .. }
                | Self::MiddlewareNotFound { .. }
                | Self::InvalidMiddleware { .. }
                | Self::InvalidAction { .. }
        )
    }

    /// Shorthand for [`Error::Status`]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }
}
