//! # Error Classifier
//!
//! Terminal handling path for failures that escape dispatch: classify by
//! declared status, log, then hand a page description to an
//! [`ErrorRenderer`]. Nothing is retried.

use crate::config::RouterConfig;
use crate::error::Error;
use crate::response::Response;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// Page category chosen from a failure's status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 429
    TooManyRequests,
    /// 500 and every unrecognised status
    Internal,
}

impl ErrorKind {
    /// Classify a status code
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            405 => Self::MethodNotAllowed,
            429 => Self::TooManyRequests,
            _ => Self::Internal,
        }
    }

    /// Status code of the rendered page
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::TooManyRequests => 429,
            Self::Internal => 500,
        }
    }

    /// Canned message shown to the client
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::BadRequest => "The request could not be understood by the server.",
            Self::Unauthorized => "Authentication is required to access this resource.",
            Self::Forbidden => "You do not have permission to access this resource.",
            Self::NotFound => "The requested resource was not found!",
            Self::MethodNotAllowed => "Method not allowed for this resource.",
            Self::TooManyRequests => "Too many requests. Please try again later.",
            Self::Internal => "An internal server error occurred.",
        }
    }
}

/// What the renderer is asked to show
#[derive(Debug)]
pub struct ErrorPage<'a> {
    /// Configured view name
    pub view: &'a str,
    /// Status of the page
    pub status: u16,
    /// Canned message
    pub message: &'static str,
    /// Original failure, only for internal errors
    pub detail: Option<&'a Error>,
}

/// Error-page presentation seam
pub trait ErrorRenderer: Send + Sync {
    /// Render `page` into a response carrying `page.status`
    fn render(&self, page: &ErrorPage<'_>) -> Response;
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Default renderer producing `{"status", "message", "detail"?}`
///
/// `detail` is the failure's description and is only included in debug mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorRenderer {
    debug: bool,
}

impl JsonErrorRenderer {
    /// Create a renderer
    #[must_use]
    pub const fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl ErrorRenderer for JsonErrorRenderer {
    fn render(&self, page: &ErrorPage<'_>) -> Response {
        let body = ErrorBody {
            status: page.status,
            message: page.message,
            detail: page.detail.filter(|_| self.debug).map(ToString::to_string),
        };
        let encoded = crate::json::to_json(&body)
            .unwrap_or_else(|_| format!(r#"{{"status":{},"message":"{}"}}"#, page.status, page.message));
        Response::json(encoded).with_status(page.status)
    }
}

/// Maps failures to error pages
#[derive(Clone)]
pub struct ErrorClassifier {
    view: String,
    renderer: Arc<dyn ErrorRenderer>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

impl ErrorClassifier {
    /// Create a classifier rendering through `renderer`
    pub fn new<R: ErrorRenderer + 'static>(view: impl Into<String>, renderer: R) -> Self {
        Self {
            view: view.into(),
            renderer: Arc::new(renderer),
        }
    }

    /// JSON classifier using the config's view name and debug flag
    #[must_use]
    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.error_view.clone(), JsonErrorRenderer::new(config.debug))
    }

    /// Log `err` and render its error page
    pub fn handle(&self, err: &Error) -> Response {
        let kind = ErrorKind::from_status(err.status_code());

        if kind == ErrorKind::Internal {
            error!(error = %err, declared_status = err.status_code(), "Unhandled failure");
        } else {
            warn!(error = %err, status = kind.status(), "Request failed");
        }

        let page = ErrorPage {
            view: &self.view,
            status: kind.status(),
            message: kind.message(),
            detail: (kind == ErrorKind::Internal).then_some(err),
        };
        let mut res = self.renderer.render(&page);

        if let Error::MethodNotAllowed { allowed, .. } = err {
            let allow: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
            res.set_header("Allow", &allow.join(", "));
        }
        res
    }
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}
