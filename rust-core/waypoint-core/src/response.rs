//! # HTTP Response
//!
//! Opaque result produced by actions and middleware, converted to a hyper
//! response only at the server edge.

use crate::error::Result;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use std::collections::HashMap;

/// HTTP response value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Response headers (excluding Content-Type)
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self::with_content_type(String::new(), "text/plain")
    }
}

impl Response {
    fn with_content_type(body: String, content_type: &str) -> Self {
        Self {
            status: 200,
            body,
            content_type: content_type.to_string(),
            headers: HashMap::new(),
        }
    }

    /// Create a JSON response from an already-encoded body
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "application/json")
    }

    /// Serialize `value` into a JSON response
    ///
    /// # Errors
    ///
    /// Propagates serialization failures.
    pub fn json_value<T: Serialize>(value: &T) -> Result<Self> {
        crate::json::to_json(value).map(Self::json)
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "text/plain")
    }

    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "text/html; charset=utf-8")
    }

    /// Create a redirect to `location`
    #[must_use]
    pub fn redirect(location: &str, status: u16) -> Self {
        Self::text(String::new())
            .with_status(status)
            .with_header("Location", location)
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers.retain(|k, _| !k.eq_ignore_ascii_case(key));
            self.headers.insert(key.to_string(), value.to_string());
        }
    }

    /// Header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                let mut fallback =
                    hyper::Response::new(Full::new(Bytes::from("Internal Server Error")));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json() {
        let resp = Response::json(r#"{"status": "ok"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "application/json");
    }

    #[test]
    fn test_response_with_status() {
        let resp = Response::text("Not Found").with_status(404);
        assert_eq!(resp.status, 404);
    }

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut resp = Response::text("ok").with_header("X-Trace", "1");
        resp.set_header("x-trace", "2");
        assert_eq!(resp.headers.len(), 1);
        assert_eq!(resp.header("X-TRACE"), Some("2"));
    }

    #[test]
    fn test_redirect() {
        let resp = Response::redirect("/users/7", 302);
        assert_eq!(resp.status, 302);
        assert_eq!(resp.header("location"), Some("/users/7"));
    }

    #[test]
    fn test_into_hyper_keeps_status_and_headers() {
        let resp = Response::json("{}").with_status(201).with_header("X-Id", "9");
        let hyper_resp = resp.into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::CREATED);
        assert_eq!(hyper_resp.headers()["x-id"], "9");
        assert_eq!(hyper_resp.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_invalid_status_falls_back_to_500() {
        let hyper_resp = Response::text("x").with_status(42).into_hyper();
        assert_eq!(hyper_resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
