//! # HTTP Server
//!
//! HTTP entry point built on Hyper and Tokio. Every request is dispatched
//! through the [`Router`]; any failure is turned into a response by the
//! [`ErrorClassifier`].
//!
//! ## Key Features
//!
//! - Async request handling with Tokio runtime
//! - Graceful shutdown on Ctrl-C with a connection drain timeout
//! - Connection keep-alive support
//! - Request ids echoed on every response

use crate::classifier::ErrorClassifier;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// HTTP server wrapping a fully built router
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    classifier: Arc<ErrorClassifier>,
}

impl Server {
    /// Serve `router` with the default configuration and JSON error pages
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            config: ServerConfig::default(),
            router: Arc::new(router),
            classifier: Arc::new(ErrorClassifier::default()),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Render failures with `classifier`
    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// The router being served
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// `Error::Bind` if the listener cannot be set up, `Error::Io` if
    /// accepting a connection fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;
        let bind_err = |source: std::io::Error| Error::Bind {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()
        } else {
            tokio::net::TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true).map_err(bind_err)?;
        }
        socket.bind(addr).map_err(bind_err)?;

        let listener = socket.listen(1024).map_err(bind_err)?;

        info!("Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let router = Arc::clone(&self.router);
                    let classifier = Arc::clone(&self.classifier);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                            let router = Arc::clone(&router);
                            let classifier = Arc::clone(&classifier);
                            async move {
                                let method = req.method().clone();
                                let path = req.uri().path().to_string();
                                let version = format!("{:?}", req.version());

                                let resp = handle_request(
                                    req,
                                    &router,
                                    &classifier,
                                    remote_addr,
                                    max_body_size,
                                )
                                .await;

                                info!("    {} - \"{} {} {}\" {}",
                                    remote_addr,
                                    method,
                                    path,
                                    version,
                                    resp.status()
                                );
                                Ok::<_, hyper::Error>(resp)
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let timeout = self.config.shutdown_timeout;
        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            info!(
                remaining = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        Ok(())
    }

    /// Run `req` through the same pipeline as network requests
    ///
    /// Headers are taken as given; use [`Server::handle_from`] to attribute
    /// the request to a peer.
    pub async fn handle(&self, req: Request) -> Response {
        process_request(req, &self.router, &self.classifier).await
    }

    /// Like [`Server::handle`], with `x-client-ip` set from `remote_addr`
    pub async fn handle_from(&self, mut req: Request, remote_addr: SocketAddr) -> Response {
        req.set_header("x-client-ip", &remote_addr.ip().to_string());
        process_request(req, &self.router, &self.classifier).await
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", err);
        std::future::pending::<()>().await;
    }
}

/// Dispatch and classify (network agnostic)
async fn process_request(mut req: Request, router: &Router, classifier: &ErrorClassifier) -> Response {
    let request_id = match req.header("x-request-id") {
        Some(id) => id.to_string(),
        None => {
            let id = generate_request_id();
            req.set_header("x-request-id", &id);
            id
        }
    };

    let mut response = match router.dispatch(req).await {
        Ok(response) => response,
        Err(err) => classifier.handle(&err),
    };
    response.set_header("x-request-id", &request_id);
    response
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    router: &Router,
    classifier: &ErrorClassifier,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r,
        Err(Error::PayloadTooLarge { limit, actual }) => {
            info!(limit, actual, "Rejected oversized request body");
            return Response::text("Payload Too Large").with_status(413).into_hyper();
        }
        Err(err) => return classifier.handle(&err).into_hyper(),
    };

    request.set_header("x-client-ip", &remote_addr.ip().to_string());
    process_request(request, router, classifier).await.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::router::Method;

    fn server() -> Server {
        let mut router = Router::new();
        router.get("/hello/{name}", handler(|req: Request| async move {
            Ok(Response::text(format!("hello {}", req.param("name").unwrap_or("?"))))
        }));
        router.post("/only-post", handler(|_req| async { Ok(Response::text("posted")) }));
        router.get("/ip", handler(|req: Request| async move {
            Ok(Response::text(req.header("x-client-ip").unwrap_or("").to_string()))
        }));
        Server::new(router)
    }

    #[tokio::test]
    async fn test_handle_success_echoes_request_id() {
        let res = server()
            .handle(Request::new(Method::Get, "/hello/ada").with_header("x-request-id", "abc"))
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body, "hello ada");
        assert_eq!(res.header("x-request-id"), Some("abc"));
    }

    #[tokio::test]
    async fn test_failures_go_through_classifier() {
        let server = server();

        let res = server.handle(Request::new(Method::Get, "/missing")).await;
        assert_eq!(res.status, 404);
        assert!(res.header("x-request-id").is_some());

        let res = server.handle(Request::new(Method::Get, "/only-post")).await;
        assert_eq!(res.status, 405);
        assert_eq!(res.header("allow"), Some("POST"));
    }

    #[tokio::test]
    async fn test_client_ip_comes_from_the_peer() {
        let server = server();

        let res = server.handle(Request::new(Method::Get, "/ip")).await;
        assert_eq!(res.body, "");

        let peer: SocketAddr = ([192, 168, 1, 20], 40000).into();
        let res = server
            .handle_from(Request::new(Method::Get, "/ip").with_header("x-client-ip", "spoofed"), peer)
            .await;
        assert_eq!(res.body, "192.168.1.20");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }

    #[test]
    fn test_builder_settings() {
        let mut server = Server::new(Router::new()).bind(([0, 0, 0, 0], 9000).into());
        server.set_max_body_size(16);
        assert_eq!(server.config.address.port(), 9000);
        assert_eq!(server.config.max_body_size, 16);
        assert_eq!(server.router().route_count(), 0);
    }
}
