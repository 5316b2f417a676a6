//! HTTP server for one worker.
//!
//! # Responsibilities
//! - Wrap the composed route router with middleware (trace, timeout, request ID)
//! - Serve it on the worker's shared listener
//! - Stop accepting on shutdown and let in-flight requests finish

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::HttpConfig;
use crate::lifecycle::Shutdown;

/// HTTP server wrapping a worker's composed router.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Apply the standard middleware stack to `routes`.
    pub fn new(routes: Router, config: &HttpConfig) -> Self {
        Self {
            router: Self::build_router(routes, config),
        }
    }

    #[allow(deprecated)]
    fn build_router(routes: Router, config: &HttpConfig) -> Router {
        routes.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
        )
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}
