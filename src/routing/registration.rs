//! Fan-out/fan-in registration of route modules.
//!
//! # Responsibilities
//! - Resolve and register every named module concurrently
//! - Wait for all attempts to settle, successes and failures alike
//! - Compose the successful pieces into one router
//!
//! # Design Decisions
//! - A failure (unknown name, `Err`, panic) is logged and isolated
//! - Registration never fails the worker as a whole
//! - Not idempotent: registering the same names twice mounts them twice

use std::panic::{catch_unwind, AssertUnwindSafe};

use axum::Router;
use futures_util::future::join_all;
use futures_util::FutureExt;

use crate::observability::metrics;
use crate::process::panic_message;
use crate::routing::{RouteCatalog, RouteContext, RouteError};

/// Settled outcome of [`register_routes`].
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pieces: Vec<(String, Router)>,
    pub failed: Vec<(String, RouteError)>,
}

impl RegistrationReport {
    /// Modules that registered, in request order.
    pub fn registered(&self) -> Vec<&str> {
        self.pieces.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn settled(&self) -> usize {
        self.pieces.len() + self.failed.len()
    }

    /// Merge every registered piece into a single router.
    ///
    /// A piece that cannot be merged (for example a path already mounted by
    /// an earlier module) is logged and left out.
    pub fn into_router(self) -> Router {
        let mut composed = Router::new();
        for (name, piece) in self.pieces {
            let base = composed.clone();
            match catch_unwind(AssertUnwindSafe(move || base.merge(piece))) {
                Ok(merged) => composed = merged,
                Err(panic) => {
                    tracing::warn!(
                        module = %name,
                        error = %panic_message(panic.as_ref()),
                        "Route module conflicts with an earlier module; skipped"
                    );
                }
            }
        }
        composed
    }
}

/// Register `names` from `catalog` for one worker.
///
/// Every attempt runs concurrently and the call returns only once all of
/// them have settled.
pub async fn register_routes(
    catalog: &RouteCatalog,
    names: &[String],
    ctx: &RouteContext,
) -> RegistrationReport {
    let attempts = names.iter().map(|name| async move {
        let outcome = attempt(catalog, name, ctx).await;
        (name.clone(), outcome)
    });

    let mut report = RegistrationReport::default();
    for (name, outcome) in join_all(attempts).await {
        match outcome {
            Ok(router) => {
                tracing::debug!(module = %name, "Route module registered");
                metrics::record_route_registration(true);
                report.pieces.push((name, router));
            }
            Err(e) => {
                tracing::warn!(module = %name, error = %e, "Route module failed to register");
                metrics::record_route_registration(false);
                report.failed.push((name, e));
            }
        }
    }
    report
}

async fn attempt(catalog: &RouteCatalog, name: &str, ctx: &RouteContext) -> Result<Router, RouteError> {
    let module = catalog.resolve(name)?;
    match AssertUnwindSafe(module.register(ctx.clone())).catch_unwind().await {
        Ok(Ok(router)) => Ok(router),
        Ok(Err(source)) => Err(RouteError::Registration {
            module: name.to_string(),
            source,
        }),
        Err(panic) => Err(RouteError::Panicked {
            module: name.to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}
