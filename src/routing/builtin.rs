//! Built-in route modules available in every catalog.

use async_trait::async_trait;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::process::BoxError;
use crate::routing::{RouteContext, RouteModule};

pub const HEALTH: &str = "health";
pub const IDENTITY: &str = "identity";

/// `GET /health`: liveness of this worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Health;

#[async_trait]
impl RouteModule for Health {
    async fn register(&self, ctx: RouteContext) -> Result<Router, BoxError> {
        let worker = ctx.worker().to_string();
        Ok(Router::new().route(
            "/health",
            get(move || {
                let worker = worker.clone();
                async move { Json(json!({ "status": "ok", "worker": worker })) }
            }),
        ))
    }
}

/// `GET /identity`: the serving worker's instance identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl RouteModule for Identity {
    async fn register(&self, ctx: RouteContext) -> Result<Router, BoxError> {
        Ok(Router::new().route(
            "/identity",
            get(move || {
                let ctx = ctx.clone();
                async move { Json(identity_body(&ctx)) }
            }),
        ))
    }
}

fn identity_body(ctx: &RouteContext) -> Value {
    let identity = ctx.process().identity();
    json!({
        "instance_id": identity.instance_id().to_string(),
        "canonical_url": identity.canonical_url().as_str(),
        "started_at_ms": identity.started_at_unix_ms(),
        "uptime_secs": identity.uptime().as_secs(),
        "worker": ctx.worker().to_string(),
    })
}
