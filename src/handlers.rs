//! HTTP endpoints of the payments gateway.
//!
//! - `GET /health` – liveness probe
//! - everything else – handed to [`Gateway::handle_request`], which recognizes the payment
//!   operations under the configured base path and answers `404` for anything else
//!
//! State is an `Arc<Gateway<L>>`, shared by all requests.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::gateway::Gateway;
use crate::lookup::PaymentLookup;

pub fn routes<L>() -> Router<Arc<Gateway<L>>>
where
    L: PaymentLookup + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(get_health))
        .fallback(dispatch::<L>)
}

/// `GET /health`: Reports the service as up.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}

/// Classifies and forwards a payment request.
pub async fn dispatch<L>(State(gateway): State<Arc<Gateway<L>>>, req: Request) -> Response
where
    L: PaymentLookup + Send + Sync + 'static,
{
    gateway.handle_request(req).await
}
