//! Per-request pipeline of the payments gateway.
//!
//! [`Gateway::handle_request`] runs one inbound request through every stage:
//! operation matching, classification, forwarding and response augmentation. Failures are
//! mapped to HTTP responses by [`GatewayError`]:
//!
//! | Outcome                                    | Status |
//! |--------------------------------------------|--------|
//! | unknown path, or no payment type matched   | 404    |
//! | malformed or unreadable request body       | 400    |
//! | upstream unreachable                       | 502    |
//!
//! A failed payment lookup is a classification miss, so it ends in 404 as well.

use axum::Json;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;
use tracing::instrument;

use crate::augment::augment;
use crate::body_cache::CachedBody;
use crate::classifier::ClassifyError;
use crate::dispatcher::Dispatcher;
use crate::lookup::PaymentLookup;
use crate::payment_type::PaymentType;
use crate::upstream::{UpstreamClient, UpstreamError, UpstreamResponse};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("No route for request")]
    NoRoute,
    #[error(transparent)]
    Malformed(#[from] ClassifyError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoRoute => StatusCode::NOT_FOUND,
            GatewayError::Malformed(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            GatewayError::NoRoute => "Not found".to_string(),
            GatewayError::Malformed(err) => err.to_string(),
            GatewayError::Upstream(_) => "Upstream unavailable".to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Classifies inbound requests and forwards each to the upstream of its payment type.
pub struct Gateway<L> {
    dispatcher: Dispatcher<L>,
    upstream: UpstreamClient,
    max_body_bytes: usize,
}

impl<L> Gateway<L>
where
    L: PaymentLookup + Sync,
{
    pub fn new(dispatcher: Dispatcher<L>, upstream: UpstreamClient, max_body_bytes: usize) -> Self {
        Self {
            dispatcher,
            upstream,
            max_body_bytes,
        }
    }

    /// Serves one request. Every failure is turned into an error response.
    #[instrument(
        name = "gateway.handle_request",
        skip_all,
        fields(method = %req.method(), path = %req.uri().path())
    )]
    pub async fn handle_request(&self, req: Request) -> Response {
        match self.handle_request_fallible(req).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    GatewayError::NoRoute => tracing::info!("No route for request"),
                    GatewayError::Malformed(error) => {
                        tracing::warn!(%error, "Rejected malformed request")
                    }
                    GatewayError::Upstream(error) => {
                        tracing::warn!(%error, "Upstream request failed")
                    }
                }
                err.into_response()
            }
        }
    }

    /// Serves one request, returning failures as [`GatewayError`].
    pub async fn handle_request_fallible(&self, req: Request) -> Result<Response, GatewayError> {
        let (parts, body) = req.into_parts();
        let matched = self
            .dispatcher
            .match_request(&parts.method, parts.uri.path())
            .ok_or(GatewayError::NoRoute)?;

        let body = CachedBody::new(body, self.max_body_bytes);
        let rule = self
            .dispatcher
            .select(&matched, &body)
            .await?
            .ok_or(GatewayError::NoRoute)?;
        let payment_type = rule.payment_type();
        let url = rule.target_url(matched.path_id.as_deref(), parts.uri.query());
        tracing::info!(
            operation = %matched.operation,
            %payment_type,
            %url,
            "Forwarding request"
        );

        let upstream = self
            .upstream
            .forward(parts.method, &parts.headers, url, body.into_forward_body())
            .await?;
        Ok(tag_response(upstream, payment_type))
    }
}

/// Adds `payment_type` to successful JSON object responses. Anything else passes through.
fn tag_response(upstream: UpstreamResponse, payment_type: PaymentType) -> Response {
    if upstream.status.is_success() {
        if let Some(body) = augment(&upstream.body, payment_type) {
            let mut response = Response::from(upstream);
            *response.body_mut() = Body::from(body);
            return response;
        }
    }
    Response::from(upstream)
}
