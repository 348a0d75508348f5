//! Forwarding of classified requests to the selected upstream service.
//!
//! Exactly one HTTP call is made per request. Upstream errors are not retried and no other
//! upstream is tried once one has been selected.

use axum::body::{Body, Bytes, HttpBody};
use http::{HeaderMap, HeaderName, Method, StatusCode, header};
use reqwest::Client;
use tracing::instrument;
use url::Url;

use crate::body_cache::ForwardBody;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to read response from {url}: {source}")]
    ResponseBodyRead {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// Fully read upstream response.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// HTTP client shared by all forwarded requests.
#[derive(Clone, Debug, Default)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    /// Sends the request to `url`, keeping the original method, headers and body.
    #[instrument(name = "upstream.forward", skip_all, fields(%method, %url), err)]
    pub async fn forward(
        &self,
        method: Method,
        headers: &HeaderMap,
        url: Url,
        body: ForwardBody,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut req = self.client.request(method, url.clone());
        for (name, value) in headers.iter() {
            if is_forwarded_request_header(name) {
                req = req.header(name, value);
            }
        }
        req = match body {
            ForwardBody::Buffered(bytes) => req.body(bytes),
            ForwardBody::Streaming(body) if body.is_end_stream() => req,
            ForwardBody::Streaming(body) => {
                req.body(reqwest::Body::wrap_stream(body.into_data_stream()))
            }
        };
        let response = req.send().await.map_err(|source| UpstreamError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| is_returned_response_header(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect::<HeaderMap>();
        let body = response
            .bytes()
            .await
            .map_err(|source| UpstreamError::ResponseBodyRead { url, source })?;
        tracing::debug!(%status, bytes = body.len(), "Upstream responded");
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Headers describing a single connection. They are never forwarded in either direction.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn is_forwarded_request_header(name: &HeaderName) -> bool {
    *name != header::HOST && *name != header::CONTENT_LENGTH && !is_hop_by_hop(name)
}

fn is_returned_response_header(name: &HeaderName) -> bool {
    *name != header::CONTENT_LENGTH && !is_hop_by_hop(name)
}

impl From<UpstreamResponse> for axum::response::Response {
    fn from(upstream: UpstreamResponse) -> Self {
        let mut response = axum::response::Response::new(Body::from(upstream.body));
        *response.status_mut() = upstream.status;
        *response.headers_mut() = upstream.headers;
        response
    }
}
