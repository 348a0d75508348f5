//! Read-once cache for inbound request bodies.
//!
//! A transport body can only be consumed once, but the gateway may need it twice: first to
//! classify the request, then to forward it upstream. [`CachedBody`] owns the inbound body
//! for the lifetime of one request. The first [`CachedBody::capture`] drains it into memory;
//! every later capture returns the same bytes. Concurrent captures await the single read.

use axum::body::{Body, Bytes};
use std::sync::Mutex;
use tokio::sync::OnceCell;

#[derive(Debug, thiserror::Error)]
pub enum BodyCacheError {
    #[error("Request body was already handed off")]
    Consumed,
    #[error("Failed to read request body: {0}")]
    Read(#[source] axum::Error),
}

/// Request body that can be read by any number of classifiers and then forwarded.
#[derive(Debug)]
pub struct CachedBody {
    source: Mutex<Option<Body>>,
    bytes: OnceCell<Bytes>,
    limit: usize,
}

/// Body to send upstream once classification is over.
#[derive(Debug)]
pub enum ForwardBody {
    /// The body was captured during classification.
    Buffered(Bytes),
    /// Nobody looked at the body; it is still the original stream.
    Streaming(Body),
}

impl CachedBody {
    /// Wraps an inbound body. At most `limit` bytes are buffered on capture.
    pub fn new(body: Body, limit: usize) -> Self {
        Self {
            source: Mutex::new(Some(body)),
            bytes: OnceCell::new(),
            limit,
        }
    }

    /// Returns the full body, reading it from the transport on first use.
    pub async fn capture(&self) -> Result<&Bytes, BodyCacheError> {
        self.bytes
            .get_or_try_init(|| async {
                let body = self
                    .source
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take()
                    .ok_or(BodyCacheError::Consumed)?;
                axum::body::to_bytes(body, self.limit)
                    .await
                    .map_err(BodyCacheError::Read)
            })
            .await
    }

    /// Whether the body has already been buffered.
    pub fn is_captured(&self) -> bool {
        self.bytes.initialized()
    }

    /// Releases the body for forwarding.
    pub fn into_forward_body(self) -> ForwardBody {
        match self.bytes.into_inner() {
            Some(bytes) => ForwardBody::Buffered(bytes),
            None => {
                let source = self
                    .source
                    .into_inner()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                ForwardBody::Streaming(source.unwrap_or_else(Body::empty))
            }
        }
    }
}
