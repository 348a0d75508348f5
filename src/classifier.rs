//! Classification of inbound requests into payment types.
//!
//! There are two strategies:
//!
//! - **Content**: `check` and `create` requests carry a credit destination type in their body.
//!   The token is read once and tested against each type's destination tokens.
//! - **Remote**: `status`, `repeat` and `cancel` requests only carry an identifier. The
//!   payments service is asked which provider handles it, and the provider code is mapped
//!   to a type. [`RemoteClassification`] memoizes that single query for the whole request.
//!
//! An undetermined type is a normal outcome. Bodies that violate the expected format are
//! reported as [`ClassifyError`] so the caller can answer with a client error instead.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::body_cache::BodyCacheError;
use crate::lookup::{LookupKey, PaymentLookup};
use crate::payment_type::PaymentType;

/// Why a request could not be classified at all.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Body(#[from] BodyCacheError),
    #[error("Request body is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("Required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("Field `intent` is not valid base64: {0}")]
    IntentEncoding(#[source] base64::DecodeError),
    #[error("Field `intent` does not decode to a JSON object: {0}")]
    IntentPayload(#[source] serde_json::Error),
    #[error("Path identifier is not valid percent-encoded UTF-8: {0}")]
    PathId(#[source] std::string::FromUtf8Error),
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    #[serde(default)]
    credit_dst_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(default)]
    intent: Option<String>,
}

/// Decoded content of [`CreateRequest::intent`].
#[derive(Debug, Deserialize)]
struct Intent {
    #[serde(default)]
    credit_dst_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    #[serde(default)]
    payment_id: Option<String>,
}

/// Reads `credit_dst_type` from a `check` request body.
pub fn check_destination(body: &[u8]) -> Result<Option<String>, ClassifyError> {
    let request: CheckRequest =
        serde_json::from_slice(body).map_err(ClassifyError::MalformedJson)?;
    Ok(request.credit_dst_type)
}

/// Reads `credit_dst_type` from the base64-encoded `intent` of a `create` request body.
pub fn create_destination(body: &[u8]) -> Result<Option<String>, ClassifyError> {
    let request: CreateRequest =
        serde_json::from_slice(body).map_err(ClassifyError::MalformedJson)?;
    let encoded = request.intent.ok_or(ClassifyError::MissingField("intent"))?;
    let decoded = b64
        .decode(encoded.trim())
        .map_err(ClassifyError::IntentEncoding)?;
    let intent: Intent = serde_json::from_slice(&decoded).map_err(ClassifyError::IntentPayload)?;
    Ok(intent.credit_dst_type)
}

/// Reads `payment_id` from a `cancel` request body.
pub fn cancel_payment_id(body: &[u8]) -> Result<String, ClassifyError> {
    let request: CancelRequest =
        serde_json::from_slice(body).map_err(ClassifyError::MalformedJson)?;
    request
        .payment_id
        .ok_or(ClassifyError::MissingField("payment_id"))
}

/// Decodes the identifier segment of a `status` or `repeat` path.
pub fn path_identifier(segment: &str) -> Result<String, ClassifyError> {
    urlencoding::decode(segment)
        .map(|id| id.into_owned())
        .map_err(ClassifyError::PathId)
}

/// Remote classification of one request, queried at most once.
///
/// Every candidate payment type is tested against the same memoized outcome.
/// Lookup failures are logged and count as an undetermined type.
pub struct RemoteClassification<'a, L> {
    lookup: &'a L,
    key: LookupKey,
    id: String,
    outcome: OnceCell<Option<PaymentType>>,
}

impl<'a, L> RemoteClassification<'a, L>
where
    L: PaymentLookup + Sync,
{
    pub fn new(lookup: &'a L, key: LookupKey, id: String) -> Self {
        Self {
            lookup,
            key,
            id,
            outcome: OnceCell::new(),
        }
    }

    /// The payment type of the request, querying the payments service on first use.
    pub async fn resolve(&self) -> Option<PaymentType> {
        *self
            .outcome
            .get_or_init(|| async {
                match self.lookup.credit_provider(self.key, &self.id).await {
                    Ok(Some(code)) => {
                        let payment_type = PaymentType::from_provider_code(&code);
                        if payment_type.is_none() {
                            tracing::info!(
                                key = %self.key,
                                id = %self.id,
                                credit_provider = %code,
                                "Unknown credit provider"
                            );
                        }
                        payment_type
                    }
                    Ok(None) => None,
                    Err(error) => {
                        tracing::warn!(
                            key = %self.key,
                            id = %self.id,
                            %error,
                            "Payment lookup failed"
                        );
                        None
                    }
                }
            })
            .await
    }
}

/// Per-request classification state, shared by all candidate payment types.
pub enum Classification<'a, L> {
    /// Destination token read from the request body. `None` when the body carries none.
    Destination(Option<String>),
    /// Payment type resolved through the payments service.
    Remote(RemoteClassification<'a, L>),
}

impl<L> Classification<'_, L>
where
    L: PaymentLookup + Sync,
{
    /// Whether the request belongs to `payment_type`.
    pub async fn matches(&self, payment_type: PaymentType) -> bool {
        match self {
            Classification::Destination(token) => {
                payment_type.accepts_destination(token.as_deref())
            }
            Classification::Remote(remote) => remote.resolve().await == Some(payment_type),
        }
    }
}
