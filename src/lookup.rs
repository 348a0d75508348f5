//! Lookup of the credit provider behind a payment or an operation.
//!
//! Requests that only carry an identifier (status, repeat, cancel) are classified by asking
//! the payments service which provider handles that payment. [`PaymentLookup`] is the seam;
//! [`PaymentsServiceClient`] is the HTTP implementation used in production.
//!
//! ## Protocol
//!
//! `GET {base_url}/payments/routing_direction?{key}={id}` where `key` is `payment_id` or
//! `operation_id`. A `200 OK` response carries `{"credit_provider": "<code>" | null}`.
//! Any other status is an error.

use http::StatusCode;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Kind of identifier a lookup is keyed by. Doubles as the query parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey {
    PaymentId,
    OperationId,
}

impl LookupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKey::PaymentId => "payment_id",
            LookupKey::OperationId => "operation_id",
        }
    }
}

impl Display for LookupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous query interface of the payments service.
pub trait PaymentLookup {
    /// The error type returned by this lookup.
    type Error: Debug + Display;

    /// Returns the provider code of the payment identified by `id`, if the service knows one.
    fn credit_provider(
        &self,
        key: LookupKey,
        id: &str,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;
}

impl<T: PaymentLookup> PaymentLookup for Arc<T> {
    type Error = T::Error;

    fn credit_provider(
        &self,
        key: LookupKey,
        id: &str,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send {
        self.as_ref().credit_provider(key, id)
    }
}

#[derive(Debug, Deserialize)]
struct RoutingDirection {
    #[serde(default)]
    credit_provider: Option<String>,
}

/// Errors that can occur while querying the payments service.
#[derive(Debug, thiserror::Error)]
pub enum PaymentsServiceClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// A client for the payments service `routing_direction` endpoint.
#[derive(Clone, Debug)]
pub struct PaymentsServiceClient {
    /// Full URL of `GET /payments/routing_direction`
    routing_direction_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl PaymentsServiceClient {
    const CONTEXT: &'static str = "GET /payments/routing_direction";

    /// Constructs a client from the payments service base URL.
    ///
    /// A path prefix of the base URL is kept: `http://payments:8080/internal` resolves to
    /// `http://payments:8080/internal/payments/routing_direction`.
    pub fn try_new(mut base_url: Url) -> Result<Self, PaymentsServiceClientError> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let path = format!("{}/", base_url.path().trim_end_matches('/'));
        base_url.set_path(&path);
        let routing_direction_url = base_url
            .join("./payments/routing_direction")
            .map_err(|e| PaymentsServiceClientError::UrlParse {
                context: "Failed to construct ./payments/routing_direction URL",
                source: e,
            })?;
        Ok(Self {
            routing_direction_url,
            client: Client::new(),
            timeout: None,
        })
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Sends `GET /payments/routing_direction?{key}={id}`.
    #[instrument(name = "payments_service.routing_direction", skip(self), err)]
    pub async fn routing_direction(
        &self,
        key: LookupKey,
        id: &str,
    ) -> Result<Option<String>, PaymentsServiceClientError> {
        let context = Self::CONTEXT;
        let mut url = self.routing_direction_url.clone();
        url.query_pairs_mut().append_pair(key.as_str(), id);

        let mut req = self.client.get(url);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| PaymentsServiceClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            let direction = http_response
                .json::<RoutingDirection>()
                .await
                .map_err(|e| PaymentsServiceClientError::JsonDeserialization { context, source: e })?;
            tracing::info!(
                %key,
                id,
                credit_provider = ?direction.credit_provider,
                "Resolved routing direction"
            );
            Ok(direction.credit_provider)
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| PaymentsServiceClientError::ResponseBodyRead { context, source: e })?;
            Err(PaymentsServiceClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

impl PaymentLookup for PaymentsServiceClient {
    type Error = PaymentsServiceClientError;

    async fn credit_provider(
        &self,
        key: LookupKey,
        id: &str,
    ) -> Result<Option<String>, Self::Error> {
        self.routing_direction(key, id).await
    }
}

/// Converts a string URL into a `PaymentsServiceClient`.
impl TryFrom<&str> for PaymentsServiceClient {
    type Error = PaymentsServiceClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(value).map_err(|e| PaymentsServiceClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        PaymentsServiceClient::try_new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_routing_direction_by_payment_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/routing_direction"))
            .and(query_param("payment_id", "pay-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "credit_provider": "IBAN" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = PaymentsServiceClient::try_from(mock_server.uri().as_str()).unwrap();
        let provider = client
            .credit_provider(LookupKey::PaymentId, "pay-1")
            .await
            .unwrap();
        assert_eq!(provider.as_deref(), Some("IBAN"));
    }

    #[tokio::test]
    async fn test_routing_direction_by_operation_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/routing_direction"))
            .and(query_param("operation_id", "op-7"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "credit_provider": "MOBILE" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = PaymentsServiceClient::try_from(mock_server.uri().as_str()).unwrap();
        let provider = client
            .credit_provider(LookupKey::OperationId, "op-7")
            .await
            .unwrap();
        assert_eq!(provider.as_deref(), Some("MOBILE"));
    }

    #[tokio::test]
    async fn test_null_credit_provider() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/routing_direction"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "credit_provider": null })),
            )
            .mount(&mock_server)
            .await;

        let client = PaymentsServiceClient::try_from(mock_server.uri().as_str()).unwrap();
        let provider = client
            .credit_provider(LookupKey::PaymentId, "pay-1")
            .await
            .unwrap();
        assert_eq!(provider, None);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/routing_direction"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let client = PaymentsServiceClient::try_from(mock_server.uri().as_str()).unwrap();
        let err = client
            .credit_provider(LookupKey::PaymentId, "pay-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentsServiceClientError::HttpStatus { status, ref body, .. }
                if status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom"
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/routing_direction"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "credit_provider": "UAPI" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = PaymentsServiceClient::try_from(mock_server.uri().as_str())
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let err = client
            .credit_provider(LookupKey::PaymentId, "pay-1")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentsServiceClientError::Http { .. }));
    }

    #[tokio::test]
    async fn test_id_is_encoded_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/routing_direction"))
            .and(query_param("payment_id", "pay 1/2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "credit_provider": "UAPI" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = PaymentsServiceClient::try_from(mock_server.uri().as_str()).unwrap();
        let provider = client
            .credit_provider(LookupKey::PaymentId, "pay 1/2")
            .await
            .unwrap();
        assert_eq!(provider.as_deref(), Some("UAPI"));
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        for base in [
            "http://payments:8080/internal",
            "http://payments:8080/internal/",
            "http://payments:8080/internal//",
        ] {
            let client = PaymentsServiceClient::try_new(Url::parse(base).unwrap()).unwrap();
            assert_eq!(
                client.routing_direction_url.as_str(),
                "http://payments:8080/internal/payments/routing_direction"
            );
        }
        let client = PaymentsServiceClient::try_from("http://payments:8080").unwrap();
        assert_eq!(
            client.routing_direction_url.as_str(),
            "http://payments:8080/payments/routing_direction"
        );
    }

    #[tokio::test]
    async fn test_prefixed_base_url_reaches_service() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/payments/routing_direction"))
            .and(query_param("operation_id", "op-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "credit_provider": "IBAN" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let base = Url::parse(&format!("{}/internal", mock_server.uri())).unwrap();
        let client = PaymentsServiceClient::try_new(base).unwrap();
        let provider = client
            .credit_provider(LookupKey::OperationId, "op-1")
            .await
            .unwrap();
        assert_eq!(provider.as_deref(), Some("IBAN"));
    }
}
