//! Operation matching and ordered rule evaluation.
//!
//! The [`Dispatcher`] owns a small routing table built once from the [`RouteTable`]: for
//! each [`Operation`], the list of [`RouteRule`]s of the payment types that offer it, in
//! [`PaymentType::ALL`] order. A request is served as follows:
//!
//! 1. [`Dispatcher::match_request`] maps method and path to an operation. Unknown shapes
//!    stop here.
//! 2. [`Dispatcher::select`] classifies the request once and walks the operation's rules in
//!    order. The first rule whose payment type matches wins.
//! 3. [`RouteRule::target_url`] builds the upstream URL of the winning rule.

use http::Method;
use url::Url;

use crate::body_cache::CachedBody;
use crate::classifier::{
    Classification, ClassifyError, RemoteClassification, cancel_payment_id, check_destination,
    create_destination, path_identifier,
};
use crate::lookup::{LookupKey, PaymentLookup};
use crate::payment_type::PaymentType;
use crate::route_table::{Operation, PathTemplate, RouteTable};

/// An inbound request recognized as one of the gateway operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRequest {
    pub operation: Operation,
    /// Identifier segment of `status` and `repeat` paths.
    pub path_id: Option<String>,
}

impl MatchedRequest {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            path_id: None,
        }
    }

    fn with_id(operation: Operation, id: &str) -> Self {
        Self {
            operation,
            path_id: Some(id.to_string()),
        }
    }
}

/// Forwarding rule of one payment type for one operation.
#[derive(Debug, Clone)]
pub struct RouteRule {
    payment_type: PaymentType,
    upstream: Url,
    path: PathTemplate,
}

impl RouteRule {
    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    /// Upstream URL for a request: the rewritten path on the upstream origin, with the
    /// inbound query string carried over.
    pub fn target_url(&self, path_id: Option<&str>, query: Option<&str>) -> Url {
        let mut url = self.upstream.clone();
        url.set_path(&self.path.render(path_id));
        url.set_query(query);
        url
    }
}

/// Selects the upstream rule of inbound requests.
pub struct Dispatcher<L> {
    base_path: String,
    rules: [Vec<RouteRule>; 5],
    lookup: L,
}

impl<L> Dispatcher<L> {
    /// Builds the rule lists from the route table. Disabled operations produce no rule.
    pub fn new(base_path: impl Into<String>, table: &RouteTable, lookup: L) -> Self {
        let mut rules: [Vec<RouteRule>; 5] = Default::default();
        for (payment_type, entry) in table.iter() {
            for operation in Operation::ALL {
                if let Some(path) = entry.path_for(operation) {
                    rules[operation.index()].push(RouteRule {
                        payment_type,
                        upstream: entry.upstream().clone(),
                        path: path.clone(),
                    });
                }
            }
        }
        Self {
            base_path: base_path.into(),
            rules,
            lookup,
        }
    }

    /// Rules of an operation, in priority order.
    pub fn rules(&self, operation: Operation) -> &[RouteRule] {
        &self.rules[operation.index()]
    }

    /// Recognizes one of the five request shapes under the base path.
    pub fn match_request(&self, method: &Method, path: &str) -> Option<MatchedRequest> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        if rest.is_empty() {
            return (*method == Method::POST).then(|| MatchedRequest::new(Operation::Create));
        }
        let rest = rest.strip_prefix('/')?;
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        match segments.as_slice() {
            ["check"] if *method == Method::POST => Some(MatchedRequest::new(Operation::Check)),
            ["cancel"] if *method == Method::PATCH => Some(MatchedRequest::new(Operation::Cancel)),
            ["repeat", id] if *method == Method::GET => {
                Some(MatchedRequest::with_id(Operation::Repeat, id))
            }
            [id] if *method == Method::GET => Some(MatchedRequest::with_id(Operation::Status, id)),
            _ => None,
        }
    }
}

impl<L> Dispatcher<L>
where
    L: PaymentLookup + Sync,
{
    /// Finds the first rule whose payment type the request belongs to.
    ///
    /// The request is classified at most once, and only if some payment type offers the
    /// operation. `Ok(None)` means no payment type matched.
    pub async fn select(
        &self,
        matched: &MatchedRequest,
        body: &CachedBody,
    ) -> Result<Option<&RouteRule>, ClassifyError> {
        let candidates = self.rules(matched.operation);
        if candidates.is_empty() {
            return Ok(None);
        }
        let classification = self.classify(matched, body).await?;
        for rule in candidates {
            if classification.matches(rule.payment_type).await {
                tracing::debug!(
                    operation = %matched.operation,
                    payment_type = %rule.payment_type,
                    "Route selected"
                );
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    async fn classify<'a>(
        &'a self,
        matched: &MatchedRequest,
        body: &CachedBody,
    ) -> Result<Classification<'a, L>, ClassifyError> {
        let classification = match matched.operation {
            Operation::Check => {
                Classification::Destination(check_destination(body.capture().await?)?)
            }
            Operation::Create => {
                Classification::Destination(create_destination(body.capture().await?)?)
            }
            Operation::Cancel => {
                let payment_id = cancel_payment_id(body.capture().await?)?;
                Classification::Remote(RemoteClassification::new(
                    &self.lookup,
                    LookupKey::PaymentId,
                    payment_id,
                ))
            }
            Operation::Status => Classification::Remote(RemoteClassification::new(
                &self.lookup,
                LookupKey::PaymentId,
                path_identifier(matched.path_id.as_deref().unwrap_or_default())?,
            )),
            Operation::Repeat => Classification::Remote(RemoteClassification::new(
                &self.lookup,
                LookupKey::OperationId,
                path_identifier(matched.path_id.as_deref().unwrap_or_default())?,
            )),
        };
        Ok(classification)
    }
}
