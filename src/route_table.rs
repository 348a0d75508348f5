//! Per-type upstream routes.
//!
//! The [`RouteTable`] is built once from [`RoutesConfig`] at startup and is read-only
//! afterwards. For each [`PaymentType`] it holds the upstream base URL and, for each
//! [`Operation`], the path the request is rewritten to. An operation without a path
//! override is not offered for that payment type.
//!
//! Overrides are templates: `status` overrides may reference `{payment_id}` and `repeat`
//! overrides may reference `{operation_id}`. Both are filled from the inbound path.

use std::fmt;
use url::Url;

use crate::config::{RouteConfig, RoutesConfig};
use crate::payment_type::PaymentType;

/// One of the five request shapes the gateway serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST {base}/check`
    Check,
    /// `POST {base}`
    Create,
    /// `GET {base}/{payment_id}`
    Status,
    /// `PATCH {base}/cancel`
    Cancel,
    /// `GET {base}/repeat/{operation_id}`
    Repeat,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Check,
        Operation::Create,
        Operation::Status,
        Operation::Cancel,
        Operation::Repeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::Create => "create",
            Operation::Status => "status",
            Operation::Cancel => "cancel",
            Operation::Repeat => "repeat",
        }
    }

    /// Name of the identifier the inbound path carries for this operation, if any.
    pub fn path_variable(&self) -> Option<&'static str> {
        match self {
            Operation::Status => Some("payment_id"),
            Operation::Repeat => Some("operation_id"),
            Operation::Check | Operation::Create | Operation::Cancel => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Operation::Check => 0,
            Operation::Create => 1,
            Operation::Status => 2,
            Operation::Cancel => 3,
            Operation::Repeat => 4,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Variable,
}

/// An upstream path with an optional identifier placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    parts: Vec<TemplatePart>,
}

impl PathTemplate {
    /// Parses an override for `operation`, rejecting placeholders the operation cannot fill.
    pub fn parse(source: &str, operation: Operation) -> Result<Self, TemplateError> {
        if !source.starts_with('/') {
            return Err(TemplateError::NotAbsolute);
        }
        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or(TemplateError::Unbalanced)?;
            let literal = &rest[..open];
            if literal.contains('}') {
                return Err(TemplateError::Unbalanced);
            }
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(literal.to_string()));
            }
            let name = &rest[open + 1..close];
            if operation.path_variable() != Some(name) {
                return Err(TemplateError::UnknownVariable(name.to_string()));
            }
            parts.push(TemplatePart::Variable);
            rest = &rest[close + 1..];
        }
        if rest.contains('}') {
            return Err(TemplateError::Unbalanced);
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Literal(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// Produces the upstream path, substituting `value` for the placeholder.
    pub fn render(&self, value: Option<&str>) -> String {
        let mut path = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                TemplatePart::Literal(literal) => path.push_str(literal),
                TemplatePart::Variable => path.push_str(value.unwrap_or_default()),
            }
        }
        path
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("path must start with '/'")]
    NotAbsolute,
    #[error("unbalanced braces")]
    Unbalanced,
    #[error("placeholder {{{0}}} is not available for this operation")]
    UnknownVariable(String),
}

/// Errors detected while building the route table. All of them are configuration defects.
#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("{payment_type}: upstream URL {url} must use http or https")]
    UnsupportedScheme { payment_type: PaymentType, url: Url },
    #[error("{payment_type}: invalid {operation} override {path:?}: {source}")]
    InvalidOverride {
        payment_type: PaymentType,
        operation: Operation,
        path: String,
        #[source]
        source: TemplateError,
    },
}

/// Upstream base URL and path overrides of one payment type.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    upstream: Url,
    overrides: [Option<PathTemplate>; 5],
}

impl RouteEntry {
    fn from_config(
        payment_type: PaymentType,
        config: &RouteConfig,
    ) -> Result<Self, RouteTableError> {
        let upstream = config.url.inner().clone();
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(RouteTableError::UnsupportedScheme {
                payment_type,
                url: upstream,
            });
        }
        let mut overrides: [Option<PathTemplate>; 5] = Default::default();
        for operation in Operation::ALL {
            let source = match operation {
                Operation::Check => &config.check,
                Operation::Create => &config.create,
                Operation::Status => &config.status,
                Operation::Cancel => &config.cancel,
                Operation::Repeat => &config.repeat,
            };
            if let Some(source) = source {
                let template = PathTemplate::parse(source, operation).map_err(|source_err| {
                    RouteTableError::InvalidOverride {
                        payment_type,
                        operation,
                        path: source.clone(),
                        source: source_err,
                    }
                })?;
                overrides[operation.index()] = Some(template);
            }
        }
        Ok(Self {
            upstream,
            overrides,
        })
    }

    pub fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// The path override for `operation`, or `None` when the operation is not offered.
    pub fn path_for(&self, operation: Operation) -> Option<&PathTemplate> {
        self.overrides[operation.index()].as_ref()
    }
}

/// Routes of every payment type, kept in priority order.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn from_config(config: &RoutesConfig) -> Result<Self, RouteTableError> {
        let entries = PaymentType::all()
            .map(|payment_type| RouteEntry::from_config(payment_type, config.for_type(payment_type)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn entry(&self, payment_type: PaymentType) -> &RouteEntry {
        let slot = match payment_type {
            PaymentType::P2p => 0,
            PaymentType::P2m => 1,
            PaymentType::Iban => 2,
            PaymentType::Tokenization => 3,
        };
        &self.entries[slot]
    }

    /// Entries in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (PaymentType, &RouteEntry)> {
        PaymentType::all().zip(self.entries.iter())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::LiteralOrEnv;

    pub(crate) fn route(url: &str, overrides: [Option<&str>; 5]) -> RouteConfig {
        let [check, create, status, cancel, repeat] = overrides.map(|o| o.map(str::to_string));
        RouteConfig {
            url: LiteralOrEnv::from_literal(url.parse().unwrap()),
            check,
            create,
            status,
            cancel,
            repeat,
        }
    }

    /// The route set used by production deployments.
    pub(crate) fn default_routes(urls: [&str; 4]) -> RoutesConfig {
        RoutesConfig {
            p2p: route(
                urls[0],
                [
                    Some("/check"),
                    Some("/payments"),
                    Some("/payments/{payment_id}"),
                    Some("/cancel-payment"),
                    Some("/repeat/{operation_id}"),
                ],
            ),
            p2m: route(
                urls[1],
                [
                    Some("/smpay/check"),
                    Some("/smpay/payments"),
                    Some("/smpay/payments/{payment_id}"),
                    Some("/smpay/cancel-payment"),
                    Some("/smpay/repeat/{operation_id}"),
                ],
            ),
            iban: route(
                urls[2],
                [
                    Some("/smpay/c2a/check"),
                    Some("/smpay/c2a"),
                    Some("/smpay/c2a/{payment_id}"),
                    None,
                    None,
                ],
            ),
            tokenization: route(
                urls[3],
                [
                    None,
                    Some("/smpay/tokenization"),
                    Some("/smpay/tokenization/{payment_id}"),
                    None,
                    None,
                ],
            ),
        }
    }

    fn default_table() -> RouteTable {
        RouteTable::from_config(&default_routes([
            "http://p2p:8080",
            "http://p2m:8080",
            "http://c2a:8080",
            "http://tokenization:8080",
        ]))
        .unwrap()
    }

    #[test]
    fn test_table_keeps_priority_order() {
        let table = default_table();
        let order: Vec<_> = table.iter().map(|(t, _)| t).collect();
        assert_eq!(order, PaymentType::ALL.to_vec());
    }

    #[test]
    fn test_disabled_operations() {
        let table = default_table();
        assert!(table.entry(PaymentType::Iban).path_for(Operation::Cancel).is_none());
        assert!(table.entry(PaymentType::Iban).path_for(Operation::Repeat).is_none());
        assert!(
            table
                .entry(PaymentType::Tokenization)
                .path_for(Operation::Check)
                .is_none()
        );
        assert_eq!(
            table
                .entry(PaymentType::P2m)
                .path_for(Operation::Cancel)
                .map(PathTemplate::as_str),
            Some("/smpay/cancel-payment")
        );
        assert_eq!(
            table.entry(PaymentType::Iban).upstream().as_str(),
            "http://c2a:8080/"
        );
    }

    #[test]
    fn test_render_template() {
        let template = PathTemplate::parse("/smpay/payments/{payment_id}", Operation::Status).unwrap();
        assert_eq!(template.render(Some("abc")), "/smpay/payments/abc");

        let template = PathTemplate::parse("/repeat/{operation_id}/again", Operation::Repeat).unwrap();
        assert_eq!(template.render(Some("42")), "/repeat/42/again");

        let template = PathTemplate::parse("/cancel-payment", Operation::Cancel).unwrap();
        assert_eq!(template.render(None), "/cancel-payment");
    }

    #[test]
    fn test_invalid_templates() {
        assert_eq!(
            PathTemplate::parse("check", Operation::Check),
            Err(TemplateError::NotAbsolute)
        );
        assert_eq!(
            PathTemplate::parse("/payments/{payment_id", Operation::Status),
            Err(TemplateError::Unbalanced)
        );
        assert_eq!(
            PathTemplate::parse("/payments/payment_id}", Operation::Status),
            Err(TemplateError::Unbalanced)
        );
        assert_eq!(
            PathTemplate::parse("/repeat/{payment_id}", Operation::Repeat),
            Err(TemplateError::UnknownVariable("payment_id".to_string()))
        );
        assert_eq!(
            PathTemplate::parse("/cancel/{payment_id}", Operation::Cancel),
            Err(TemplateError::UnknownVariable("payment_id".to_string()))
        );
    }

    #[test]
    fn test_invalid_override_fails_table() {
        let mut routes = default_routes([
            "http://p2p:8080",
            "http://p2m:8080",
            "http://c2a:8080",
            "http://tokenization:8080",
        ]);
        routes.p2m.repeat = Some("/smpay/repeat/{id}".to_string());
        let err = RouteTable::from_config(&routes).unwrap_err();
        assert!(matches!(
            err,
            RouteTableError::InvalidOverride {
                payment_type: PaymentType::P2m,
                operation: Operation::Repeat,
                ..
            }
        ));
    }

    #[test]
    fn test_non_http_upstream_fails_table() {
        let routes = default_routes([
            "http://p2p:8080",
            "ftp://p2m",
            "http://c2a:8080",
            "http://tokenization:8080",
        ]);
        assert!(matches!(
            RouteTable::from_config(&routes),
            Err(RouteTableError::UnsupportedScheme {
                payment_type: PaymentType::P2m,
                ..
            })
        ));
    }
}
