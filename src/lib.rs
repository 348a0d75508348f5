//! Payments gateway: classification and dispatch of payment requests.
//!
//! Every inbound request is matched to one of five operations (check, create, status,
//! cancel, repeat), classified into a [`PaymentType`](payment_type::PaymentType) and
//! forwarded to the upstream service of that type with its path rewritten. Successful JSON
//! responses are tagged with the resolved `payment_type`.
//!
//! # Classification
//!
//! - `check` and `create` requests are classified from the credit destination type found
//!   in their body.
//! - `status`, `repeat` and `cancel` requests carry only an identifier. The payments service
//!   is asked once per request which provider handles it.
//!
//! Payment types are tried in a fixed priority order; the first match wins. Requests that
//! match no type are answered with `404`.
//!
//! # Modules
//!
//! - [`payment_type`] - Payment types, destination tokens and provider codes.
//! - [`route_table`] - Per-type upstream URLs and path overrides.
//! - [`body_cache`] - Read-once cache for request bodies.
//! - [`classifier`] - Content and remote classification.
//! - [`lookup`] - Payments service client.
//! - [`dispatcher`] - Operation matching and ordered rule evaluation.
//! - [`augment`] - Response tagging.
//! - [`upstream`] - Forwarding to upstream services.
//! - [`gateway`] - The per-request pipeline and its error responses.
//! - [`handlers`] - Axum routes.
//! - [`config`] - Server configuration.
//! - [`util`] - Telemetry and signal handling.

pub mod augment;
pub mod body_cache;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod gateway;
pub mod handlers;
pub mod lookup;
pub mod payment_type;
pub mod route_table;
pub mod upstream;
pub mod util;
