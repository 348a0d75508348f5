//! Payments gateway HTTP entrypoint.
//!
//! Endpoints:
//! - `POST {base}/check` – Pre-payment check, classified by destination type
//! - `POST {base}` – Create a payment, classified by the destination type of its intent
//! - `GET {base}/{payment_id}` – Payment status, classified by payments service lookup
//! - `GET {base}/repeat/{operation_id}` – Repeat a payment, classified by lookup
//! - `PATCH {base}/cancel` – Cancel a payment, classified by lookup
//! - `GET /health` – Liveness probe
//!
//! `{base}` is `/payments` unless configured otherwise.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the configuration file
//! - `RUST_LOG` filters log output
//! - `OTEL_*` variables enable trace and metric export

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors;

use payments_gateway::config::Config;
use payments_gateway::dispatcher::Dispatcher;
use payments_gateway::gateway::Gateway;
use payments_gateway::handlers;
use payments_gateway::lookup::PaymentsServiceClient;
use payments_gateway::route_table::RouteTable;
use payments_gateway::upstream::UpstreamClient;
use payments_gateway::util::{SigDown, Telemetry};

/// Starts the gateway.
///
/// - Loads `.env` variables.
/// - Initializes logging and OpenTelemetry.
/// - Builds the route table and the payments service client from configuration.
/// - Serves HTTP until SIGTERM or SIGINT.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register()?;

    let config = Config::load()?;

    let route_table = RouteTable::from_config(config.routes())?;
    for (payment_type, entry) in route_table.iter() {
        tracing::info!(%payment_type, upstream = %entry.upstream(), "Route configured");
    }

    let payments_service = config.payments_service();
    let mut lookup = PaymentsServiceClient::try_new(payments_service.url.inner().clone())?;
    if let Some(timeout) = payments_service.timeout() {
        lookup = lookup.with_timeout(timeout);
    }

    let dispatcher = Dispatcher::new(config.base_path(), &route_table, lookup);
    let gateway = Gateway::new(dispatcher, UpstreamClient::default(), config.max_body_bytes());
    let axum_state = Arc::new(gateway);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(telemetry.http_tracing())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!(base_path = config.base_path(), "Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;
    sig_down.wait().await;

    Ok(())
}
