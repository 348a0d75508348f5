//! Process plumbing for the gateway binary.
//!
//! - [`sig_down`] - Graceful shutdown signal handling
//! - [`telemetry`] - Logging and OpenTelemetry setup

pub mod sig_down;
pub mod telemetry;

pub use sig_down::*;
pub use telemetry::*;
