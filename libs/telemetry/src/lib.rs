//! Logging and metrics plumbing shared by the Mantis services.
//!
//! `init_telemetry` installs the process-wide `tracing` subscriber; the recorders below feed
//! the `metrics` facade so whichever exporter the deployment installs picks them up.

mod config;
mod context;
mod recorders;
mod tracing_init;

pub use config::TelemetryConfig;
pub use context::{CommandLabels, start_command_span};
pub use recorders::{record_counter, record_histogram};
pub use tracing_init::{init_telemetry, telemetry_initialized};
