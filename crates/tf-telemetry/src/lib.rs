//! Logging setup for teamforge binaries.
//!
//! Human-readable or JSON output via `tracing-subscriber`, filtered by
//! `RUST_LOG` when set and by the configured level otherwise.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};
