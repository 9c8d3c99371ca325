//! # Couchlog Telemetry
//!
//! Process-wide logging for couchlog binaries, built on `tracing` and
//! `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use couchlog_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&TelemetryConfig::for_service("couchlog-admin"))?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `couchlog` | Service name on every line |
//! | `COUCHLOG_LOG_LEVEL` / `RUST_LOG` | `info` | Level filter |
//! | `COUCHLOG_JSON_LOGS` | `false` | JSON lines instead of pretty output |
//! | `COUCHLOG_CONSOLE_OUTPUT` | `true` | Write to stderr at all |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging, LoggingGuard};

#[doc(hidden)]
pub use tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Log a transport-related event with the standard fields.
///
/// # Example
///
/// ```rust,ignore
/// log_transport_event!(info, "couchdb", "winston", "Tail started", seq = %offset);
/// ```
#[macro_export]
macro_rules! log_transport_event {
    ($level:ident, $transport:expr, $db:expr, $msg:expr $(, $($field:tt)*)?) => {
        $crate::tracing::$level!(
            transport = %$transport,
            db = %$db,
            $($($field)*,)?
            $msg
        )
    };
}
