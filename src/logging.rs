//! Logging and tracing setup.
//!
//! Reconciler and provider operations emit `tracing` spans and events with
//! the variable's `kind`, `resource_group`, `account` and `name` as fields.
//! All logs are written to **stderr**; stdout belongs to the host process.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_automation_variables::init_logging;
//!
//! fn main() {
//!     // Initialize logging (reads RUST_LOG env var)
//!     init_logging();
//!     tracing::info!("Starting provider");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `hemmer_automation_variables=debug`)
//!
//! ```bash
//! # Trace every remote call made by the reconciler
//! RUST_LOG=hemmer_automation_variables::reconciler=debug ./my-provider
//! ```

use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt, EnvFilter};

fn subscriber(default_level: &str) -> impl SubscriberInitExt {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize the default logging subscriber.
///
/// This sets up a `tracing` subscriber that:
/// - Writes to **stderr**
/// - Respects the `RUST_LOG` environment variable for filtering
/// - Defaults to `info` level if `RUST_LOG` is not set
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    subscriber("info").init();
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when `RUST_LOG` is
/// not set.
///
/// # Example
///
/// ```ignore
/// use hemmer_automation_variables::init_logging_with_default;
///
/// fn main() {
///     init_logging_with_default("debug");
/// }
/// ```
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this does not panic when a subscriber has
/// already been set, which makes it safe to call from every test.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}
