//! Observability for the transaction manager
//!
//! Logging goes through `tracing`. Each record names an `Event` from a fixed
//! vocabulary in its `event` field:
//!
//! ```ignore
//! use tracing::info;
//! use xatm::observability::Event;
//!
//! info!(event = %Event::ResourceRegistered, resource = "ledger-db", "registered");
//! ```
//!
//! Library code only emits; installing a subscriber is the host's job.
//! `init_logging` does it for the `xatm` binary.

mod events;

pub use events::Event;

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber on stderr.
///
/// `RUST_LOG` takes precedence over `default_level`. Calling this more than
/// once is harmless; later calls are ignored.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
