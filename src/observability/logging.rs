//! Structured logging.
//!
//! # Responsibilities
//! - Initialize a tracing subscriber for applications that do not bring one
//! - Honour `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - The library itself only emits `tracing` events; installing a subscriber
//!   is the application's choice
//! - `try_init` so a second call reports an error instead of panicking

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("global subscriber already set: {0}")]
    AlreadySet(#[from] tracing_subscriber::util::TryInitError),
}

/// Install a global fmt subscriber filtered at `level`, unless `RUST_LOG`
/// overrides it.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("resilient_client={level}"))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
