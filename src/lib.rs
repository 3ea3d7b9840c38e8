//! Bulk metadata tagging for a remote file gallery.
//!
//! The crate is split the way the pieces are deployed:
//!
//! - [`relay`] owns all HTTP: bearer auth, 429 backoff, search and update.
//! - [`tagging`] is the UI-agent side: selection, name resolution, tag merge
//!   and the sequential bulk loop.
//! - [`store`] and [`config`] hold the persisted token and runtime settings.

pub mod config;
pub mod error;
pub mod relay;
pub mod store;
pub mod tagging;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use config::Config;
pub use error::{Result, TagError};

use relay::executor::{ReqwestTransport, RetryingExecutor};
use relay::Relay;

/// Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
/// `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .try_init();
}

/// Builds a relay backed by `reqwest` from `config`.
pub fn build_relay(config: &Config) -> Result<Relay> {
    let transport = ReqwestTransport::new(config.request_timeout())?;
    let executor =
        RetryingExecutor::new(Arc::new(transport)).with_max_retries(config.api.max_retries);
    Ok(Relay::new(executor, &config.api.base_url).with_search_limit(config.api.search_limit))
}
