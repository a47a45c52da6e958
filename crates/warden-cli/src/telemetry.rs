//! Tracing subscriber setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{CliError, Result};

const DEFAULT_FILTER: &str = "info,warden=info,kube=warn,hyper=warn,tower=warn";

/// Install the global subscriber, honoring `RUST_LOG`
pub fn init(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (plain, structured) = if json {
        (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            ),
        )
    } else {
        (Some(fmt::layer().with_target(false)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .try_init()
        .map_err(|e| CliError::internal(format!("failed to initialize logging: {e}")))
}
