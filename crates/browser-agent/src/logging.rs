//! Tracing setup for binaries and tests embedding the agent.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a fmt subscriber filtered by `RUST_LOG`, or by
/// `default_directive` (e.g. `"info,reqwest=warn"`) when it is unset.
///
/// Only the first call installs anything; later calls return the
/// "already set" error, which callers may ignore.
pub fn init(default_directive: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
}
