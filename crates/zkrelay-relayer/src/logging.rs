use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `filter` uses `RUST_LOG` syntax (`"info"`, `"zkrelay_core=debug,warn"`).
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_logging(filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_new(filter).with_context(|| format!("invalid log filter {filter:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("logging already initialized: {e}"))
}
