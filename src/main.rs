//! Entry point for the Pension Engine binary.
//!
//! Running this binary starts an HTTP server exposing the analysis
//! engine.  Rule tables are read from `PENSION_RULES_DIR` when set and
//! otherwise come from the tables built into the binary; see
//! [`pension_engine::config`] for the other variables.  Log filtering
//! follows `PENSION_LOG` (e.g. `PENSION_LOG=pension_engine=debug`).

use anyhow::Result;
use pension_engine::{api, config::EngineConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("PENSION_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let config = EngineConfig::from_env()?;
    let rules = config.load_rules()?;
    api::serve(&config, rules).await
}
