//! coderun HTTP gateway
//!
//! Serves the run, stream, input, stop, module-check and health endpoints.

use anyhow::Context;
use coderun::config::{validate_config, Config};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    coderun::logging::init(&config.log);

    info!("Starting coderun gateway v{}", coderun::VERSION);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("{}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            tracing::error!("{}", issue);
        }
        anyhow::bail!("invalid configuration ({} error(s))", validation.errors.len());
    }

    coderun::gateway::serve(config).await?;
    Ok(())
}
