//! Logs command implementation

use super::shared::PhaseContext;
use anyhow::Result;
use launcher_core::container::logs_invocation;
use tracing::instrument;

/// Capture the container's accumulated output
#[instrument(skip(ctx))]
pub async fn collect_logs(ctx: &PhaseContext, config: &str) -> Result<String> {
    let output = ctx.output(logs_invocation(ctx.program(), config)).await?;
    Ok(String::from_utf8_lossy(&output).into_owned())
}

/// Execute the logs command
pub async fn execute_logs(ctx: &PhaseContext, config: &str) -> Result<()> {
    println!("{}", collect_logs(ctx, config).await?);
    Ok(())
}
