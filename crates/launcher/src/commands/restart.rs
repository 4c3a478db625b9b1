//! Restart command implementation

use super::shared::PhaseContext;
use super::start::{execute_start, StartArgs};
use super::stop::execute_stop;
use anyhow::Result;
use launcher_core::pipeline::Pipeline;
use tracing::instrument;

/// Stop then start; a failed stop skips the start
#[instrument(skip(ctx))]
pub async fn execute_restart(ctx: &PhaseContext, args: StartArgs) -> Result<()> {
    let config = args.config.clone();
    Pipeline::new("restart")
        .step("stop", execute_stop(ctx, &config))
        .step("start", execute_start(ctx, args))
        .run()
        .await?;
    Ok(())
}
