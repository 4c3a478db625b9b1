//! Rebuild command implementation
//!
//! Bootstraps a fresh image while the old container keeps serving, then
//! swaps containers: destroy the old one, start the new one.

use super::bootstrap::{execute_bootstrap, BootstrapArgs};
use super::destroy::execute_destroy;
use super::shared::PhaseContext;
use super::start::{execute_start, StartArgs};
use anyhow::Result;
use launcher_core::pipeline::Pipeline;
use tracing::instrument;

/// Rebuild command arguments
#[derive(Debug, Clone)]
pub struct RebuildArgs {
    pub config: String,
    pub docker_args: Option<String>,
    pub skip_post_deployment_migrations: bool,
}

/// Execute the rebuild command
#[instrument(skip(ctx))]
pub async fn execute_rebuild(ctx: &PhaseContext, args: RebuildArgs) -> Result<()> {
    let bootstrap = BootstrapArgs {
        config: args.config.clone(),
        skip_post_deployment_migrations: args.skip_post_deployment_migrations,
    };
    let start = StartArgs {
        docker_args: args.docker_args.clone(),
        ..StartArgs::new(&args.config)
    };

    Pipeline::new("rebuild")
        .step("bootstrap", execute_bootstrap(ctx, bootstrap))
        .step("destroy", execute_destroy(ctx, &args.config))
        .step("start", execute_start(ctx, start))
        .run()
        .await?;
    Ok(())
}
