//! Bootstrap command implementation
//!
//! build, migrate, configure. The first failure ends the run; nothing that
//! already completed is rolled back, re-running bootstrap is the recovery.

use super::build::{execute_build, BuildArgs};
use super::configure::{execute_configure, ConfigureArgs};
use super::migrate::{execute_migrate, MigrateArgs};
use super::shared::PhaseContext;
use anyhow::Result;
use launcher_core::pipeline::Pipeline;
use tracing::instrument;

/// Bootstrap command arguments
#[derive(Debug, Clone)]
pub struct BootstrapArgs {
    pub config: String,
    pub skip_post_deployment_migrations: bool,
}

/// Execute the bootstrap command
#[instrument(skip(ctx))]
pub async fn execute_bootstrap(ctx: &PhaseContext, args: BootstrapArgs) -> Result<()> {
    let migrate = MigrateArgs {
        skip_post_deployment_migrations: args.skip_post_deployment_migrations,
        ..MigrateArgs::new(&args.config)
    };

    Pipeline::new("bootstrap")
        .step("build", execute_build(ctx, BuildArgs::new(&args.config)))
        .step("migrate", execute_migrate(ctx, migrate))
        .step(
            "configure",
            execute_configure(ctx, ConfigureArgs::new(&args.config)),
        )
        .run()
        .await?;
    Ok(())
}
