//! Run command implementation
//!
//! Executes an arbitrary command in a disposable container built from the
//! resolved configuration. Ports are never published.

use super::shared::PhaseContext;
use anyhow::{Context, Result};
use launcher_core::container::RunInvocation;
use tracing::instrument;

/// Run command arguments
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: String,
    pub run_image: Option<String>,
    pub docker_args: Option<String>,
    /// Command and its arguments, passed through verbatim
    pub command: Vec<String>,
}

/// Execute the run command
#[instrument(skip(ctx))]
pub async fn execute_run(ctx: &PhaseContext, args: RunArgs) -> Result<()> {
    let config = ctx.load_config(&args.config, true)?;
    let image = args
        .run_image
        .or_else(|| config.run_image.clone())
        .unwrap_or_else(|| ctx.image(&args.config));

    let mut docker_args = config.docker_args()?;
    if let Some(extra) = &args.docker_args {
        docker_args.extend(
            shell_words::split(extra)
                .with_context(|| format!("Invalid --docker-args: {}", extra))?,
        );
    }

    let spec = RunInvocation::new(&config, image)
        .remove(true)
        .docker_args(docker_args)
        .command(args.command)
        .build(ctx.program());
    ctx.run(spec).await
}
