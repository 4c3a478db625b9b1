//! Build command implementation
//!
//! Builds the base image for a configuration without any credentials. The
//! Dockerfile is piped to `build -f -` and runs pups with the database,
//! migration and precompile stages skipped; those happen later in migrate
//! and configure with the full environment.

use super::shared::PhaseContext;
use anyhow::{Context, Result};
use launcher_core::config::CONFIG_FILE_OUTPUT;
use launcher_core::container::{build_invocation, tagged_image};
use launcher_core::pipeline::Pipeline;
use std::path::Path;
use tracing::{debug, instrument, warn};

/// pups arguments for the image build stage
pub const BUILD_PUPS_ARGS: &str = "--skip-tags=precompile,migrate,db";

/// Build command arguments
#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub config: String,
    /// Tag applied to `local_<namespace>/<config>`
    pub tag: String,
    /// Bake the non-secret environment into the image as `ENV` lines
    pub bake_env: bool,
}

impl BuildArgs {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            tag: "latest".to_string(),
            bake_env: false,
        }
    }
}

/// Execute the build command
#[instrument(skip(ctx))]
pub async fn execute_build(ctx: &PhaseContext, args: BuildArgs) -> Result<()> {
    let config = ctx.load_config(&args.config, true)?;

    let context_dir = ctx.settings.build_dir.join(&args.config);
    std::fs::create_dir_all(&context_dir).with_context(|| {
        format!("Failed to create build directory {}", context_dir.display())
    })?;
    std::fs::write(context_dir.join(CONFIG_FILE_OUTPUT), config.yaml())
        .with_context(|| format!("Failed to write {} payload", CONFIG_FILE_OUTPUT))?;
    debug!("Prepared build context at {}", context_dir.display());

    let image = tagged_image(&ctx.settings.namespace, &args.config, &args.tag);
    let spec = build_invocation(
        ctx.program(),
        &config,
        &image,
        &context_dir,
        config.dockerfile(BUILD_PUPS_ARGS, args.bake_env),
    );

    let report = Pipeline::new("build")
        .step("image", ctx.run(spec))
        .step_continue("remove build context", remove_context(&context_dir))
        .run()
        .await?;
    if !report.is_clean() {
        warn!(
            "Image built, but the build context at {} was left behind",
            context_dir.display()
        );
    }
    Ok(())
}

async fn remove_context(dir: &Path) -> Result<()> {
    std::fs::remove_dir_all(dir)
        .with_context(|| format!("Failed to remove build context {}", dir.display()))
}
