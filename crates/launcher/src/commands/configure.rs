//! Configure command implementation
//!
//! Runs the precompile and database stages against the built image, commits
//! the stopped container as the runnable image, then removes it. A failed
//! run or commit leaves the intermediate container in place for inspection.

use super::shared::{build_container_name, PhaseContext, PUPS_RUNNER};
use anyhow::Result;
use launcher_core::container::{commit_invocation, remove_invocation, tagged_image, RunInvocation};
use launcher_core::pipeline::Pipeline;
use tracing::{info, instrument};

/// Configure command arguments
#[derive(Debug, Clone)]
pub struct ConfigureArgs {
    pub config: String,
    /// Tag of the image the intermediate container runs from
    pub source_tag: String,
    /// Tag the committed image is saved under
    pub target_tag: String,
}

impl ConfigureArgs {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            source_tag: "latest".to_string(),
            target_tag: "latest".to_string(),
        }
    }
}

/// Execute the configure command
#[instrument(skip(ctx))]
pub async fn execute_configure(ctx: &PhaseContext, args: ConfigureArgs) -> Result<()> {
    let config = ctx.load_config(&args.config, true)?;
    let namespace = &ctx.settings.namespace;
    let container = build_container_name();

    let run = RunInvocation::new(&config, tagged_image(namespace, &args.config, &args.source_tag))
        .name(container.clone())
        .extra_env("SKIP_EMBER_CLI_COMPILE", "1")
        .stdin(config.yaml())
        .command([
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!("{} --tags=db,precompile", PUPS_RUNNER),
        ])
        .build(ctx.program());
    let commit = commit_invocation(
        ctx.program(),
        &container,
        &tagged_image(namespace, &args.config, &args.target_tag),
        config.boot_command(),
    );
    let remove = remove_invocation(ctx.program(), &container, true);

    Pipeline::new("configure")
        .step("run", ctx.run(run))
        .step("commit", ctx.run(commit))
        .step("remove", ctx.run(remove))
        .run()
        .await?;

    info!("Configured image {}", ctx.image(&args.config));
    Ok(())
}
