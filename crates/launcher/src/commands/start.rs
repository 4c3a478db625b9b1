//! Start command implementation
//!
//! Resumes the configuration's container when it exists, otherwise runs a
//! fresh one from the configured image with ports published.

use super::shared::PhaseContext;
use anyhow::{Context, Result};
use launcher_core::config::default_hostname;
use launcher_core::container::{start_invocation, RunInvocation};
use tracing::{debug, info, instrument};

/// Start command arguments
#[derive(Debug, Clone, Default)]
pub struct StartArgs {
    pub config: String,
    /// Print the run command instead of executing it
    pub dry_run: bool,
    /// Extra runtime flags, split like a shell would
    pub docker_args: Option<String>,
    /// Override the image used for running the container
    pub run_image: Option<String>,
    /// Run attached in the foreground without a restart policy
    pub supervised: bool,
}

impl StartArgs {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            ..Self::default()
        }
    }
}

/// Execute the start command
#[instrument(skip(ctx))]
pub async fn execute_start(ctx: &PhaseContext, args: StartArgs) -> Result<()> {
    let name = &args.config;

    if ctx.container_running(name).await? {
        println!("Nothing to do, your container has already started!");
        return Ok(());
    }

    if ctx.container_exists(name).await? {
        let spec = start_invocation(ctx.program(), name);
        if args.dry_run {
            println!("{}", spec);
            return Ok(());
        }
        info!("Starting up existing container {}", name);
        return ctx.run(spec).await;
    }

    let config = ctx.load_config(name, true)?;
    let hostname = config.hostname(&default_hostname(name));
    let image = args
        .run_image
        .clone()
        .or_else(|| config.run_image.clone())
        .unwrap_or_else(|| ctx.image(name));

    let mut docker_args = config.docker_args()?;
    if let Some(extra) = &args.docker_args {
        docker_args.extend(
            shell_words::split(extra)
                .with_context(|| format!("Invalid --docker-args: {}", extra))?,
        );
    }

    let detached = !args.supervised;
    let spec = RunInvocation::new(&config, image)
        .detach(detached)
        .restart_always(detached)
        .publish_ports(true)
        .name(name.as_str())
        .hostname(hostname)
        .docker_args(docker_args)
        .build(ctx.program())
        .interactive(args.supervised);

    if args.dry_run {
        println!("{}", spec);
        return Ok(());
    }

    debug!("Running new container {}", name);
    ctx.run(spec).await
}
