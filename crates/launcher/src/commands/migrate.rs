//! Migrate command implementation
//!
//! Runs the database stages of pups in a disposable container from the
//! built image. Nothing is committed; the container is always removed.

use super::shared::{build_container_name, PhaseContext, PUPS_RUNNER};
use anyhow::Result;
use launcher_core::container::{tagged_image, RunInvocation};
use tracing::instrument;

/// Migrate command arguments
#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub config: String,
    /// Tag of the image built by `build`
    pub tag: String,
    pub skip_post_deployment_migrations: bool,
}

impl MigrateArgs {
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            tag: "latest".to_string(),
            skip_post_deployment_migrations: false,
        }
    }
}

/// Execute the migrate command
#[instrument(skip(ctx))]
pub async fn execute_migrate(ctx: &PhaseContext, args: MigrateArgs) -> Result<()> {
    let config = ctx.load_config(&args.config, true)?;
    let image = tagged_image(&ctx.settings.namespace, &args.config, &args.tag);

    let mut runner = RunInvocation::new(&config, image)
        .remove(true)
        .name(build_container_name())
        .extra_env("SKIP_EMBER_CLI_COMPILE", "1");
    if args.skip_post_deployment_migrations {
        runner = runner.extra_env("SKIP_POST_DEPLOYMENT_MIGRATIONS", "1");
    }
    let spec = runner
        .stdin(config.yaml())
        .command([
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!("{} --tags=db,migrate", PUPS_RUNNER),
        ])
        .build(ctx.program());

    ctx.run(spec).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::shared::testing::context;
    use launcher_core::process::mock::RecordingInvoker;

    #[tokio::test]
    async fn test_migrate_runs_disposable_container() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new();
        let ctx = context(&invoker, tmp.path());

        execute_migrate(&ctx, MigrateArgs::new("test")).await.unwrap();

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        let spec = &calls[0];
        let line = spec.command_line();
        assert!(line.starts_with("docker run"));
        assert!(line.contains("--env DISCOURSE_DEVELOPER_EMAILS"));
        assert!(line.contains("--env SKIP_EMBER_CLI_COMPILE=1"));
        assert!(!line.contains("SKIP_POST_DEPLOYMENT_MIGRATIONS"));
        assert!(line.contains("--rm"));
        assert!(!line.contains("-p 80"));
        assert!(line.contains("local_discourse/test:latest"));
        assert!(line.ends_with("--tags=db,migrate"));
        assert_eq!(spec.env.get("DISCOURSE_DB_PASSWORD"), Some("SOME_SECRET"));
        assert!(spec
            .stdin
            .as_deref()
            .unwrap()
            .contains("path: /etc/service/nginx/run"));
        assert!(spec
            .flag_value("--name")
            .unwrap()
            .starts_with("discourse-build-"));
    }

    #[tokio::test]
    async fn test_migrate_can_skip_post_deployment_migrations() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new();
        let ctx = context(&invoker, tmp.path());

        let args = MigrateArgs {
            skip_post_deployment_migrations: true,
            ..MigrateArgs::new("test")
        };
        execute_migrate(&ctx, args).await.unwrap();

        let line = invoker.calls()[0].command_line();
        assert!(line.contains("--env SKIP_POST_DEPLOYMENT_MIGRATIONS=1"));
        assert!(line.contains("--env SKIP_EMBER_CLI_COMPILE=1"));
        assert!(line.contains("--env DISCOURSE_DEVELOPER_EMAILS"));
        assert!(line.contains("--rm"));
    }

    #[tokio::test]
    async fn test_migrate_propagates_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new().fail_on("run", 77);
        let ctx = context(&invoker, tmp.path());

        let err = execute_migrate(&ctx, MigrateArgs::new("test"))
            .await
            .unwrap_err();
        let process = err
            .downcast_ref::<launcher_core::errors::ProcessError>()
            .unwrap();
        assert_eq!(process.exit_code(), Some(77));
    }
}
