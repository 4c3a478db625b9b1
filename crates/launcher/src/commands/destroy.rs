//! Destroy command implementation

use super::shared::PhaseContext;
use anyhow::Result;
use launcher_core::container::{remove_invocation, stop_invocation};
use launcher_core::pipeline::Pipeline;
use tracing::instrument;

/// Stop and force-remove the container if there is one
#[instrument(skip(ctx))]
pub async fn execute_destroy(ctx: &PhaseContext, config: &str) -> Result<()> {
    if !ctx.container_exists(config).await? {
        println!("{} was not found", config);
        return Ok(());
    }

    Pipeline::new("destroy")
        .step("stop", ctx.run(stop_invocation(ctx.program(), config)))
        .step("remove", ctx.run(remove_invocation(ctx.program(), config, true)))
        .run()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::shared::testing::context;
    use launcher_core::process::mock::{MockContainerState, RecordingInvoker};

    #[tokio::test]
    async fn test_destroy_missing_container_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new();
        let ctx = context(&invoker, tmp.path());

        execute_destroy(&ctx, "test").await.unwrap();
        assert!(invoker.actions().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_stops_then_removes() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new().with_container("test", MockContainerState::Running);
        let ctx = context(&invoker, tmp.path());

        execute_destroy(&ctx, "test").await.unwrap();

        let lines: Vec<String> = invoker
            .actions()
            .iter()
            .map(|spec| spec.command_line())
            .collect();
        assert_eq!(lines, vec!["docker stop -t 600 test", "docker rm -f test"]);
        assert!(invoker.container_state("test").is_none());
    }

    #[tokio::test]
    async fn test_destroy_keeps_container_when_stop_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new()
            .with_container("test", MockContainerState::Running)
            .fail_on("stop", 1);
        let ctx = context(&invoker, tmp.path());

        assert!(execute_destroy(&ctx, "test").await.is_err());
        assert!(invoker.container_state("test").is_some());
    }
}
