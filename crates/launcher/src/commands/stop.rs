//! Stop command implementation

use super::shared::PhaseContext;
use anyhow::Result;
use launcher_core::container::stop_invocation;
use tracing::instrument;

/// Gracefully stop the container if there is one
#[instrument(skip(ctx))]
pub async fn execute_stop(ctx: &PhaseContext, config: &str) -> Result<()> {
    if !ctx.container_exists(config).await? {
        println!("{} was not found", config);
        return Ok(());
    }
    ctx.run(stop_invocation(ctx.program(), config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::shared::testing::context;
    use launcher_core::process::mock::{MockContainerState, RecordingInvoker};

    #[tokio::test]
    async fn test_stop_missing_container_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new();
        let ctx = context(&invoker, tmp.path());

        execute_stop(&ctx, "test").await.unwrap();
        assert!(invoker.actions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_uses_long_grace_period() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new().with_container("test", MockContainerState::Running);
        let ctx = context(&invoker, tmp.path());

        execute_stop(&ctx, "test").await.unwrap();

        let actions = invoker.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].command_line(), "docker stop -t 600 test");
        assert_eq!(
            invoker.container_state("test"),
            Some(MockContainerState::Stopped)
        );
    }
}
