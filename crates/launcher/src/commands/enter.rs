//! Enter command implementation

use super::shared::PhaseContext;
use anyhow::Result;
use launcher_core::container::enter_invocation;
use tracing::instrument;

/// Attach an interactive login shell to the running container
#[instrument(skip(ctx))]
pub async fn execute_enter(ctx: &PhaseContext, config: &str) -> Result<()> {
    ctx.run(enter_invocation(ctx.program(), config)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::shared::testing::context;
    use launcher_core::process::mock::RecordingInvoker;

    #[tokio::test]
    async fn test_enter_attaches_interactively() {
        let tmp = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new();
        let ctx = context(&invoker, tmp.path());

        execute_enter(&ctx, "test").await.unwrap();

        let spec = &invoker.calls()[0];
        assert_eq!(spec.command_line(), "docker exec -it test /bin/bash --login");
        assert!(spec.interactive);
    }
}
