//! Cleanup command implementation
//!
//! Prunes containers and images older than an hour, then offers to delete
//! the old PostgreSQL data cluster left behind by a database upgrade.

use super::shared::PhaseContext;
use anyhow::{Context, Result};
use launcher_core::container::{prune_invocation, PruneKind};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::instrument;

pub const DEFAULT_LEGACY_DATA_DIR: &str = "/var/discourse/shared/standalone/postgres_data_old";

/// Cleanup command arguments
#[derive(Debug, Clone)]
pub struct CleanupArgs {
    /// Old data cluster offered for removal when present
    pub legacy_data_dir: PathBuf,
}

impl Default for CleanupArgs {
    fn default() -> Self {
        Self {
            legacy_data_dir: PathBuf::from(DEFAULT_LEGACY_DATA_DIR),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Completed,
    /// The operator kept the legacy data cluster
    Declined,
}

/// Execute the cleanup command, prompting on `input` and reporting on `out`
#[instrument(skip(ctx, input, out))]
pub async fn execute_cleanup(
    ctx: &PhaseContext,
    args: CleanupArgs,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<CleanupOutcome> {
    ctx.run(prune_invocation(ctx.program(), PruneKind::Containers))
        .await?;
    ctx.run(prune_invocation(ctx.program(), PruneKind::Images))
        .await?;

    let dir = &args.legacy_data_dir;
    if !dir.exists() {
        return Ok(CleanupOutcome::Completed);
    }

    writeln!(out, "Old PostgreSQL backup data cluster detected")?;
    writeln!(out, "Would you like to remove it? (y/N)")?;
    out.flush()?;

    let mut reply = String::new();
    input.read_line(&mut reply)?;
    match reply.trim() {
        "y" | "Y" => {
            writeln!(
                out,
                "removing old PostgreSQL data cluster at {}...",
                dir.display()
            )?;
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
            Ok(CleanupOutcome::Completed)
        }
        _ => {
            writeln!(out, "Cancelled")?;
            Ok(CleanupOutcome::Declined)
        }
    }
}
