//! Generate command implementations
//!
//! Render a configuration for use outside the launcher: the raw pups payload,
//! a standalone Dockerfile build context, or the resolved configuration as
//! JSON with secrets masked.

use super::build::BUILD_PUPS_ARGS;
use super::shared::PhaseContext;
use anyhow::{bail, Context, Result};
use launcher_core::config::CONFIG_FILE_OUTPUT;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Runtime pups payload for `config`
pub fn raw_yaml(ctx: &PhaseContext, config: &str) -> Result<String> {
    Ok(ctx.load_config(config, true)?.yaml())
}

/// Resolved configuration as pretty JSON, secret values masked
pub fn resolved_json(ctx: &PhaseContext, config: &str) -> Result<String> {
    let resolved = ctx.load_config(config, true)?.redacted();
    serde_json::to_string_pretty(&resolved).context("Failed to serialize configuration")
}

/// Arguments for `generate dockerfile`
#[derive(Debug, Clone)]
pub struct DockerfileArgs {
    pub config: String,
    /// Parent of the generated `<config>/` directory, defaults to the build dir
    pub output_dir: Option<PathBuf>,
    pub bake_env: bool,
}

/// Write `<out>/<config>/config.yaml` and `<out>/<config>/Dockerfile`
#[instrument(skip(ctx))]
pub fn write_dockerfile(ctx: &PhaseContext, args: DockerfileArgs) -> Result<PathBuf> {
    let config = ctx.load_config(&args.config, true)?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| ctx.settings.build_dir.clone());
    let dir = output_dir.join(&args.config);

    prepare_dir(&dir, ctx.settings.create_parent_dirs)?;
    std::fs::write(dir.join(CONFIG_FILE_OUTPUT), config.yaml())
        .with_context(|| format!("Failed to write {}", dir.join(CONFIG_FILE_OUTPUT).display()))?;
    std::fs::write(
        dir.join("Dockerfile"),
        config.dockerfile(BUILD_PUPS_ARGS, args.bake_env),
    )
    .with_context(|| format!("Failed to write {}", dir.join("Dockerfile").display()))?;

    debug!("Generated build context in {}", dir.display());
    Ok(dir)
}

fn prepare_dir(dir: &Path, create_parents: bool) -> Result<()> {
    if create_parents {
        return std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()));
    }
    if dir.is_dir() {
        return Ok(());
    }
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => bail!(
            "Output directory {} does not exist, use --parent-dirs to create it",
            parent.display()
        ),
        _ => std::fs::create_dir(dir).with_context(|| format!("Failed to create {}", dir.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::shared::testing::context;
    use launcher_core::process::mock::RecordingInvoker;

    #[test]
    fn test_raw_yaml_contains_all_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&RecordingInvoker::new(), tmp.path());

        let yaml = raw_yaml(&ctx, "test").unwrap();
        assert!(yaml.contains("path: /etc/service/nginx/run"));
        assert!(yaml.contains("path: /etc/service/postgres/run"));
        assert!(yaml.contains("DISCOURSE_DEVELOPER_EMAILS: 'me@example.com,you@example.com'"));
    }

    #[test]
    fn test_resolved_json_masks_secrets() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&RecordingInvoker::new(), tmp.path());

        let json = resolved_json(&ctx, "test").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["env"]["DISCOURSE_DB_PASSWORD"], "****");
        assert_eq!(value["params"]["version"], "tests-passed");
        assert!(!json.contains("SOME_SECRET"));
    }

    #[test]
    fn test_write_dockerfile_requires_existing_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&RecordingInvoker::new(), tmp.path());
        let args = DockerfileArgs {
            config: "test".to_string(),
            output_dir: Some(tmp.path().join("missing/nested")),
            bake_env: false,
        };

        let err = write_dockerfile(&ctx, args).unwrap_err();
        assert!(err.to_string().contains("--parent-dirs"));
    }

    #[test]
    fn test_write_dockerfile_with_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = context(&RecordingInvoker::new(), tmp.path());
        ctx.settings.create_parent_dirs = true;
        let args = DockerfileArgs {
            config: "test".to_string(),
            output_dir: Some(tmp.path().join("missing/nested")),
            bake_env: true,
        };

        let dir = write_dockerfile(&ctx, args).unwrap();
        assert_eq!(dir, tmp.path().join("missing/nested/test"));
        let dockerfile = std::fs::read_to_string(dir.join("Dockerfile")).unwrap();
        assert!(dockerfile.contains("--skip-tags=precompile,migrate,db"));
        assert!(dockerfile.contains("ENV LANG=${LANG}"));
        assert!(dir.join("config.yaml").exists());
    }
}
