//! Shared state and helpers for phase commands.
//!
//! Every phase receives a [`PhaseContext`]: the resolved global settings,
//! the runtime bound to the injected process invoker, the configuration
//! loader, and the cancellation token installed by the dispatcher.

use anyhow::Result;
use launcher_core::config::{ConfigLoader, ResolvedConfig};
use launcher_core::container::{image_name, ContainerRuntime};
use launcher_core::errors::{ConfigError, LauncherError};
use launcher_core::process::{InvocationSpec, ProcessInvoker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Payload wrapper for pups runs inside a container
pub const PUPS_RUNNER: &str = "/usr/local/bin/pups --stdin";

/// Name for a disposable or intermediate build container
pub fn build_container_name() -> String {
    format!("discourse-build-{}", Uuid::new_v4())
}

/// Global options resolved once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSettings {
    /// Directory holding `<config>.yml` container definitions
    pub conf_dir: PathBuf,
    /// Parent directory of the `templates/` tree
    pub templates_dir: PathBuf,
    /// Scratch area for build contexts
    pub build_dir: PathBuf,
    /// Image namespace, images are `local_<namespace>/<config>`
    pub namespace: String,
    /// Create missing parent directories for generated output
    pub create_parent_dirs: bool,
    /// Runtime binary every invocation is issued against
    pub runtime_binary: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from("./containers"),
            templates_dir: PathBuf::from("."),
            build_dir: PathBuf::from("./tmp"),
            namespace: "discourse".to_string(),
            create_parent_dirs: false,
            runtime_binary: "docker".to_string(),
        }
    }
}

/// Everything a phase needs to act
#[derive(Clone)]
pub struct PhaseContext {
    pub settings: LauncherSettings,
    runtime: ContainerRuntime,
    loader: Arc<dyn ConfigLoader>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("settings", &self.settings)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl PhaseContext {
    pub fn new(
        settings: LauncherSettings,
        invoker: Arc<dyn ProcessInvoker>,
        loader: Arc<dyn ConfigLoader>,
        cancel: CancellationToken,
    ) -> Self {
        let runtime = ContainerRuntime::new(invoker, settings.runtime_binary.clone());
        Self {
            settings,
            runtime,
            loader,
            cancel,
        }
    }

    pub fn program(&self) -> &str {
        self.runtime.program()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// `local_<namespace>/<config>`
    pub fn image(&self, config: &str) -> String {
        image_name(&self.settings.namespace, config)
    }

    /// Load a configuration, collapsing any loader failure into the syntax error
    pub fn load_config(&self, name: &str, perform_env_validation: bool) -> Result<ResolvedConfig> {
        match self.loader.load(name, perform_env_validation) {
            Ok(config) => Ok(config),
            Err(err @ LauncherError::Config(ConfigError::InvalidName { .. })) => Err(err.into()),
            Err(err) => {
                debug!("Failed to load config {}: {}", name, err);
                Err(LauncherError::from(ConfigError::Syntax {
                    message: err.to_string(),
                })
                .into())
            }
        }
    }

    pub async fn run(&self, spec: InvocationSpec) -> Result<()> {
        self.runtime.run(spec, &self.cancel).await?;
        Ok(())
    }

    pub async fn output(&self, spec: InvocationSpec) -> Result<Vec<u8>> {
        Ok(self.runtime.output(spec, &self.cancel).await?)
    }

    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        Ok(self.runtime.exists(name, &self.cancel).await?)
    }

    pub async fn container_running(&self, name: &str) -> Result<bool> {
        Ok(self.runtime.running(name, &self.cancel).await?)
    }
}

#[cfg(test)]
pub mod testing {
    //! Fixtures shared by the phase command tests

    use super::*;
    use launcher_core::config::TemplateConfigLoader;
    use launcher_core::process::mock::RecordingInvoker;
    use std::path::Path;

    pub fn fixtures_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    pub fn fixture_loader() -> Arc<dyn ConfigLoader> {
        let dir = fixtures_dir();
        Arc::new(TemplateConfigLoader::new(dir.join("containers"), dir))
    }

    /// Context over the fixture configs, building into `build_dir`
    pub fn context(invoker: &RecordingInvoker, build_dir: &Path) -> PhaseContext {
        let settings = LauncherSettings {
            conf_dir: fixtures_dir().join("containers"),
            templates_dir: fixtures_dir(),
            build_dir: build_dir.to_path_buf(),
            ..LauncherSettings::default()
        };
        PhaseContext::new(
            settings,
            Arc::new(invoker.clone()),
            fixture_loader(),
            CancellationToken::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use launcher_core::errors::CONFIG_SYNTAX_MESSAGE;
    use launcher_core::process::mock::RecordingInvoker;

    #[test]
    fn test_settings_defaults() {
        let settings = LauncherSettings::default();
        assert_eq!(settings.conf_dir, PathBuf::from("./containers"));
        assert_eq!(settings.namespace, "discourse");
        assert_eq!(settings.runtime_binary, "docker");
    }

    #[test]
    fn test_load_config_errors_collapse_to_syntax_message() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&RecordingInvoker::new(), tmp.path());

        let err = ctx.load_config("broken", true).unwrap_err();
        assert_eq!(err.to_string(), CONFIG_SYNTAX_MESSAGE);

        let err = ctx.load_config("missing", true).unwrap_err();
        assert_eq!(err.to_string(), CONFIG_SYNTAX_MESSAGE);

        let err = ctx.load_config("Test", true).unwrap_err();
        assert!(err.to_string().contains("upper case"));
    }

    #[test]
    fn test_build_container_names_are_unique() {
        let a = build_container_name();
        let b = build_container_name();
        assert!(a.starts_with("discourse-build-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_image_uses_namespace() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(&RecordingInvoker::new(), tmp.path());
        assert_eq!(ctx.image("test"), "local_discourse/test");
        assert_eq!(ctx.program(), "docker");
    }
}
