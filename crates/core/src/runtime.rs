//! Container runtime selection
//!
//! The launcher drives whichever CLI-compatible runtime binary is selected.
//! Docker is the default; Podman accepts the same argument shapes for
//! everything the phases issue.

use crate::errors::LauncherError;

/// Environment variable naming an explicit runtime binary path
pub const DOCKER_PATH_ENV: &str = "LAUNCHER_DOCKER_PATH";

/// Environment variable selecting the runtime kind
pub const RUNTIME_ENV: &str = "LAUNCHER_RUNTIME";

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeKind {
    #[default]
    Docker,
    Podman,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = LauncherError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(LauncherError::Runtime(format!(
                "Unknown runtime: {}. Supported runtimes: docker, podman",
                s
            ))),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detect runtime from CLI flag, environment variable, or default
///
/// Precedence: CLI flag > LAUNCHER_RUNTIME env var > default (docker)
pub fn detect_runtime(cli_runtime: Option<RuntimeKind>) -> RuntimeKind {
    if let Some(runtime) = cli_runtime {
        return runtime;
    }

    if let Ok(env_runtime) = std::env::var(RUNTIME_ENV) {
        if let Ok(runtime) = env_runtime.parse() {
            return runtime;
        }
    }

    RuntimeKind::Docker
}

/// Resolve the binary every invocation is issued against
///
/// Precedence: `--docker-path` > LAUNCHER_DOCKER_PATH > detected runtime kind
pub fn resolve_runtime_binary(
    cli_path: Option<&str>,
    cli_runtime: Option<RuntimeKind>,
) -> String {
    if let Some(path) = cli_path.filter(|p| !p.is_empty()) {
        return path.to_string();
    }
    if let Ok(path) = std::env::var(DOCKER_PATH_ENV) {
        if !path.is_empty() {
            return path;
        }
    }
    detect_runtime(cli_runtime).as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_runtime_kind_from_str() {
        assert_eq!(
            "docker".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::Docker
        );
        assert_eq!(
            "PODMAN".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::Podman
        );
        assert!("containerd".parse::<RuntimeKind>().is_err());
    }

    #[test]
    fn test_runtime_kind_display() {
        assert_eq!(RuntimeKind::Docker.to_string(), "docker");
        assert_eq!(RuntimeKind::Podman.to_string(), "podman");
    }

    #[test]
    fn test_detect_runtime_env_var() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var(RUNTIME_ENV, "podman");
        assert_eq!(detect_runtime(None), RuntimeKind::Podman);
        assert_eq!(detect_runtime(Some(RuntimeKind::Docker)), RuntimeKind::Docker);

        // Invalid env var should fall back to default
        std::env::set_var(RUNTIME_ENV, "invalid");
        assert_eq!(detect_runtime(None), RuntimeKind::Docker);
        std::env::remove_var(RUNTIME_ENV);
    }

    #[test]
    fn test_resolve_runtime_binary_precedence() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var(RUNTIME_ENV);
        std::env::remove_var(DOCKER_PATH_ENV);
        assert_eq!(resolve_runtime_binary(None, None), "docker");
        assert_eq!(
            resolve_runtime_binary(None, Some(RuntimeKind::Podman)),
            "podman"
        );

        std::env::set_var(DOCKER_PATH_ENV, "/opt/bin/docker");
        assert_eq!(
            resolve_runtime_binary(None, Some(RuntimeKind::Podman)),
            "/opt/bin/docker"
        );
        assert_eq!(
            resolve_runtime_binary(Some("/usr/local/bin/docker"), None),
            "/usr/local/bin/docker"
        );
        std::env::remove_var(DOCKER_PATH_ENV);
    }
}
