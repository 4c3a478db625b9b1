//! Runtime argument composition and state queries
//!
//! Every phase builds its runtime calls from the helpers here so that the
//! flag layout (order, env exposure, port publishing) is decided in one
//! place. [`ContainerRuntime`] pairs the selected runtime binary with the
//! injected [`ProcessInvoker`] and answers the existence/running questions
//! the lifecycle commands ask right before acting.

use crate::config::{ResolvedConfig, KNOWN_SECRETS};
use crate::errors::ProcessError;
use crate::process::{EnvOverlay, InvocationSpec, ProcessInvoker};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Grace period handed to `stop -t`, in seconds
pub const STOP_GRACE_SECONDS: u32 = 600;

pub const SHM_SIZE_FLAG: &str = "--shm-size=512m";

/// Age filter used by `cleanup` when pruning
pub const PRUNE_FILTER: &str = "until=1h";

/// Local image reference for a configuration, `local_<namespace>/<config>`
pub fn image_name(namespace: &str, config: &str) -> String {
    format!("local_{}/{}", namespace, config)
}

pub fn tagged_image(namespace: &str, config: &str, tag: &str) -> String {
    format!("{}:{}", image_name(namespace, config), tag)
}

/// Overlay carrying every configured variable, credentials included
pub fn full_env_overlay(config: &ResolvedConfig) -> EnvOverlay {
    let mut env = EnvOverlay::new();
    for (key, value) in config.env_pairs(true) {
        env.set(key, value);
    }
    env
}

/// Overlay that adds nothing and strips known credentials from the inherited environment
pub fn credential_free_overlay() -> EnvOverlay {
    let mut env = EnvOverlay::new();
    for key in KNOWN_SECRETS {
        env.remove(*key);
    }
    env
}

/// Builder for a `run` invocation
#[derive(Debug, Clone)]
pub struct RunInvocation<'a> {
    config: &'a ResolvedConfig,
    image: String,
    detach: bool,
    restart_always: bool,
    remove: bool,
    publish_ports: bool,
    name: Option<String>,
    hostname: Option<String>,
    extra_env: Vec<(String, String)>,
    docker_args: Vec<String>,
    extra_flags: Vec<String>,
    stdin: Option<String>,
    command: Vec<String>,
}

impl<'a> RunInvocation<'a> {
    pub fn new(config: &'a ResolvedConfig, image: impl Into<String>) -> Self {
        Self {
            config,
            image: image.into(),
            detach: false,
            restart_always: false,
            remove: false,
            publish_ports: false,
            name: None,
            hostname: None,
            extra_env: Vec::new(),
            docker_args: Vec::new(),
            extra_flags: Vec::new(),
            stdin: None,
            command: Vec::new(),
        }
    }

    pub fn detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    pub fn restart_always(mut self, restart: bool) -> Self {
        self.restart_always = restart;
        self
    }

    /// Auto-remove the container once it exits (`--rm`)
    pub fn remove(mut self, remove: bool) -> Self {
        self.remove = remove;
        self
    }

    pub fn publish_ports(mut self, publish: bool) -> Self {
        self.publish_ports = publish;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Literal `--env KEY=VALUE` entry placed ahead of the configured variables
    pub fn extra_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    pub fn docker_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.docker_args.extend(args);
        self
    }

    pub fn extra_flag(mut self, flag: impl Into<String>) -> Self {
        self.extra_flags.push(flag.into());
        self
    }

    /// Pipe `payload` to the container, which adds `--interactive`
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(command.into_iter().map(Into::into));
        self
    }

    pub fn build(self, program: &str) -> InvocationSpec {
        let mut args = vec!["run".to_string()];

        if self.detach {
            args.push("--detach".to_string());
        }
        if self.restart_always {
            args.push("--restart=always".to_string());
        }

        for (key, value) in &self.extra_env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }
        // Values travel through the process environment, not the argument list
        for (key, _) in self.config.env_pairs(true) {
            args.push("--env".to_string());
            args.push(key);
        }

        for (key, value) in &self.config.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        if self.publish_ports {
            for port in &self.config.expose {
                if port.contains(':') {
                    args.push("-p".to_string());
                } else {
                    args.push("--expose".to_string());
                }
                args.push(port.clone());
            }
        }

        for volume in &self.config.volumes {
            args.push("--volume".to_string());
            args.push(format!("{}:{}", volume.host, volume.guest));
        }
        for link in &self.config.links {
            args.push("--link".to_string());
            args.push(format!("{}:{}", link.name, link.alias));
        }

        args.push(SHM_SIZE_FLAG.to_string());

        if self.remove {
            args.push("--rm".to_string());
        }
        if let Some(name) = &self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if let Some(hostname) = &self.hostname {
            args.push("--hostname".to_string());
            args.push(hostname.clone());
        }

        args.extend(self.docker_args);
        args.extend(self.extra_flags);

        if self.stdin.is_some() {
            args.push("--interactive".to_string());
        }
        args.push(self.image);
        args.extend(self.command);

        let spec = InvocationSpec::new(program)
            .args(args)
            .env(full_env_overlay(self.config));
        match self.stdin {
            Some(payload) => spec.stdin(payload),
            None => spec,
        }
    }
}

/// Credential-free image build fed from a Dockerfile on stdin
pub fn build_invocation(
    program: &str,
    config: &ResolvedConfig,
    image: &str,
    context_dir: &Path,
    dockerfile: String,
) -> InvocationSpec {
    let public_env = config.env_pairs(false);

    let mut args = vec!["build".to_string()];
    for (key, _) in &public_env {
        args.push("--build-arg".to_string());
        args.push(key.clone());
    }
    args.extend(
        ["--no-cache", "--pull", "--force-rm", "-t"]
            .into_iter()
            .map(String::from),
    );
    args.push(image.to_string());
    args.push(SHM_SIZE_FLAG.to_string());
    args.extend(["-f", "-", "."].into_iter().map(String::from));

    let mut env = credential_free_overlay();
    for (key, value) in public_env {
        env.set(key, value);
    }
    env.set("BUILDKIT_PROGRESS", "plain");

    InvocationSpec::new(program)
        .args(args)
        .env(env)
        .current_dir(context_dir)
        .stdin(dockerfile)
}

/// `commit` of a stopped container into `image`, setting the boot command
pub fn commit_invocation(
    program: &str,
    container: &str,
    image: &str,
    boot_command: &str,
) -> InvocationSpec {
    InvocationSpec::new(program)
        .args([
            "commit".to_string(),
            "--change".to_string(),
            format!("CMD [\"{}\"]", boot_command),
            container.to_string(),
            image.to_string(),
        ])
        .env(credential_free_overlay())
}

pub fn remove_invocation(program: &str, container: &str, force: bool) -> InvocationSpec {
    let spec = InvocationSpec::new(program).arg("rm");
    let spec = if force { spec.arg("-f") } else { spec };
    spec.arg(container)
}

pub fn stop_invocation(program: &str, container: &str) -> InvocationSpec {
    InvocationSpec::new(program).args([
        "stop".to_string(),
        "-t".to_string(),
        STOP_GRACE_SECONDS.to_string(),
        container.to_string(),
    ])
}

pub fn start_invocation(program: &str, container: &str) -> InvocationSpec {
    InvocationSpec::new(program).args(["start", container])
}

pub fn logs_invocation(program: &str, container: &str) -> InvocationSpec {
    InvocationSpec::new(program).args(["logs", container])
}

/// Interactive login shell in a running container
pub fn enter_invocation(program: &str, container: &str) -> InvocationSpec {
    InvocationSpec::new(program)
        .args(["exec", "-it", container, "/bin/bash", "--login"])
        .interactive(true)
}

/// `container prune` or `image prune --all`, attached so the runtime can ask for confirmation
pub fn prune_invocation(program: &str, kind: PruneKind) -> InvocationSpec {
    let spec = InvocationSpec::new(program);
    let spec = match kind {
        PruneKind::Containers => spec.args(["container", "prune"]),
        PruneKind::Images => spec.args(["image", "prune", "--all"]),
    };
    spec.args(["--filter", PRUNE_FILTER]).interactive(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneKind {
    Containers,
    Images,
}

fn ps_invocation(program: &str, name: &str, include_stopped: bool) -> InvocationSpec {
    let spec = InvocationSpec::new(program).arg("ps");
    let spec = if include_stopped {
        spec.arg("--all")
    } else {
        spec
    };
    spec.args(["--quiet", "--filter"])
        .arg(format!("name=^{}$", name))
}

/// The selected runtime binary bound to an invoker
#[derive(Clone)]
pub struct ContainerRuntime {
    invoker: Arc<dyn ProcessInvoker>,
    program: String,
}

impl std::fmt::Debug for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRuntime")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl ContainerRuntime {
    pub fn new(invoker: Arc<dyn ProcessInvoker>, program: impl Into<String>) -> Self {
        Self {
            invoker,
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn run(
        &self,
        spec: InvocationSpec,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        self.invoker.run(spec, cancel).await
    }

    pub async fn output(
        &self,
        spec: InvocationSpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProcessError> {
        self.invoker.output(spec, cancel).await
    }

    /// Whether a container with exactly this name exists, running or not
    #[instrument(skip(self, cancel))]
    pub async fn exists(&self, name: &str, cancel: &CancellationToken) -> Result<bool, ProcessError> {
        self.query(name, true, cancel).await
    }

    #[instrument(skip(self, cancel))]
    pub async fn running(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ProcessError> {
        self.query(name, false, cancel).await
    }

    async fn query(
        &self,
        name: &str,
        include_stopped: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, ProcessError> {
        let out = self
            .invoker
            .output(ps_invocation(&self.program, name, include_stopped), cancel)
            .await?;
        let found = !String::from_utf8_lossy(&out).trim().is_empty();
        debug!("Container {} present: {}", name, found);
        Ok(found)
    }
}

/// Secret keys that must not appear anywhere in `spec`
pub fn leaked_secrets(spec: &InvocationSpec) -> Vec<String> {
    KNOWN_SECRETS
        .iter()
        .filter(|key| {
            spec.env.contains(key)
                || !spec.env.is_removed(key)
                || spec.args.iter().any(|a| a.starts_with(*key))
        })
        .map(|key| key.to_string())
        .collect()
}

/// True when no known secret reaches the child through args, overlay or inheritance
pub fn is_credential_free(spec: &InvocationSpec) -> bool {
    leaked_secrets(spec).is_empty()
}
