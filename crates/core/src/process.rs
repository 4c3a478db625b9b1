//! External process invocation
//!
//! Every interaction with the container runtime goes through a
//! [`ProcessInvoker`]. Phases describe a call as an [`InvocationSpec`] and
//! hand it to the invoker they were constructed with, so tests can swap in
//! [`mock::RecordingInvoker`] and inspect exactly what would have run.

use crate::errors::ProcessError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Environment changes applied on top of the inherited process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    set: BTreeMap<String, String>,
    remove: BTreeSet<String>,
}

impl EnvOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable. Clears any pending removal of the same name.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove.remove(&key);
        self.set.insert(key, value.into());
    }

    /// Strip a variable from the inherited environment
    pub fn remove(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.set.remove(&key);
        self.remove.insert(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.set.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.set.contains_key(key)
    }

    pub fn is_removed(&self, key: &str) -> bool {
        self.remove.contains(key)
    }

    fn apply(&self, command: &mut Command) {
        for key in &self.remove {
            command.env_remove(key);
        }
        command.envs(&self.set);
    }
}

/// Description of one external-process call
///
/// Built fresh for every call and consumed by the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    /// Executable (the container runtime binary)
    pub program: String,
    /// Ordered argument list
    pub args: Vec<String>,
    /// Environment overlay on top of the inherited environment
    pub env: EnvOverlay,
    /// Working directory for the child
    pub working_dir: Option<PathBuf>,
    /// Payload piped to the child's stdin
    pub stdin: Option<String>,
    /// Inherit stdin/stdout/stderr for an attached session
    pub interactive: bool,
}

impl InvocationSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: EnvOverlay::new(),
            working_dir: None,
            stdin: None,
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: EnvOverlay) -> Self {
        self.env = env;
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// First argument, i.e. the runtime subcommand (`build`, `run`, ...)
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Program and arguments joined with spaces
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Value following the first occurrence of `flag`
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for InvocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Uniform contract for running one external command to completion
///
/// Implementations must observe `cancel` while the child runs and return
/// [`ProcessError::Interrupted`] once it fires.
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    /// Run with stdout/stderr attached to the terminal
    async fn run(
        &self,
        spec: InvocationSpec,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError>;

    /// Run and return the captured stdout
    async fn output(
        &self,
        spec: InvocationSpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProcessError>;
}

/// How long an interrupted child gets to exit before it is killed
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(10);

/// Production invoker backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct CliInvoker {
    interrupt_grace: Duration,
}

impl Default for CliInvoker {
    fn default() -> Self {
        Self {
            interrupt_grace: INTERRUPT_GRACE,
        }
    }
}

impl CliInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time between SIGINT and SIGKILL once the run is cancelled
    pub fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    async fn execute(
        &self,
        spec: &InvocationSpec,
        capture: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProcessError> {
        let command_line = spec.command_line();
        if cancel.is_cancelled() {
            return Err(ProcessError::Interrupted {
                command: command_line,
            });
        }
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        spec.env.apply(&mut command);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        if spec.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(if spec.stdin.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                })
                .stdout(if capture {
                    Stdio::piped()
                } else {
                    Stdio::inherit()
                })
                .stderr(Stdio::inherit());
        }
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        if let (Some(payload), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                // The child may exit before reading everything; that surfaces through its status.
                if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                    debug!("Failed to write stdin payload: {}", err);
                }
            });
        }

        let reader = child.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            })
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| ProcessError::Io {
                command: command_line.clone(),
                source,
            })?,
            _ = cancel.cancelled() => {
                interrupt_child(&mut child, self.interrupt_grace).await;
                return Err(ProcessError::Interrupted { command: command_line });
            }
        };

        let captured = match reader {
            Some(handle) => handle
                .await
                .map_err(|e| ProcessError::Io {
                    command: command_line.clone(),
                    source: std::io::Error::other(e),
                })?
                .map_err(|source| ProcessError::Io {
                    command: command_line.clone(),
                    source,
                })?,
            None => Vec::new(),
        };

        check_status(status, command_line)?;
        Ok(captured)
    }
}

fn check_status(status: ExitStatus, command: String) -> Result<(), ProcessError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ProcessError::Exited { command, code }),
        None => Err(ProcessError::Terminated { command }),
    }
}

/// Ask the child to stop the way a terminal Ctrl-C would, then reap it.
/// A child still alive after `grace` is killed.
async fn interrupt_child(child: &mut Child, grace: Duration) {
    if !send_interrupt(child) {
        warn!("Could not deliver SIGINT to child, killing it");
        if let Err(err) = child.kill().await {
            debug!("Failed to kill child: {}", err);
        }
        return;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            debug!("Interrupted child exited with {}", status);
            return;
        }
        Ok(Err(err)) => debug!("Failed to wait for interrupted child: {}", err),
        Err(_) => warn!("Child still running {:?} after SIGINT, killing it", grace),
    }

    if let Err(err) = child.kill().await {
        debug!("Failed to kill child: {}", err);
    }
}

#[cfg(unix)]
fn send_interrupt(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        #[allow(clippy::cast_possible_wrap)]
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGINT).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn send_interrupt(_child: &Child) -> bool {
    false
}

#[async_trait]
impl ProcessInvoker for CliInvoker {
    #[instrument(skip_all, fields(command = %spec.subcommand().unwrap_or_default()))]
    async fn run(
        &self,
        spec: InvocationSpec,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        info!("{}", spec);
        self.execute(&spec, false, cancel).await.map(|_| ())
    }

    #[instrument(skip_all, fields(command = %spec.subcommand().unwrap_or_default()))]
    async fn output(
        &self,
        spec: InvocationSpec,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProcessError> {
        debug!("{}", spec);
        self.execute(&spec, true, cancel).await
    }
}

pub mod mock {
    //! Recording invoker for tests
    //!
    //! Nothing is executed. Every spec is stored for inspection, `ps`
    //! queries are answered from a simulated container table, and
    //! `run`/`start`/`stop`/`rm` update that table the way the real runtime
    //! would. Individual subcommands can be scripted to fail.

    use super::{InvocationSpec, ProcessInvoker};
    use crate::errors::ProcessError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    /// Simulated state of a named container
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockContainerState {
        Running,
        Stopped,
    }

    #[derive(Debug, Default)]
    struct RecorderState {
        calls: Vec<InvocationSpec>,
        containers: HashMap<String, MockContainerState>,
        failures: HashMap<String, i32>,
        outputs: HashMap<String, Vec<u8>>,
        cancel_after: HashMap<String, CancellationToken>,
    }

    /// Test double that records invocation specs instead of executing them
    #[derive(Debug, Clone, Default)]
    pub struct RecordingInvoker {
        state: Arc<Mutex<RecorderState>>,
    }

    impl RecordingInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed the simulated runtime with an existing container
        pub fn with_container(self, name: &str, state: MockContainerState) -> Self {
            self.state
                .lock()
                .unwrap()
                .containers
                .insert(name.to_string(), state);
            self
        }

        /// Make every invocation of `subcommand` exit with `code`
        pub fn fail_on(self, subcommand: &str, code: i32) -> Self {
            self.state
                .lock()
                .unwrap()
                .failures
                .insert(subcommand.to_string(), code);
            self
        }

        /// Captured stdout returned for `subcommand`
        pub fn with_output(self, subcommand: &str, output: &[u8]) -> Self {
            self.state
                .lock()
                .unwrap()
                .outputs
                .insert(subcommand.to_string(), output.to_vec());
            self
        }

        /// Cancel `token` once an invocation of `subcommand` has completed,
        /// as if the operator pressed Ctrl-C right after it
        pub fn cancel_after(self, subcommand: &str, token: &CancellationToken) -> Self {
            self.state
                .lock()
                .unwrap()
                .cancel_after
                .insert(subcommand.to_string(), token.clone());
            self
        }

        /// Every recorded spec, in call order
        pub fn calls(&self) -> Vec<InvocationSpec> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Recorded specs that act on the runtime, i.e. excluding `ps` state queries
        pub fn actions(&self) -> Vec<InvocationSpec> {
            self.calls()
                .into_iter()
                .filter(|spec| spec.subcommand() != Some("ps"))
                .collect()
        }

        pub fn container_state(&self, name: &str) -> Option<MockContainerState> {
            self.state.lock().unwrap().containers.get(name).copied()
        }

        fn record(&self, spec: &InvocationSpec) -> Result<Vec<u8>, ProcessError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(spec.clone());

            let subcommand = spec.subcommand().unwrap_or_default().to_string();
            if let Some(code) = state.failures.get(&subcommand) {
                return Err(ProcessError::Exited {
                    command: spec.command_line(),
                    code: *code,
                });
            }

            let target = spec.args.last().cloned().unwrap_or_default();
            match subcommand.as_str() {
                "ps" => return Ok(answer_ps(&state.containers, spec)),
                "run" => {
                    if let Some(name) = spec.flag_value("--name") {
                        let next = if spec.args.iter().any(|a| a == "--rm") {
                            None
                        } else if spec.args.iter().any(|a| a == "--detach") {
                            Some(MockContainerState::Running)
                        } else {
                            Some(MockContainerState::Stopped)
                        };
                        if let Some(next) = next {
                            state.containers.insert(name.to_string(), next);
                        }
                    }
                }
                "start" => {
                    state
                        .containers
                        .insert(target, MockContainerState::Running);
                }
                "stop" => {
                    if let Some(entry) = state.containers.get_mut(&target) {
                        *entry = MockContainerState::Stopped;
                    }
                }
                "rm" => {
                    state.containers.remove(&target);
                }
                _ => {}
            }

            if let Some(token) = state.cancel_after.get(&subcommand) {
                token.cancel();
            }
            Ok(state.outputs.get(&subcommand).cloned().unwrap_or_default())
        }
    }

    fn answer_ps(
        containers: &HashMap<String, MockContainerState>,
        spec: &InvocationSpec,
    ) -> Vec<u8> {
        let include_stopped = spec.args.iter().any(|a| a == "--all");
        let name = spec
            .args
            .iter()
            .find_map(|a| a.strip_prefix("name="))
            .map(|n| n.trim_start_matches('^').trim_end_matches('$'));

        match name.and_then(|n| containers.get(n)) {
            Some(MockContainerState::Running) => b"f00dfeed\n".to_vec(),
            Some(MockContainerState::Stopped) if include_stopped => b"f00dfeed\n".to_vec(),
            _ => Vec::new(),
        }
    }

    #[async_trait]
    impl ProcessInvoker for RecordingInvoker {
        async fn run(
            &self,
            spec: InvocationSpec,
            cancel: &CancellationToken,
        ) -> Result<(), ProcessError> {
            if cancel.is_cancelled() {
                return Err(ProcessError::Interrupted {
                    command: spec.command_line(),
                });
            }
            self.record(&spec).map(|_| ())
        }

        async fn output(
            &self,
            spec: InvocationSpec,
            cancel: &CancellationToken,
        ) -> Result<Vec<u8>, ProcessError> {
            if cancel.is_cancelled() {
                return Err(ProcessError::Interrupted {
                    command: spec.command_line(),
                });
            }
            self.record(&spec)
        }
    }
}
