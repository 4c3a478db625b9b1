use crate::commands::bootstrap::{execute_bootstrap, BootstrapArgs};
use crate::commands::build::{execute_build, BuildArgs};
use crate::commands::cleanup::{execute_cleanup, CleanupArgs, DEFAULT_LEGACY_DATA_DIR};
use crate::commands::configure::{execute_configure, ConfigureArgs};
use crate::commands::destroy::execute_destroy;
use crate::commands::enter::execute_enter;
use crate::commands::generate::{raw_yaml, resolved_json, write_dockerfile, DockerfileArgs};
use crate::commands::logs::execute_logs;
use crate::commands::migrate::{execute_migrate, MigrateArgs};
use crate::commands::rebuild::{execute_rebuild, RebuildArgs};
use crate::commands::restart::execute_restart;
use crate::commands::run::{execute_run, RunArgs};
use crate::commands::shared::{LauncherSettings, PhaseContext};
use crate::commands::start::{execute_start, StartArgs};
use crate::commands::stop::execute_stop;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use launcher_core::config::TemplateConfigLoader;
use launcher_core::process::CliInvoker;
use launcher_core::runtime::{resolve_runtime_binary, RuntimeKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => RuntimeKind::Docker,
            RuntimeOption::Podman => RuntimeKind::Podman,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Launcher subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a base image with no dependencies
    Build {
        /// Configuration name (containers/<config>.yml)
        config: String,
        /// Tag for the resulting image
        #[arg(long, default_value = "latest")]
        tag: String,
        /// Bake the non-secret environment into the image
        #[arg(long)]
        bake_env: bool,
    },
    /// Run migration tasks from a built image. Does not save the container.
    Migrate {
        config: String,
        /// Tag of the image to migrate from
        #[arg(long, default_value = "latest")]
        tag: String,
        /// Skip post-deployment migrations
        #[arg(long)]
        skip_post_deployment_migrations: bool,
    },
    /// Configure and save an image with all dependencies and environment baked in
    #[command(
        long_about = "Configure and save an image with all dependencies and environment baked in.\n\n\
        Updates themes and precompiles all assets, then commits the resulting container."
    )]
    Configure {
        config: String,
        /// Tag of the image to configure from
        #[arg(long, default_value = "latest")]
        source_tag: String,
        /// Tag to save the configured image under
        #[arg(long, default_value = "latest")]
        target_tag: String,
    },
    /// Build, migrate, and configure an image
    Bootstrap {
        config: String,
        /// Skip post-deployment migrations
        #[arg(long)]
        skip_post_deployment_migrations: bool,
    },
    /// Starts container
    Start {
        config: String,
        /// Print the start command only
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Extra arguments to pass when running docker
        #[arg(long, allow_hyphen_values = true)]
        docker_args: Option<String>,
        /// Override the image used for running the container
        #[arg(long)]
        run_image: Option<String>,
        /// Run in the foreground under an external supervisor
        #[arg(long)]
        supervised: bool,
    },
    /// Stops container
    Stop { config: String },
    /// Stops then starts container
    Restart {
        config: String,
        /// Extra arguments to pass when running docker
        #[arg(long, allow_hyphen_values = true)]
        docker_args: Option<String>,
        /// Override the image used for running the container
        #[arg(long)]
        run_image: Option<String>,
    },
    /// Shutdown and destroy container
    Destroy { config: String },
    /// Builds new image, then destroys old container, and starts new container
    Rebuild {
        config: String,
        /// Extra arguments to pass when running docker
        #[arg(long, allow_hyphen_values = true)]
        docker_args: Option<String>,
        /// Skip post-deployment migrations
        #[arg(long)]
        skip_post_deployment_migrations: bool,
    },
    /// Print logs for container
    Logs { config: String },
    /// Connects to a shell running in the container
    Enter { config: String },
    /// Cleanup unused containers and images
    Cleanup {
        /// Old PostgreSQL data cluster offered for removal
        #[arg(long, value_name = "PATH", default_value = DEFAULT_LEGACY_DATA_DIR)]
        legacy_data_dir: PathBuf,
    },
    /// Runs the specified command in context of a docker container
    Run {
        /// Override the image used for running the container
        #[arg(long)]
        run_image: Option<String>,
        /// Extra arguments to pass when running docker
        #[arg(long, allow_hyphen_values = true)]
        docker_args: Option<String>,
        config: String,
        /// Command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Generate pups configuration for external use
    #[command(subcommand)]
    Generate(GenerateCommands),
}

/// Generate subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum GenerateCommands {
    /// Print the concatenated pups payload
    RawYaml { config: String },
    /// Write a standalone Dockerfile build context
    Dockerfile {
        config: String,
        /// Parent directory of the generated <config>/ context (defaults to --build-dir)
        #[arg(long, value_name = "PATH")]
        output_dir: Option<PathBuf>,
        /// Bake the non-secret environment into the image
        #[arg(long)]
        bake_env: bool,
    },
    /// Print the resolved configuration as JSON with secrets masked
    Resolved { config: String },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Container launcher",
    long_about = "Container launcher\n\nBuilds, bootstraps, and manages application containers defined by layered pups templates.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via LAUNCHER_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Pups config directory
    #[arg(long, global = true, value_name = "PATH", default_value = "./containers")]
    pub conf_dir: PathBuf,

    /// Parent directory containing a templates/ directory with pups yaml templates
    #[arg(long, global = true, value_name = "PATH", default_value = ".")]
    pub templates_dir: PathBuf,

    /// Temporary build folder for building images
    #[arg(long, global = true, value_name = "PATH", default_value = "./tmp")]
    pub build_dir: PathBuf,

    /// Image namespace, images are named local_<namespace>/<config>
    #[arg(long, global = true, default_value = "discourse")]
    pub namespace: String,

    /// Create intermediate output directories as required
    #[arg(short = 'p', long = "parent-dirs", global = true)]
    pub parent_dirs: bool,

    /// Container runtime to use (docker or podman, can be set via LAUNCHER_RUNTIME env var)
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the runtime executable (can be set via LAUNCHER_DOCKER_PATH env var)
    #[arg(long, global = true, value_name = "PATH")]
    pub docker_path: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Resolve the global options into the settings handed to every phase
    pub fn settings(&self) -> LauncherSettings {
        LauncherSettings {
            conf_dir: self.conf_dir.clone(),
            templates_dir: self.templates_dir.clone(),
            build_dir: self.build_dir.clone(),
            namespace: self.namespace.clone(),
            create_parent_dirs: self.parent_dirs,
            runtime_binary: resolve_runtime_binary(
                self.docker_path.as_deref(),
                self.runtime.map(Into::into),
            ),
        }
    }

    /// Initialize logging, build the phase context, and run the selected command
    pub async fn dispatch(self, cancel: CancellationToken) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };
        let log_level = self.log_level.as_str();
        if std::env::var_os("LAUNCHER_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("launcher={},launcher_core={}", log_level, log_level),
            );
        }
        launcher_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let settings = self.settings();
        tracing::debug!("Using runtime binary: {}", settings.runtime_binary);
        let loader = Arc::new(TemplateConfigLoader::new(
            settings.conf_dir.clone(),
            settings.templates_dir.clone(),
        ));
        let ctx = PhaseContext::new(settings, Arc::new(CliInvoker::new()), loader, cancel);

        match self.command {
            Commands::Build {
                config,
                tag,
                bake_env,
            } => {
                execute_build(
                    &ctx,
                    BuildArgs {
                        config,
                        tag,
                        bake_env,
                    },
                )
                .await
            }
            Commands::Migrate {
                config,
                tag,
                skip_post_deployment_migrations,
            } => {
                execute_migrate(
                    &ctx,
                    MigrateArgs {
                        config,
                        tag,
                        skip_post_deployment_migrations,
                    },
                )
                .await
            }
            Commands::Configure {
                config,
                source_tag,
                target_tag,
            } => {
                execute_configure(
                    &ctx,
                    ConfigureArgs {
                        config,
                        source_tag,
                        target_tag,
                    },
                )
                .await
            }
            Commands::Bootstrap {
                config,
                skip_post_deployment_migrations,
            } => {
                execute_bootstrap(
                    &ctx,
                    BootstrapArgs {
                        config,
                        skip_post_deployment_migrations,
                    },
                )
                .await
            }
            Commands::Start {
                config,
                dry_run,
                docker_args,
                run_image,
                supervised,
            } => {
                execute_start(
                    &ctx,
                    StartArgs {
                        config,
                        dry_run,
                        docker_args,
                        run_image,
                        supervised,
                    },
                )
                .await
            }
            Commands::Stop { config } => execute_stop(&ctx, &config).await,
            Commands::Restart {
                config,
                docker_args,
                run_image,
            } => {
                execute_restart(
                    &ctx,
                    StartArgs {
                        docker_args,
                        run_image,
                        ..StartArgs::new(config)
                    },
                )
                .await
            }
            Commands::Destroy { config } => execute_destroy(&ctx, &config).await,
            Commands::Rebuild {
                config,
                docker_args,
                skip_post_deployment_migrations,
            } => {
                execute_rebuild(
                    &ctx,
                    RebuildArgs {
                        config,
                        docker_args,
                        skip_post_deployment_migrations,
                    },
                )
                .await
            }
            Commands::Logs { config } => execute_logs(&ctx, &config).await,
            Commands::Enter { config } => execute_enter(&ctx, &config).await,
            Commands::Cleanup { legacy_data_dir } => {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                let mut out = std::io::stdout();
                execute_cleanup(&ctx, CleanupArgs { legacy_data_dir }, &mut input, &mut out)
                    .await
                    .map(|outcome| tracing::debug!("Cleanup finished: {:?}", outcome))
            }
            Commands::Run {
                run_image,
                docker_args,
                config,
                command,
            } => {
                execute_run(
                    &ctx,
                    RunArgs {
                        config,
                        run_image,
                        docker_args,
                        command,
                    },
                )
                .await
            }
            Commands::Generate(GenerateCommands::RawYaml { config }) => {
                println!("{}", raw_yaml(&ctx, &config)?);
                Ok(())
            }
            Commands::Generate(GenerateCommands::Dockerfile {
                config,
                output_dir,
                bake_env,
            }) => {
                let dir = write_dockerfile(
                    &ctx,
                    DockerfileArgs {
                        config,
                        output_dir,
                        bake_env,
                    },
                )?;
                println!("{}", dir.display());
                Ok(())
            }
            Commands::Generate(GenerateCommands::Resolved { config }) => {
                println!("{}", resolved_json(&ctx, &config)?);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_global_flag_defaults() {
        let cli = Cli::parse_from(["launcher", "stop", "app"]);
        assert_eq!(cli.conf_dir, PathBuf::from("./containers"));
        assert_eq!(cli.templates_dir, PathBuf::from("."));
        assert_eq!(cli.build_dir, PathBuf::from("./tmp"));
        assert_eq!(cli.namespace, "discourse");
        assert!(!cli.parent_dirs);
        assert!(cli.docker_path.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "launcher",
            "generate",
            "dockerfile",
            "app",
            "-p",
            "--docker-path",
            "/usr/local/bin/docker",
            "--conf-dir",
            "/etc/launcher/containers",
        ]);
        let settings = cli.settings();
        assert!(settings.create_parent_dirs);
        assert_eq!(settings.runtime_binary, "/usr/local/bin/docker");
        assert_eq!(settings.conf_dir, PathBuf::from("/etc/launcher/containers"));
    }

    #[test]
    fn test_build_options() {
        let cli = Cli::parse_from(["launcher", "build", "app", "--tag", "beta", "--bake-env"]);
        match cli.command {
            Commands::Build {
                config,
                tag,
                bake_env,
            } => {
                assert_eq!(config, "app");
                assert_eq!(tag, "beta");
                assert!(bake_env);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_takes_trailing_command() {
        let cli = Cli::parse_from([
            "launcher",
            "run",
            "--run-image",
            "custom:1",
            "app",
            "rails",
            "runner",
            "--verbose",
        ]);
        match cli.command {
            Commands::Run {
                config,
                command,
                run_image,
                ..
            } => {
                assert_eq!(config, "app");
                assert_eq!(run_image.as_deref(), Some("custom:1"));
                assert_eq!(command, vec!["rails", "runner", "--verbose"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_start_docker_args_accepts_flags() {
        let cli = Cli::parse_from([
            "launcher",
            "start",
            "app",
            "--docker-args",
            "--cpus 2",
            "-n",
        ]);
        match cli.command {
            Commands::Start {
                docker_args,
                dry_run,
                ..
            } => {
                assert_eq!(docker_args.as_deref(), Some("--cpus 2"));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["launcher"]).is_err());
        assert!(Cli::try_parse_from(["launcher", "run", "app"]).is_err());
    }
}
