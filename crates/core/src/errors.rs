//! Error types and handling
//!
//! The error taxonomy is split by domain (configuration loading, external
//! process execution) and wrapped in the main `LauncherError` enum for
//! unified handling. Phase commands in the binary crate propagate these
//! through `anyhow`, and the dispatcher inspects the chain to decide the
//! process exit status.

use thiserror::Error;

/// Message shown to the operator for any configuration load failure.
pub const CONFIG_SYNTAX_MESSAGE: &str =
    "YAML syntax error. Please check your containers/*.yml config files.";

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Template or container file could not be parsed or merged
    #[error("{}", CONFIG_SYNTAX_MESSAGE)]
    Syntax { message: String },

    /// Configuration name contains characters that cannot be used in image or container names
    #[error("config cannot contain upper case letters, slashes, or special characters: {name}")]
    InvalidName { name: String },

    /// Container definition file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    /// A referenced template could not be loaded
    #[error("Failed to load template {path}: {message}")]
    Template { path: String, message: String },

    /// Environment key that cannot be passed as a container variable
    #[error("Invalid environment variable name: {key}")]
    InvalidEnv { key: String },

    /// Configuration I/O error
    #[error("Failed to access configuration")]
    Io(#[from] std::io::Error),
}

/// External process execution errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The runtime binary could not be started (missing, not executable, ...)
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited with a non-zero status
    #[error("Command failed with exit code {code}: {command}")]
    Exited { command: String, code: i32 },

    /// The process was killed by a signal and reported no exit status
    #[error("Command terminated by signal: {command}")]
    Terminated { command: String },

    /// Cancellation fired while the process was running
    #[error("Command interrupted: {command}")]
    Interrupted { command: String },

    /// Failure while feeding stdin or waiting on the child
    #[error("I/O error while running {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Numeric exit status, when the process actually exited
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Exited { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum LauncherError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// External process errors
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Container runtime reported something we could not interpret
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Convenience type alias for Results with LauncherError
pub type Result<T> = std::result::Result<T, LauncherError>;
