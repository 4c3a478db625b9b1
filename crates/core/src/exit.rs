//! Terminal outcome of a dispatched command
//!
//! The runtime (or a script inside the container) exits with
//! [`RETRY_EXIT_CODE`] to ask the operator to run the whole command again.
//! That status is passed through unchanged; every other process failure is
//! reported with the bootstrap failure banner.

use crate::errors::{LauncherError, ProcessError};

/// Reserved exit status meaning "re-run the command"
pub const RETRY_EXIT_CODE: i32 = 77;

const FAILURE_BANNER: &str = "** FAILED TO BOOTSTRAP ** please scroll up and look for earlier error messages, there may be more than one.\n./discourse-doctor may help diagnose the problem.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSignal {
    Success,
    /// Ordinary failure with the message shown to the operator
    Failure(String),
    RetryRequested,
}

impl ExitSignal {
    /// Classify an error returned by a phase
    pub fn from_error(err: &anyhow::Error) -> Self {
        match find_process_error(err) {
            Some(ProcessError::Exited { code, .. }) if *code == RETRY_EXIT_CODE => {
                ExitSignal::RetryRequested
            }
            Some(ProcessError::Exited { code, .. }) => ExitSignal::Failure(format!(
                "run failed with exit code {}\n{}",
                code, FAILURE_BANNER
            )),
            _ => ExitSignal::Failure(format!("Error: {:#}", err)),
        }
    }

    pub fn from_result<T>(result: &anyhow::Result<T>) -> Self {
        match result {
            Ok(_) => ExitSignal::Success,
            Err(err) => Self::from_error(err),
        }
    }

    /// Status the launcher process exits with
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitSignal::Success => 0,
            ExitSignal::Failure(_) => 1,
            ExitSignal::RetryRequested => RETRY_EXIT_CODE,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ExitSignal::Failure(msg) => Some(msg),
            _ => None,
        }
    }
}

fn find_process_error(err: &anyhow::Error) -> Option<&ProcessError> {
    err.chain().find_map(|cause| {
        cause.downcast_ref::<ProcessError>().or_else(|| {
            match cause.downcast_ref::<LauncherError>() {
                Some(LauncherError::Process(inner)) => Some(inner),
                _ => None,
            }
        })
    })
}
