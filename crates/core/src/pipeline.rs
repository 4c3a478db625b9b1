//! Sequential step composition
//!
//! Composite phases (bootstrap, restart, destroy, rebuild) are an ordered
//! list of [`PipelineStep`]s run by [`Pipeline::run`]. A step only starts
//! after the previous one returned; a failing [`FailurePolicy::Abort`] step
//! ends the run and the remaining step futures are dropped without being
//! polled.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Boxed step body
pub type StepFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

/// What happens to the rest of the pipeline when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Propagate the failure, later steps never run
    Abort,
    /// Log and record the failure, then carry on
    Continue,
}

/// A named unit of work inside a [`Pipeline`]
pub struct PipelineStep<'a, E> {
    name: String,
    policy: FailurePolicy,
    future: StepFuture<'a, E>,
}

impl<'a, E> PipelineStep<'a, E> {
    fn new<F>(name: impl Into<String>, policy: FailurePolicy, future: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'a,
    {
        Self {
            name: name.into(),
            policy,
            future: Box::pin(future),
        }
    }
}

impl<E> fmt::Debug for PipelineStep<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Outcome of a completed pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Steps that returned success, in order
    pub completed: Vec<String>,
    /// Continue-policy steps that failed, with their error text
    pub tolerated_failures: Vec<(String, String)>,
}

impl PipelineReport {
    pub fn is_clean(&self) -> bool {
        self.tolerated_failures.is_empty()
    }
}

/// Ordered list of steps with short-circuit on abort-policy failures
pub struct Pipeline<'a, E> {
    name: String,
    steps: Vec<PipelineStep<'a, E>>,
}

impl<'a, E: fmt::Display> Pipeline<'a, E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step that aborts the pipeline on failure
    pub fn step<F>(self, name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'a,
    {
        self.push(PipelineStep::new(name, FailurePolicy::Abort, future))
    }

    /// Append a step whose failure is tolerated
    pub fn step_continue<F>(self, name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'a,
    {
        self.push(PipelineStep::new(name, FailurePolicy::Continue, future))
    }

    fn push(mut self, step: PipelineStep<'a, E>) -> Self {
        self.steps.push(step);
        self
    }

    /// Await every step in order
    pub async fn run(self) -> Result<PipelineReport, E> {
        let mut report = PipelineReport::default();
        let total = self.steps.len();
        debug!("Running pipeline {} with {} step(s)", self.name, total);

        for (index, step) in self.steps.into_iter().enumerate() {
            debug!("{} step {}/{}: {}", self.name, index + 1, total, step.name);
            match step.future.await {
                Ok(()) => report.completed.push(step.name),
                Err(err) => match step.policy {
                    FailurePolicy::Abort => {
                        info!(
                            "{} aborted at step {}; {} step(s) skipped",
                            self.name,
                            step.name,
                            total - index - 1
                        );
                        return Err(err);
                    }
                    FailurePolicy::Continue => {
                        warn!("{} step {} failed, continuing: {}", self.name, step.name, err);
                        report.tolerated_failures.push((step.name, err.to_string()));
                    }
                },
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    async fn record(
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        fail: bool,
    ) -> Result<(), String> {
        log.lock().unwrap().push(name);
        if fail {
            Err(format!("{} failed", name))
        } else {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_steps_in_order() {
        let log = recorder();
        let report = Pipeline::new("bootstrap")
            .step("build", record(log.clone(), "build", false))
            .step("migrate", record(log.clone(), "migrate", false))
            .step("configure", record(log.clone(), "configure", false))
            .run()
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["build", "migrate", "configure"]);
        assert_eq!(report.completed, vec!["build", "migrate", "configure"]);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_abort_skips_later_steps() {
        let log = recorder();
        let err = Pipeline::new("bootstrap")
            .step("build", record(log.clone(), "build", false))
            .step("migrate", record(log.clone(), "migrate", true))
            .step("configure", record(log.clone(), "configure", false))
            .run()
            .await
            .unwrap_err();

        assert_eq!(err, "migrate failed");
        assert_eq!(*log.lock().unwrap(), vec!["build", "migrate"]);
    }

    #[tokio::test]
    async fn test_continue_records_failure() {
        let log = recorder();
        let report = Pipeline::new("build")
            .step("image", record(log.clone(), "image", false))
            .step_continue("cleanup", record(log.clone(), "cleanup", true))
            .step("after", record(log.clone(), "after", false))
            .run()
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["image", "cleanup", "after"]);
        assert_eq!(report.completed, vec!["image", "after"]);
        assert_eq!(
            report.tolerated_failures,
            vec![("cleanup".to_string(), "cleanup failed".to_string())]
        );
    }

    #[test]
    fn test_step_metadata() {
        let pipeline: Pipeline<'_, String> = Pipeline::new("destroy")
            .step("stop", async { Ok(()) })
            .step_continue("rm", async { Ok(()) });
        let names: Vec<&str> = pipeline.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["stop", "rm"]);
        assert_eq!(pipeline.steps[1].policy, FailurePolicy::Continue);
    }
}
