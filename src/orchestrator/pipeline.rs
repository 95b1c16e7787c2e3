//! Named pipelines with per-step error policies.
//!
//! A pipeline is an ordered list of steps executed strictly sequentially:
//! later steps may depend on earlier steps' side effects on the metric
//! store. Step failures are isolated: they become structured reports to an
//! injected reporter collaborator, never panics, and never affect sibling
//! pipelines.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ComputationError, ExecutionError, TerraError, TerraResult};

/// What to do when a step's function fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Report the failure and continue with the next step.
    Skip,
    /// Report the failure and stop the pipeline; remaining steps do not
    /// run. The metric store keeps its last-known-consistent state because
    /// step writes are all-or-nothing batches.
    Abort,
    /// Retry the step once; a second failure aborts the pipeline.
    RetryOnce,
}

/// Pipeline lifecycle state.
///
/// `Succeeded` and `Failed` are restable: the next invocation moves the
/// pipeline back through `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Never run, or reset.
    Idle,
    /// A run is in flight.
    Running,
    /// The last run completed without an abort.
    Succeeded,
    /// The last run aborted.
    Failed,
}

/// How one step ended within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Ran and returned Ok.
    Succeeded,
    /// Failed once, then succeeded on the retry.
    Retried,
    /// Failed under the `Skip` policy; the pipeline continued.
    FailedSkipped,
    /// Failed under `Abort` (or a failed retry); the pipeline stopped.
    FailedAborted,
    /// Never ran because an earlier step aborted.
    NotRun,
}

/// Per-step record in a run report.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Step name.
    pub step: String,
    /// How the step ended.
    pub status: StepStatus,
    /// The final error for failed steps.
    pub error: Option<ComputationError>,
}

/// Overall outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every step ran; skipped failures may still be present in the step
    /// reports.
    Succeeded,
    /// An abort stopped the pipeline early.
    Failed,
}

/// Report for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunReport {
    /// Pipeline name.
    pub pipeline: String,
    /// Overall outcome.
    pub outcome: PipelineOutcome,
    /// Per-step records, in declaration order.
    pub steps: Vec<StepReport>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl PipelineRunReport {
    /// Errors reported during this run, in step order.
    #[must_use]
    pub fn errors(&self) -> Vec<&ComputationError> {
        self.steps.iter().filter_map(|s| s.error.as_ref()).collect()
    }
}

/// Structured failure report delivered to the error-isolation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Component or calculator the failure originated in.
    pub module: String,
    /// Operation that was being performed.
    pub operation: String,
    /// Human-readable cause.
    pub cause: String,
    /// Whether retrying could succeed.
    pub recoverable: bool,
    /// When the failure was reported.
    pub reported_at: DateTime<Utc>,
}

impl From<&ComputationError> for ErrorReport {
    fn from(err: &ComputationError) -> Self {
        Self {
            module: err.module.clone(),
            operation: err.operation.clone(),
            cause: err.cause.clone(),
            recoverable: err.recoverable,
            reported_at: Utc::now(),
        }
    }
}

/// External error-reporting collaborator.
pub trait ErrorReporter: Send + Sync {
    /// Delivers one structured failure report.
    fn report(&self, report: &ErrorReport);
}

/// Default reporter: structured log records via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport) {
        tracing::error!(
            module = %report.module,
            operation = %report.operation,
            cause = %report.cause,
            recoverable = report.recoverable,
            "pipeline step failed"
        );
    }
}

/// In-memory reporter for tests and consumers that inspect failures.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl MemoryReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports received so far.
    #[must_use]
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, report: &ErrorReport) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
    }
}

type StepFn = Box<dyn Fn() -> Result<(), ComputationError> + Send + Sync>;

/// One unit of orchestrated work with a declared error policy.
pub struct PipelineStep {
    name: String,
    policy: ErrorPolicy,
    run: StepFn,
}

impl PipelineStep {
    /// Creates a step.
    pub fn new(
        name: impl Into<String>,
        policy: ErrorPolicy,
        run: impl Fn() -> Result<(), ComputationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            run: Box::new(run),
        }
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared error policy.
    #[must_use]
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// A named, ordered list of steps.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    steps: Vec<PipelineStep>,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    /// Creates a pipeline from its steps.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<PipelineStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            state: Mutex::new(PipelineState::Idle),
        }
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TerraResult<PipelineState> {
        self.state
            .lock()
            .map(|s| *s)
            .map_err(|_| TerraError::internal("poisoned lock: pipeline.state"))
    }

    /// Executes the pipeline's steps sequentially.
    ///
    /// Step failures are reported and absorbed per their policies; the only
    /// errors this function itself returns are `PipelineBusy` when a run is
    /// already in flight and internal lock failures.
    pub fn run(&self, reporter: &dyn ErrorReporter) -> TerraResult<PipelineRunReport> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TerraError::internal("poisoned lock: pipeline.run"))?;
            if *state == PipelineState::Running {
                return Err(TerraError::Execution(ExecutionError::PipelineBusy {
                    name: self.name.clone(),
                }));
            }
            *state = PipelineState::Running;
        }

        let started_at = Utc::now();
        let mut steps = Vec::with_capacity(self.steps.len());
        let mut aborted = false;

        for step in &self.steps {
            if aborted {
                steps.push(StepReport {
                    step: step.name.clone(),
                    status: StepStatus::NotRun,
                    error: None,
                });
                continue;
            }

            let report = match (step.run)() {
                Ok(()) => StepReport {
                    step: step.name.clone(),
                    status: StepStatus::Succeeded,
                    error: None,
                },
                Err(first) => match step.policy {
                    ErrorPolicy::Skip => {
                        reporter.report(&ErrorReport::from(&first));
                        StepReport {
                            step: step.name.clone(),
                            status: StepStatus::FailedSkipped,
                            error: Some(first),
                        }
                    }
                    ErrorPolicy::Abort => {
                        reporter.report(&ErrorReport::from(&first));
                        aborted = true;
                        StepReport {
                            step: step.name.clone(),
                            status: StepStatus::FailedAborted,
                            error: Some(first),
                        }
                    }
                    ErrorPolicy::RetryOnce => match (step.run)() {
                        Ok(()) => StepReport {
                            step: step.name.clone(),
                            status: StepStatus::Retried,
                            error: None,
                        },
                        Err(second) => {
                            reporter.report(&ErrorReport::from(&second));
                            aborted = true;
                            StepReport {
                                step: step.name.clone(),
                                status: StepStatus::FailedAborted,
                                error: Some(second),
                            }
                        }
                    },
                },
            };
            steps.push(report);
        }

        let outcome = if aborted {
            PipelineOutcome::Failed
        } else {
            PipelineOutcome::Succeeded
        };

        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TerraError::internal("poisoned lock: pipeline.run"))?;
            *state = match outcome {
                PipelineOutcome::Succeeded => PipelineState::Succeeded,
                PipelineOutcome::Failed => PipelineState::Failed,
            };
        }

        Ok(PipelineRunReport {
            pipeline: self.name.clone(),
            outcome,
            steps,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
