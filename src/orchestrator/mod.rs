//! Pipeline orchestration.
//!
//! The orchestrator coordinates the flow from upstream changes (entity and
//! grid mutation) to downstream metric recomputation: dependency-ordered
//! component bootstrap, named pipelines with per-step error policies, and
//! on-demand / periodic / reactive-debounced triggering.

pub mod bootstrap;
pub mod pipeline;
pub mod scheduler;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use crate::error::{ComputationError, ExecutionError, TerraError, TerraResult};

pub use bootstrap::ComponentRegistry;
pub use pipeline::{
    ErrorPolicy, ErrorReport, ErrorReporter, MemoryReporter, Pipeline, PipelineOutcome,
    PipelineRunReport, PipelineState, PipelineStep, StepReport, StepStatus, TracingReporter,
};
pub use scheduler::{ScheduleHandle, SchedulerConfig};

use scheduler::Scheduler;

fn lock_err(context: &'static str) -> TerraError {
    TerraError::internal(format!("poisoned lock: {context}"))
}

/// Shared pipeline registry used by direct calls and the scheduler worker.
pub(crate) struct PipelineSet {
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl std::fmt::Debug for PipelineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .pipelines
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("PipelineSet")
            .field("pipelines", &names)
            .finish_non_exhaustive()
    }
}

impl PipelineSet {
    fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            reporter,
        }
    }

    fn register(&self, pipeline: Pipeline) -> TerraResult<()> {
        let mut pipelines = self
            .pipelines
            .write()
            .map_err(|_| lock_err("orchestrator.register_pipeline"))?;
        pipelines.insert(pipeline.name().to_string(), Arc::new(pipeline));
        Ok(())
    }

    fn get(&self, name: &str) -> TerraResult<Arc<Pipeline>> {
        let pipelines = self
            .pipelines
            .read()
            .map_err(|_| lock_err("orchestrator.get_pipeline"))?;
        pipelines.get(name).cloned().ok_or_else(|| {
            TerraError::Execution(ExecutionError::PipelineNotFound {
                name: name.to_string(),
            })
        })
    }

    /// Runs a pipeline without holding the registry lock, so independent
    /// pipelines can run concurrently; the per-pipeline state lock rejects
    /// overlapping runs of the same pipeline.
    pub(crate) fn run(&self, name: &str) -> TerraResult<PipelineRunReport> {
        let pipeline = self.get(name)?;
        pipeline.run(self.reporter.as_ref())
    }
}

/// Coordinates bootstrap, pipelines, and triggering.
///
/// All collaborators are injected at construction; multiple independent
/// orchestrators (one per test, one per document) never share state.
#[derive(Debug)]
pub struct Orchestrator {
    pipelines: Arc<PipelineSet>,
    components: Mutex<ComponentRegistry>,
    scheduler: Scheduler,
}

impl Orchestrator {
    /// Creates an orchestrator reporting failures via `tracing`.
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_reporter(config, Arc::new(TracingReporter))
    }

    /// Creates an orchestrator with an injected error reporter.
    #[must_use]
    pub fn with_reporter(config: &SchedulerConfig, reporter: Arc<dyn ErrorReporter>) -> Self {
        let pipelines = Arc::new(PipelineSet::new(reporter));
        let scheduler = Scheduler::new(config, Arc::clone(&pipelines));
        Self {
            pipelines,
            components: Mutex::new(ComponentRegistry::new()),
            scheduler,
        }
    }

    /// Registers (or replaces) a named pipeline.
    pub fn register_pipeline(&self, pipeline: Pipeline) -> TerraResult<()> {
        self.pipelines.register(pipeline)
    }

    /// Runs a pipeline now, on the caller's thread.
    pub fn run_pipeline(&self, name: &str) -> TerraResult<PipelineRunReport> {
        self.pipelines.run(name)
    }

    /// Current lifecycle state of a pipeline.
    pub fn pipeline_state(&self, name: &str) -> TerraResult<PipelineState> {
        self.pipelines.get(name)?.state()
    }

    /// Registers a bootstrap component with its dependencies.
    pub fn register_component(
        &self,
        name: impl Into<String>,
        dependencies: Vec<String>,
        init: impl Fn() -> Result<(), ComputationError> + Send + Sync + 'static,
    ) -> TerraResult<()> {
        let mut components = self
            .components
            .lock()
            .map_err(|_| lock_err("orchestrator.register_component"))?;
        components.register(name, dependencies, init);
        Ok(())
    }

    /// Computes the bootstrap rounds without executing them.
    pub fn bootstrap_rounds(&self) -> TerraResult<Vec<Vec<String>>> {
        let components = self
            .components
            .lock()
            .map_err(|_| lock_err("orchestrator.bootstrap_rounds"))?;
        components.rounds().map_err(TerraError::Configuration)
    }

    /// Initializes all registered components in dependency order.
    pub fn bootstrap(&self) -> TerraResult<Vec<Vec<String>>> {
        let components = self
            .components
            .lock()
            .map_err(|_| lock_err("orchestrator.bootstrap"))?;
        components.bootstrap()
    }

    /// Schedules a pipeline on a period; returns a cancellation handle.
    ///
    /// The pipeline must already be registered: scheduling work that could
    /// never run is refused up front.
    pub fn schedule_periodic(
        &self,
        pipeline: &str,
        interval: StdDuration,
    ) -> TerraResult<ScheduleHandle> {
        self.pipelines.get(pipeline)?;
        self.scheduler
            .schedule_periodic(pipeline.to_string(), interval)
    }

    /// Cancels a periodic schedule. An in-flight run completes; only
    /// future firings stop.
    pub fn cancel_schedule(&self, handle: ScheduleHandle) -> TerraResult<()> {
        self.scheduler.cancel(handle)
    }

    /// Subscribes a pipeline to a state key's change notifications.
    pub fn watch(&self, state_key: &str, pipeline: &str) -> TerraResult<()> {
        self.pipelines.get(pipeline)?;
        self.scheduler
            .watch(state_key.to_string(), pipeline.to_string())
    }

    /// Signals that a watched piece of state changed.
    ///
    /// Non-blocking: bursts coalesce through the debounce window, and a
    /// full queue drops (and counts) rather than stalling the caller.
    pub fn notify_changed(&self, state_key: &str) {
        self.scheduler.notify_changed(state_key);
    }

    /// Notifications dropped due to a full queue.
    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.scheduler.dropped_notifications()
    }

    /// The configured reactive debounce interval.
    #[must_use]
    pub fn debounce(&self) -> StdDuration {
        self.scheduler.debounce()
    }
}
