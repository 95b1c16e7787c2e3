//! Scheduler worker: periodic and reactive pipeline triggering.
//!
//! The scheduler owns a dedicated worker thread fed by bounded channels.
//! Change notifications are enqueued non-blocking and never stall the
//! caller; a full queue drops the notification and counts it. Reactive
//! triggers are debounced: a burst of notifications for one state key
//! coalesces into a single pipeline run once the configured quiet interval
//! has elapsed since the first notification.
//!
//! Cancellation affects future scheduling only; an in-flight pipeline run
//! completes, so the metric store is never abandoned mid-batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, ExecutionError, TerraError, TerraResult};

use super::PipelineSet;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Quiet interval applied to reactive triggers.
    pub debounce: StdDuration,
    /// Worker wake-up interval when no messages arrive.
    pub tick: StdDuration,
    /// Max queued control messages (schedule/cancel/watch).
    pub control_queue_capacity: usize,
    /// Max queued change notifications before drops apply.
    pub notify_queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: StdDuration::from_millis(250),
            tick: StdDuration::from_millis(20),
            control_queue_capacity: 1024,
            notify_queue_capacity: 4096,
        }
    }
}

/// Cancellation handle for a periodic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleHandle(Uuid);

impl ScheduleHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug)]
enum ControlMsg {
    SchedulePeriodic {
        handle: ScheduleHandle,
        pipeline: String,
        interval: StdDuration,
    },
    Cancel {
        handle: ScheduleHandle,
    },
    Watch {
        state_key: String,
        pipeline: String,
    },
}

#[derive(Debug)]
struct NotifyMsg {
    state_key: String,
}

/// Periodic/reactive trigger worker.
#[derive(Debug)]
pub(crate) struct Scheduler {
    debounce: StdDuration,
    control_tx: Sender<ControlMsg>,
    notify_tx: Sender<NotifyMsg>,
    control_capacity: usize,
    dropped_notifications: AtomicU64,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub(crate) fn new(cfg: &SchedulerConfig, pipelines: Arc<PipelineSet>) -> Self {
        let control_capacity = cfg.control_queue_capacity.max(1);
        let notify_capacity = cfg.notify_queue_capacity.max(1);

        let (control_tx, control_rx) = bounded::<ControlMsg>(control_capacity);
        let (notify_tx, notify_rx) = bounded::<NotifyMsg>(notify_capacity);

        let debounce = cfg.debounce;
        let tick = cfg.tick.max(StdDuration::from_millis(1));
        let join = thread::Builder::new()
            .name("terrastat-scheduler".to_string())
            .spawn(move || worker_loop(debounce, tick, &pipelines, &control_rx, &notify_rx))
            .expect("failed to spawn terrastat scheduler worker");

        Self {
            debounce: cfg.debounce,
            control_tx,
            notify_tx,
            control_capacity,
            dropped_notifications: AtomicU64::new(0),
            join: Mutex::new(Some(join)),
        }
    }

    /// The configured debounce interval.
    pub(crate) fn debounce(&self) -> StdDuration {
        self.debounce
    }

    fn submit(&self, msg: ControlMsg) -> TerraResult<()> {
        match self.control_tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TerraError::Execution(ExecutionError::QueueFull {
                queue: "scheduler_control".to_string(),
                capacity: self.control_capacity,
            })),
            Err(TrySendError::Disconnected(_)) => {
                Err(TerraError::Execution(ExecutionError::Disconnected {
                    queue: "scheduler_control".to_string(),
                }))
            }
        }
    }

    pub(crate) fn schedule_periodic(
        &self,
        pipeline: String,
        interval: StdDuration,
    ) -> TerraResult<ScheduleHandle> {
        if interval.is_zero() {
            return Err(TerraError::Configuration(
                ConfigurationError::NonPositiveInterval,
            ));
        }
        let handle = ScheduleHandle::new();
        self.submit(ControlMsg::SchedulePeriodic {
            handle,
            pipeline,
            interval,
        })?;
        Ok(handle)
    }

    pub(crate) fn cancel(&self, handle: ScheduleHandle) -> TerraResult<()> {
        self.submit(ControlMsg::Cancel { handle })
    }

    pub(crate) fn watch(&self, state_key: String, pipeline: String) -> TerraResult<()> {
        self.submit(ControlMsg::Watch {
            state_key,
            pipeline,
        })
    }

    /// Non-blocking change notification. A full queue drops and counts.
    pub(crate) fn notify_changed(&self, state_key: &str) {
        let msg = NotifyMsg {
            state_key: state_key.to_string(),
        };
        match self.notify_tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Close both channels so the worker can terminate, then detach.
        // Joining here could deadlock if a caller still holds a sender
        // clone; the worker exits once the last sender is gone.
        let (dummy_control, _) = bounded::<ControlMsg>(1);
        drop(std::mem::replace(&mut self.control_tx, dummy_control));
        let (dummy_notify, _) = bounded::<NotifyMsg>(1);
        drop(std::mem::replace(&mut self.notify_tx, dummy_notify));

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                drop(handle);
            }
        }
    }
}

#[derive(Debug)]
struct PeriodicEntry {
    pipeline: String,
    interval: StdDuration,
    next_due: Instant,
}

fn run_pipeline(pipelines: &PipelineSet, name: &str) {
    match pipelines.run(name) {
        Ok(report) => {
            tracing::trace!(pipeline = name, outcome = ?report.outcome, "scheduled run finished");
        }
        Err(err) => {
            // Busy or unknown pipelines are a scheduling miss, not a crash.
            tracing::warn!(pipeline = name, error = %err, "scheduled run not executed");
        }
    }
}

fn worker_loop(
    debounce: StdDuration,
    tick: StdDuration,
    pipelines: &PipelineSet,
    control_rx: &Receiver<ControlMsg>,
    notify_rx: &Receiver<NotifyMsg>,
) {
    let mut periodic: HashMap<ScheduleHandle, PeriodicEntry> = HashMap::new();
    let mut watches: HashMap<String, Vec<String>> = HashMap::new();
    let mut pending: HashMap<String, Instant> = HashMap::new();

    let mut control_closed = false;
    let mut notify_closed = false;

    loop {
        select! {
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMsg::SchedulePeriodic { handle, pipeline, interval }) => {
                        periodic.insert(handle, PeriodicEntry {
                            pipeline,
                            interval,
                            next_due: Instant::now() + interval,
                        });
                    }
                    Ok(ControlMsg::Cancel { handle }) => {
                        periodic.remove(&handle);
                    }
                    Ok(ControlMsg::Watch { state_key, pipeline }) => {
                        let entry = watches.entry(state_key).or_default();
                        if !entry.contains(&pipeline) {
                            entry.push(pipeline);
                        }
                    }
                    Err(_) => {
                        control_closed = true;
                    }
                }
            }
            recv(notify_rx) -> msg => {
                match msg {
                    Ok(NotifyMsg { state_key }) => {
                        // Keep the earliest deadline: later notifications in
                        // the burst coalesce into the pending run.
                        pending
                            .entry(state_key)
                            .or_insert_with(|| Instant::now() + debounce);
                    }
                    Err(_) => {
                        notify_closed = true;
                    }
                }
            }
            default(tick) => {}
        }

        let now = Instant::now();

        for entry in periodic.values_mut() {
            if entry.next_due <= now {
                run_pipeline(pipelines, &entry.pipeline);
                entry.next_due = Instant::now() + entry.interval;
            }
        }

        let due: Vec<String> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            pending.remove(&key);
            if let Some(names) = watches.get(&key) {
                for name in names {
                    run_pipeline(pipelines, name);
                }
            }
        }

        if control_closed && notify_closed {
            break;
        }
    }
}
