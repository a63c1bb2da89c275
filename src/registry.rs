//! The pipeline registry and lifecycle manager.
//!
//! One registry instance owns the name-to-record map and the worker threads
//! that execute pipelines. Callers construct it explicitly and pass it around
//! (service layer, CLI, tests); there is no process-wide singleton. The map
//! lock covers bookkeeping only; builds and joins happen outside it so a
//! blocked pipeline never stalls operations on unrelated ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::engine::EngineProvider;
use crate::error::{Error, Result};
use crate::inference::AdapterFactory;
use crate::io::IoFactory;
use crate::pipeline::{build_pipeline, Pipeline};

/// Interval at which a paused worker re-checks its flags.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle state of one registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// No record under this name (or a record not yet started).
    #[default]
    NotCreated,
    Stopped,
    Running,
    Paused,
    /// A worker hit an unrecoverable failure. Terminal until the record is
    /// removed and recreated.
    Error,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::NotCreated => "not-created",
            PipelineState::Stopped => "stopped",
            PipelineState::Running => "running",
            PipelineState::Paused => "paused",
            PipelineState::Error => "error",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, PipelineState::Running | PipelineState::Paused)
    }

    /// Startable by `run_all`.
    pub fn is_startable(self) -> bool {
        matches!(self, PipelineState::NotCreated | PipelineState::Stopped)
    }

    pub fn can_transition_to(self, target: PipelineState) -> bool {
        use PipelineState::*;
        match (self, target) {
            (NotCreated, Stopped) | (NotCreated, Running) => true,
            (Stopped, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, Stopped) | (Paused, Stopped) => true,
            (Running, Error) | (Paused, Error) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags and state shared between a record and its worker thread. Lifecycle
/// operations never mutate a running pipeline directly; they signal through
/// here.
struct WorkerControl {
    cancel: AtomicBool,
    paused: AtomicBool,
    state: Mutex<PipelineState>,
}

impl WorkerControl {
    fn new() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Stopped),
        }
    }

    fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Apply `target` only if the state machine allows the transition.
    /// Returns whether it was applied; in particular, Error is terminal and
    /// refuses everything but itself.
    fn transition(&self, target: PipelineState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(target) {
            return false;
        }
        *state = target;
        true
    }
}

/// One registry slot.
struct PipelineRecord {
    config: PipelineConfig,
    /// The worker holds this lock for as long as it runs, making its
    /// exclusive ownership of the running pipeline explicit.
    pipeline: Arc<Mutex<Pipeline>>,
    control: Arc<WorkerControl>,
    /// Present iff the record has been started and not yet joined.
    worker: Option<JoinHandle<()>>,
}

/// Point-in-time copy of one record, safe to hand across thread boundaries.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub name: String,
    pub config: PipelineConfig,
    pub state: PipelineState,
    pub has_worker: bool,
}

pub struct PipelineRegistry {
    adapters: AdapterFactory,
    io: IoFactory,
    engines: EngineProvider,
    records: Mutex<HashMap<String, PipelineRecord>>,
}

impl PipelineRegistry {
    pub fn new(adapters: AdapterFactory, io: IoFactory, engines: EngineProvider) -> Self {
        Self {
            adapters,
            io,
            engines,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Build a pipeline from `config` and insert it under its name in state
    /// Stopped. Fails without touching the registry if a record with the
    /// same name is currently Running/Paused, or if the build fails; a
    /// stopped record under the same name is rebuilt in place.
    pub fn create_pipeline(&self, config: PipelineConfig) -> Result<PipelineSnapshot> {
        {
            let records = self.records.lock();
            if let Some(existing) = records.get(&config.name) {
                if existing.control.state().is_active() {
                    return Err(Error::DuplicateActive(config.name.clone()));
                }
            }
        }

        // Build outside the lock; construction only touches the engine cache.
        let pipeline = build_pipeline(&config, &self.adapters, &self.io, &self.engines)?;

        let mut records = self.records.lock();
        if let Some(existing) = records.get_mut(&config.name) {
            // Re-check: another caller may have started it while we built.
            if existing.control.state().is_active() {
                return Err(Error::DuplicateActive(config.name.clone()));
            }
            // An inactive record can still hold the handle of a worker in
            // its final instants (end of stream, error exit); reap it so the
            // old pipeline is fully released before the rebuild.
            if let Some(handle) = existing.worker.take() {
                join_handle(&config.name, handle);
            }
            existing.config = config.clone();
            existing.pipeline = Arc::new(Mutex::new(pipeline));
            existing.control = Arc::new(WorkerControl::new());
        } else {
            records.insert(
                config.name.clone(),
                PipelineRecord {
                    config: config.clone(),
                    pipeline: Arc::new(Mutex::new(pipeline)),
                    control: Arc::new(WorkerControl::new()),
                    worker: None,
                },
            );
        }
        info!(pipeline = %config.name, "pipeline created");
        Ok(snapshot_of(&config.name, &records[&config.name]))
    }

    /// Rebuild the named pipeline from a new configuration. An active record
    /// is stopped and joined first and left Stopped; callers restart it
    /// explicitly with `run_all`.
    pub fn update_pipeline(&self, name: &str, config: PipelineConfig) -> Result<PipelineSnapshot> {
        let stopped = {
            let mut records = self.records.lock();
            let record = records
                .get_mut(name)
                .ok_or_else(|| Error::UnknownPipeline(name.to_string()))?;
            record.control.cancel.store(true, Ordering::SeqCst);
            record.worker.take().map(|h| (h, record.control.clone()))
        };
        if let Some((handle, control)) = stopped {
            join_handle(name, handle);
            // Even if the rebuild below fails, the record is now honestly
            // Stopped: its worker is gone. A no-op for Error records.
            control.transition(PipelineState::Stopped);
        }

        let pipeline = build_pipeline(&config, &self.adapters, &self.io, &self.engines)?;

        let mut records = self.records.lock();
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::UnknownPipeline(name.to_string()))?;
        record.config = config;
        record.pipeline = Arc::new(Mutex::new(pipeline));
        record.control = Arc::new(WorkerControl::new());
        info!(pipeline = %name, "pipeline updated");
        Ok(snapshot_of(name, record))
    }

    /// Stop, join, and erase the named record. Unknown names are reported,
    /// never silently ignored.
    pub fn remove_pipeline(&self, name: &str) -> Result<()> {
        let mut record = {
            let mut records = self.records.lock();
            records
                .remove(name)
                .ok_or_else(|| Error::UnknownPipeline(name.to_string()))?
        };
        // The record is out of the map, so nobody else can reach it; join
        // before the pipeline is dropped.
        record.control.cancel.store(true, Ordering::SeqCst);
        if let Some(handle) = record.worker.take() {
            join_handle(name, handle);
        }
        info!(pipeline = %name, "pipeline removed");
        Ok(())
    }

    /// Spawn one worker thread for every startable record. Records already
    /// Running/Paused (and Error records) are untouched.
    pub fn run_all(&self) {
        let mut records = self.records.lock();
        for (name, record) in records.iter_mut() {
            // Reap a worker that already exited on its own (end of stream)
            // so its record is restartable. The join is immediate.
            if record.worker.as_ref().is_some_and(|w| w.is_finished()) {
                if let Some(handle) = record.worker.take() {
                    join_handle(name, handle);
                }
            }
            if !record.control.state().is_startable() || record.worker.is_some() {
                continue;
            }
            record.control.cancel.store(false, Ordering::SeqCst);
            record.control.paused.store(false, Ordering::SeqCst);
            record.control.transition(PipelineState::Running);

            let pipeline = record.pipeline.clone();
            let control = record.control.clone();
            let thread_name = format!("pipeline-{name}");
            let worker_name = name.clone();
            match thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker_loop(worker_name, pipeline, control))
            {
                Ok(handle) => record.worker = Some(handle),
                Err(err) => {
                    error!(pipeline = %name, error = %err, "failed to spawn worker");
                    record.control.transition(PipelineState::Error);
                }
            }
        }
    }

    /// Request cooperative cancellation of every active worker. Returns
    /// immediately; pair with `join_all` to wait for exits.
    pub fn stop_all(&self) {
        let records = self.records.lock();
        for record in records.values() {
            if record.worker.is_some() {
                record.control.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Join every worker that was asked to stop or has already exited on its
    /// own. Joined records transition to Stopped (Error stays Error).
    pub fn join_all(&self) {
        let joinable: Vec<(String, JoinHandle<()>, Arc<WorkerControl>)> = {
            let mut records = self.records.lock();
            records
                .iter_mut()
                .filter_map(|(name, record)| {
                    let reap = record.control.cancel.load(Ordering::SeqCst)
                        || record.worker.as_ref().is_some_and(|w| w.is_finished());
                    if !reap {
                        return None;
                    }
                    record
                        .worker
                        .take()
                        .map(|handle| (name.clone(), handle, record.control.clone()))
                })
                .collect()
        };

        for (name, handle, control) in joinable {
            join_handle(&name, handle);
            // A no-op for Error records; they stay Error until removed.
            control.transition(PipelineState::Stopped);
            control.paused.store(false, Ordering::SeqCst);
            control.cancel.store(false, Ordering::SeqCst);
        }
    }

    /// Suspend the named pipeline's pull loop without exiting its thread.
    pub fn pause_pipeline(&self, name: &str) -> Result<()> {
        let records = self.records.lock();
        let record = records
            .get(name)
            .ok_or_else(|| Error::UnknownPipeline(name.to_string()))?;
        let mut state = record.control.state.lock();
        if *state != PipelineState::Running {
            return Err(Error::InvalidTransition {
                pipeline: name.to_string(),
                from: state.as_str(),
                to: PipelineState::Paused.as_str(),
            });
        }
        record.control.paused.store(true, Ordering::SeqCst);
        *state = PipelineState::Paused;
        info!(pipeline = %name, "pipeline paused");
        Ok(())
    }

    pub fn resume_pipeline(&self, name: &str) -> Result<()> {
        let records = self.records.lock();
        let record = records
            .get(name)
            .ok_or_else(|| Error::UnknownPipeline(name.to_string()))?;
        let mut state = record.control.state.lock();
        if *state != PipelineState::Paused {
            return Err(Error::InvalidTransition {
                pipeline: name.to_string(),
                from: state.as_str(),
                to: PipelineState::Running.as_str(),
            });
        }
        record.control.paused.store(false, Ordering::SeqCst);
        *state = PipelineState::Running;
        info!(pipeline = %name, "pipeline resumed");
        Ok(())
    }

    /// Point-in-time copy of the registry, taken under the lock so callers
    /// never observe a partially-updated map. External access is
    /// snapshot-only; mutation goes through the lifecycle operations.
    pub fn pipelines(&self) -> HashMap<String, PipelineSnapshot> {
        let records = self.records.lock();
        records
            .iter()
            .map(|(name, record)| (name.clone(), snapshot_of(name, record)))
            .collect()
    }

    /// State of the named record; `NotCreated` when no record exists.
    pub fn state_of(&self, name: &str) -> PipelineState {
        let records = self.records.lock();
        records
            .get(name)
            .map(|record| record.control.state())
            .unwrap_or_default()
    }

    /// Number of records currently holding a worker-thread handle.
    pub fn worker_count(&self) -> usize {
        let records = self.records.lock();
        records.values().filter(|r| r.worker.is_some()).count()
    }
}

impl Drop for PipelineRegistry {
    fn drop(&mut self) {
        // Workers borrow nothing from the registry, but leaving them running
        // past the registry's lifetime would leak threads.
        let records = self.records.get_mut();
        for record in records.values() {
            record.control.cancel.store(true, Ordering::SeqCst);
        }
        for (name, record) in records.iter_mut() {
            if let Some(handle) = record.worker.take() {
                join_handle(name, handle);
            }
        }
    }
}

fn snapshot_of(name: &str, record: &PipelineRecord) -> PipelineSnapshot {
    PipelineSnapshot {
        name: name.to_string(),
        config: record.config.clone(),
        state: record.control.state(),
        has_worker: record.worker.is_some(),
    }
}

fn join_handle(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!(pipeline = %name, "worker thread panicked");
    }
}

/// Main loop of one pipeline's worker thread: pull, infer, deliver, check
/// flags between units. Cancellation is cooperative: the flag is observed
/// between work units, never mid-unit.
fn worker_loop(name: String, pipeline: Arc<Mutex<Pipeline>>, control: Arc<WorkerControl>) {
    let mut pipeline = pipeline.lock();
    info!(pipeline = %name, "worker started");
    loop {
        if control.cancel.load(Ordering::SeqCst) {
            info!(pipeline = %name, "worker cancelled");
            break;
        }
        if control.paused.load(Ordering::SeqCst) {
            thread::sleep(PAUSE_POLL_INTERVAL);
            continue;
        }
        match pipeline.process_next() {
            Ok(true) => {}
            Ok(false) => {
                info!(pipeline = %name, "all sources ended, worker exiting");
                // Mark the exit immediately so the record never reports
                // Running with a dead thread; the handle itself is reaped
                // by `join_all` or the next rebuild.
                control.transition(PipelineState::Stopped);
                break;
            }
            Err(err) => {
                error!(pipeline = %name, error = %err, "worker failed");
                control.transition(PipelineState::Error);
                break;
            }
        }
    }
}
