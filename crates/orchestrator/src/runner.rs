//! Simulation runner with lifecycle management
//!
//! This module provides the `SimulationRunner` which steps a solver frame by
//! frame in a background thread, with start, pause, resume and stop control.
//! Diagnostics samples are handed over a channel to a recorder thread so
//! that writing them never stalls stepping.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tailings_kernel::{
    damping_coefficient, DiagnosticSample, FlowAccumulator, RenderPropertyBuffer, RenderSettings,
    SimulationKernel, SolverError,
};
use thiserror::Error;

use crate::export::{DiagnosticsCsv, ExportError};

/// Runner state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Simulation created but not yet started
    Created,
    /// Simulation actively running
    Running,
    /// Simulation paused
    Paused,
    /// Simulation finished (stopping condition or stop request)
    Finished,
    /// Simulation encountered an error
    Error,
}

/// Errors surfaced when joining a runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The simulation or recorder thread panicked.
    #[error("simulation thread panicked")]
    ThreadPanicked,
    /// Writing diagnostics failed.
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// What the frame loop does besides stepping.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Stop after this many frames; `None` runs until [`SimulationRunner::stop`].
    pub max_frames: Option<u64>,
    /// Frames between diagnostics samples.
    pub diagnostics_interval: u64,
    /// Flow grid cells per side; `None` disables flow accumulation.
    pub flow_resolution: Option<usize>,
    /// Render-record settings.
    pub render: RenderSettings,
    /// Stream diagnostics to this CSV file while running.
    pub diagnostics_csv: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_frames: None,
            diagnostics_interval: 30,
            flow_resolution: None,
            render: RenderSettings::default(),
            diagnostics_csv: None,
        }
    }
}

/// Final state of a run, returned by [`SimulationRunner::join`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Frames completed.
    pub frames: u64,
    /// Simulated time (seconds).
    pub sim_time: f64,
    /// Diagnostics time series.
    pub samples: Vec<DiagnosticSample>,
    /// Flow-extent snapshot, when flow accumulation was enabled.
    pub flow: Option<Vec<Option<f32>>>,
    /// Render records after the last frame.
    pub render: RenderPropertyBuffer,
    /// Bucket entries dropped over the run.
    pub dropped_entries: u64,
}

/// Shared state between the runner thread and control interface
struct SharedState {
    /// Current runner state
    state: RunnerState,
    /// Current simulation time (seconds)
    sim_time: f64,
    /// Number of frames executed
    frame_count: u64,
    /// Restitution to apply before the next frame
    pending_restitution: Option<f32>,
    /// Most recent error message (if state is Error)
    error_message: Option<String>,
}

type Shared = Arc<Mutex<SharedState>>;

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for controlling and querying a running simulation
pub struct SimulationRunner {
    /// Shared state (protected by mutex)
    shared: Shared,
    /// Handle to the background thread
    thread_handle: Option<thread::JoinHandle<Result<RunOutcome, RunnerError>>>,
}

impl SimulationRunner {
    /// Create a runner around `kernel`. The thread waits for [`start`](Self::start).
    pub fn new(mut kernel: Box<dyn SimulationKernel + Send>, settings: RunSettings) -> Self {
        let shared = Arc::new(Mutex::new(SharedState {
            state: RunnerState::Created,
            sim_time: 0.0,
            frame_count: 0,
            pending_restitution: None,
            error_message: None,
        }));

        let shared_clone = Arc::clone(&shared);

        // Spawn background thread
        let thread_handle = thread::spawn(move || {
            let result = run_simulation_loop(kernel.as_mut(), &shared_clone, &settings);
            if let Err(e) = &result {
                let mut guard = lock(&shared_clone);
                guard.state = RunnerState::Error;
                guard.error_message = Some(e.to_string());
            }
            result
        });

        Self {
            shared,
            thread_handle: Some(thread_handle),
        }
    }

    /// Get current runner state
    pub fn state(&self) -> RunnerState {
        lock(&self.shared).state
    }

    /// Get current simulation time (seconds)
    pub fn sim_time(&self) -> f64 {
        lock(&self.shared).sim_time
    }

    /// Get current frame count
    pub fn frame_count(&self) -> u64 {
        lock(&self.shared).frame_count
    }

    /// Get error message if state is Error
    pub fn error_message(&self) -> Option<String> {
        lock(&self.shared).error_message.clone()
    }

    /// Start the simulation (transition from Created to Running)
    pub fn start(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Created {
            state.state = RunnerState::Running;
        }
    }

    /// Pause the simulation
    pub fn pause(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Running {
            state.state = RunnerState::Paused;
        }
    }

    /// Resume the simulation
    pub fn resume(&self) {
        let mut state = lock(&self.shared);
        if state.state == RunnerState::Paused {
            state.state = RunnerState::Running;
        }
    }

    /// Ask the thread to finish after the current frame
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if matches!(state.state, RunnerState::Created | RunnerState::Running | RunnerState::Paused) {
            state.state = RunnerState::Finished;
        }
    }

    /// Change the contact restitution from the next frame on.
    ///
    /// The value is validated immediately; invalid values leave the run
    /// untouched.
    pub fn set_restitution(&self, restitution: f32) -> Result<(), SolverError> {
        damping_coefficient(restitution)?;
        lock(&self.shared).pending_restitution = Some(restitution);
        Ok(())
    }

    /// Wait for the simulation thread to complete
    pub fn join(mut self) -> Result<RunOutcome, RunnerError> {
        match self.thread_handle.take() {
            Some(handle) => handle.join().map_err(|_| RunnerError::ThreadPanicked)?,
            None => Err(RunnerError::ThreadPanicked),
        }
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        // Signal the thread to exit
        self.stop();
    }
}

/// Recorder thread body: collect samples, streaming them to CSV if asked.
fn record_diagnostics(
    rx: Receiver<DiagnosticSample>,
    csv_path: Option<PathBuf>,
) -> Result<Vec<DiagnosticSample>, ExportError> {
    let mut csv = csv_path.as_deref().map(DiagnosticsCsv::create).transpose()?;
    let mut samples = Vec::new();
    for sample in rx {
        if let (Some(writer), Some(path)) = (csv.as_mut(), csv_path.as_ref()) {
            writer
                .write_sample(&sample)
                .map_err(|source| ExportError::Io { path: path.clone(), source })?;
        }
        samples.push(sample);
    }
    if let (Some(writer), Some(path)) = (csv, csv_path) {
        writer.finish().map_err(|source| ExportError::Io { path, source })?;
    }
    Ok(samples)
}

/// Block until the runner leaves `Created`; `true` if it was started.
fn wait_for_start(shared: &Mutex<SharedState>) -> bool {
    loop {
        match lock(shared).state {
            RunnerState::Created => {}
            RunnerState::Running | RunnerState::Paused => return true,
            RunnerState::Finished | RunnerState::Error => return false,
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Main simulation loop executed in background thread
fn run_simulation_loop(
    kernel: &mut dyn SimulationKernel,
    shared: &Mutex<SharedState>,
    settings: &RunSettings,
) -> Result<RunOutcome, RunnerError> {
    let (tx, rx) = mpsc::channel();
    let csv_path = settings.diagnostics_csv.clone();
    let recorder = thread::spawn(move || record_diagnostics(rx, csv_path));

    let flow = settings.flow_resolution.map(FlowAccumulator::new);
    let mut render = RenderPropertyBuffer::with_capacity(kernel.particle_count() + kernel.walls().len());
    // Wall records never change; write them once
    kernel.write_render(&settings.render, &mut render, true);

    let interval = settings.diagnostics_interval.max(1);
    let start_wall_time = Instant::now();
    let mut dropped_entries = 0_u64;

    if wait_for_start(shared) {
        loop {
            let (current_state, pending) = {
                let mut guard = lock(shared);
                (guard.state, guard.pending_restitution.take())
            };

            match current_state {
                RunnerState::Running => {
                    if let Some(e) = pending {
                        if let Err(err) = kernel.set_restitution(e) {
                            tracing::warn!("Ignoring restitution {}: {}", e, err);
                        }
                    }

                    let report = kernel.step_frame();
                    dropped_entries += u64::from(report.bucket.dropped);

                    if let Some(flow) = &flow {
                        kernel.accumulate_flow(flow);
                    }
                    kernel.write_render(&settings.render, &mut render, false);

                    if report.frame % interval == 0 {
                        // A closed channel means the recorder failed; join reports it
                        let _ = tx.send(kernel.diagnostics());
                    }

                    {
                        let mut guard = lock(shared);
                        guard.sim_time = report.sim_time;
                        guard.frame_count = report.frame;
                    }

                    if let Some(max_frames) = settings.max_frames {
                        if report.frame >= max_frames {
                            tracing::info!("Simulation finished: reached max_frames = {}", max_frames);
                            lock(shared).state = RunnerState::Finished;
                            break;
                        }
                    }

                    if report.frame % 100 == 0 {
                        tracing::debug!(
                            "Frame {}: sim_time={:.4}s, wall_time={:.2}s",
                            report.frame,
                            report.sim_time,
                            start_wall_time.elapsed().as_secs_f64()
                        );
                    }
                }
                RunnerState::Paused => {
                    // Keep a pending restitution for when we resume
                    if pending.is_some() {
                        lock(shared).pending_restitution = pending;
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                RunnerState::Finished | RunnerState::Error | RunnerState::Created => break,
            }
        }
    }

    drop(tx);
    let samples = recorder.join().map_err(|_| RunnerError::ThreadPanicked)??;

    tracing::info!(
        "Simulation thread exiting: {} frames, {:.4}s simulated, {} samples",
        kernel.frame(),
        kernel.sim_time(),
        samples.len()
    );

    Ok(RunOutcome {
        frames: kernel.frame(),
        sim_time: kernel.sim_time(),
        samples,
        flow: flow.map(|f| f.snapshot()),
        render,
        dropped_entries,
    })
}
