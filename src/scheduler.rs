//! Drives the pass sequence over a double-buffered pair.
//!
//! | State              | reset     | run_batch / begin_animated | advance     |
//! |--------------------|-----------|----------------------------|-------------|
//! | `Idle`             | → `Idle`  | runs                       | no-op       |
//! | `RunningSync`      | rejected  | rejected                   | no-op       |
//! | `RunningAnimated`  | rejected  | rejected                   | one pass    |
//! | `Complete`         | → `Idle`  | runs again                 | no-op       |
//!
//! Any backend failure drops the buffer pair and returns to `Idle`; the next
//! run then fails with [`SortError::NotInitialized`] until a reset.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::backend::{ComputeBackend, Kernel};
use crate::buffers::BufferPair;
use crate::error::SortError;
use crate::grid::{GridSize, PassDescriptor};
use crate::init::Seed;
use crate::present::{Frame, PresentationSink};

pub const DEFAULT_ANIMATION_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RunningSync,
    /// `next` is the pass the following [`SortScheduler::advance`] executes.
    RunningAnimated { next: PassDescriptor },
    Complete,
}

impl RunState {
    pub fn is_running(self) -> bool {
        matches!(self, RunState::RunningSync | RunState::RunningAnimated { .. })
    }

    pub fn phase(self) -> Phase {
        match self {
            RunState::Idle => Phase::Idle,
            RunState::RunningSync | RunState::RunningAnimated { .. } => Phase::Running,
            RunState::Complete => Phase::Complete,
        }
    }
}

/// Coarse state for callers gating their own requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRequest {
    Accepted,
    /// A run is in progress; nothing changed.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced(PassDescriptor),
    /// The last pass of the network ran; the state is now `Complete`.
    Finished(PassDescriptor),
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub elapsed: Duration,
    pub passes: u64,
}

/// Fixed-interval tick source for animated runs. Holds no reference to the
/// scheduler; the driver asks it whether a tick is due.
#[derive(Debug, Clone, Copy)]
pub struct Animation {
    interval: Duration,
    due: Instant,
}

impl Animation {
    /// The first tick is due at `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            due: start,
        }
    }

    /// True if a tick is due at `now`; schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.due {
            return false;
        }
        self.due = now + self.interval;
        true
    }

    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.due.saturating_duration_since(now)
    }
}

pub struct SortScheduler<B: ComputeBackend, S: PresentationSink> {
    backend: B,
    sink: S,
    grid: Option<GridSize>,
    buffers: Option<BufferPair<B::Buffer>>,
    state: RunState,
    draw_calls: u64,
    elapsed: Duration,
}

impl<B: ComputeBackend, S: PresentationSink> SortScheduler<B, S> {
    pub fn new(backend: B, sink: S) -> Self {
        Self {
            backend,
            sink,
            grid: None,
            buffers: None,
            state: RunState::Idle,
            draw_calls: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn grid(&self) -> Option<GridSize> {
        self.grid
    }

    /// Passes executed since the last reset.
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Time spent executing passes since the last reset.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Reads back the current front buffer.
    pub fn snapshot(&mut self) -> Result<Vec<f32>, SortError> {
        let buffers = self.buffers.as_ref().ok_or(SortError::NotInitialized)?;
        Ok(self.backend.read_buffer(buffers.front())?)
    }

    /// Allocates a fresh buffer pair of `4^size_exponent` elements, fills it
    /// from `seed` and presents it.
    pub fn reset(&mut self, size_exponent: i64, seed: Seed) -> Result<RunRequest, SortError> {
        if self.state.is_running() {
            log::info!("reset ignored: a run is in progress");
            return Ok(RunRequest::Rejected);
        }
        let grid = GridSize::from_exponent(size_exponent, self.backend.max_size_exponent())?;

        self.buffers = None;
        self.grid = Some(grid);
        self.state = RunState::Idle;
        self.draw_calls = 0;
        self.elapsed = Duration::ZERO;
        log::info!(
            "reset: {}x{} grid, {} elements, {} passes, seed {:?}",
            grid.side(),
            grid.side(),
            grid.element_count(),
            grid.total_passes(),
            seed.0
        );

        match self.initialize(grid, seed) {
            Ok(()) => Ok(RunRequest::Accepted),
            Err(err) => Err(self.abandon(err)),
        }
    }

    fn initialize(&mut self, grid: GridSize, seed: Seed) -> Result<(), SortError> {
        let front = self.backend.allocate_buffer(grid.element_count())?;
        let back = self.backend.allocate_buffer(grid.element_count())?;
        let mut pair = BufferPair::new(front, back);
        {
            let (read, write) = pair.split();
            self.backend
                .run_parallel_pass(Kernel::Initialize { seed }, read, write, grid)?;
        }
        pair.swap();
        self.buffers = Some(pair);
        self.present(None)
    }

    /// Starts a run that executes one pass per [`advance`](Self::advance).
    pub fn begin_animated(&mut self) -> Result<RunRequest, SortError> {
        if self.state.is_running() {
            log::info!("animated run ignored: a run is in progress");
            return Ok(RunRequest::Rejected);
        }
        let grid = self.ready_grid()?;
        self.state = match grid.first_pass() {
            Some(next) => RunState::RunningAnimated { next },
            None => RunState::Complete,
        };
        log::info!("animated run started: {} passes", grid.total_passes());
        Ok(RunRequest::Accepted)
    }

    /// Executes the pending pass of an animated run, swaps and presents.
    pub fn advance(&mut self) -> Result<StepOutcome, SortError> {
        let RunState::RunningAnimated { next: pass } = self.state else {
            return Ok(StepOutcome::NotRunning);
        };
        let grid = self.ready_grid()?;

        let started = Instant::now();
        if let Err(err) = self.execute_pass(grid, pass) {
            return Err(self.abandon(err));
        }
        self.elapsed += started.elapsed();
        if let Err(err) = self.present(Some(pass)) {
            return Err(self.abandon(err));
        }

        Ok(match pass.next(grid.size_n()) {
            Some(next) => {
                self.state = RunState::RunningAnimated { next };
                StepOutcome::Advanced(pass)
            }
            None => {
                self.state = RunState::Complete;
                log::info!("animated run complete after {} passes", self.draw_calls);
                StepOutcome::Finished(pass)
            }
        })
    }

    /// Runs the whole network one pass per `interval`, presenting after each.
    pub fn run_animated(&mut self, interval: Duration) -> Result<RunRequest, SortError> {
        if self.begin_animated()? == RunRequest::Rejected {
            return Ok(RunRequest::Rejected);
        }
        let mut animation = Animation::new(interval, Instant::now());
        while self.state.is_running() {
            let now = Instant::now();
            if animation.poll(now) {
                self.advance()?;
            } else {
                std::thread::sleep(animation.time_until_due(now));
            }
        }
        Ok(RunRequest::Accepted)
    }

    /// Runs the whole network back to back and presents only the result.
    /// Returns `None` if a run is already in progress.
    pub fn run_batch(&mut self) -> Result<Option<BatchReport>, SortError> {
        if self.state.is_running() {
            log::info!("batch run ignored: a run is in progress");
            return Ok(None);
        }
        let grid = self.ready_grid()?;
        self.state = RunState::RunningSync;

        let started = Instant::now();
        let mut passes = 0u64;
        for pass in grid.passes() {
            if let Err(err) = self.execute_pass(grid, pass) {
                return Err(self.abandon(err));
            }
            passes += 1;
        }
        if let Err(err) = self.backend.finish() {
            return Err(self.abandon(err.into()));
        }
        let elapsed = started.elapsed();
        self.elapsed += elapsed;

        self.state = RunState::Complete;
        log::info!(
            "batch run: {passes} passes in {:.6} s on {}",
            elapsed.as_secs_f64(),
            self.backend.name()
        );
        if let Err(err) = self.present(None) {
            return Err(self.abandon(err));
        }
        Ok(Some(BatchReport { elapsed, passes }))
    }

    fn ready_grid(&self) -> Result<GridSize, SortError> {
        match (self.grid, &self.buffers) {
            (Some(grid), Some(_)) => Ok(grid),
            _ => Err(SortError::NotInitialized),
        }
    }

    fn execute_pass(&mut self, grid: GridSize, pass: PassDescriptor) -> Result<(), SortError> {
        let buffers = self.buffers.as_mut().ok_or(SortError::NotInitialized)?;
        let (read, write) = buffers.split();
        self.backend
            .run_parallel_pass(Kernel::CompareExchange(pass), read, write, grid)?;
        buffers.swap();
        self.draw_calls += 1;
        log::debug!(
            "pass ({}, {}) distance {}",
            pass.block_step(),
            pass.sub_block_step(),
            pass.distance()
        );
        Ok(())
    }

    fn present(&mut self, pass: Option<PassDescriptor>) -> Result<(), SortError> {
        let grid = self.grid.ok_or(SortError::NotInitialized)?;
        let values = self.snapshot()?;
        self.sink.present(&Frame {
            grid,
            pass,
            draw_calls: self.draw_calls,
            values: &values,
        })
    }

    /// Ends the current run after a failure. Backend failures also discard
    /// the buffers, whose contents can no longer be trusted.
    fn abandon(&mut self, err: SortError) -> SortError {
        log::error!("run abandoned: {err}");
        if matches!(err, SortError::Backend(_)) {
            self.buffers = None;
        }
        self.state = RunState::Idle;
        err
    }
}
