//! Fixed-interval task sampler
//!
//! A [`Sampler`] owns one task's probe (detector + media stream) and advances
//! it one tick at a time. It is a pure state machine: the caller supplies the
//! elapsed time of every tick, so the same sampler runs under the tokio timer
//! in [`crate::driver`] and under synthetic time in replays and tests.
//!
//! Within a tick the probe measures first and progress is published after, so
//! a published status always reflects the measurement of that tick. Finalize
//! runs at most once per sampler, on completion, early stop, interruption or
//! cancellation, and always releases the stream before building metrics.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Duration;

use crate::error::AssessmentError;
use crate::types::{Completion, Phase, TaskSummary};

/// Tick interval and number of ticks for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval_ms: u64,
    total_steps: u32,
}

impl Schedule {
    /// Build a schedule covering `duration_ms` with ticks every `interval_ms`
    pub fn new(interval_ms: u64, duration_ms: u64) -> Self {
        let interval_ms = interval_ms.max(1);
        let steps = duration_ms.div_ceil(interval_ms).clamp(1, u32::MAX as u64);
        Self {
            interval_ms,
            total_steps: steps as u32,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// Full task duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.interval_ms * self.total_steps as u64
    }

    /// Progress percentage after `step` ticks, clamped to `[0, 100]`
    pub fn progress(&self, step: u32) -> f64 {
        (step as f64 / self.total_steps as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Context handed to a probe on every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub step: u32,
    pub elapsed_ms: u64,
    /// Percentage in `[0, 100]`
    pub progress: f64,
}

impl Tick {
    /// Normalized progress in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        self.progress / 100.0
    }
}

/// Per-task measurement plugged into a [`Sampler`]
pub trait Probe {
    /// Snapshot published after each tick
    type Status;
    /// Finalized metrics
    type Output;

    /// Take one measurement. An error ends the task as interrupted.
    fn measure(&mut self, tick: &Tick) -> Result<(), AssessmentError>;

    fn status(&self, tick: &Tick) -> Self::Status;

    /// Stop the underlying media tracks. Must be idempotent.
    fn release(&mut self);

    /// Build the metrics record; called once, after `release`.
    fn finish(&mut self, summary: &TaskSummary) -> Self::Output;
}

/// Published after every tick that did not end the task
#[derive(Debug, Clone, PartialEq)]
pub struct Progress<S> {
    pub step: u32,
    pub total_steps: u32,
    pub progress: f64,
    pub remaining_ms: u64,
    pub status: S,
}

/// A finalized task: bookkeeping plus the probe's metrics
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedTask<O> {
    pub summary: TaskSummary,
    pub metrics: O,
}

/// Result of advancing a sampler by one tick
#[derive(Debug)]
pub enum TickOutcome<S, O> {
    Running(Progress<S>),
    Finished(FinishedTask<O>),
    /// The sampler was already finalized; nothing was measured
    Idle,
}

/// Tick loop state for one task instance
pub struct Sampler<P: Probe> {
    phase: Phase,
    schedule: Schedule,
    probe: P,
    step: u32,
    measured: u32,
    started_at: DateTime<Utc>,
    finalized: bool,
}

impl<P: Probe> Sampler<P> {
    /// Start a task around an already-acquired probe
    pub fn start(phase: Phase, schedule: Schedule, probe: P) -> Self {
        info!(
            "{} task started: {} ticks every {}ms",
            phase.as_str(),
            schedule.total_steps(),
            schedule.interval_ms()
        );
        Self {
            phase,
            schedule,
            probe,
            step: 0,
            measured: 0,
            started_at: Utc::now(),
            finalized: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Advance one tick at `elapsed_ms` since task start
    pub fn tick(&mut self, elapsed_ms: u64) -> TickOutcome<P::Status, P::Output> {
        if self.finalized {
            return TickOutcome::Idle;
        }

        self.step += 1;
        let tick = Tick {
            step: self.step,
            elapsed_ms,
            progress: self.schedule.progress(self.step),
        };

        if let Err(e) = self.probe.measure(&tick) {
            warn!("{} task interrupted at tick {}: {}", self.phase.as_str(), tick.step, e);
            return match self.finalize(Completion::Interrupted, elapsed_ms, Some(e.to_string())) {
                Some(task) => TickOutcome::Finished(task),
                None => TickOutcome::Idle,
            };
        }
        self.measured += 1;

        if self.step >= self.schedule.total_steps() {
            let duration_ms = self.schedule.duration_ms();
            return match self.finalize(Completion::Completed, duration_ms, None) {
                Some(task) => TickOutcome::Finished(task),
                None => TickOutcome::Idle,
            };
        }

        TickOutcome::Running(Progress {
            step: self.step,
            total_steps: self.schedule.total_steps(),
            progress: tick.progress,
            remaining_ms: self.schedule.duration_ms().saturating_sub(elapsed_ms),
            status: self.probe.status(&tick),
        })
    }

    /// User-requested early stop. Returns `None` if the task already finalized.
    pub fn stop(&mut self, elapsed_ms: u64) -> Option<FinishedTask<P::Output>> {
        self.finalize(Completion::Stopped, elapsed_ms, None)
    }

    /// Teardown of the surrounding flow. Returns `None` if already finalized.
    pub fn cancel(&mut self, elapsed_ms: u64) -> Option<FinishedTask<P::Output>> {
        self.finalize(Completion::Cancelled, elapsed_ms, None)
    }

    /// Drive the task to its end with synthetic time `step * interval`
    pub fn run_to_end(mut self) -> Option<FinishedTask<P::Output>> {
        loop {
            let elapsed_ms = (self.step as u64 + 1) * self.schedule.interval_ms();
            match self.tick(elapsed_ms) {
                TickOutcome::Running(_) => continue,
                TickOutcome::Finished(task) => return Some(task),
                TickOutcome::Idle => return None,
            }
        }
    }

    fn finalize(
        &mut self,
        completion: Completion,
        elapsed_ms: u64,
        interruption: Option<String>,
    ) -> Option<FinishedTask<P::Output>> {
        if self.finalized {
            debug!("{} task already finalized, ignoring {:?}", self.phase.as_str(), completion);
            return None;
        }
        self.finalized = true;
        self.probe.release();

        let summary = TaskSummary {
            phase: self.phase,
            completion,
            started_at: self.started_at,
            ended_at: Utc::now(),
            duration_ms: elapsed_ms,
            ticks: self.measured,
            interruption,
        };
        let metrics = self.probe.finish(&summary);

        info!(
            "{} task finalized: {:?} after {}ms ({} ticks)",
            self.phase.as_str(),
            completion,
            summary.duration_ms,
            summary.ticks
        );

        Some(FinishedTask { summary, metrics })
    }
}

impl<P: Probe> Drop for Sampler<P> {
    fn drop(&mut self) {
        if !self.finalized {
            debug!("{} task dropped before finalize, releasing stream", self.phase.as_str());
            self.probe.release();
        }
    }
}
