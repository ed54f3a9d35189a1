//! Periodic timer driver
//!
//! Runs a [`Sampler`] on a tokio interval. A user stop request arrives over a
//! watch channel; dropping the [`StopHandle`] tears the task down as
//! cancelled. Either way the sampler's single finalize routine runs and the
//! stream is released before `drive` returns.

use log::debug;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::sampler::{FinishedTask, Probe, Progress, Sampler, TickOutcome};

/// Requests an early stop of a driven task
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Ask the task to stop at its next opportunity
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving side of a stop request, consumed by [`drive`]
#[derive(Debug)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Drive `sampler` until it finalizes, calling `on_progress` after every tick
/// that did not end the task
pub async fn drive<P, F>(
    mut sampler: Sampler<P>,
    mut stop: StopSignal,
    mut on_progress: F,
) -> Option<FinishedTask<P::Output>>
where
    P: Probe,
    F: FnMut(&Progress<P::Status>),
{
    let schedule = sampler.schedule();
    let start = Instant::now();
    let elapsed_ms = |start: Instant| start.elapsed().as_millis() as u64;

    if *stop.rx.borrow_and_update() {
        debug!("{} task stopped before its first tick", sampler.phase().as_str());
        return sampler.stop(0);
    }

    let mut interval = time::interval_at(start + schedule.interval(), schedule.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            changed = stop.rx.changed() => match changed {
                Ok(()) => {
                    if *stop.rx.borrow_and_update() {
                        return sampler.stop(elapsed_ms(start));
                    }
                }
                Err(_) => {
                    debug!("{} task stop handle dropped, cancelling", sampler.phase().as_str());
                    return sampler.cancel(elapsed_ms(start));
                }
            },

            _ = interval.tick() => match sampler.tick(elapsed_ms(start)) {
                TickOutcome::Running(progress) => on_progress(&progress),
                TickOutcome::Finished(task) => return Some(task),
                TickOutcome::Idle => return None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::{AcousticProbe, AcousticStatus};
    use crate::config::AcousticConfig;
    use crate::media::ReplayAudio;
    use crate::types::Completion;
    use std::time::Duration;

    fn sampler(samples: usize) -> Sampler<AcousticProbe<ReplayAudio>> {
        let config = AcousticConfig {
            duration_ms: 3000,
            ..Default::default()
        };
        AcousticProbe::new(ReplayAudio::new(vec![40.0; samples]), &config).into_sampler(&config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_timer_expiry() {
        let (_handle, signal) = stop_channel();
        let mut updates: Vec<u32> = Vec::new();

        let task = drive(sampler(30), signal, |p: &Progress<AcousticStatus>| {
            updates.push(p.step)
        })
        .await
        .unwrap();

        assert_eq!(task.summary.completion, Completion::Completed);
        assert_eq!(task.summary.ticks, 30);
        assert_eq!(task.summary.duration_ms, 3000);
        assert_eq!(updates, (1..30).collect::<Vec<u32>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_stop_finalizes_early() {
        let (handle, signal) = stop_channel();

        let (task, _) = tokio::join!(drive(sampler(30), signal, |_| {}), async {
            time::sleep(Duration::from_millis(250)).await;
            handle.stop();
        });
        let task = task.unwrap();

        assert_eq!(task.summary.completion, Completion::Stopped);
        assert_eq!(task.summary.ticks, 2);
        assert_eq!(task.summary.duration_ms, 250);
        assert!(!task.metrics.incomplete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_cancels() {
        let (handle, signal) = stop_channel();
        drop(handle);

        let task = drive(sampler(30), signal, |_| {}).await.unwrap();
        assert_eq!(task.summary.completion, Completion::Cancelled);
        assert!(task.metrics.incomplete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_loss_interrupts() {
        let (_handle, signal) = stop_channel();

        let task = drive(sampler(5), signal, |_| {}).await.unwrap();
        assert_eq!(task.summary.completion, Completion::Interrupted);
        assert_eq!(task.summary.ticks, 5);
        assert_eq!(task.summary.duration_ms, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_requested_before_start() {
        let (handle, signal) = stop_channel();
        handle.stop();

        let task = drive(sampler(30), signal, |_| {}).await.unwrap();
        assert_eq!(task.summary.completion, Completion::Stopped);
        assert_eq!(task.summary.ticks, 0);
    }
}
