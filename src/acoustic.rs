//! Acoustic pause detection
//!
//! [`PauseDetector`] classifies each energy sample as silent or voiced and
//! emits one [`PauseEvent`] per continuous silent run that lasts longer than
//! the minimum pause duration. Short gaps between words never count.
//! [`AcousticProbe`] runs the detector against a microphone stream inside a
//! [`Sampler`].

use log::{debug, trace};

use crate::config::AcousticConfig;
use crate::error::AssessmentError;
use crate::linguistic::TranscriptAnalysis;
use crate::media::{AudioSource, StreamGuard};
use crate::sampler::{Probe, Sampler, Tick};
use crate::types::{AudioMetrics, PauseEvent, Phase, TaskSummary};

/// Energy below this (0-255 scale) is silence
pub const SILENCE_THRESHOLD: f64 = 15.0;

/// Silence must last strictly longer than this to count as a pause
pub const MIN_PAUSE_MS: u64 = 1500;

/// Silence state of the most recent sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SilenceWindow {
    pub is_silent: bool,
    /// Set once per silent run, cleared on the first voiced sample
    pub silence_started_at: Option<u64>,
    /// The current run already produced its pause
    reported: bool,
}

impl SilenceWindow {
    /// Silence elapsed at `now_ms`, zero when voiced
    pub fn silent_for(&self, now_ms: u64) -> u64 {
        self.silence_started_at
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0)
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }
}

/// Silence/pause classifier over a stream of energy samples
#[derive(Debug, Clone)]
pub struct PauseDetector {
    threshold: f64,
    min_pause_ms: u64,
    window: SilenceWindow,
    events: Vec<PauseEvent>,
}

impl Default for PauseDetector {
    fn default() -> Self {
        Self::new(SILENCE_THRESHOLD, MIN_PAUSE_MS)
    }
}

impl PauseDetector {
    pub fn new(threshold: f64, min_pause_ms: u64) -> Self {
        Self {
            threshold,
            min_pause_ms,
            window: SilenceWindow::default(),
            events: Vec::new(),
        }
    }

    pub fn from_config(config: &AcousticConfig) -> Self {
        Self::new(config.silence_threshold, config.min_pause_ms)
    }

    /// Feed one sample taken at `now_ms`. Returns the pause it completed, if any.
    pub fn push(&mut self, energy: f64, now_ms: u64) -> Option<PauseEvent> {
        if energy >= self.threshold {
            if self.window.is_silent {
                trace!("voice resumed after {}ms", self.window.silent_for(now_ms));
            }
            self.window = SilenceWindow::default();
            return None;
        }

        let Some(started_at) = self.window.silence_started_at else {
            self.window.is_silent = true;
            self.window.silence_started_at = Some(now_ms);
            return None;
        };

        if self.window.reported || now_ms.saturating_sub(started_at) <= self.min_pause_ms {
            return None;
        }

        self.window.reported = true;
        let event = PauseEvent {
            detected_at_ms: now_ms,
        };
        debug!(
            "pause detected at {}ms after {}ms of silence",
            now_ms,
            now_ms - started_at
        );
        self.events.push(event);
        Some(event)
    }

    pub fn window(&self) -> &SilenceWindow {
        &self.window
    }

    pub fn events(&self) -> &[PauseEvent] {
        &self.events
    }

    pub fn pause_count(&self) -> u32 {
        self.events.len() as u32
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.window = SilenceWindow::default();
        self.events.clear();
    }
}

/// Status published after each acoustic tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcousticStatus {
    pub energy: f64,
    pub is_silent: bool,
    pub pause_count: u32,
}

/// Pause detector bound to an owned microphone stream
pub struct AcousticProbe<S: AudioSource> {
    stream: StreamGuard<S>,
    detector: PauseDetector,
    transcript: Option<String>,
    last_energy: f64,
    energy_sum: f64,
    samples: u32,
    silent_samples: u32,
}

impl<S: AudioSource> AcousticProbe<S> {
    pub fn new(source: S, config: &AcousticConfig) -> Self {
        Self {
            stream: StreamGuard::new(source),
            detector: PauseDetector::from_config(config),
            transcript: None,
            last_energy: 0.0,
            energy_sum: 0.0,
            samples: 0,
            silent_samples: 0,
        }
    }

    /// Wrap the probe in a sampler following the configured schedule
    pub fn into_sampler(self, config: &AcousticConfig) -> Sampler<Self> {
        Sampler::start(Phase::Acoustic, config.schedule(), self)
    }

    /// Attach the transcript produced by an external recogniser
    pub fn set_transcript(&mut self, transcript: impl Into<String>) {
        self.transcript = Some(transcript.into());
    }

    pub fn detector(&self) -> &PauseDetector {
        &self.detector
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_released()
    }
}

impl<S: AudioSource> Probe for AcousticProbe<S> {
    type Status = AcousticStatus;
    type Output = AudioMetrics;

    fn measure(&mut self, tick: &Tick) -> Result<(), AssessmentError> {
        let energy = self.stream.track_mut()?.read_energy()?;

        self.last_energy = energy;
        self.energy_sum += energy;
        self.samples += 1;
        if energy < self.detector.threshold() {
            self.silent_samples += 1;
        }

        self.detector.push(energy, tick.elapsed_ms);
        Ok(())
    }

    fn status(&self, _tick: &Tick) -> AcousticStatus {
        AcousticStatus {
            energy: self.last_energy,
            is_silent: self.detector.window().is_silent,
            pause_count: self.detector.pause_count(),
        }
    }

    fn release(&mut self) {
        self.stream.release();
    }

    fn finish(&mut self, summary: &TaskSummary) -> AudioMetrics {
        let transcript = self.transcript.take().unwrap_or_default();
        let analysis = TranscriptAnalysis::analyze(&transcript, summary.duration_secs());

        let (mean_energy, silence_ratio) = if self.samples == 0 {
            (0.0, 0.0)
        } else {
            (
                self.energy_sum / self.samples as f64,
                self.silent_samples as f64 / self.samples as f64,
            )
        };

        AudioMetrics {
            transcript,
            pause_count: self.detector.pause_count(),
            filler_words: analysis.filler_words,
            speech_rate: analysis.speech_rate,
            lexical_diversity: analysis.lexical_diversity,
            analysis_duration: summary.duration_secs(),
            mean_energy,
            silence_ratio,
            incomplete: summary.incomplete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ReplayAudio;
    use crate::types::Completion;

    /// Feed samples at 100ms spacing, returning the pause events
    fn run(samples: &[f64]) -> Vec<PauseEvent> {
        let mut detector = PauseDetector::default();
        samples
            .iter()
            .enumerate()
            .filter_map(|(i, &energy)| detector.push(energy, i as u64 * 100))
            .collect()
    }

    fn sequence(parts: &[(f64, usize)]) -> Vec<f64> {
        parts
            .iter()
            .flat_map(|&(value, count)| std::iter::repeat(value).take(count))
            .collect()
    }

    #[test]
    fn test_short_silence_emits_nothing() {
        // 14 silent samples: the run spans 1300ms between first and last sample
        let samples = sequence(&[(20.0, 2), (5.0, 14), (20.0, 1)]);
        assert!(run(&samples).is_empty());
    }

    #[test]
    fn test_sustained_silence_emits_one_pause() {
        let samples = sequence(&[(20.0, 2), (5.0, 20), (20.0, 1)]);
        let events = run(&samples);

        assert_eq!(events.len(), 1);
        // Silence starts at 200ms; first sample more than 1500ms later is 1800ms
        assert_eq!(events[0].detected_at_ms, 1800);
    }

    #[test]
    fn test_long_silence_fires_exactly_once() {
        // 10 seconds of silence
        let samples = sequence(&[(20.0, 1), (5.0, 100)]);
        assert_eq!(run(&samples).len(), 1);
    }

    #[test]
    fn test_voice_rearms_detector() {
        let samples = sequence(&[(5.0, 20), (30.0, 1), (5.0, 20), (30.0, 1), (5.0, 5)]);
        let events = run(&samples);

        assert_eq!(events.len(), 2);
        assert!(events[1].detected_at_ms > events[0].detected_at_ms);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut detector = PauseDetector::default();
        detector.push(15.0, 0);
        assert!(!detector.window().is_silent);

        detector.push(14.9, 100);
        assert!(detector.window().is_silent);
        assert_eq!(detector.window().silence_started_at, Some(100));
    }

    #[test]
    fn test_silence_start_set_once_per_run() {
        let mut detector = PauseDetector::default();
        detector.push(5.0, 0);
        detector.push(5.0, 100);
        detector.push(5.0, 200);
        assert_eq!(detector.window().silence_started_at, Some(0));
        assert_eq!(detector.window().silent_for(200), 200);

        detector.push(50.0, 300);
        assert_eq!(detector.window().silence_started_at, None);
        assert!(!detector.window().is_reported());
    }

    #[test]
    fn test_probe_builds_audio_metrics() {
        let config = AcousticConfig {
            duration_ms: 3000,
            ..Default::default()
        };
        let samples = sequence(&[(40.0, 5), (5.0, 20), (40.0, 5)]);
        let mut probe = AcousticProbe::new(ReplayAudio::new(samples), &config);
        probe.set_transcript("um so I think that that is like fine");

        let task = probe.into_sampler(&config).run_to_end().unwrap();
        let metrics = task.metrics;

        assert_eq!(task.summary.completion, Completion::Completed);
        assert_eq!(metrics.pause_count, 1);
        assert_eq!(metrics.analysis_duration, 3.0);
        assert!((metrics.silence_ratio - 20.0 / 30.0).abs() < 1e-9);
        assert!((metrics.mean_energy - (400.0 + 100.0) / 30.0).abs() < 1e-9);
        assert_eq!(metrics.filler_words, vec!["um".to_string(), "like".to_string()]);
        assert!(!metrics.incomplete);
    }

    #[test]
    fn test_probe_flags_interrupted_stream() {
        let config = AcousticConfig {
            duration_ms: 3000,
            ..Default::default()
        };
        // Recording ends after 10 of 30 ticks
        let probe = AcousticProbe::new(ReplayAudio::new(vec![30.0; 10]), &config);
        let task = probe.into_sampler(&config).run_to_end().unwrap();

        assert_eq!(task.summary.completion, Completion::Interrupted);
        assert!(task.metrics.incomplete);
        assert_eq!(task.summary.ticks, 10);
        assert_eq!(task.metrics.analysis_duration, 1.1);
    }
}
