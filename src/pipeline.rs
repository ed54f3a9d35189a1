//! Assessment orchestration
//!
//! This module provides the public entry points of NeuroLens: acquiring
//! devices and starting the timed phases, replaying recordings through the
//! same samplers, and the stateful [`AssessmentSession`] that collects phase
//! metrics and requests the final report.

use log::info;

use crate::aggregator::SessionAggregator;
use crate::acoustic::AcousticProbe;
use crate::config::{AcousticConfig, AssessmentConfig, TypingConfig, VisualConfig};
use crate::error::AssessmentError;
use crate::inference::{ReportGenerator, ReportOutcome};
use crate::linguistic::{KeystrokeLog, TypingTracker};
use crate::media::{
    AudioSource, MediaDevices, MediaTrack, PcmAudio, ReplayAudio, ReplayVideo, VideoSource,
};
use crate::sampler::{FinishedTask, Probe, Sampler};
use crate::spectrum::SpectrumAnalyzer;
use crate::types::{AssessmentPayload, AudioMetrics, TaskMetrics, TextMetrics, VisualMetrics};
use crate::visual::{DriftDetector, Frame, VisualProbe};

/// Acoustic sampler over a device-provided microphone
pub type AcousticSampler = Sampler<AcousticProbe<Box<dyn AudioSource>>>;

/// Visual sampler over a device-provided camera
pub type VisualSampler = Sampler<VisualProbe<Box<dyn VideoSource>>>;

/// Acquire the microphone and start the acoustic phase.
///
/// A denied or missing device fails with [`AssessmentError::DevicePermission`]
/// before any task state exists.
pub fn start_acoustic(
    devices: &mut dyn MediaDevices,
    config: &AcousticConfig,
) -> Result<AcousticSampler, AssessmentError> {
    let microphone = devices.microphone()?;
    info!("microphone acquired: {}", microphone.label());
    Ok(AcousticProbe::new(microphone, config).into_sampler(config))
}

/// Acquire the camera and start the visual phase
pub fn start_visual(
    devices: &mut dyn MediaDevices,
    config: &VisualConfig,
) -> Result<VisualSampler, AssessmentError> {
    let camera = devices.camera()?;
    info!("camera acquired: {}", camera.label());
    Ok(VisualProbe::new(camera, config).into_sampler(config))
}

fn finish<P: Probe>(sampler: Sampler<P>) -> Result<FinishedTask<P::Output>, AssessmentError> {
    sampler.run_to_end().ok_or_else(|| {
        AssessmentError::StreamInterrupted("task finalized without metrics".to_string())
    })
}

/// Replay recorded energy samples (0-255, one per tick) through the acoustic phase
///
/// # Example
/// ```ignore
/// let task = analyze_energy_samples(energies, Some("um so I think"), &AcousticConfig::default())?;
/// println!("{} pauses", task.metrics.pause_count);
/// ```
pub fn analyze_energy_samples(
    samples: Vec<f64>,
    transcript: Option<&str>,
    config: &AcousticConfig,
) -> Result<FinishedTask<AudioMetrics>, AssessmentError> {
    let mut probe = AcousticProbe::new(ReplayAudio::new(samples), config);
    if let Some(transcript) = transcript {
        probe.set_transcript(transcript);
    }
    finish(probe.into_sampler(config))
}

/// Replay raw PCM frames (one per tick) through the spectrum analyzer and the
/// acoustic phase
pub fn analyze_pcm(
    frames: Vec<Vec<f32>>,
    transcript: Option<&str>,
    config: &AcousticConfig,
) -> Result<FinishedTask<AudioMetrics>, AssessmentError> {
    let analyzer = SpectrumAnalyzer::new(config.fft_size, config.smoothing);
    let mut probe = AcousticProbe::new(PcmAudio::new(frames.into_iter(), analyzer), config);
    if let Some(transcript) = transcript {
        probe.set_transcript(transcript);
    }
    finish(probe.into_sampler(config))
}

/// Replay captured frames (one per tick) through the visual phase
pub fn analyze_frames(
    frames: Vec<Frame>,
    config: &VisualConfig,
) -> Result<FinishedTask<VisualMetrics>, AssessmentError> {
    finish(VisualProbe::new(ReplayVideo::new(frames), config).into_sampler(config))
}

/// Score precomputed frame deltas without any frames
pub fn analyze_frame_deltas(deltas: &[f64], config: &VisualConfig) -> VisualMetrics {
    let mut detector = DriftDetector::new(config.drift_threshold);
    for &delta in deltas {
        detector.record_delta(delta);
    }

    let max_delta = (config.frame_width * config.frame_height) as f64 * 255.0;
    let expression_delta = if deltas.is_empty() || max_delta == 0.0 {
        0.0
    } else {
        (deltas.iter().sum::<f64>() / deltas.len() as f64 / max_delta).clamp(0.0, 1.0)
    };

    VisualMetrics {
        blink_rate: None,
        gaze_stability: detector.stability(),
        drift_events: detector.drift_score(),
        motor_lag: None,
        expression_delta,
        frames_analyzed: deltas.len() as u32 + 1,
        analysis_duration: (deltas.len() as u64 + 1) as f64 * config.tick_interval_ms as f64 / 1000.0,
        incomplete: false,
    }
}

/// Replay a recorded keystroke log through the typing task
pub fn replay_typing(log: &KeystrokeLog, config: &TypingConfig) -> Result<TextMetrics, AssessmentError> {
    log.replay(config)
}

/// Stateful processor for one assessment session.
///
/// Phases are run in any order; each finalized phase is recorded into the
/// session payload, and the report is requested once all wanted phases are in.
pub struct AssessmentSession {
    config: AssessmentConfig,
    aggregator: SessionAggregator,
    reports: ReportGenerator,
}

impl AssessmentSession {
    /// Create a session whose provider is picked from the configuration
    pub fn new(config: AssessmentConfig) -> Self {
        let reports = ReportGenerator::from_config(config.provider.clone());
        Self::with_generator(config, reports)
    }

    pub fn with_generator(config: AssessmentConfig, reports: ReportGenerator) -> Self {
        let aggregator = SessionAggregator::new();
        info!(
            "session {} created, report provider {}",
            aggregator.session_id(),
            reports.provider_name()
        );
        Self {
            config,
            aggregator,
            reports,
        }
    }

    pub fn session_id(&self) -> &str {
        self.aggregator.session_id()
    }

    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    pub fn start_acoustic(
        &self,
        devices: &mut dyn MediaDevices,
    ) -> Result<AcousticSampler, AssessmentError> {
        start_acoustic(devices, &self.config.acoustic)
    }

    pub fn start_visual(&self, devices: &mut dyn MediaDevices) -> Result<VisualSampler, AssessmentError> {
        start_visual(devices, &self.config.visual)
    }

    pub fn typing_tracker(&self) -> TypingTracker {
        TypingTracker::new(&self.config.typing)
    }

    /// Record one finalized phase, replacing any earlier result for it
    pub fn record(&mut self, metrics: impl Into<TaskMetrics>) -> Result<(), AssessmentError> {
        self.aggregator.record(metrics.into())
    }

    pub fn payload(&self) -> &AssessmentPayload {
        self.aggregator.payload()
    }

    /// Request the report, blocking on the provider
    pub fn generate_report(&self) -> ReportOutcome {
        self.reports.generate(self.aggregator.payload())
    }

    /// Request the report, bounded by the provider timeout
    pub async fn generate_report_with_timeout(&self) -> ReportOutcome {
        self.reports.generate_with_timeout(self.aggregator.payload()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ReportSource, StaticProvider};
    use crate::media::ReplayDevices;
    use crate::types::{BehavioralData, Completion};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn short_config() -> AssessmentConfig {
        let mut config = AssessmentConfig::default();
        config.acoustic.duration_ms = 2000;
        config.visual.duration_ms = 1000;
        config
    }

    fn devices() -> ReplayDevices {
        let mut energies = vec![30.0; 3];
        energies.extend(vec![2.0; 17]);
        ReplayDevices {
            audio: Some(energies),
            video: Some(
                (0..10)
                    .map(|i| Frame::uniform(100, 100, if i % 2 == 0 { 0.0 } else { 40.0 }))
                    .collect(),
            ),
        }
    }

    #[test]
    fn test_denied_device_creates_no_task() {
        let mut devices = ReplayDevices::default();
        let result = start_acoustic(&mut devices, &AcousticConfig::default());
        assert!(matches!(result, Err(AssessmentError::DevicePermission(_))));
        assert!(result.err().is_some_and(|e| e.is_recoverable()));
    }

    #[test]
    fn test_full_session_with_simulated_report() {
        let config = short_config();
        let mut session = AssessmentSession::new(config.clone());
        let mut devices = devices();

        let audio = session.start_acoustic(&mut devices).unwrap().run_to_end().unwrap();
        assert_eq!(audio.summary.completion, Completion::Completed);
        assert_eq!(audio.metrics.pause_count, 1);
        session.record(audio.metrics).unwrap();

        let visual = session.start_visual(&mut devices).unwrap().run_to_end().unwrap();
        // Every frame pair differs by 400000
        assert_eq!(visual.metrics.drift_events, 9);
        session.record(visual.metrics).unwrap();

        let mut tracker = session.typing_tracker();
        tracker.key_down(crate::linguistic::Key::Char('T'), 0);
        session
            .record(tracker.submit("The quick brown fox", 10_000).unwrap())
            .unwrap();

        session
            .record(TaskMetrics::Behavioral(BehavioralData {
                sleep_rating: 7,
                activity_level: 6,
                social_engagement: 8,
                stress_frequency: 4,
            }))
            .unwrap();

        let payload = session.payload();
        assert!(payload.audio_metrics.is_some());
        assert!(payload.visual_metrics.is_some());
        assert!(payload.text_metrics.is_some());
        assert!(payload.cognitive_scores.is_none());

        let outcome = session.generate_report();
        assert_eq!(outcome.source, ReportSource::Simulated);
        assert!(outcome.report.is_demo);
    }

    #[test]
    fn test_session_falls_back_on_bad_provider_output() {
        let config = short_config();
        let generator = ReportGenerator::new(
            Arc::new(StaticProvider::new("{ not json at all }")),
            config.provider.clone(),
        );
        let session = AssessmentSession::with_generator(config, generator);

        let outcome = session.generate_report();
        assert!(outcome.is_fallback());
        assert!(outcome.report.medical_grounding.starts_with("FALLBACK"));
    }

    #[test]
    fn test_energy_replay_short_recording_is_incomplete() {
        let config = AcousticConfig {
            duration_ms: 1000,
            ..Default::default()
        };
        let task = analyze_energy_samples(vec![40.0; 4], None, &config).unwrap();

        assert_eq!(task.summary.completion, Completion::Interrupted);
        assert!(task.metrics.incomplete);
        assert_eq!(task.metrics.transcript, "");
    }

    #[test]
    fn test_pcm_replay_detects_silence() {
        let config = AcousticConfig {
            duration_ms: 2500,
            smoothing: 0.0,
            ..Default::default()
        };
        let task = analyze_pcm(vec![vec![0.0; 256]; 25], None, &config).unwrap();

        assert_eq!(task.metrics.silence_ratio, 1.0);
        assert_eq!(task.metrics.pause_count, 1);
    }

    #[test]
    fn test_frame_delta_replay() {
        let metrics = analyze_frame_deltas(&[200_000.0, 10_000.0, 180_000.0], &VisualConfig::default());

        assert_eq!(metrics.drift_events, 2);
        assert!((metrics.gaze_stability - 0.98).abs() < 1e-12);
        assert_eq!(metrics.frames_analyzed, 4);
        assert!(metrics.expression_delta > 0.0);
    }

    #[test]
    fn test_frames_replay() {
        let config = VisualConfig {
            duration_ms: 300,
            ..Default::default()
        };
        let frames = vec![
            Frame::uniform(100, 100, 0.0),
            Frame::uniform(100, 100, 0.0),
            Frame::uniform(100, 100, 90.0),
        ];
        let task = analyze_frames(frames, &config).unwrap();

        assert_eq!(task.metrics.drift_events, 1);
        assert_eq!(task.metrics.frames_analyzed, 3);
        assert!(!task.metrics.incomplete);
    }
}
