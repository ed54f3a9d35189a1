//! Visual drift detection
//!
//! Involuntary head or gaze movement is approximated by the brightness change
//! between consecutive downsampled camera frames. Each tick compares the new
//! frame against a single retained previous frame; deltas above the drift
//! threshold increment the drift score. Alongside, a fixation target moves on
//! a fixed parametric path for the user to follow.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::VisualConfig;
use crate::error::AssessmentError;
use crate::media::{StreamGuard, VideoSource};
use crate::sampler::{Probe, Sampler, Tick};
use crate::types::{FixationTarget, Phase, TaskSummary, VisualMetrics};

pub const FRAME_WIDTH: usize = 100;
pub const FRAME_HEIGHT: usize = 100;

/// Summed brightness delta above which a frame pair counts as drift
pub const DRIFT_THRESHOLD: f64 = 150_000.0;

/// Lowest stability score ever reported
pub const STABILITY_FLOOR: f64 = 0.4;

/// Downsampled grayscale frame, brightness per pixel in `[0, 255]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct Frame {
    width: usize,
    height: usize,
    brightness: Vec<f32>,
}

#[derive(Deserialize)]
struct RawFrame {
    width: usize,
    height: usize,
    brightness: Vec<f32>,
}

impl TryFrom<RawFrame> for Frame {
    type Error = AssessmentError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        Frame::from_brightness(raw.width, raw.height, raw.brightness)
    }
}

/// `width * height * channels`, rejecting dimensions that overflow
fn buffer_len(width: usize, height: usize, channels: usize) -> Result<usize, AssessmentError> {
    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| {
            AssessmentError::InvalidInput(format!("frame dimensions {width}x{height} overflow"))
        })
}

impl Frame {
    pub fn from_brightness(
        width: usize,
        height: usize,
        brightness: Vec<f32>,
    ) -> Result<Self, AssessmentError> {
        if brightness.len() != buffer_len(width, height, 1)? {
            return Err(AssessmentError::InvalidInput(format!(
                "frame buffer has {} pixels, expected {}x{}",
                brightness.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            brightness,
        })
    }

    /// Frame where every pixel has the same brightness
    pub fn uniform(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            brightness: vec![value; width * height],
        }
    }

    /// Downsample an RGBA buffer to `out_width` x `out_height` (nearest
    /// neighbour) with brightness = mean of the R, G, B channels
    pub fn from_rgba(
        src_width: usize,
        src_height: usize,
        rgba: &[u8],
        out_width: usize,
        out_height: usize,
    ) -> Result<Self, AssessmentError> {
        if src_width == 0 || src_height == 0 || out_width == 0 || out_height == 0 {
            return Err(AssessmentError::InvalidInput(
                "frame dimensions must be non-zero".to_string(),
            ));
        }
        let expected = buffer_len(src_width, src_height, 4)?;
        if rgba.len() != expected {
            return Err(AssessmentError::InvalidInput(format!(
                "rgba buffer has {} bytes, expected {}",
                rgba.len(),
                expected
            )));
        }

        let mut brightness = Vec::with_capacity(buffer_len(out_width, out_height, 1)?);
        for y in 0..out_height {
            let sy = y * src_height / out_height;
            for x in 0..out_width {
                let sx = x * src_width / out_width;
                let i = (sy * src_width + sx) * 4;
                let sum = rgba[i] as f32 + rgba[i + 1] as f32 + rgba[i + 2] as f32;
                brightness.push(sum / 3.0);
            }
        }

        Ok(Self {
            width: out_width,
            height: out_height,
            brightness,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.brightness.len()
    }

    pub fn brightness(&self) -> &[f32] {
        &self.brightness
    }

    /// Sum of absolute per-pixel brightness differences; `None` on size mismatch
    pub fn abs_diff(&self, other: &Frame) -> Option<f64> {
        if self.width != other.width || self.height != other.height {
            return None;
        }
        Some(
            self.brightness
                .iter()
                .zip(&other.brightness)
                .map(|(a, b)| (a - b).abs() as f64)
                .sum(),
        )
    }
}

/// Frame-differencing drift counter with a single-slot previous frame
#[derive(Debug, Clone)]
pub struct DriftDetector {
    threshold: f64,
    previous: Option<Frame>,
    drift_score: u32,
    comparisons: u32,
    normalized_delta_sum: f64,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DRIFT_THRESHOLD)
    }
}

impl DriftDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
            drift_score: 0,
            comparisons: 0,
            normalized_delta_sum: 0.0,
        }
    }

    /// Compare `frame` with the previous one, then keep it as the new previous.
    /// Returns the delta, or `None` for the first frame or a size change.
    pub fn observe(&mut self, frame: Frame) -> Option<f64> {
        let delta = match self.previous.as_ref() {
            Some(previous) => {
                let delta = frame.abs_diff(previous);
                if delta.is_none() {
                    warn!(
                        "frame size changed to {}x{}, restarting comparison",
                        frame.width(),
                        frame.height()
                    );
                }
                delta
            }
            None => None,
        };

        if let Some(delta) = delta {
            if frame.pixel_count() > 0 {
                self.normalized_delta_sum += delta / (frame.pixel_count() as f64 * 255.0);
            }
            self.record_delta(delta);
        }

        self.previous = Some(frame);
        delta
    }

    /// Count one frame delta. Returns `true` when it registered as drift.
    pub fn record_delta(&mut self, delta: f64) -> bool {
        self.comparisons += 1;
        if delta > self.threshold {
            self.drift_score += 1;
            debug!("drift event {} (delta {:.0})", self.drift_score, delta);
            return true;
        }
        false
    }

    pub fn drift_score(&self) -> u32 {
        self.drift_score
    }

    pub fn comparisons(&self) -> u32 {
        self.comparisons
    }

    /// Mean frame delta normalized to `[0, 1]` over compared frames
    pub fn mean_normalized_delta(&self) -> f64 {
        if self.comparisons == 0 {
            return 0.0;
        }
        (self.normalized_delta_sum / self.comparisons as f64).clamp(0.0, 1.0)
    }

    pub fn stability(&self) -> f64 {
        stability_score(self.drift_score)
    }
}

/// `max(0.4, 1 - drift_score / 100)`
pub fn stability_score(drift_score: u32) -> f64 {
    (1.0 - drift_score as f64 / 100.0).max(STABILITY_FLOOR)
}

/// Fixation target at normalized progress `t` (clamped to `[0, 1]`)
///
/// `x = 50 + 35 sin(6πt)`, `y = 50 + 25 cos(3πt)`
pub fn fixation_target(t: f64) -> FixationTarget {
    let t = t.clamp(0.0, 1.0);
    FixationTarget {
        x: 50.0 + 35.0 * (6.0 * PI * t).sin(),
        y: 50.0 + 25.0 * (3.0 * PI * t).cos(),
    }
}

/// Status published after each visual tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualStatus {
    pub fixation: FixationTarget,
    pub drift_score: u32,
    pub last_delta: Option<f64>,
}

/// Drift detector bound to an owned camera stream
pub struct VisualProbe<S: VideoSource> {
    stream: StreamGuard<S>,
    detector: DriftDetector,
    last_delta: Option<f64>,
    frames: u32,
}

impl<S: VideoSource> VisualProbe<S> {
    pub fn new(source: S, config: &VisualConfig) -> Self {
        Self {
            stream: StreamGuard::new(source),
            detector: DriftDetector::new(config.drift_threshold),
            last_delta: None,
            frames: 0,
        }
    }

    /// Wrap the probe in a sampler following the configured schedule
    pub fn into_sampler(self, config: &VisualConfig) -> Sampler<Self> {
        Sampler::start(Phase::Visual, config.schedule(), self)
    }

    pub fn detector(&self) -> &DriftDetector {
        &self.detector
    }

    pub fn is_released(&self) -> bool {
        self.stream.is_released()
    }
}

impl<S: VideoSource> Probe for VisualProbe<S> {
    type Status = VisualStatus;
    type Output = VisualMetrics;

    fn measure(&mut self, _tick: &Tick) -> Result<(), AssessmentError> {
        let frame = self.stream.track_mut()?.capture()?;
        self.frames += 1;
        self.last_delta = self.detector.observe(frame);
        Ok(())
    }

    fn status(&self, tick: &Tick) -> VisualStatus {
        VisualStatus {
            fixation: fixation_target(tick.fraction()),
            drift_score: self.detector.drift_score(),
            last_delta: self.last_delta,
        }
    }

    fn release(&mut self) {
        self.stream.release();
    }

    fn finish(&mut self, summary: &TaskSummary) -> VisualMetrics {
        VisualMetrics {
            blink_rate: None,
            gaze_stability: self.detector.stability(),
            drift_events: self.detector.drift_score(),
            motor_lag: None,
            expression_delta: self.detector.mean_normalized_delta(),
            frames_analyzed: self.frames,
            analysis_duration: summary.duration_secs(),
            incomplete: summary.incomplete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::ReplayVideo;
    use crate::sampler::TickOutcome;
    use crate::types::Completion;

    #[test]
    fn test_drift_counts_only_large_deltas() {
        let mut detector = DriftDetector::default();
        let flags: Vec<bool> = [200_000.0, 10_000.0, 180_000.0]
            .into_iter()
            .map(|delta| detector.record_delta(delta))
            .collect();

        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(detector.drift_score(), 2);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut detector = DriftDetector::default();
        assert!(!detector.record_delta(150_000.0));
        assert!(detector.record_delta(150_000.5));
    }

    #[test]
    fn test_stability_floor() {
        assert_eq!(stability_score(0), 1.0);
        assert!((stability_score(25) - 0.75).abs() < 1e-12);
        assert_eq!(stability_score(60), 0.4);
        assert_eq!(stability_score(61), 0.4);
        assert_eq!(stability_score(1000), 0.4);
    }

    #[test]
    fn test_fixation_target_is_deterministic() {
        for t in [0.0, 0.13, 0.5, 0.77, 1.0] {
            assert_eq!(fixation_target(t), fixation_target(t));
        }

        let start = fixation_target(0.0);
        assert!((start.x - 50.0).abs() < 1e-9);
        assert!((start.y - 75.0).abs() < 1e-9);

        // Out-of-range progress is clamped
        assert_eq!(fixation_target(1.5), fixation_target(1.0));
        assert_eq!(fixation_target(-0.2), fixation_target(0.0));
    }

    #[test]
    fn test_fixation_target_stays_in_bounds() {
        for i in 0..=1000 {
            let target = fixation_target(i as f64 / 1000.0);
            assert!((0.0..=100.0).contains(&target.x));
            assert!((0.0..=100.0).contains(&target.y));
        }
    }

    #[test]
    fn test_frame_diff() {
        let dark = Frame::uniform(100, 100, 10.0);
        let bright = Frame::uniform(100, 100, 30.0);
        assert_eq!(dark.abs_diff(&bright), Some(200_000.0));
        assert_eq!(dark.abs_diff(&Frame::uniform(50, 50, 10.0)), None);
    }

    #[test]
    fn test_from_rgba_downsamples_and_averages_channels() {
        // 4x2 source, left half (r=30,g=60,b=90) right half black
        let mut rgba = Vec::new();
        for _row in 0..2 {
            for x in 0..4 {
                if x < 2 {
                    rgba.extend_from_slice(&[30, 60, 90, 255]);
                } else {
                    rgba.extend_from_slice(&[0, 0, 0, 255]);
                }
            }
        }

        let frame = Frame::from_rgba(4, 2, &rgba, 2, 1).unwrap();
        assert_eq!(frame.brightness(), &[60.0, 0.0]);

        assert!(Frame::from_rgba(4, 2, &rgba[..8], 2, 1).is_err());
    }

    #[test]
    fn test_frame_json_is_validated() {
        let frame: Frame =
            serde_json::from_str(r#"{"width": 2, "height": 1, "brightness": [1.0, 2.0]}"#).unwrap();
        assert_eq!(frame.pixel_count(), 2);

        let bad = serde_json::from_str::<Frame>(r#"{"width": 2, "height": 2, "brightness": [1.0]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let json = format!(r#"{{"width": {}, "height": 2, "brightness": []}}"#, usize::MAX);
        assert!(serde_json::from_str::<Frame>(&json).is_err());

        assert!(matches!(
            Frame::from_brightness(usize::MAX, 2, Vec::new()),
            Err(AssessmentError::InvalidInput(_))
        ));
        assert!(matches!(
            Frame::from_rgba(usize::MAX / 2, 2, &[0; 4], 1, 1),
            Err(AssessmentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_observe_keeps_single_previous_frame() {
        let mut detector = DriftDetector::default();
        assert_eq!(detector.observe(Frame::uniform(100, 100, 0.0)), None);
        assert_eq!(detector.observe(Frame::uniform(100, 100, 20.0)), Some(200_000.0));
        // Compared with the immediately preceding frame only
        assert_eq!(detector.observe(Frame::uniform(100, 100, 21.0)), Some(10_000.0));
        assert_eq!(detector.drift_score(), 1);
        assert_eq!(detector.comparisons(), 2);
    }

    #[test]
    fn test_probe_builds_visual_metrics() {
        let config = VisualConfig {
            duration_ms: 500,
            ..Default::default()
        };
        let frames = vec![
            Frame::uniform(100, 100, 0.0),
            Frame::uniform(100, 100, 20.0),
            Frame::uniform(100, 100, 21.0),
            Frame::uniform(100, 100, 2.0),
            Frame::uniform(100, 100, 2.0),
        ];
        let probe = VisualProbe::new(ReplayVideo::new(frames), &config);
        let mut sampler = probe.into_sampler(&config);

        match sampler.tick(100) {
            TickOutcome::Running(progress) => {
                let expected = fixation_target(0.2);
                assert!((progress.status.fixation.x - expected.x).abs() < 1e-9);
                assert!((progress.status.fixation.y - expected.y).abs() < 1e-9);
                assert_eq!(progress.status.last_delta, None);
            }
            other => panic!("expected running, got {other:?}"),
        }

        let task = sampler.run_to_end().unwrap();
        let metrics = task.metrics;

        assert_eq!(task.summary.completion, Completion::Completed);
        assert_eq!(metrics.frames_analyzed, 5);
        assert_eq!(metrics.drift_events, 2);
        assert!((metrics.gaze_stability - 0.98).abs() < 1e-12);
        assert!(metrics.blink_rate.is_none());
        assert!(metrics.expression_delta > 0.0 && metrics.expression_delta < 1.0);
    }

    #[test]
    fn test_visual_metrics_omit_unmeasured_fields() {
        let metrics = VisualMetrics {
            blink_rate: None,
            gaze_stability: 0.9,
            drift_events: 3,
            motor_lag: None,
            expression_delta: 0.1,
            frames_analyzed: 100,
            analysis_duration: 10.0,
            incomplete: false,
        };
        let value = serde_json::to_value(&metrics).unwrap();
        assert!(value.get("blinkRate").is_none());
        assert_eq!(value["driftEvents"], 3);
        assert_eq!(value["gazeStability"], 0.9);
    }
}
