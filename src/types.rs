//! Core types for the NeuroLens signal core
//!
//! This module defines the records that leave each task phase (finalized
//! metrics), the composite payload handed to the inference provider, and the
//! report that comes back from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::AssessmentError;

/// Assessment phase that owns a media stream and a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Acoustic,
    Visual,
    Linguistic,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Acoustic => "acoustic",
            Phase::Visual => "visual",
            Phase::Linguistic => "linguistic",
        }
    }
}

/// How a task reached its finalize routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Ran for its full duration
    Completed,
    /// User requested an early stop
    Stopped,
    /// Device disconnected or the stream failed mid-task
    Interrupted,
    /// Surrounding flow was torn down while the task was running
    Cancelled,
}

impl Completion {
    /// Metrics from interrupted or cancelled tasks are flagged incomplete
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Completion::Interrupted | Completion::Cancelled)
    }
}

/// Bookkeeping for one finalized task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub phase: Phase,
    pub completion: Completion,
    /// Wall-clock start of the task (UTC)
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the task (UTC)
    pub ended_at: DateTime<Utc>,
    /// Elapsed task time in milliseconds (full duration only on completion)
    pub duration_ms: u64,
    /// Number of ticks that ran a measurement
    pub ticks: u32,
    /// Reason recorded when the stream failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interruption: Option<String>,
}

impl TaskSummary {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    pub fn incomplete(&self) -> bool {
        self.completion.is_incomplete()
    }
}

/// A sustained pause in speech, timestamped in ms since task start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseEvent {
    pub detected_at_ms: u64,
}

/// Position of the on-screen fixation marker, both axes in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixationTarget {
    pub x: f64,
    pub y: f64,
}

/// Acoustic phase metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetrics {
    pub transcript: String,
    pub pause_count: u32,
    pub filler_words: Vec<String>,
    /// Words per minute (0 without a transcript)
    pub speech_rate: f64,
    /// Unique words / total words (0 without a transcript)
    pub lexical_diversity: f64,
    /// Analysis duration in seconds
    pub analysis_duration: f64,
    /// Mean energy on the 0-255 scale
    pub mean_energy: f64,
    /// Fraction of samples below the silence threshold
    pub silence_ratio: f64,
    #[serde(default)]
    pub incomplete: bool,
}

/// Visual (oculomotor) phase metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink_rate: Option<f64>,
    /// Bounded stability score in `[0.4, 1.0]`
    pub gaze_stability: f64,
    pub drift_events: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_lag: Option<f64>,
    /// Mean normalized frame delta in `[0, 1]`
    pub expression_delta: f64,
    pub frames_analyzed: u32,
    /// Task duration in seconds
    pub analysis_duration: f64,
    #[serde(default)]
    pub incomplete: bool,
}

/// Linguistic (typing) phase metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMetrics {
    pub content: String,
    pub backspaces: u32,
    /// Words per minute (5 characters per word)
    pub typing_speed: u32,
    pub errors: u32,
    /// Percentage in `[0, 100]`
    pub accuracy: u32,
    #[serde(default)]
    pub mean_inter_key_ms: f64,
    #[serde(default)]
    pub duration_ms: u64,
}

/// Micro-test scores collected outside the signal core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveScores {
    pub memory_score: f64,
    pub attention_score: f64,
    pub reaction_time_ms: f64,
}

impl CognitiveScores {
    pub fn validate(&self) -> Result<(), AssessmentError> {
        for (name, value) in [
            ("memoryScore", self.memory_score),
            ("attentionScore", self.attention_score),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(AssessmentError::InvalidInput(format!(
                    "{name} must be within 0-100, got {value}"
                )));
            }
        }
        if !self.reaction_time_ms.is_finite() || self.reaction_time_ms < 0.0 {
            return Err(AssessmentError::InvalidInput(format!(
                "reactionTimeMs must be non-negative, got {}",
                self.reaction_time_ms
            )));
        }
        Ok(())
    }
}

/// Self-reported lifestyle ratings, each on a 1-10 scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralData {
    pub sleep_rating: u8,
    pub activity_level: u8,
    pub social_engagement: u8,
    pub stress_frequency: u8,
}

impl BehavioralData {
    pub fn validate(&self) -> Result<(), AssessmentError> {
        for (name, value) in [
            ("sleepRating", self.sleep_rating),
            ("activityLevel", self.activity_level),
            ("socialEngagement", self.social_engagement),
            ("stressFrequency", self.stress_frequency),
        ] {
            if !(1..=10).contains(&value) {
                return Err(AssessmentError::InvalidInput(format!(
                    "{name} must be within 1-10, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Finalized output of one phase, handed to the aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMetrics {
    Audio(AudioMetrics),
    Visual(VisualMetrics),
    Text(TextMetrics),
    Cognitive(CognitiveScores),
    Behavioral(BehavioralData),
}

impl TaskMetrics {
    /// Top-level payload key this metrics record occupies
    pub fn key(&self) -> &'static str {
        match self {
            TaskMetrics::Audio(_) => "audioMetrics",
            TaskMetrics::Visual(_) => "visualMetrics",
            TaskMetrics::Text(_) => "textMetrics",
            TaskMetrics::Cognitive(_) => "cognitiveScores",
            TaskMetrics::Behavioral(_) => "behavioralData",
        }
    }
}

impl From<AudioMetrics> for TaskMetrics {
    fn from(metrics: AudioMetrics) -> Self {
        TaskMetrics::Audio(metrics)
    }
}

impl From<VisualMetrics> for TaskMetrics {
    fn from(metrics: VisualMetrics) -> Self {
        TaskMetrics::Visual(metrics)
    }
}

impl From<TextMetrics> for TaskMetrics {
    fn from(metrics: TextMetrics) -> Self {
        TaskMetrics::Text(metrics)
    }
}

/// Composite biomarker payload sent to the inference provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_metrics: Option<AudioMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_metrics: Option<VisualMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_metrics: Option<TextMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognitive_scores: Option<CognitiveScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavioral_data: Option<BehavioralData>,
}

impl AssessmentPayload {
    pub fn is_empty(&self) -> bool {
        self.audio_metrics.is_none()
            && self.visual_metrics.is_none()
            && self.text_metrics.is_none()
            && self.cognitive_scores.is_none()
            && self.behavioral_data.is_none()
    }

    /// Load a payload from JSON
    pub fn from_json(json: &str) -> Result<Self, AssessmentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the payload to JSON
    pub fn to_json(&self) -> Result<String, AssessmentError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Overall risk band returned by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::Elevated => "Elevated",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "moderate" | "medium" => Ok(RiskLevel::Moderate),
            "elevated" | "high" => Ok(RiskLevel::Elevated),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

impl Serialize for RiskLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Provider output is untrusted, so accept any casing.
impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Free-text analysis sections of the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportAnalysis {
    #[serde(default)]
    pub speech: String,
    #[serde(default)]
    pub visual: String,
    #[serde(default)]
    pub cognitive: String,
}

/// Web source backing a citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uri: String,
}

/// Grounding citation attached to a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub web: WebSource,
}

/// Structured report returned by the inference provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub overall_risk: RiskLevel,
    pub confidence: f64,
    #[serde(default)]
    pub analysis: ReportAnalysis,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub medical_grounding: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Simulated or fallback content rather than a provider analysis
    #[serde(default)]
    pub is_demo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_payload_uses_camel_case_keys() {
        let payload = AssessmentPayload {
            behavioral_data: Some(BehavioralData {
                sleep_rating: 7,
                activity_level: 5,
                social_engagement: 8,
                stress_frequency: 3,
            }),
            ..Default::default()
        };

        let value: serde_json::Value =
            serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(value["behavioralData"]["sleepRating"], 7);
        assert_eq!(value["behavioralData"]["stressFrequency"], 3);
        assert!(value.get("audioMetrics").is_none());
    }

    #[test]
    fn test_behavioral_range() {
        let mut data = BehavioralData {
            sleep_rating: 1,
            activity_level: 10,
            social_engagement: 5,
            stress_frequency: 5,
        };
        assert!(data.validate().is_ok());

        data.stress_frequency = 0;
        assert!(data.validate().is_err());

        data.stress_frequency = 11;
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_cognitive_range() {
        let scores = CognitiveScores {
            memory_score: 80.0,
            attention_score: 101.0,
            reaction_time_ms: 250.0,
        };
        assert!(scores.validate().is_err());
    }

    #[test]
    fn test_risk_level_is_case_insensitive() {
        let risk: RiskLevel = serde_json::from_str("\"elevated\"").unwrap();
        assert_eq!(risk, RiskLevel::Elevated);
        assert_eq!(serde_json::to_string(&risk).unwrap(), "\"Elevated\"");
        assert!(serde_json::from_str::<RiskLevel>("\"severe\"").is_err());
    }

    #[test]
    fn test_report_defaults() {
        let report: DiagnosticReport =
            serde_json::from_str(r#"{"overallRisk": "Low", "confidence": 0.9}"#).unwrap();
        assert!(report.recommendations.is_empty());
        assert!(report.citations.is_empty());
        assert!(!report.is_demo);
        assert_eq!(report.analysis, ReportAnalysis::default());
    }

    #[test]
    fn test_incomplete_completions() {
        assert!(!Completion::Completed.is_incomplete());
        assert!(!Completion::Stopped.is_incomplete());
        assert!(Completion::Interrupted.is_incomplete());
        assert!(Completion::Cancelled.is_incomplete());
    }
}
