//! Session aggregation
//!
//! Each finalized phase contributes its metrics under its own top-level key of
//! the composite payload. Recording a phase again replaces only that key.

use log::{debug, info};
use uuid::Uuid;

use crate::error::AssessmentError;
use crate::types::{AssessmentPayload, TaskMetrics};

/// Collects finalized task metrics for one assessment session
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    session_id: String,
    payload: AssessmentPayload,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4().to_string())
    }

    /// Create an aggregator with a fixed session id (for replays and tests)
    pub fn with_session_id(session_id: String) -> Self {
        Self {
            session_id,
            payload: AssessmentPayload::default(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Merge one phase's metrics. Self-reported data is range-checked first;
    /// a rejected record leaves the payload untouched.
    pub fn record(&mut self, metrics: TaskMetrics) -> Result<(), AssessmentError> {
        let key = metrics.key();
        let replaced = match metrics {
            TaskMetrics::Audio(audio) => self.payload.audio_metrics.replace(audio).is_some(),
            TaskMetrics::Visual(visual) => self.payload.visual_metrics.replace(visual).is_some(),
            TaskMetrics::Text(text) => self.payload.text_metrics.replace(text).is_some(),
            TaskMetrics::Cognitive(scores) => {
                scores.validate()?;
                self.payload.cognitive_scores.replace(scores).is_some()
            }
            TaskMetrics::Behavioral(data) => {
                data.validate()?;
                self.payload.behavioral_data.replace(data).is_some()
            }
        };

        if replaced {
            info!("session {}: {} re-recorded, previous value replaced", self.session_id, key);
        } else {
            debug!("session {}: recorded {}", self.session_id, key);
        }
        Ok(())
    }

    /// Payload keys recorded so far
    pub fn recorded(&self) -> Vec<&'static str> {
        let p = &self.payload;
        [
            (p.audio_metrics.is_some(), "audioMetrics"),
            (p.visual_metrics.is_some(), "visualMetrics"),
            (p.text_metrics.is_some(), "textMetrics"),
            (p.cognitive_scores.is_some(), "cognitiveScores"),
            (p.behavioral_data.is_some(), "behavioralData"),
        ]
        .into_iter()
        .filter_map(|(present, key)| present.then_some(key))
        .collect()
    }

    pub fn payload(&self) -> &AssessmentPayload {
        &self.payload
    }

    pub fn into_payload(self) -> AssessmentPayload {
        self.payload
    }
}
