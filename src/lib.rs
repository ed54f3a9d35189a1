//! NeuroLens - signal core for a multimodal wellness self-assessment
//!
//! NeuroLens samples a microphone and a camera at fixed intervals during short
//! timed tasks and reduces the streams to a few behavioral indicators:
//! sustained speech pauses, visual drift between frames and gaze stability.
//! Typing dynamics and self-reported data join them in one composite payload,
//! which an external inference provider turns into a structured report.
//!
//! ## Modules
//!
//! - **Detectors**: [`acoustic::PauseDetector`], [`visual::DriftDetector`],
//!   [`linguistic::TypingTracker`]
//! - **Sampling**: [`sampler::Sampler`] state machine and the tokio
//!   [`driver`] that runs it on a timer
//! - **Session**: [`aggregator::SessionAggregator`] and
//!   [`pipeline::AssessmentSession`]
//! - **Inference**: prompt building, defensive parsing and fallback reports

pub mod acoustic;
pub mod aggregator;
pub mod config;
pub mod driver;
pub mod error;
pub mod inference;
pub mod linguistic;
pub mod media;
pub mod pipeline;
pub mod sampler;
pub mod spectrum;
pub mod types;
pub mod visual;

pub use acoustic::{AcousticProbe, PauseDetector};
pub use aggregator::SessionAggregator;
pub use config::AssessmentConfig;
pub use driver::{drive, stop_channel, StopHandle, StopSignal};
pub use error::{AssessmentError, ProviderError};
pub use inference::{ReportGenerator, ReportOutcome, ReportSource};
pub use linguistic::{TranscriptAnalysis, TypingTracker};
pub use pipeline::{
    analyze_energy_samples, analyze_frame_deltas, analyze_frames, analyze_pcm, replay_typing,
    start_acoustic, start_visual, AssessmentSession,
};
pub use sampler::{Sampler, Schedule};
pub use types::{AssessmentPayload, DiagnosticReport, TaskMetrics};
pub use visual::{fixation_target, stability_score, DriftDetector, Frame, VisualProbe};

/// Engine version reported by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
