//! Report inference
//!
//! Turns a composite [`AssessmentPayload`](crate::types::AssessmentPayload)
//! into a [`DiagnosticReport`](crate::types::DiagnosticReport) through an
//! external language-model provider. The provider is an untrusted
//! collaborator: its output is parsed defensively, and any failure degrades to
//! a labelled fallback report instead of an error.

pub mod parse;
pub mod prompt;
pub mod provider;
pub mod report;

pub use parse::{extract_json_body, parse_report, StreamAccumulator};
pub use prompt::{build_prompt, ChatCompletionRequest, ChatMessage};
pub use provider::{
    HttpProvider, InferenceProvider, ProviderResponse, SimulatedProvider, StaticProvider,
};
pub use report::{fallback_report, ReportGenerator, ReportOutcome, ReportSource};
