//! Defensive parsing of provider output
//!
//! Models wrap their JSON in prose or markdown fences and providers stream it
//! in server-sent-event chunks. Everything here assumes the worst about the
//! input and reports problems as [`ProviderError`] values.

use log::{trace, warn};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::types::DiagnosticReport;

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    delta: Option<MessageContent>,
    #[serde(default)]
    message: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_error(self) -> ProviderError {
        let code = self.code.map(|c| c.to_string()).unwrap_or_default();
        let lower = self.message.to_lowercase();
        if code.contains("401")
            || code.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("api key")
        {
            ProviderError::Auth(self.message)
        } else {
            ProviderError::Unavailable(self.message)
        }
    }
}

/// Accumulates the content deltas of a streamed chat completion
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    text: String,
    chunks: usize,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of the event stream. Returns `false` once `[DONE]` was seen.
    pub fn push_line(&mut self, line: &str) -> bool {
        if self.done {
            return false;
        }
        let Some(data) = line.trim().strip_prefix("data:") else {
            return true;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return false;
        }

        match serde_json::from_str::<CompletionBody>(data) {
            Ok(chunk) => {
                self.chunks += 1;
                if let Some(content) = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta)
                    .and_then(|delta| delta.content)
                {
                    self.text.push_str(&content);
                }
            }
            Err(e) => warn!("skipping unparsable stream chunk: {}", e),
        }
        true
    }

    /// Feed a block of stream text containing any number of lines
    pub fn push_str(&mut self, block: &str) {
        for line in block.lines() {
            if !self.push_line(line) {
                break;
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Extract the model text from a raw provider body: an event stream, a whole
/// chat completion, or plain text
pub fn completion_text(body: &str) -> Result<String, ProviderError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    if trimmed.lines().any(|line| line.trim_start().starts_with("data:")) {
        let mut stream = StreamAccumulator::new();
        stream.push_str(trimmed);
        trace!("accumulated {} stream chunks", stream.chunk_count());
        let text = stream.into_text();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        return Ok(text);
    }

    if let Ok(completion) = serde_json::from_str::<CompletionBody>(trimmed) {
        if let Some(error) = completion.error {
            return Err(error.into_error());
        }
        if let Some(content) = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.or(choice.delta))
            .and_then(|message| message.content)
        {
            if content.trim().is_empty() {
                return Err(ProviderError::EmptyResponse);
            }
            return Ok(content);
        }
    }

    Ok(trimmed.to_string())
}

/// Text from the first `{` to the last `}`
pub fn extract_json_body(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a report out of model text that may carry prose or markdown around it
pub fn parse_report(text: &str) -> Result<DiagnosticReport, ProviderError> {
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    let body = extract_json_body(text)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in response".to_string()))?;

    let mut report: DiagnosticReport =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if !(0.0..=1.0).contains(&report.confidence) {
        warn!("confidence {} out of range, clamping", report.confidence);
        report.confidence = report.confidence.clamp(0.0, 1.0);
    }
    report.is_demo = false;
    Ok(report)
}
