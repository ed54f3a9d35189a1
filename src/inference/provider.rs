//! Inference provider implementations

use log::{debug, info, warn};
use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::inference::parse::completion_text;
use crate::inference::prompt::ChatCompletionRequest;
use crate::types::{Citation, WebSource};

/// Model text plus any grounding citations the provider attached
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }
}

/// A language-model backend that answers one chat request
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run the request to completion, giving up once `timeout` has passed.
    /// May block.
    fn complete(
        &self,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Canned output rather than a real analysis
    fn is_simulated(&self) -> bool {
        false
    }
}

const SIMULATED_REPORT: &str = r#"{
  "overallRisk": "Low",
  "confidence": 0.92,
  "analysis": {
    "speech": "SIMULATED: Vocal patterns show standard frequency distribution. No micro-tremors detected in the 50Hz range.",
    "visual": "SIMULATED: Gaze tracking stable with standard saccadic latency of 210ms.",
    "cognitive": "SIMULATED: Linguistic variability suggests high executive function and working memory stability."
  },
  "recommendations": [
    "Continue routine cognitive monitoring.",
    "Maintain current physical activity levels.",
    "Ensure consistent 7-9 hour sleep cycles."
  ],
  "medicalGrounding": "DEMO MODE: In a production environment, this analysis is grounded in real-time medical literature. Currently displaying baseline metrics."
}"#;

/// Offline provider used when no API key is configured
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    delay: Duration,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause before answering, like a real round trip
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl InferenceProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    fn complete(
        &self,
        _request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        if self.delay > timeout {
            thread::sleep(timeout);
            return Err(ProviderError::Timeout(timeout.as_secs()));
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(ProviderResponse {
            text: SIMULATED_REPORT.to_string(),
            citations: vec![Citation {
                web: WebSource {
                    title: "Standard Cognitive Baselines".to_string(),
                    uri: "https://example.com/demo".to_string(),
                },
            }],
        })
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Provider answering with a fixed raw body (recorded response or stream)
#[derive(Debug, Clone)]
pub struct StaticProvider {
    body: String,
}

impl StaticProvider {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

impl InferenceProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn complete(
        &self,
        _request: &ChatCompletionRequest,
        _timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        completion_text(&self.body).map(ProviderResponse::text)
    }
}

/// OpenAI-compatible chat completions endpoint over HTTP
///
/// Posts the request to `{base_url}/chat/completions` with a bearer key and
/// reads the completion, streamed or whole, from the response body. The
/// deadline passed to [`InferenceProvider::complete`] bounds the whole
/// request, so a timed-out call never outlives the caller.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let io_timeout = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .map_or(false, |e| {
            matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
        });
    let msg = transport.to_string();
    io_timeout || msg.contains("timed out") || msg.contains("timeout")
}

impl InferenceProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn complete(
        &self,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = self.endpoint();
        debug!("posting chat request to {} ({}s deadline)", url, timeout.as_secs());

        let mut req = ureq::post(&url).timeout(timeout);
        if !self.api_key.is_empty() {
            req = req.set("Authorization", &format!("Bearer {}", self.api_key));
        }
        if request.stream {
            req = req.set("Accept", "text/event-stream");
        }

        let response = req
            .set("Content-Type", "application/json")
            .send_json(request)
            .map_err(|e| match e {
                ureq::Error::Status(code @ (401 | 403), resp) => {
                    let body = resp.into_string().unwrap_or_default();
                    ProviderError::Auth(format!("HTTP {code}: {}", body.trim()))
                }
                ureq::Error::Status(code, resp) => {
                    let body = resp.into_string().unwrap_or_default();
                    warn!("provider answered HTTP {}: {}", code, body.trim());
                    ProviderError::Unavailable(format!("HTTP {code}"))
                }
                ureq::Error::Transport(t) if is_timeout(&t) => {
                    ProviderError::Timeout(timeout.as_secs())
                }
                ureq::Error::Transport(t) => {
                    ProviderError::Unavailable(format!("transport error: {t}"))
                }
            })?;

        let body = response.into_string().map_err(|e| {
            if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
                ProviderError::Timeout(timeout.as_secs())
            } else {
                ProviderError::Unavailable(format!("reading response: {e}"))
            }
        })?;
        info!("provider returned {} bytes", body.len());
        completion_text(&body).map(ProviderResponse::text)
    }
}
