//! Report generation with fallback
//!
//! [`ReportGenerator`] never fails: a provider error of any kind is logged and
//! replaced by [`fallback_report`], and the outcome records why.

use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::inference::parse::parse_report;
use crate::inference::prompt::{build_prompt, ChatCompletionRequest};
use crate::inference::provider::{HttpProvider, InferenceProvider, SimulatedProvider};
use crate::types::{AssessmentPayload, DiagnosticReport, ReportAnalysis, RiskLevel};

/// Extra time the provider gets to report its own timeout
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

/// Where the final report came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportSource {
    Provider { name: String },
    Simulated,
    Fallback { reason: String },
}

/// A report together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub report: DiagnosticReport,
    pub source: ReportSource,
    pub elapsed_ms: u64,
}

impl ReportOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ReportSource::Fallback { .. })
    }
}

/// Placeholder report used when the provider could not produce one
pub fn fallback_report(reason: &str) -> DiagnosticReport {
    let unavailable = "Automated analysis unavailable for this session.".to_string();
    DiagnosticReport {
        overall_risk: RiskLevel::Low,
        confidence: 0.0,
        analysis: ReportAnalysis {
            speech: unavailable.clone(),
            visual: unavailable.clone(),
            cognitive: unavailable,
        },
        recommendations: vec![
            "Retry the analysis later.".to_string(),
            "Consult a clinician for any health concern.".to_string(),
        ],
        medical_grounding: format!(
            "FALLBACK: the inference provider did not return a usable report ({reason}). \
             No clinical interpretation was performed."
        ),
        citations: Vec::new(),
        is_demo: true,
    }
}

/// Builds prompts, calls the provider and parses its answer
pub struct ReportGenerator {
    provider: Arc<dyn InferenceProvider>,
    config: ProviderConfig,
    timeout: Duration,
}

impl ReportGenerator {
    pub fn new(provider: Arc<dyn InferenceProvider>, config: ProviderConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            provider,
            config,
            timeout,
        }
    }

    /// Pick the provider for `config`: the HTTP endpoint when an API key is
    /// set, otherwise the simulated provider
    pub fn from_config(config: ProviderConfig) -> Self {
        let provider: Arc<dyn InferenceProvider> = if config.is_simulated() {
            info!("no API key found, running in simulation mode");
            Arc::new(SimulatedProvider::new())
        } else {
            info!("using provider endpoint {}", config.base_url);
            Arc::new(HttpProvider::from_config(&config))
        };
        Self::new(provider, config)
    }

    /// Override the provider timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn request(&self, payload: &AssessmentPayload) -> ChatCompletionRequest {
        if payload.is_empty() {
            warn!("generating a report from an empty payload");
        }
        ChatCompletionRequest::new(&self.config, &build_prompt(payload))
    }

    fn call(
        provider: &dyn InferenceProvider,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<DiagnosticReport, ProviderError> {
        let response = provider.complete(request, timeout)?;
        let mut report = parse_report(&response.text)?;
        if report.citations.is_empty() {
            report.citations = response.citations;
        }
        report.is_demo = provider.is_simulated();
        Ok(report)
    }

    fn outcome(&self, result: Result<DiagnosticReport, ProviderError>, started: Instant) -> ReportOutcome {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(report) => {
                let source = if self.provider.is_simulated() {
                    ReportSource::Simulated
                } else {
                    ReportSource::Provider {
                        name: self.provider.name().to_string(),
                    }
                };
                info!(
                    "report ready from {} in {}ms: {} risk",
                    self.provider.name(),
                    elapsed_ms,
                    report.overall_risk
                );
                ReportOutcome {
                    report,
                    source,
                    elapsed_ms,
                }
            }
            Err(e) => {
                warn!("provider {} failed, using fallback report: {}", self.provider.name(), e);
                let reason = e.to_string();
                ReportOutcome {
                    report: fallback_report(&reason),
                    source: ReportSource::Fallback { reason },
                    elapsed_ms,
                }
            }
        }
    }

    /// Generate a report, blocking on the provider until it answers or the
    /// timeout passes
    pub fn generate(&self, payload: &AssessmentPayload) -> ReportOutcome {
        let started = Instant::now();
        let request = self.request(payload);
        let result = Self::call(self.provider.as_ref(), &request, self.timeout);
        self.outcome(result, started)
    }

    /// Generate a report on the blocking pool.
    ///
    /// The provider gets the timeout as its own deadline and ends the call
    /// itself; the outer timer is a backstop for providers that overrun it.
    pub async fn generate_with_timeout(&self, payload: &AssessmentPayload) -> ReportOutcome {
        let started = Instant::now();
        let request = self.request(payload);
        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;

        let task =
            tokio::task::spawn_blocking(move || Self::call(provider.as_ref(), &request, timeout));
        let result = match tokio::time::timeout(timeout + DEADLINE_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ProviderError::Unavailable(format!("provider task failed: {join}"))),
            Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
        };
        self.outcome(result, started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::provider::{ProviderResponse, StaticProvider};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FailingProvider(fn() -> ProviderError);

    impl InferenceProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn complete(
            &self,
            _request: &ChatCompletionRequest,
            _timeout: Duration,
        ) -> Result<ProviderResponse, ProviderError> {
            Err((self.0)())
        }
    }

    /// Blocks until the deadline it was given, then reports a timeout
    #[derive(Default)]
    struct StallingProvider {
        deadline: Mutex<Option<Duration>>,
        finished: AtomicBool,
    }

    impl InferenceProvider for StallingProvider {
        fn name(&self) -> &str {
            "stalling"
        }

        fn complete(
            &self,
            _request: &ChatCompletionRequest,
            timeout: Duration,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.deadline.lock().unwrap() = Some(timeout);
            std::thread::sleep(timeout);
            self.finished.store(true, Ordering::SeqCst);
            Err(ProviderError::Timeout(timeout.as_secs()))
        }
    }

    fn generator(provider: impl InferenceProvider + 'static) -> ReportGenerator {
        ReportGenerator::new(Arc::new(provider), ProviderConfig::default())
    }

    #[test]
    fn test_provider_report() {
        let body = r#"Sure! {"overallRisk":"Elevated","confidence":0.7,
            "analysis":{"speech":"a","visual":"b","cognitive":"c"},
            "recommendations":["see a specialist"],"medicalGrounding":"g"}"#;
        let outcome = generator(StaticProvider::new(body)).generate(&AssessmentPayload::default());

        assert_eq!(
            outcome.source,
            ReportSource::Provider {
                name: "static".to_string()
            }
        );
        assert_eq!(outcome.report.overall_risk, RiskLevel::Elevated);
        assert_eq!(outcome.report.recommendations, vec!["see a specialist"]);
        assert!(!outcome.report.is_demo);
    }

    #[test]
    fn test_simulated_report_is_demo() {
        let outcome = generator(SimulatedProvider::new()).generate(&AssessmentPayload::default());

        assert_eq!(outcome.source, ReportSource::Simulated);
        assert!(outcome.report.is_demo);
        assert_eq!(outcome.report.overall_risk, RiskLevel::Low);
        assert_eq!(outcome.report.citations.len(), 1);
    }

    #[test]
    fn test_malformed_response_falls_back() {
        let outcome = generator(StaticProvider::new("The model is overloaded"))
            .generate(&AssessmentPayload::default());

        assert!(outcome.is_fallback());
        assert!(outcome.report.is_demo);
        assert!(outcome.report.medical_grounding.starts_with("FALLBACK"));
    }

    #[test]
    fn test_auth_failure_falls_back_with_reason() {
        let outcome = generator(FailingProvider(|| ProviderError::Auth("bad key".to_string())))
            .generate(&AssessmentPayload::default());

        match outcome.source {
            ReportSource::Fallback { reason } => assert!(reason.contains("bad key")),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let generator = generator(SimulatedProvider::with_delay(Duration::from_millis(300)))
            .with_timeout(Duration::from_millis(20));
        let outcome = generator.generate_with_timeout(&AssessmentPayload::default()).await;

        assert!(outcome.is_fallback());
    }

    #[tokio::test]
    async fn test_provider_work_ends_with_the_timeout() {
        let provider = Arc::new(StallingProvider::default());
        let generator = ReportGenerator::new(provider.clone(), ProviderConfig::default())
            .with_timeout(Duration::from_millis(50));
        let outcome = generator.generate_with_timeout(&AssessmentPayload::default()).await;

        assert!(outcome.is_fallback());
        assert_eq!(
            *provider.deadline.lock().unwrap(),
            Some(Duration::from_millis(50))
        );
        // No blocking call is left running once the outcome is returned
        assert!(provider.finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_api_key_selects_http_provider() {
        let config = ProviderConfig {
            api_key: Some("nvapi-real".to_string()),
            ..Default::default()
        };
        let generator = ReportGenerator::from_config(config);
        assert_eq!(generator.provider_name(), "http");

        let generator = ReportGenerator::from_config(ProviderConfig::default());
        assert_eq!(generator.provider_name(), "simulated");
    }

    #[test]
    fn test_unreachable_endpoint_falls_back() {
        let config = ProviderConfig {
            api_key: Some("nvapi-real".to_string()),
            base_url: "http://127.0.0.1:1/v1".to_string(),
            ..Default::default()
        };
        let outcome = ReportGenerator::from_config(config)
            .with_timeout(Duration::from_secs(2))
            .generate(&AssessmentPayload::default());

        assert!(outcome.is_fallback());
        assert_ne!(outcome.source, ReportSource::Simulated);
    }

    #[tokio::test]
    async fn test_timeout_not_hit_by_fast_provider() {
        let generator = generator(SimulatedProvider::new());
        let outcome = generator.generate_with_timeout(&AssessmentPayload::default()).await;

        assert_eq!(outcome.source, ReportSource::Simulated);
    }
}
