//! Assessment configuration
//!
//! Every tunable constant of the task phases lives here with its reference
//! default. Configuration is plain serde data: it can be loaded from JSON with
//! missing fields filled from defaults, and provider settings can be
//! overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::acoustic::{MIN_PAUSE_MS, SILENCE_THRESHOLD};
use crate::error::AssessmentError;
use crate::linguistic::{DEFAULT_TARGET_TEXT, MIN_SUBMISSION_CHARS};
use crate::sampler::Schedule;
use crate::spectrum::{DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING};
use crate::visual::{DRIFT_THRESHOLD, FRAME_HEIGHT, FRAME_WIDTH};

/// Environment variable holding the provider API key
pub const ENV_API_KEY: &str = "NEUROLENS_API_KEY";
/// Legacy environment variable consulted when `NEUROLENS_API_KEY` is unset
pub const ENV_API_KEY_FALLBACK: &str = "API_KEY";
pub const ENV_MODEL: &str = "NEUROLENS_MODEL";
pub const ENV_BASE_URL: &str = "NEUROLENS_BASE_URL";

/// Top-level configuration for one assessment session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub acoustic: AcousticConfig,
    pub visual: VisualConfig,
    pub typing: TypingConfig,
    pub provider: ProviderConfig,
}

impl AssessmentConfig {
    /// Load configuration from JSON, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self, AssessmentError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, AssessmentError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize configuration to pretty JSON (the API key is never written)
    pub fn to_json(&self) -> Result<String, AssessmentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), AssessmentError> {
        self.acoustic.validate()?;
        self.visual.validate()?;
        self.typing.validate()?;
        self.provider.validate()
    }
}

/// Acoustic phase settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcousticConfig {
    pub tick_interval_ms: u64,
    pub duration_ms: u64,
    /// Energy below this value (0-255 scale) counts as silence
    pub silence_threshold: f64,
    /// Silence must last longer than this to count as a pause
    pub min_pause_ms: u64,
    pub fft_size: usize,
    /// Temporal smoothing of the spectrum, in `[0, 1)`
    pub smoothing: f64,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            duration_ms: 180_000,
            silence_threshold: SILENCE_THRESHOLD,
            min_pause_ms: MIN_PAUSE_MS,
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl AcousticConfig {
    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.tick_interval_ms, self.duration_ms)
    }

    fn validate(&self) -> Result<(), AssessmentError> {
        validate_schedule("acoustic", self.tick_interval_ms, self.duration_ms)?;
        if !(0.0..=255.0).contains(&self.silence_threshold) {
            return Err(AssessmentError::InvalidConfig(format!(
                "acoustic.silence_threshold must be within 0-255, got {}",
                self.silence_threshold
            )));
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(AssessmentError::InvalidConfig(format!(
                "acoustic.fft_size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(AssessmentError::InvalidConfig(format!(
                "acoustic.smoothing must be within [0, 1), got {}",
                self.smoothing
            )));
        }
        Ok(())
    }
}

/// Visual phase settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub tick_interval_ms: u64,
    pub duration_ms: u64,
    /// Summed per-pixel brightness delta above which a tick counts as drift
    pub drift_threshold: f64,
    pub frame_width: usize,
    pub frame_height: usize,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            duration_ms: 10_000,
            drift_threshold: DRIFT_THRESHOLD,
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
        }
    }
}

impl VisualConfig {
    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.tick_interval_ms, self.duration_ms)
    }

    fn validate(&self) -> Result<(), AssessmentError> {
        validate_schedule("visual", self.tick_interval_ms, self.duration_ms)?;
        if self.drift_threshold < 0.0 {
            return Err(AssessmentError::InvalidConfig(
                "visual.drift_threshold must be non-negative".to_string(),
            ));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(AssessmentError::InvalidConfig(
                "visual frame dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Typing task settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    pub target_text: String,
    pub min_chars: usize,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            target_text: DEFAULT_TARGET_TEXT.to_string(),
            min_chars: MIN_SUBMISSION_CHARS,
        }
    }
}

impl TypingConfig {
    fn validate(&self) -> Result<(), AssessmentError> {
        if self.target_text.trim().is_empty() {
            return Err(AssessmentError::InvalidConfig(
                "typing.target_text must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Inference provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            model: "deepseek-ai/deepseek-v3".to_string(),
            temperature: 0.1,
            top_p: 1.0,
            max_tokens: 4096,
            stream: true,
            timeout_secs: 60,
        }
    }
}

impl ProviderConfig {
    /// Apply `NEUROLENS_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = env_value(ENV_API_KEY).or_else(|| env_value(ENV_API_KEY_FALLBACK)) {
            self.api_key = Some(key);
        }
        if let Some(model) = env_value(ENV_MODEL) {
            self.model = model;
        }
        if let Some(base_url) = env_value(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        self
    }

    /// No usable key means the provider runs in simulation mode
    pub fn is_simulated(&self) -> bool {
        match self.api_key.as_deref().map(str::trim) {
            None | Some("") | Some("undefined") => true,
            Some(_) => false,
        }
    }

    fn validate(&self) -> Result<(), AssessmentError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AssessmentError::InvalidConfig(format!(
                "provider.temperature must be within 0-2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(AssessmentError::InvalidConfig(
                "provider.max_tokens must be positive".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(AssessmentError::InvalidConfig(
                "provider.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn validate_schedule(
    phase: &str,
    tick_interval_ms: u64,
    duration_ms: u64,
) -> Result<(), AssessmentError> {
    if tick_interval_ms == 0 {
        return Err(AssessmentError::InvalidConfig(format!(
            "{phase}.tick_interval_ms must be positive"
        )));
    }
    if duration_ms < tick_interval_ms {
        return Err(AssessmentError::InvalidConfig(format!(
            "{phase}.duration_ms ({duration_ms}) must cover at least one tick ({tick_interval_ms})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = AssessmentConfig::default();
        assert_eq!(config.acoustic.silence_threshold, 15.0);
        assert_eq!(config.acoustic.min_pause_ms, 1500);
        assert_eq!(config.acoustic.schedule().total_steps(), 1800);
        assert_eq!(config.visual.drift_threshold, 150_000.0);
        assert_eq!(config.visual.schedule().total_steps(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            AssessmentConfig::from_json(r#"{"acoustic": {"min_pause_ms": 2000}}"#).unwrap();
        assert_eq!(config.acoustic.min_pause_ms, 2000);
        assert_eq!(config.acoustic.silence_threshold, 15.0);
        assert_eq!(config.visual, VisualConfig::default());
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let result = AssessmentConfig::from_json(r#"{"visual": {"tick_interval_ms": 0}}"#);
        assert!(matches!(result, Err(AssessmentError::InvalidConfig(_))));

        let result =
            AssessmentConfig::from_json(r#"{"acoustic": {"duration_ms": 50, "tick_interval_ms": 100}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_fft_size_rejected() {
        let result = AssessmentConfig::from_json(r#"{"acoustic": {"fft_size": 300}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = AssessmentConfig::default();
        config.provider.api_key = Some("secret".to_string());
        let json = config.to_json().unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_simulation_mode_detection() {
        let mut provider = ProviderConfig::default();
        assert!(provider.is_simulated());

        provider.api_key = Some("undefined".to_string());
        assert!(provider.is_simulated());

        provider.api_key = Some("nvapi-123".to_string());
        assert!(!provider.is_simulated());
    }
}
