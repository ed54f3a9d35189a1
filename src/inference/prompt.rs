//! Prompt and chat request construction

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::types::AssessmentPayload;

/// One message of an OpenAI-compatible chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat completion request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(config: &ProviderConfig, prompt: &str) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            stream: config.stream,
        }
    }
}

const OUTPUT_STRUCTURE: &str = r#"{
  "overallRisk": "Low" | "Moderate" | "Elevated",
  "confidence": number,
  "analysis": {
    "speech": "text",
    "visual": "text",
    "cognitive": "text"
  },
  "recommendations": ["string"],
  "medicalGrounding": "Deep clinical reasoning text"
}"#;

/// Render a payload section, `null` when the phase was skipped
fn section<T: Serialize>(value: &Option<T>) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Build the analysis prompt for a composite payload
pub fn build_prompt(payload: &AssessmentPayload) -> String {
    format!(
        "ACT AS A SENIOR NEUROLOGICAL DIAGNOSTIC AI SYSTEM.\n\
         Analyze the following multimodal digital biomarker data for indicators of \
         neurodegenerative risk (specifically targeting Alzheimer's and Parkinson's patterns).\n\
         \n\
         DATA PACKAGE:\n\
         - ACOUSTIC: {}\n\
         - OCULOMOTOR: {}\n\
         - LINGUISTIC: {}\n\
         - COGNITIVE: {}\n\
         - BEHAVIORAL CONTEXT: {}\n\
         \n\
         REQUIRED OUTPUT:\n\
         Return a STRICT JSON object only. Do not provide any conversational preamble.\n\
         Structure:\n{}\n",
        section(&payload.audio_metrics),
        section(&payload.visual_metrics),
        section(&payload.text_metrics),
        section(&payload.cognitive_scores),
        section(&payload.behavioral_data),
        OUTPUT_STRUCTURE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BehavioralData;

    #[test]
    fn test_prompt_embeds_sections() {
        let payload = AssessmentPayload {
            behavioral_data: Some(BehavioralData {
                sleep_rating: 7,
                activity_level: 5,
                social_engagement: 8,
                stress_frequency: 3,
            }),
            ..Default::default()
        };
        let prompt = build_prompt(&payload);

        assert!(prompt.contains("- ACOUSTIC: null"));
        assert!(prompt.contains("\"sleepRating\":7"));
        assert!(prompt.contains("\"overallRisk\": \"Low\" | \"Moderate\" | \"Elevated\""));
    }

    #[test]
    fn test_request_uses_provider_settings() {
        let config = ProviderConfig::default();
        let request = ChatCompletionRequest::new(&config, "hello");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "deepseek-ai/deepseek-v3");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hello");
        assert_eq!(value["temperature"], 0.1);
        assert_eq!(value["top_p"], 1.0);
        assert_eq!(value["max_tokens"], 4096);
        assert_eq!(value["stream"], true);
    }
}
