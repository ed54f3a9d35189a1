//! Linguistic metrics
//!
//! Two independent measurements: keystroke dynamics of the typing task
//! ([`TypingTracker`]) and lexical features of a speech transcript
//! ([`TranscriptAnalysis`]).

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::TypingConfig;
use crate::error::AssessmentError;
use crate::types::TextMetrics;

pub const DEFAULT_TARGET_TEXT: &str = "The quick brown fox jumps over the lazy dog. \
A clear mind allows for focus and determination in the face of complex challenges.";

/// Shortest accepted typing submission, in characters
pub const MIN_SUBMISSION_CHARS: usize = 10;

/// Filler lexicon; multi-word entries match consecutive tokens
pub const FILLER_WORDS: &[&str] = &[
    "um",
    "uh",
    "er",
    "ah",
    "like",
    "actually",
    "basically",
    "you know",
    "i mean",
];

/// Characters per word when converting typed characters to words per minute
const CHARS_PER_WORD: f64 = 5.0;

/// Accuracy points lost per mismatched word
const ERROR_PENALTY: u32 = 5;

/// Lexical features of a transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptAnalysis {
    /// Distinct fillers in first-seen order
    pub filler_words: Vec<String>,
    pub word_count: usize,
    /// Words per minute; 0 when no time elapsed
    pub speech_rate: f64,
    /// Unique / total words; 0 for an empty transcript
    pub lexical_diversity: f64,
}

impl TranscriptAnalysis {
    pub fn analyze(transcript: &str, duration_secs: f64) -> Self {
        let tokens = tokenize(transcript);
        if tokens.is_empty() {
            return Self::default();
        }

        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        let lexical_diversity = unique.len() as f64 / tokens.len() as f64;

        let speech_rate = if duration_secs > 0.0 {
            tokens.len() as f64 / (duration_secs / 60.0)
        } else {
            0.0
        };

        Self {
            filler_words: find_fillers(&tokens),
            word_count: tokens.len(),
            speech_rate,
            lexical_diversity,
        }
    }
}

/// Lowercased words with surrounding punctuation stripped
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

fn find_fillers(tokens: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let pair = tokens
            .get(i + 1)
            .map(|next| format!("{} {}", tokens[i], next));

        let (filler, width) = match pair {
            Some(pair) if FILLER_WORDS.contains(&pair.as_str()) => (Some(pair), 2),
            _ if FILLER_WORDS.contains(&tokens[i].as_str()) => (Some(tokens[i].clone()), 1),
            _ => (None, 1),
        };

        if let Some(filler) = filler {
            if !found.contains(&filler) {
                found.push(filler);
            }
        }
        i += width;
    }

    found
}

/// Number of input words that differ from the target word at the same index
pub fn count_word_errors(input: &str, target: &str) -> u32 {
    let mut target_words = target.split_whitespace();
    input
        .split_whitespace()
        .filter(|word| target_words.next() != Some(*word))
        .count() as u32
}

/// A keystroke as seen by the typing task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Char(char),
    Backspace,
    Other,
}

impl Key {
    /// Map a DOM-style key name ("a", "Backspace", "Shift") to a key
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("backspace") {
            return Key::Backspace;
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Key::Char(c),
            _ if name == "Space" => Key::Char(' '),
            _ => Key::Other,
        }
    }
}

/// One recorded key press
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    /// DOM-style key name
    pub key: String,
    pub at_ms: u64,
}

/// A recorded typing session that can be replayed through a [`TypingTracker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystrokeLog {
    pub keys: Vec<KeyEvent>,
    pub content: String,
    pub submitted_at_ms: u64,
}

impl KeystrokeLog {
    pub fn replay(&self, config: &TypingConfig) -> Result<TextMetrics, AssessmentError> {
        let mut tracker = TypingTracker::new(config);
        for event in &self.keys {
            tracker.key_down(Key::from_name(&event.key), event.at_ms);
        }
        tracker.submit(&self.content, self.submitted_at_ms)
    }
}

/// Keystroke timing for one typing task
#[derive(Debug, Clone)]
pub struct TypingTracker {
    target_text: String,
    min_chars: usize,
    started_at_ms: Option<u64>,
    last_key_ms: Option<u64>,
    backspaces: u32,
    intervals: Vec<u64>,
}

impl TypingTracker {
    pub fn new(config: &TypingConfig) -> Self {
        Self {
            target_text: config.target_text.clone(),
            min_chars: config.min_chars,
            started_at_ms: None,
            last_key_ms: None,
            backspaces: 0,
            intervals: Vec::new(),
        }
    }

    pub fn target_text(&self) -> &str {
        &self.target_text
    }

    /// Record a key press at `at_ms`; the first press starts the clock
    pub fn key_down(&mut self, key: Key, at_ms: u64) {
        if self.started_at_ms.is_none() {
            debug!("typing started at {}ms", at_ms);
            self.started_at_ms = Some(at_ms);
        }
        if let Some(last) = self.last_key_ms {
            self.intervals.push(at_ms.saturating_sub(last));
        }
        self.last_key_ms = Some(at_ms);

        if key == Key::Backspace {
            self.backspaces += 1;
        }
    }

    pub fn backspaces(&self) -> u32 {
        self.backspaces
    }

    pub fn has_started(&self) -> bool {
        self.started_at_ms.is_some()
    }

    /// Whether `content` is long enough to submit
    pub fn can_submit(&self, content: &str) -> bool {
        content.chars().count() >= self.min_chars
    }

    /// Finalize the task with the submitted text at `at_ms`
    pub fn submit(&self, content: &str, at_ms: u64) -> Result<TextMetrics, AssessmentError> {
        let chars = content.chars().count();
        if chars < self.min_chars {
            return Err(AssessmentError::InvalidInput(format!(
                "submission has {} characters, at least {} required",
                chars, self.min_chars
            )));
        }

        let duration_ms = self
            .started_at_ms
            .map(|start| at_ms.saturating_sub(start))
            .unwrap_or(0);
        let minutes = duration_ms as f64 / 60_000.0;
        let typing_speed = if minutes > 0.0 {
            ((chars as f64 / CHARS_PER_WORD) / minutes).round() as u32
        } else {
            0
        };

        let errors = count_word_errors(content, &self.target_text);
        let accuracy = 100u32.saturating_sub(errors.saturating_mul(ERROR_PENALTY));

        let mean_inter_key_ms = if self.intervals.is_empty() {
            0.0
        } else {
            self.intervals.iter().sum::<u64>() as f64 / self.intervals.len() as f64
        };

        debug!(
            "typing submitted: {} chars in {}ms, {} errors",
            chars, duration_ms, errors
        );

        Ok(TextMetrics {
            content: content.to_string(),
            backspaces: self.backspaces,
            typing_speed,
            errors,
            accuracy,
            mean_inter_key_ms,
            duration_ms,
        })
    }
}
