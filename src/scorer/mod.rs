// src/scorer/mod.rs

mod llm;

use crate::quantity::ExtractedQuantities;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use llm::LlmScorer;

/// Everything a scorer gets to look at for one validation.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRequest<'a> {
    pub text: &'a str,
    pub entered: f64,
    pub extracted: &'a ExtractedQuantities,
    /// Value the field locator found, if any.
    pub hinted_field_value: Option<f64>,
}

/// Advisory judgment from an external scorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorerResult {
    pub is_valid: bool,
    pub matched_value: Option<f64>,
    /// 0..=100
    pub confidence: u8,
    pub reasoning: String,
    pub field_location: String,
}

/// The shape a model actually returns. Every field is optional and
/// `matched_value` may be a string like "1,234.56".
#[derive(Debug, Default, Deserialize)]
pub struct RawScorerResult {
    pub is_valid: Option<bool>,
    pub matched_value: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub field_location: Option<String>,
}

impl From<RawScorerResult> for ScorerResult {
    fn from(raw: RawScorerResult) -> Self {
        let matched_value = raw.matched_value.and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => {
                let cleaned: String = s.chars().filter(|c| *c != ',' && *c != ' ').collect();
                cleaned.parse::<f64>().ok()
            }
            _ => None,
        });
        Self {
            is_valid: raw.is_valid.unwrap_or(false),
            matched_value: matched_value.filter(|v| v.is_finite()),
            confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8,
            reasoning: raw
                .reasoning
                .unwrap_or_else(|| "No reasoning provided".to_string()),
            field_location: raw.field_location.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("Scorer not configured")]
    NotConfigured,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Scorer call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scorer API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Scorer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Could not parse scorer response: {0}")]
    Parse(String),

    #[error("Scorer unavailable: {0}")]
    Unavailable(String),
}

impl ScorerError {
    /// Rate-limit class failures are the only ones worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status == 429,
            Self::Request(e) => e.status().is_some_and(|s| s.as_u16() == 429),
            Self::Unavailable(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("429") || lower.contains("rate limit")
            }
            _ => false,
        }
    }
}

/// Optional semantic judge consulted after the mechanical match.
#[async_trait]
pub trait ExternalScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Capability check. A scorer that reports `false` is skipped without
    /// being called.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn score(&self, request: &ScoreRequest<'_>) -> Result<ScorerResult, ScorerError>;
}
