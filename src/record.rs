// src/record.rs

use crate::document::truncate_chars;
use crate::scorer::ScorerResult;
use crate::validator::ValidationVerdict;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// The JSON document persisted per record id and returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub status: RecordStatus,
    pub record_id: String,
    pub delivery_quantity: f64,
    pub matched_quantity: Option<f64>,
    pub cargo_discharged_weight: Option<f64>,
    pub remarks: Option<String>,
    pub extracted_quantities: Vec<f64>,
    pub extracted_text_preview: String,
    pub ai_agent: Option<AgentInfo>,
    pub scorer_status: String,
    pub processed_at: String,
}

/// Mirror of the scorer's judgment inside the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub is_valid: bool,
    pub matched_value: Option<f64>,
    pub confidence: u8,
    pub reasoning: String,
    pub field_location: String,
}

impl From<&ScorerResult> for AgentInfo {
    fn from(r: &ScorerResult) -> Self {
        Self {
            is_valid: r.is_valid,
            matched_value: r.matched_value,
            confidence: r.confidence,
            reasoning: r.reasoning.clone(),
            field_location: r.field_location.clone(),
        }
    }
}

impl ResultRecord {
    pub fn from_verdict(
        record_id: &str,
        entered: f64,
        text: &str,
        verdict: &ValidationVerdict,
        preview_chars: usize,
    ) -> Self {
        Self {
            status: if verdict.passed {
                RecordStatus::Success
            } else {
                RecordStatus::Error
            },
            record_id: record_id.to_string(),
            delivery_quantity: entered,
            matched_quantity: verdict.matched_value(),
            cargo_discharged_weight: verdict.field_match.as_ref().map(|f| f.value()),
            remarks: verdict.remarks.clone(),
            extracted_quantities: verdict.extracted_quantities.values(),
            extracted_text_preview: truncate_chars(text, preview_chars).to_string(),
            ai_agent: verdict.scorer_info.as_ref().map(AgentInfo::from),
            scorer_status: verdict.scorer_status.label().to_string(),
            processed_at: now_rfc3339(),
        }
    }
}

/// Current UTC time as ISO-8601.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Derive a stable record id from the document and entered quantity.
pub fn generate_record_id(document: &[u8], entered: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document);
    hasher.update(entered.to_bits().to_be_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
