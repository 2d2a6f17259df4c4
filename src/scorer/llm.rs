// src/scorer/llm.rs

use super::{ExternalScorer, RawScorerResult, ScoreRequest, ScorerError, ScorerResult};
use crate::config::{ScorerBackend, ScorerSection};
use crate::document::truncate_chars;
use crate::quantity::format_values;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Instructs the model to find the discharged quantity and judge the match.
const SYSTEM_PROMPT: &str = r#"You are an expert at validating delivery quantities against shipping, cargo and discharge documents.

Your job:
- Find the discharged cargo weight, quantity or value in the document text.
  Common field names include (but are not limited to):
    - WEIGHT OF CARGO DISCHARGED
    - CARGO DISCHARGED WEIGHT / QTY / QUANTITY
    - DISCHARGED WEIGHT / QTY / QUANTITY
    - QUANTITY DISCHARGED
    - TOTAL DISCHARGED / NET DISCHARGED
    - DELIVERED QTY / DELIVERED WEIGHT
  The exact wording varies across documents.
- Compare that value against the delivery quantity entered by the business system.
- If the values match (within rounding tolerance) the validation succeeds, otherwise it fails.
- Explain where you found the value and why it matches or not.

Always respond with a single valid JSON object."#;

const STRUCTURE_PROMPT: &str = "You are a document analysis expert. Respond with a single JSON object.";

/// Characters of document text sent for structure analysis.
const STRUCTURE_PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    backend: ScorerBackend,
    base_url: String,
    model: String,
    api_key: String,
}

/// Resolve the scorer config section into a concrete endpoint.
fn resolve_endpoint(cfg: &ScorerSection) -> Result<ResolvedEndpoint, ScorerError> {
    match cfg.backend {
        ScorerBackend::None => Err(ScorerError::NotConfigured),
        ScorerBackend::Ollama => {
            info!(
                url = %cfg.ollama.base_url,
                model = %cfg.ollama.model,
                "Using Ollama (local) scorer"
            );
            Ok(ResolvedEndpoint {
                backend: cfg.backend,
                base_url: cfg.ollama.base_url.clone(),
                model: cfg.ollama.model.clone(),
                api_key: "ollama".to_string(), // required by API but ignored
            })
        }
        ScorerBackend::Remote => {
            let api_key = std::env::var("LLM_API_KEY").map_err(|_| {
                ScorerError::Unavailable("LLM_API_KEY env var required for remote scorer".into())
            })?;
            info!(
                url = %cfg.remote.base_url,
                model = %cfg.remote.model,
                "Using remote API scorer"
            );
            Ok(ResolvedEndpoint {
                backend: cfg.backend,
                base_url: cfg.remote.base_url.clone(),
                model: cfg.remote.model.clone(),
                api_key,
            })
        }
    }
}

/// Check if the Ollama server is reachable.
async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama's health endpoint is at the root (not under /v1)
    let health_url = base_url.trim_end_matches('/').trim_end_matches("/v1");

    match client
        .get(health_url)
        .timeout(Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!("Ollama server is reachable");
            true
        }
        Ok(resp) => {
            warn!(status = %resp.status(), "Ollama server returned non-OK status");
            false
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

/// Build the per-request prompt.
fn build_prompt(request: &ScoreRequest<'_>, max_chars: usize) -> String {
    let doc = truncate_chars(request.text, max_chars);
    let entered = request.entered;

    let field_info = match request.hinted_field_value {
        Some(v) => format!("REGEX-EXTRACTED DISCHARGED WEIGHT: {v}"),
        None => "REGEX-EXTRACTED DISCHARGED WEIGHT: Not found by regex, \
                 please locate it in the text yourself."
            .to_string(),
    };
    let values = if request.extracted.is_empty() {
        "None found".to_string()
    } else {
        format_values(&request.extracted.values())
    };

    format!(
        r#"Validate a delivery quantity against a cargo/shipping document.

DOCUMENT TEXT:
{doc}

{field_info}

ALL EXTRACTED NUMERICAL VALUES:
{values}

DELIVERY QUANTITY ENTERED:
{entered}

TASK:
1. Locate the discharged cargo weight / quantity / value in the document.
   Look for fields like "Weight of Cargo Discharged", "Cargo Discharged Qty",
   "Discharged Quantity", "Quantity Discharged", "Total Discharged",
   "Delivered Qty", "Net Discharged", or any equivalent.
2. Determine whether the entered delivery quantity ({entered}) matches that value.
3. Consider formatting variations (e.g. 1234.56 vs 1,234.56) and unit labels (MT, KG, LT, BBL, etc.).
4. Ignore numbers that are clearly dates, reference IDs, vessel numbers, or unrelated fields.

RESPOND IN JSON FORMAT:
{{
    "is_valid": <boolean, true if the entered quantity matches the discharged weight/qty>,
    "matched_value": <the discharged weight/qty number from the document, or null>,
    "confidence": <0-100>,
    "reasoning": "<brief explanation of where you found the value and why it matches or not>",
    "field_location": "<exact text snippet where the value appears>"
}}
"#,
    )
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text (markdown fences, thinking tokens).
fn extract_json_object(s: &str) -> Result<&str, ScorerError> {
    let s = s
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = s
        .find('{')
        .ok_or_else(|| ScorerError::Parse("No '{' found in response".into()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| ScorerError::Parse("No '}' found in response".into()))?;
    if end <= start {
        return Err(ScorerError::Parse("Malformed JSON in response".into()));
    }
    Ok(&s[start..=end])
}

/// Parse a chat completion body into a normalised scorer result.
fn parse_scorer_content(content: &str) -> Result<ScorerResult, ScorerError> {
    let json_str = extract_json_object(content)?;
    let raw: RawScorerResult = serde_json::from_str(json_str)
        .map_err(|e| ScorerError::Parse(format!("{e}\nRaw: {json_str}")))?;
    Ok(raw.into())
}

/// Scorer backed by an OpenAI-compatible chat completions endpoint
/// (Ollama, OpenAI, Azure OpenAI behind a compatible gateway).
pub struct LlmScorer {
    client: Client,
    endpoint: ResolvedEndpoint,
    max_prompt_chars: usize,
    ollama_checked: AtomicBool,
}

impl LlmScorer {
    pub fn from_config(cfg: &ScorerSection) -> Result<Self, ScorerError> {
        let endpoint = resolve_endpoint(cfg)?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            max_prompt_chars: cfg.max_prompt_chars,
            ollama_checked: AtomicBool::new(false),
        })
    }

    pub fn model(&self) -> &str {
        &self.endpoint.model
    }

    /// Local backends get one reachability probe; remote ones are assumed up.
    async fn ensure_reachable(&self) -> Result<(), ScorerError> {
        if self.endpoint.backend != ScorerBackend::Ollama
            || self.ollama_checked.load(Ordering::Relaxed)
        {
            return Ok(());
        }
        if check_ollama_health(&self.client, &self.endpoint.base_url).await {
            self.ollama_checked.store(true, Ordering::Relaxed);
            Ok(())
        } else {
            Err(ScorerError::Unavailable(format!(
                "Ollama is not running at {}. Start it with: ollama serve",
                self.endpoint.base_url
            )))
        }
    }

    async fn chat(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
    ) -> Result<String, ScorerError> {
        self.ensure_reachable().await?;

        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.1,
            max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ScorerError::RateLimited(body));
            }
            return Err(ScorerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ScorerError::Parse("Empty response from model".into()))
    }

    /// Ask the model to describe the document's key fields: type, quantity
    /// field, date, reference numbers, material.
    pub async fn analyze_structure(&self, text: &str) -> Result<serde_json::Value, ScorerError> {
        let preview = truncate_chars(text, STRUCTURE_PREVIEW_CHARS);
        let prompt = format!(
            "Analyze this delivery-order document and identify key fields:\n\n{preview}\n\n\
             Identify and extract:\n\
             1. Document type/title\n\
             2. Delivery quantity field and value\n\
             3. Date\n\
             4. Any reference numbers\n\
             5. Material/product information\n\n\
             Respond in JSON format with fields and their values."
        );
        let content = self.chat(STRUCTURE_PROMPT, prompt, 800).await?;
        let json_str = extract_json_object(&content)?;
        serde_json::from_str(json_str).map_err(|e| ScorerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ExternalScorer for LlmScorer {
    fn name(&self) -> &str {
        match self.endpoint.backend {
            ScorerBackend::Ollama => "ollama",
            _ => "remote",
        }
    }

    async fn score(&self, request: &ScoreRequest<'_>) -> Result<ScorerResult, ScorerError> {
        let prompt = build_prompt(request, self.max_prompt_chars);
        debug!(prompt_chars = prompt.len(), model = %self.endpoint.model, "Calling scorer");
        let content = self.chat(SYSTEM_PROMPT, prompt, 500).await?;
        parse_scorer_content(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::{ExtractedQuantities, tokenize};

    fn request<'a>(
        text: &'a str,
        extracted: &'a ExtractedQuantities,
        hint: Option<f64>,
    ) -> ScoreRequest<'a> {
        ScoreRequest {
            text,
            entered: 1234.56,
            extracted,
            hinted_field_value: hint,
        }
    }

    #[test]
    fn test_none_backend_not_configured() {
        let cfg = ScorerSection::default();
        assert!(matches!(
            LlmScorer::from_config(&cfg),
            Err(ScorerError::NotConfigured)
        ));
    }

    #[test]
    fn test_ollama_backend_resolves() {
        let cfg = ScorerSection {
            backend: ScorerBackend::Ollama,
            ..ScorerSection::default()
        };
        let scorer = LlmScorer::from_config(&cfg).unwrap();
        assert_eq!(scorer.name(), "ollama");
        assert_eq!(scorer.model(), "qwen3:8b");
        assert!(scorer.is_enabled());
    }

    #[test]
    fn test_prompt_includes_hint_and_values() {
        let values = tokenize("2024 and 1234.56");
        let prompt = build_prompt(&request("WEIGHT: 1234.56", &values, Some(1234.56)), 2000);
        assert!(prompt.contains("REGEX-EXTRACTED DISCHARGED WEIGHT: 1234.56"));
        assert!(prompt.contains("[2024, 1234.56]"));
        assert!(prompt.contains("DELIVERY QUANTITY ENTERED:\n1234.56"));
    }

    #[test]
    fn test_prompt_without_hint_and_truncated() {
        let long = "x".repeat(5000);
        let prompt = build_prompt(&request(&long, &ExtractedQuantities::default(), None), 2000);
        assert!(prompt.contains("Not found by regex, please locate it"));
        assert!(prompt.contains("ALL EXTRACTED NUMERICAL VALUES:\nNone found"));
        assert!(!prompt.contains(&"x".repeat(2001)));
        assert!(prompt.contains(&"x".repeat(2000)));
    }

    #[test]
    fn test_parse_fenced_response() {
        let content = "```json\n{\"is_valid\": true, \"matched_value\": 42, \"confidence\": 90, \"reasoning\": \"found\", \"field_location\": \"QTY: 42\"}\n```";
        let r = parse_scorer_content(content).unwrap();
        assert!(r.is_valid);
        assert_eq!(r.matched_value, Some(42.0));
        assert_eq!(r.confidence, 90);
        assert_eq!(r.field_location, "QTY: 42");
    }

    #[test]
    fn test_parse_with_leading_reasoning() {
        let content = "<think>checking</think> {\"is_valid\": false}";
        let r = parse_scorer_content(content).unwrap();
        assert!(!r.is_valid);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_scorer_content("I cannot help with that"),
            Err(ScorerError::Parse(_))
        ));
        assert!(matches!(
            parse_scorer_content("} backwards {"),
            Err(ScorerError::Parse(_))
        ));
    }
}
