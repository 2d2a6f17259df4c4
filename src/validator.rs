// src/validator.rs

use crate::quantity::{self, ExtractedQuantities, FieldMatch, Quantity, format_values};
use crate::resolver::{self, DEFAULT_TOLERANCE, MatchSource};
use crate::scorer::{ExternalScorer, ScoreRequest, ScorerError, ScorerResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the scorer is retried after a rate-limit failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first call.
    pub max_retries: u32,
    /// Retry `n` (1-based) waits `backoff * n`.
    pub backoff: Duration,
    /// Deadline for each individual scorer call.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(15),
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff * retry
    }
}

/// What happened with the scorer for one validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ScorerStatus {
    /// The scorer answered and its judgment decided the verdict.
    Used,
    /// No scorer injected, or it reports itself disabled.
    Disabled,
    /// The scorer failed, timed out, or ran out of retries; the mechanical
    /// verdict stands.
    Unavailable(String),
}

impl ScorerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Used => "used",
            Self::Disabled => "disabled",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Final outcome of validating one entered quantity against one document.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    /// The document (or scorer) quantity that satisfied the entered value.
    pub matched: Option<Quantity>,
    pub match_source: Option<MatchSource>,
    pub field_match: Option<FieldMatch>,
    pub extracted_quantities: ExtractedQuantities,
    pub scorer_info: Option<ScorerResult>,
    pub scorer_status: ScorerStatus,
    pub remarks: Option<String>,
}

impl ValidationVerdict {
    pub fn matched_value(&self) -> Option<f64> {
        self.matched.as_ref().map(|q| q.value)
    }
}

/// Explain a failed validation, listing every value that was checked.
fn failure_remarks(
    entered: f64,
    field: Option<&FieldMatch>,
    extracted: &ExtractedQuantities,
) -> String {
    let values = format_values(&extracted.values());
    match field {
        Some(f) => format!(
            "Delivery quantity {entered} does not match Weight of Cargo Discharged in document ({}). All extracted values: {values}",
            f.value()
        ),
        None => format!(
            "Delivery quantity {entered} not found in document. Could not locate 'Weight of Cargo Discharged' field. All extracted values: {values}"
        ),
    }
}

/// Runs tokenizer, field locator and resolver, then lets the scorer (if
/// any) override the mechanical verdict.
///
/// Holds no mutable state; one instance can serve concurrent callers.
pub struct Validator {
    scorer: Option<Arc<dyn ExternalScorer>>,
    policy: RetryPolicy,
    tolerance: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Validator {
    pub fn new(scorer: Option<Arc<dyn ExternalScorer>>) -> Self {
        Self {
            scorer,
            policy: RetryPolicy::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn scorer_enabled(&self) -> bool {
        self.scorer.as_ref().is_some_and(|s| s.is_enabled())
    }

    pub fn scorer_name(&self) -> Option<&str> {
        self.scorer.as_deref().map(|s| s.name())
    }

    /// Validate `entered` against the document text.
    pub async fn validate(&self, text: &str, entered: f64) -> ValidationVerdict {
        let extracted = quantity::tokenize(text);
        let field = quantity::locate_field(text);
        let baseline = resolver::resolve(entered, &extracted, field.as_ref(), self.tolerance);

        info!(
            entered,
            extracted = extracted.len(),
            field = ?field.as_ref().map(|f| f.value()),
            passed = baseline.passed,
            matched = ?baseline.matched_value(),
            "Baseline match"
        );

        let mut passed = baseline.passed;
        let mut matched = baseline.matched.clone();
        let mut match_source = baseline.source;

        let (scorer_info, scorer_status) = match self.scorer.as_deref() {
            Some(scorer) if scorer.is_enabled() => {
                let request = ScoreRequest {
                    text,
                    entered,
                    extracted: &extracted,
                    hinted_field_value: field.as_ref().map(|f| f.value()),
                };
                match self.score_with_retry(scorer, &request).await {
                    Ok(result) => {
                        info!(
                            scorer = scorer.name(),
                            is_valid = result.is_valid,
                            matched = ?result.matched_value,
                            confidence = result.confidence,
                            "Scorer judgment overrides baseline"
                        );
                        passed = result.is_valid;
                        if !passed {
                            matched = None;
                            match_source = None;
                        } else if let Some(v) = result.matched_value {
                            matched = Some(scorer_quantity(v, &extracted, field.as_ref()));
                            match_source = None;
                        }
                        (Some(result), ScorerStatus::Used)
                    }
                    Err(e) => {
                        warn!(
                            scorer = scorer.name(),
                            error = %e,
                            "Scorer unavailable, keeping baseline verdict"
                        );
                        (None, ScorerStatus::Unavailable(e.to_string()))
                    }
                }
            }
            _ => (None, ScorerStatus::Disabled),
        };

        let remarks = (!passed).then(|| failure_remarks(entered, field.as_ref(), &extracted));

        ValidationVerdict {
            passed,
            matched,
            match_source,
            field_match: field,
            extracted_quantities: extracted,
            scorer_info,
            scorer_status,
            remarks,
        }
    }

    /// Call the scorer under the retry policy. Rate-limit failures are
    /// retried with linear backoff; anything else, a timeout included,
    /// ends the attempt immediately.
    async fn score_with_retry(
        &self,
        scorer: &dyn ExternalScorer,
        request: &ScoreRequest<'_>,
    ) -> Result<ScorerResult, ScorerError> {
        let mut retry = 0;
        loop {
            let call = tokio::time::timeout(self.policy.call_timeout, scorer.score(request));
            let outcome = match call.await {
                Ok(result) => result,
                Err(_) => Err(ScorerError::Timeout(self.policy.call_timeout)),
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) if e.is_rate_limited() && retry < self.policy.max_retries => {
                    retry += 1;
                    let wait = self.policy.delay_for(retry);
                    warn!(
                        wait_secs = wait.as_secs_f64(),
                        attempt = retry,
                        max_retries = self.policy.max_retries,
                        "Scorer rate limited, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    debug!(error = %e, retries = retry, "Scorer call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Attribute the scorer's value to a document quantity when one exists.
fn scorer_quantity(
    value: f64,
    extracted: &ExtractedQuantities,
    field: Option<&FieldMatch>,
) -> Quantity {
    field
        .map(|f| &f.quantity)
        .filter(|q| q.value == value)
        .or_else(|| extracted.iter().find(|q| q.value == value))
        .cloned()
        .unwrap_or_else(|| Quantity {
            value,
            raw: value.to_string(),
            offset: 0,
        })
}
