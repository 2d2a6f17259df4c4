// src/service.rs

use crate::document::DocumentTextProvider;
use crate::error::ValidationError;
use crate::record::{ResultRecord, generate_record_id};
use crate::result_db::{ResultStore, check_record_id};
use crate::validator::{ValidationVerdict, Validator};
use tracing::{Instrument, info, info_span, warn};

/// One validation request as it arrives from the caller.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub record_id: Option<String>,
    /// Entered quantity exactly as supplied; parsed here.
    pub delivery_quantity: Option<String>,
    pub file_name: String,
    pub document: Vec<u8>,
}

/// What the service hands back after a completed validation.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub record: ResultRecord,
    pub verdict: ValidationVerdict,
    /// Where the record was persisted, one entry per store that succeeded.
    pub locations: Vec<String>,
}

/// Parse the entered quantity. Accepts thousands separators ("1,234.56").
pub fn parse_entered_quantity(raw: Option<&str>) -> Result<f64, ValidationError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ValidationError::Input("Missing required field: delivery_quantity".into()))?;
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ValidationError::Input(format!("delivery_quantity must be a number, got '{raw}'"))
        })
}

/// Request parsing, text extraction, validation and persistence, in that
/// order. Only input problems and document extraction failures abort.
pub struct ValidationService {
    provider: Box<dyn DocumentTextProvider>,
    validator: Validator,
    stores: Vec<Box<dyn ResultStore>>,
    preview_chars: usize,
}

impl ValidationService {
    pub fn new(provider: Box<dyn DocumentTextProvider>, validator: Validator) -> Self {
        Self {
            provider,
            validator,
            stores: Vec::new(),
            preview_chars: 500,
        }
    }

    pub fn with_store(mut self, store: Box<dyn ResultStore>) -> Self {
        self.stores.push(store);
        self
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    /// Extract the document text through the configured provider.
    pub fn extract_text(
        &self,
        file_name: &str,
        document: &[u8],
    ) -> Result<String, ValidationError> {
        self.provider.extract(file_name, document)
    }

    pub async fn process(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ValidationError> {
        let entered = parse_entered_quantity(request.delivery_quantity.as_deref())?;
        if request.document.is_empty() {
            return Err(ValidationError::Input("Document is empty".into()));
        }
        let record_id = match request.record_id.as_deref().map(str::trim) {
            Some("") => return Err(ValidationError::Input("record_id must not be empty".into())),
            Some(id) => {
                check_record_id(id)?;
                id.to_string()
            }
            None => generate_record_id(&request.document, entered),
        };

        let span = info_span!("validate", record_id = %record_id, file = %request.file_name);
        async {
            info!(entered, "Validating delivery quantity");

            let text = self.extract_text(&request.file_name, &request.document)?;
            let verdict = self.validator.validate(&text, entered).await;
            let record = ResultRecord::from_verdict(
                &record_id,
                entered,
                &text,
                &verdict,
                self.preview_chars,
            );

            let mut locations = Vec::new();
            for store in &self.stores {
                match store.put(&record) {
                    Ok(location) => locations.push(location),
                    Err(e) => warn!(error = %e, "Failed to persist result"),
                }
            }

            info!(
                status = record.status.as_str(),
                matched = ?record.matched_quantity,
                "Validation complete"
            );
            Ok::<_, ValidationError>(ValidationOutcome {
                record,
                verdict,
                locations,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LocalTextProvider;
    use crate::record::RecordStatus;
    use crate::result_db::{JsonFileStore, SqliteResultStore};

    /// Records nothing and always fails.
    struct BrokenStore;

    impl ResultStore for BrokenStore {
        fn put(&self, _record: &ResultRecord) -> Result<String, ValidationError> {
            Err(ValidationError::Config("disk full".into()))
        }

        fn get(&self, _record_id: &str) -> Result<Option<ResultRecord>, ValidationError> {
            Ok(None)
        }
    }

    fn request(qty: Option<&str>, id: Option<&str>, body: &str) -> ValidationRequest {
        ValidationRequest {
            record_id: id.map(str::to_string),
            delivery_quantity: qty.map(str::to_string),
            file_name: "delivery.txt".to_string(),
            document: body.as_bytes().to_vec(),
        }
    }

    fn service() -> ValidationService {
        ValidationService::new(Box::new(LocalTextProvider), Validator::default())
    }

    #[test]
    fn test_parse_entered_quantity() {
        assert_eq!(parse_entered_quantity(Some("1,234.56")).unwrap(), 1234.56);
        assert_eq!(parse_entered_quantity(Some(" 0 ")).unwrap(), 0.0);
        assert_eq!(parse_entered_quantity(Some("-5")).unwrap(), -5.0);
        assert!(matches!(
            parse_entered_quantity(None),
            Err(ValidationError::Input(_))
        ));
        assert!(matches!(
            parse_entered_quantity(Some("abc")),
            Err(ValidationError::Input(_))
        ));
        assert!(parse_entered_quantity(Some("NaN")).is_err());
        assert!(parse_entered_quantity(Some("inf")).is_err());
    }

    #[tokio::test]
    async fn test_process_success_persists_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service()
            .with_store(Box::new(JsonFileStore::new(dir.path())))
            .with_store(Box::new(SqliteResultStore::in_memory().unwrap()));

        let out = svc
            .process(&request(
                Some("1234.56"),
                Some("REC-100"),
                "WEIGHT OF CARGO DISCHARGED: 1,234.56 MT",
            ))
            .await
            .unwrap();

        assert_eq!(out.record.status, RecordStatus::Success);
        assert_eq!(out.record.matched_quantity, Some(1234.56));
        assert_eq!(out.locations.len(), 2);
        assert!(dir.path().join("REC-100/processed/result.json").exists());
    }

    #[tokio::test]
    async fn test_no_match_is_not_an_error() {
        let out = service()
            .process(&request(Some("9999"), Some("REC-2"), "Qty 12 and 40"))
            .await
            .unwrap();
        assert_eq!(out.record.status, RecordStatus::Error);
        assert!(out.record.remarks.unwrap().contains("All extracted values: [12, 40]"));
    }

    #[tokio::test]
    async fn test_generated_record_id_is_stable() {
        let svc = service();
        let req = request(Some("12"), None, "Qty 12");
        let a = svc.process(&req).await.unwrap();
        let b = svc.process(&req).await.unwrap();
        assert_eq!(a.record.record_id, b.record.record_id);
        assert_eq!(a.record.record_id.len(), 16);
    }

    #[tokio::test]
    async fn test_input_errors_abort() {
        let svc = service();
        let err = svc.process(&request(None, Some("R"), "Qty 12")).await.unwrap_err();
        assert!(matches!(err, ValidationError::Input(_)));
        let err = svc
            .process(&request(Some("twelve"), Some("R"), "Qty 12"))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Input(_)));
        let err = svc.process(&request(Some("12"), Some("  "), "Qty 12")).await.unwrap_err();
        assert!(matches!(err, ValidationError::Input(_)));
        let err = svc.process(&request(Some("12"), Some("R"), "")).await.unwrap_err();
        assert!(matches!(err, ValidationError::Input(_)));
    }

    #[tokio::test]
    async fn test_path_like_record_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service().with_store(Box::new(JsonFileStore::new(dir.path())));
        for id in ["a/b", "..", "x\\y"] {
            let err = svc
                .process(&request(Some("12"), Some(id), "Qty 12"))
                .await
                .unwrap_err();
            assert!(matches!(err, ValidationError::Input(_)), "{id}");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_document_failure_aborts() {
        let mut req = request(Some("12"), Some("R"), "not a pdf");
        req.file_name = "scan.pdf".to_string();
        let err = service().process(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::DocumentUnavailable(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_fatal() {
        let svc = service().with_store(Box::new(BrokenStore));
        let out = svc
            .process(&request(Some("12"), Some("R"), "Qty 12"))
            .await
            .unwrap();
        assert_eq!(out.record.status, RecordStatus::Success);
        assert!(out.locations.is_empty());
    }
}
