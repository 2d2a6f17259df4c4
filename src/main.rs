mod config;
mod document;
mod error;
mod quantity;
mod record;
mod resolver;
mod result_db;
mod scorer;
mod service;
mod validator;

use clap::{Parser, Subcommand};
use config::{Config, ScorerBackend};
use document::{DocumentTextProvider, LocalTextProvider};
use result_db::{JsonFileStore, SqliteResultStore};
use scorer::{ExternalScorer, LlmScorer, ScorerError};
use service::{ValidationRequest, ValidationService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use validator::{RetryPolicy, Validator};

#[derive(Parser)]
#[command(
    name = "discharge-check",
    about = "Validate a delivery quantity against a shipping document"
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, env = "DISCHARGE_CHECK_CONFIG", default_value = "discharge_check.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an entered quantity against a document and persist the result
    Validate {
        document: PathBuf,
        #[arg(long)]
        quantity: String,
        #[arg(long)]
        record_id: Option<String>,
    },
    /// Show the quantities and discharged-quantity field found in a document
    Inspect { document: PathBuf },
    /// Ask the configured scorer to describe the document's key fields
    Structure { document: PathBuf },
    /// Report configuration and scorer health
    Status,
    /// List stored validation results
    History {
        #[arg(long)]
        record_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Build the scorer from config. A misconfigured scorer is not fatal:
/// validation runs in degraded mode on the mechanical match alone.
fn build_scorer(cfg: &Config) -> Option<Arc<dyn ExternalScorer>> {
    match LlmScorer::from_config(&cfg.scorer) {
        Ok(scorer) => Some(Arc::new(scorer)),
        Err(ScorerError::NotConfigured) => None,
        Err(e) => {
            warn!(error = %e, "Scorer could not be configured, continuing without it");
            None
        }
    }
}

fn build_service(cfg: &Config) -> Result<ValidationService, Box<dyn std::error::Error>> {
    let policy = RetryPolicy {
        max_retries: cfg.scorer.max_retries,
        backoff: cfg.scorer.backoff(),
        call_timeout: cfg.scorer.timeout(),
    };
    let validator = Validator::new(build_scorer(cfg))
        .with_policy(policy)
        .with_tolerance(cfg.validation.tolerance);

    Ok(ValidationService::new(Box::new(LocalTextProvider), validator)
        .with_preview_chars(cfg.validation.preview_chars)
        .with_store(Box::new(JsonFileStore::new(&cfg.results_dir)))
        .with_store(Box::new(SqliteResultStore::new(&cfg.db_path)?)))
}

fn read_document(path: &Path) -> Result<(String, Vec<u8>), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok((file_name, bytes))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Validate {
            document,
            quantity,
            record_id,
        } => {
            let service = build_service(&cfg)?;
            let (file_name, bytes) = read_document(&document)?;
            let request = ValidationRequest {
                record_id,
                delivery_quantity: Some(quantity),
                file_name,
                document: bytes,
            };
            let outcome = match service.process(&request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if e.is_fatal() {
                        error!(error = %e, "Request rejected");
                    }
                    return Err(e.into());
                }
            };
            debug!(verdict = ?outcome.verdict, "Verdict");
            for location in &outcome.locations {
                info!(location = %location, "Result persisted");
            }
            println!("{}", serde_json::to_string_pretty(&outcome.record)?);
        }
        Command::Inspect { document } => {
            let (file_name, bytes) = read_document(&document)?;
            let text = LocalTextProvider.extract(&file_name, &bytes)?;
            let extracted = quantity::tokenize(&text);
            let field = quantity::locate_field(&text);
            let report = serde_json::json!({
                "file": file_name,
                "field_match": field,
                "extracted_quantities": extracted,
                "text_preview": document::truncate_chars(&text, cfg.validation.preview_chars),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Structure { document } => {
            let scorer = LlmScorer::from_config(&cfg.scorer)?;
            info!(model = scorer.model(), "Analyzing document structure");
            let (file_name, bytes) = read_document(&document)?;
            let text = LocalTextProvider.extract(&file_name, &bytes)?;
            let structure = scorer.analyze_structure(&text).await?;
            println!("{}", serde_json::to_string_pretty(&structure)?);
        }
        Command::Status => {
            let validator = Validator::new(build_scorer(&cfg));
            let report = serde_json::json!({
                "status": "healthy",
                "service": "Delivery Quantity Validation",
                "scorer_backend": format!("{:?}", cfg.scorer.backend).to_lowercase(),
                "scorer_model": cfg.scorer.model(),
                "scorer_enabled": validator.scorer_enabled(),
                "scorer_name": validator.scorer_name(),
                "tolerance": cfg.validation.tolerance,
                "db_path": cfg.db_path,
                "results_dir": cfg.results_dir,
            });
            if cfg.scorer.backend != ScorerBackend::None && !validator.scorer_enabled() {
                warn!("Scorer backend configured but not usable");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::History { record_id, limit } => {
            let db = SqliteResultStore::new(&cfg.db_path)?;
            match record_id {
                Some(id) => match result_db::ResultStore::get(&db, &id)? {
                    Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                    None => println!("No result stored for record {id}"),
                },
                None => {
                    let (total, passed) = db.get_counts()?;
                    info!(total, passed, "Result statistics");
                    for row in db.list_recent(limit)? {
                        println!(
                            "{}  {:<7}  entered={}  matched={}  scorer={}  {}",
                            row.processed_at,
                            row.status,
                            row.delivery_quantity,
                            row.matched_quantity
                                .map(|v| v.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                            row.scorer_status,
                            row.record_id,
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
