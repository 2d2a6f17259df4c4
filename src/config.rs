use crate::resolver::DEFAULT_TOLERANCE;
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub scorer: ScorerSection,
}

fn default_db_path() -> String {
    "results/validations.db".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub tolerance: f64,
    pub preview_chars: usize,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            preview_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerBackend {
    None,
    Ollama,
    Remote,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScorerSection {
    pub backend: ScorerBackend,
    pub max_retries: u32,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
    pub max_prompt_chars: usize,
    pub ollama: EndpointSection,
    pub remote: EndpointSection,
}

impl Default for ScorerSection {
    fn default() -> Self {
        Self {
            backend: ScorerBackend::None,
            max_retries: 2,
            backoff_secs: 15,
            timeout_secs: 120,
            max_prompt_chars: 2000,
            ollama: EndpointSection {
                base_url: "http://localhost:11434/v1".to_string(),
                model: "qwen3:8b".to_string(),
            },
            remote: EndpointSection {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
            },
        }
    }
}

impl ScorerSection {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn model(&self) -> Option<&str> {
        match self.backend {
            ScorerBackend::None => None,
            ScorerBackend::Ollama => Some(&self.ollama.model),
            ScorerBackend::Remote => Some(&self.remote.model),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSection {
    pub base_url: String,
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            results_dir: default_results_dir(),
            validation: ValidationSection::default(),
            scorer: ScorerSection::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file found, using defaults");
            Ok(Self::default())
        }
    }
}
