//! Run configuration
//!
//! A [`Config`] is built once per invocation (defaults, then an optional JSON
//! file, then CLI overrides) and passed by reference into every step.

use crate::embedding::{Embedder, HashedEmbedder, OpenAiEmbedder};
use crate::error::{CorplinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How much of the review is delegated to the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiLevel {
    /// Reviewer fills every decision by hand.
    #[default]
    Manual,
    /// The LLM pre-fills decisions; the reviewer checks them.
    Assist,
    /// Classify, autofill and standardize in one go.
    Auto,
}

impl FromStr for AiLevel {
    type Err = CorplinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" | "1" => Ok(AiLevel::Manual),
            "assist" | "2" => Ok(AiLevel::Assist),
            "auto" | "3" => Ok(AiLevel::Auto),
            other => Err(CorplinkError::Config(format!("unknown ai_level: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Hashed,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    /// Vector width of the hashed embedder.
    pub dimensions: usize,
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashed,
            model: "text-embedding-3-small".to_string(),
            dimensions: 256,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory; relative file names below resolve against it.
    pub data_dir: PathBuf,
    pub registry_path: PathBuf,
    pub raw_file: PathBuf,
    pub dataset_file: PathBuf,
    pub review_file: PathBuf,
    pub canonical_list_file: PathBuf,
    pub fuzzy_threshold: f64,
    pub semantic_threshold: f32,
    pub embed_batch_size: usize,
    pub advisory_batch_size: usize,
    /// Semantic advisory matching and noise scoring; off means no embedding service.
    pub semantic: bool,
    pub ai_level: AiLevel,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    /// Never read from or written to the config file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            registry_path: PathBuf::from("registry.db"),
            raw_file: PathBuf::from("sentences.csv"),
            dataset_file: PathBuf::from("result.csv"),
            review_file: PathBuf::from("result_mapping_todo.csv"),
            canonical_list_file: PathBuf::from("canonical_list.csv"),
            fuzzy_threshold: 90.0,
            semantic_threshold: 0.82,
            embed_batch_size: 64,
            advisory_batch_size: 30,
            semantic: true,
            ai_level: AiLevel::Manual,
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load from a JSON file; absent keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CorplinkError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            CorplinkError::Config(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.fuzzy_threshold) {
            return Err(CorplinkError::Config(format!(
                "fuzzy_threshold must be within 0-100, got {}",
                self.fuzzy_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&self.semantic_threshold) {
            return Err(CorplinkError::Config(format!(
                "semantic_threshold must be within -1..1, got {}",
                self.semantic_threshold
            )));
        }
        if self.embed_batch_size == 0 || self.advisory_batch_size == 0 {
            return Err(CorplinkError::Config("batch sizes must be positive".to_string()));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.resolve(&self.registry_path)
    }

    pub fn raw_path(&self) -> PathBuf {
        self.resolve(&self.raw_file)
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.resolve(&self.dataset_file)
    }

    pub fn review_path(&self) -> PathBuf {
        self.resolve(&self.review_file)
    }

    pub fn canonical_list_path(&self) -> PathBuf {
        self.resolve(&self.canonical_list_file)
    }

    /// The embedding service for this run, or `None` when semantic matching is off.
    pub fn embedder(&self) -> Result<Option<Box<dyn Embedder>>> {
        if !self.semantic {
            return Ok(None);
        }
        let embedder: Box<dyn Embedder> = match self.embedding.provider {
            EmbeddingProvider::Hashed => Box::new(HashedEmbedder::new(self.embedding.dimensions)),
            EmbeddingProvider::OpenAi => {
                let api_key = self.api_key.clone().ok_or_else(|| {
                    CorplinkError::Config(
                        "openai embeddings need OPENAI_API_KEY or --api-key".to_string(),
                    )
                })?;
                Box::new(OpenAiEmbedder::new(
                    api_key,
                    self.embedding.base_url.clone(),
                    self.embedding.model.clone(),
                ))
            }
        };
        Ok(Some(embedder))
    }
}
