//! Configuration parsing and validation.
//!
//! `hrag` reads a single TOML file (default `./config/hrag.toml`). Every
//! section except `[db]` has defaults, so a minimal file is just:
//!
//! ```toml
//! [db]
//! path = "./data/hrag.sqlite"
//! ```
//!
//! See `config/hrag.example.toml` for every key.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use hybrid_rag_core::chunk::ChunkParams;
use hybrid_rag_core::prompt::{DEFAULT_FORMAT_REQUIREMENT, DEFAULT_SYSTEM_PROMPT};
use hybrid_rag_core::schema::{IndexSchema, DEFAULT_IMAGE_DIMS, DEFAULT_TEXT_DIMS};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
        }
    }
}

fn default_index_name() -> String {
    "multimodal_index".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            data_path: default_data_path(),
            image_path: default_image_path(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_data_path() -> PathBuf {
    PathBuf::from("./data/docs")
}
fn default_image_path() -> PathBuf {
    PathBuf::from("./data/images")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_text_dims")]
    pub text_dims: usize,
    #[serde(default = "default_image_dims")]
    pub image_dims: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            text_dims: default_text_dims(),
            image_dims: default_image_dims(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_text_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_image_model() -> String {
    "clip-vit-b-32".to_string()
}
fn default_text_dims() -> usize {
    DEFAULT_TEXT_DIMS
}
fn default_image_dims() -> usize {
    DEFAULT_IMAGE_DIMS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_contexts: default_max_contexts(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_max_contexts() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_format_requirement")]
    pub format_requirement: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            format_requirement: default_format_requirement(),
        }
    }
}

fn default_format_requirement() -> String {
    DEFAULT_FORMAT_REQUIREMENT.to_string()
}

impl PromptConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_provider")]
    pub provider: String,
    #[serde(default = "default_generator_url")]
    pub url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_generator_provider(),
            url: default_generator_url(),
            model: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl GeneratorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generator_provider() -> String {
    "disabled".to_string()
}
fn default_generator_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8888".to_string()
}

impl Config {
    /// Defaults everywhere, database at `./data/hrag.sqlite`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/hrag.sqlite"),
            },
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            indexing: IndexingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompt: PromptConfig::default(),
            generator: GeneratorConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Validated chunking parameters.
    pub fn chunk_params(&self) -> Result<ChunkParams> {
        Ok(ChunkParams::new(
            self.chunking.chunk_size,
            self.chunking.overlap,
        )?)
    }

    /// Index schema sized to the configured encoders.
    pub fn schema(&self) -> IndexSchema {
        IndexSchema::hybrid(self.embedding.text_dims, self.embedding.image_dims)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.index.name.trim().is_empty() {
        bail!("index.name must not be empty");
    }

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.text_dims == 0 || config.embedding.image_dims == 0 {
        bail!("embedding.text_dims and embedding.image_dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or local.",
            other
        ),
    }

    // Validate generator
    match config.generator.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.generator.model.is_none() {
                bail!("generator.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown generator provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(toml_src: &str) -> Result<Config> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_src.as_bytes()).unwrap();
        load_config(file.path())
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let cfg = parse("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(cfg.index.name, "multimodal_index");
        assert_eq!(cfg.chunking.chunk_size, 512);
        assert_eq!(cfg.chunking.overlap, 50);
        assert_eq!(cfg.indexing.batch_size, 100);
        assert_eq!(cfg.retrieval.top_k, 10);
        assert_eq!(cfg.retrieval.max_contexts, 5);
        assert_eq!(cfg.embedding.text_dims, 384);
        assert_eq!(cfg.embedding.image_dims, 512);
        assert!(!cfg.generator.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:8888");
        assert_eq!(cfg.prompt.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_overlap_must_be_below_chunk_size() {
        let err = parse("[db]\npath = \"x\"\n[chunking]\nchunk_size = 50\noverlap = 50\n")
            .unwrap_err();
        assert!(err.to_string().contains("chunking.overlap"));
    }

    #[test]
    fn test_rejects_zero_batch_and_top_k() {
        assert!(parse("[db]\npath = \"x\"\n[indexing]\nbatch_size = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_unknown_providers() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"cloud\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[generator]\nprovider = \"openai\"\n").is_err());
        assert!(parse(
            "[db]\npath = \"x\"\n[generator]\nprovider = \"openai\"\nmodel = \"llama3\"\n"
        )
        .is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_minimal_config_is_valid() {
        let cfg = Config::minimal();
        validate(&cfg).unwrap();
        assert_eq!(cfg.schema(), IndexSchema::default());
        assert_eq!(cfg.chunk_params().unwrap().stride(), 462);
    }
}
