use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub faces: FaceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default)]
    pub image_roots: Vec<PathBuf>,
    #[serde(default)]
    pub document_roots: Vec<PathBuf>,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_document_extensions")]
    pub document_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            image_roots: Vec::new(),
            document_roots: Vec::new(),
            image_extensions: default_image_extensions(),
            document_extensions: default_document_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff", "heic", "heif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_document_extensions() -> Vec<String> {
    ["txt", "md", "pdf", "docx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaceConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_face_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub min_confidence: f32,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_face_retries(),
            min_confidence: 0.0,
        }
    }
}

impl FaceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_face_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_max_k() -> usize {
    100
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
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A config pointing at `db_path` with every other section defaulted.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            scan: ScanConfig::default(),
            faces: FaceConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.default_k == 0 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    if config.retrieval.default_k > config.retrieval.max_k {
        anyhow::bail!("retrieval.default_k must be <= retrieval.max_k");
    }

    if config.scan.image_extensions.is_empty() && config.scan.document_extensions.is_empty() {
        anyhow::bail!("scan needs at least one image or document extension");
    }

    match config.faces.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.faces.url.is_none() {
                anyhow::bail!("faces.url must be set when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown face provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.faces.min_confidence) {
        anyhow::bail!("faces.min_confidence must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.max_input_chars == 0 {
            anyhow::bail!("embedding.max_input_chars must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse("[db]\npath = \"/tmp/hbi.sqlite\"\n").unwrap();
        assert_eq!(config.retrieval.default_k, 5);
        assert!(!config.faces.is_enabled());
        assert!(!config.embedding.is_enabled());
        assert!(config.scan.document_extensions.contains(&"docx".to_string()));
        assert!(config.scan.image_extensions.contains(&"heic".to_string()));
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn enabled_embedding_requires_dims_and_model() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("dims"));
    }

    #[test]
    fn http_faces_require_url() {
        let err = parse(
            r#"
            [db]
            path = "x.sqlite"
            [faces]
            provider = "http"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("faces.url"));
    }

    #[test]
    fn unknown_providers_are_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[faces]\nprovider = \"magic\"\n").is_err());
    }

    #[test]
    fn default_k_must_fit_under_max_k() {
        let err = parse("[db]\npath = \"x\"\n[retrieval]\ndefault_k = 10\nmax_k = 3\n").unwrap_err();
        assert!(err.to_string().contains("max_k"));
    }
}
