//! Configuration management for ragline.
//!
//! Settings are an explicit value built once at startup and handed to every
//! component constructor. Sources are layered, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `<user config dir>/ragline/config.toml`
//! 3. `./ragline.toml` (or the file passed with `--config`)
//! 4. `RAGLINE_*` environment variables, `__` separating section and key
//!    (e.g. `RAGLINE_LLM__EMBEDDING_BACKEND=cohere`)

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the project-local configuration file (without extension).
pub const LOCAL_CONFIG_NAME: &str = "ragline";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "RAGLINE";

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A `${VAR}` reference points at an unset environment variable.
    #[error("Environment variable referenced by `{key}` is not set: {reason}")]
    MissingEnv { key: String, reason: String },

    /// A value is present but violates a constraint.
    #[error("Invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Application identity reported by `ragline info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "ragline".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Upload acceptance rules and on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Accepted MIME types
    pub allowed_types: Vec<String>,
    /// Upload size limit in megabytes
    pub max_size_mb: u64,
    /// Buffer size used when writing uploads, in bytes
    pub default_chunk_size: usize,
    /// Root for `files/` and `database/`
    pub data_dir: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            allowed_types: vec![
                "text/plain".to_string(),
                "text/markdown".to_string(),
                "application/pdf".to_string(),
            ],
            max_size_mb: 10,
            default_chunk_size: 512 * 1024,
            data_dir: PathBuf::from("./assets"),
        }
    }
}

impl FileConfig {
    /// Directory holding uploaded files, one subdirectory per project.
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    /// Directory holding the JSON document database.
    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join("database")
    }

    /// Upload size limit in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

/// Credentials and endpoint for an OpenAI-compatible API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub api_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Credentials and endpoint for the Cohere API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CohereConfig {
    pub api_key: Option<String>,
    pub api_url: String,
}

impl Default for CohereConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.cohere.ai/v1".to_string(),
        }
    }
}

/// Backend selection and model parameters for embedding and generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub generation_backend: String,
    pub embedding_backend: String,
    pub generation_model_id: String,
    pub embedding_model_id: String,
    pub embedding_model_size: usize,
    /// Messages are truncated to this many characters before sending
    pub input_max_characters: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub openai: OpenAiConfig,
    pub cohere: CohereConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            generation_backend: "openai".to_string(),
            embedding_backend: "openai".to_string(),
            generation_model_id: "gpt-4o-mini".to_string(),
            embedding_model_id: "text-embedding-3-small".to_string(),
            embedding_model_size: 1536,
            input_max_characters: 1024,
            max_output_tokens: 200,
            temperature: 0.1,
            openai: OpenAiConfig::default(),
            cohere: CohereConfig::default(),
        }
    }
}

/// Similarity measure used when a collection is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMethod {
    #[default]
    Cosine,
    Dot,
}

/// Vector store backend and connection details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    pub backend: String,
    pub url: String,
    pub api_key: Option<String>,
    pub distance: DistanceMethod,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: "qdrant".to_string(),
            url: "http://localhost:6334".to_string(),
            api_key: None,
            distance: DistanceMethod::Cosine,
        }
    }
}

/// Template catalog language pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub primary_lang: String,
    pub default_lang: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            primary_lang: "en".to_string(),
            default_lang: "en".to_string(),
        }
    }
}

/// Bounds on external calls and indexing throughput.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub embedding_concurrency: usize,
    pub upsert_batch_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
            embedding_concurrency: 8,
            upsert_batch_size: 100,
        }
    }
}

/// Defaults applied when a request leaves a parameter unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub limit: usize,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            overlap_size: 20,
            limit: 5,
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppConfig,
    pub files: FileConfig,
    pub llm: LlmConfig,
    pub vectordb: VectorDbConfig,
    pub templates: TemplateConfig,
    pub limits: LimitsConfig,
    pub defaults: RequestDefaults,
}

impl Settings {
    /// Load settings from the layered sources.
    ///
    /// When `path` is given it replaces `./ragline.toml` and must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(dir) = dirs::config_dir() {
            let user_file = dir.join("ragline").join("config.toml");
            debug!("Looking for user config at {:?}", user_file);
            builder = builder.add_source(File::from(user_file).required(false));
        }

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(LOCAL_CONFIG_NAME).required(false)),
        };

        builder = builder.add_source(env_source());

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.finalize()
    }

    /// Parse settings from a TOML string, skipping file and environment sources.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.finalize()
    }

    /// Expand `${VAR}` secrets and `~` paths, then validate.
    fn finalize(mut self) -> Result<Self, ConfigError> {
        self.llm.openai.api_key = resolve_secret("llm.openai.api_key", &self.llm.openai.api_key)?;
        self.llm.cohere.api_key = resolve_secret("llm.cohere.api_key", &self.llm.cohere.api_key)?;
        self.vectordb.api_key = resolve_secret("vectordb.api_key", &self.vectordb.api_key)?;

        let data_dir = self.files.data_dir.to_string_lossy().to_string();
        self.files.data_dir = PathBuf::from(shellexpand::tilde(&data_dir).as_ref());

        self.validate()?;
        Ok(self)
    }

    /// Check invariants that must hold before any component is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.defaults;
        if d.chunk_size == 0 {
            return Err(invalid("defaults.chunk_size", "must be greater than zero"));
        }
        if d.overlap_size >= d.chunk_size {
            return Err(invalid(
                "defaults.overlap_size",
                format!(
                    "must be less than defaults.chunk_size ({} >= {})",
                    d.overlap_size, d.chunk_size
                ),
            ));
        }
        if d.limit == 0 {
            return Err(invalid("defaults.limit", "must be greater than zero"));
        }
        if self.llm.embedding_model_size == 0 {
            return Err(invalid("llm.embedding_model_size", "must be greater than zero"));
        }
        if self.llm.input_max_characters == 0 {
            return Err(invalid("llm.input_max_characters", "must be greater than zero"));
        }
        if self.limits.request_timeout_secs == 0 {
            return Err(invalid("limits.request_timeout_secs", "must be greater than zero"));
        }
        if self.limits.embedding_concurrency == 0 {
            return Err(invalid("limits.embedding_concurrency", "must be greater than zero"));
        }
        if self.limits.upsert_batch_size == 0 {
            return Err(invalid("limits.upsert_batch_size", "must be greater than zero"));
        }
        if self.templates.primary_lang.trim().is_empty() {
            return Err(invalid("templates.primary_lang", "must not be empty"));
        }
        if self.templates.default_lang.trim().is_empty() {
            return Err(invalid("templates.default_lang", "must not be empty"));
        }
        if self.files.max_size_mb == 0 {
            return Err(invalid("files.max_size_mb", "must be greater than zero"));
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("files.allowed_types")
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Expand `${VAR}` references in an optional secret.
///
/// Empty strings are treated as unset.
fn resolve_secret(key: &str, value: &Option<String>) -> Result<Option<String>, ConfigError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => shellexpand::env(raw)
            .map(|expanded| Some(expanded.into_owned()))
            .map_err(|e| ConfigError::MissingEnv {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.defaults.chunk_size, 100);
        assert_eq!(settings.defaults.overlap_size, 20);
        assert_eq!(settings.defaults.limit, 5);
        assert_eq!(settings.limits.upsert_batch_size, 100);
        assert_eq!(settings.vectordb.distance, DistanceMethod::Cosine);
    }

    #[test]
    fn test_from_toml_overrides_sections() {
        let settings = Settings::from_toml_str(
            r#"
            [llm]
            embedding_backend = "cohere"
            embedding_model_size = 384

            [vectordb]
            backend = "memory"
            distance = "dot"

            [templates]
            primary_lang = "ar"
            "#,
        )
        .unwrap();

        assert_eq!(settings.llm.embedding_backend, "cohere");
        assert_eq!(settings.llm.generation_backend, "openai");
        assert_eq!(settings.llm.embedding_model_size, 384);
        assert_eq!(settings.vectordb.backend, "memory");
        assert_eq!(settings.vectordb.distance, DistanceMethod::Dot);
        assert_eq!(settings.templates.primary_lang, "ar");
        assert_eq!(settings.templates.default_lang, "en");
    }

    #[test]
    fn test_overlap_must_be_less_than_chunk_size() {
        let err = Settings::from_toml_str(
            r#"
            [defaults]
            chunk_size = 50
            overlap_size = 50
            "#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "defaults.overlap_size",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Settings::from_toml_str("[limits]\nupsert_batch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("limits.upsert_batch_size"));
    }

    #[test]
    fn test_resolve_secret_plain_and_empty() {
        assert_eq!(resolve_secret("k", &None).unwrap(), None);
        assert_eq!(resolve_secret("k", &Some("  ".to_string())).unwrap(), None);
        assert_eq!(
            resolve_secret("k", &Some("sk-plain".to_string())).unwrap(),
            Some("sk-plain".to_string())
        );
    }

    #[test]
    fn test_resolve_secret_missing_env() {
        let err = resolve_secret(
            "llm.openai.api_key",
            &Some("${RAGLINE_TEST_SURELY_UNSET_VAR}".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv { .. }));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[defaults]\nlimit = 7\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.defaults.limit, 7);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_file_config_paths() {
        let files = FileConfig {
            data_dir: PathBuf::from("/tmp/rag"),
            ..Default::default()
        };
        assert_eq!(files.files_dir(), PathBuf::from("/tmp/rag/files"));
        assert_eq!(files.database_dir(), PathBuf::from("/tmp/rag/database"));
        assert_eq!(files.max_size_bytes(), 10 * 1024 * 1024);
    }
}
