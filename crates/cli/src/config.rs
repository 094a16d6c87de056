//! `goldi.toml` plus environment overrides.

use std::path::{Path, PathBuf};

use goldi_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

/// File read when `--config` is not given, if present.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "goldi.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub port: u16,
    /// Requests per minute per client IP.
    pub rate_limit: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            rate_limit: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            model: pipeline.model,
            max_tokens: pipeline.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct GoldiConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl GoldiConfig {
    /// Load `path`, or `goldi.toml` in the working directory when it exists,
    /// then apply environment overrides and validate.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// `GOLDI_PORT`, `GOLDI_RATE_LIMIT` and `GOLDI_MODEL` win over the file.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = var("GOLDI_PORT") {
            self.server.port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "GOLDI_PORT",
                value,
            })?;
        }
        if let Some(value) = var("GOLDI_RATE_LIMIT") {
            self.server.rate_limit = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "GOLDI_RATE_LIMIT",
                value,
            })?;
        }
        if let Some(value) = var("GOLDI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.model = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.rate_limit == 0 {
            return Err(ConfigError::Invalid("server.rate_limit must be at least 1".into()));
        }
        self.pipeline_config().validate().map_err(ConfigError::Invalid)
    }

    /// The pipeline settings with the `[llm]` table applied.
    pub(crate) fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            ..self.pipeline.clone()
        }
    }
}

/// The Anthropic API key from the environment.
pub(crate) fn api_key(var: impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    var("ANTHROPIC_API_KEY")
        .filter(|k| !k.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)
}
