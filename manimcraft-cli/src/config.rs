//! `manimcraft.toml` configuration

use manimcraft_agent::{AgentConfig, PromptSources, PythonRenderer, QUALITIES};
use manimcraft_error::{Error, ErrorKind, Result};
use manimcraft_llm::{ProviderConfig, ProviderType, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "manimcraft.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderSection,
    pub paths: PathsSection,
    pub limits: LimitsSection,
    pub renderer: RendererSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderType,
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Retries of a transient oracle failure before the job fails
    pub max_retries: usize,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: ProviderType::Anthropic,
            model: None,
            max_tokens: 19999,
            temperature: 1.0,
            api_key_env: None,
            base_url: None,
            timeout_secs: 600,
            max_retries: 3,
        }
    }
}

impl ProviderSection {
    pub fn api_key_env(&self) -> &str {
        match (&self.api_key_env, self.kind) {
            (Some(var), _) => var.as_str(),
            (None, ProviderType::Anthropic) => "ANTHROPIC_API_KEY",
            (None, ProviderType::OpenAI) => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub examples_dir: PathBuf,
    pub pages_dir: PathBuf,
    pub summaries_dir: PathBuf,
    pub supplement_file: PathBuf,
    /// Holds the generated code file and the renderer's media directory
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Relative to `work_dir`
    pub code_file: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            examples_dir: "documentation/examples".into(),
            pages_dir: "documentation/page_content".into(),
            summaries_dir: "documentation/summary".into(),
            supplement_file: "documentation/voiceover_doc.txt".into(),
            work_dir: ".".into(),
            output_dir: "output".into(),
            code_file: "outputs.py".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_attempts: usize,
    pub max_tool_rounds: usize,
    pub cacheable_tool_results: usize,
    pub generation_timeout_secs: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_tool_rounds: 25,
            cacheable_tool_results: 4,
            generation_timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSection {
    pub python: String,
    pub quality: String,
    pub scene: String,
    pub timeout_secs: u64,
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            quality: "low_quality".into(),
            scene: manimcraft_agent::ENTRY_POINT.into(),
            timeout_secs: 1200,
        }
    }
}

impl Config {
    /// Load from `path`, or from `manimcraft.toml` when present, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) if !p.exists() => {
                return Err(Error::file_not_found(p.display().to_string()).with_operation("Config::load"))
            }
            Some(p) => p.to_path_buf(),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };

        let text = std::fs::read_to_string(&path)?;
        Self::from_toml(&text).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            Error::config_invalid(format!("invalid configuration: {}", e))
                .with_operation("Config::from_toml")
                .set_source(e)
        })
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::config_invalid(msg).with_operation("Config::validate"));

        if self.limits.max_attempts == 0 {
            return invalid("limits.max_attempts must be at least 1".into());
        }
        if self.limits.generation_timeout_secs == 0 {
            return invalid("limits.generation_timeout_secs must be positive".into());
        }
        if self.renderer.timeout_secs == 0 {
            return invalid("renderer.timeout_secs must be positive".into());
        }
        if self.provider.timeout_secs == 0 {
            return invalid("provider.timeout_secs must be positive".into());
        }
        if !QUALITIES.contains(&self.renderer.quality.as_str()) {
            return invalid(format!(
                "renderer.quality '{}' is not one of {}",
                self.renderer.quality,
                QUALITIES.join(", ")
            ));
        }
        if self.renderer.scene.trim().is_empty() {
            return invalid("renderer.scene must not be empty".into());
        }
        Ok(())
    }

    /// Provider settings with the API key read from the environment
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let var = self.provider.api_key_env();
        let key = std::env::var(var).ok().filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            Error::new(ErrorKind::AuthenticationFailed, format!("environment variable {} is not set", var))
                .with_operation("Config::provider_config")
        })?;

        let mut config = match self.provider.kind {
            ProviderType::Anthropic => ProviderConfig::anthropic(key),
            ProviderType::OpenAI => ProviderConfig::openai(key),
        }
        .with_timeout(self.provider.timeout_secs);
        if let Some(model) = &self.provider.model {
            config = config.with_model(model.clone());
        }
        if let Some(url) = &self.provider.base_url {
            config = config.with_base_url(url.clone());
        }
        Ok(config)
    }

    pub fn code_file(&self) -> PathBuf {
        self.paths.work_dir.join(&self.paths.code_file)
    }

    pub fn media_dir(&self) -> PathBuf {
        self.paths.work_dir.join("media")
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.provider.model.clone(),
            max_tokens: self.provider.max_tokens,
            temperature: self.provider.temperature,
            max_attempts: self.limits.max_attempts,
            max_tool_rounds: self.limits.max_tool_rounds,
            cacheable_tool_results: self.limits.cacheable_tool_results,
            generation_timeout: Duration::from_secs(self.limits.generation_timeout_secs),
            code_file: self.code_file(),
            output_dir: self.paths.output_dir.clone(),
            retry: RetryPolicy::default().with_max_retries(self.provider.max_retries),
        }
    }

    pub fn renderer(&self) -> PythonRenderer {
        PythonRenderer::new(self.media_dir())
            .with_python(self.renderer.python.clone())
            .with_scene(self.renderer.scene.clone())
            .with_quality(self.renderer.quality.clone())
            .with_timeout(Duration::from_secs(self.renderer.timeout_secs))
    }

    pub fn prompt_sources(&self) -> PromptSources {
        PromptSources {
            examples_dir: self.paths.examples_dir.clone(),
            summaries_dir: self.paths.summaries_dir.clone(),
            supplement_file: self.paths.supplement_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider.kind, ProviderType::Anthropic);
        assert_eq!(config.provider.api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(config.limits.max_attempts, 5);
        assert_eq!(config.renderer.scene, "FullTutorial");
        assert_eq!(config.code_file(), PathBuf::from("./outputs.py"));
        assert_eq!(config.agent_config().retry, RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            [provider]
            kind = "openai"
            model = "o1"
            max_retries = 0

            [limits]
            max_attempts = 3

            [renderer]
            quality = "medium_quality"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.kind, ProviderType::OpenAI);
        assert_eq!(config.provider.api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.provider.max_tokens, 19999);
        assert_eq!(config.limits.max_attempts, 3);
        assert_eq!(config.limits.max_tool_rounds, 25);
        assert_eq!(config.renderer.quality, "medium_quality");

        let agent = config.agent_config();
        assert_eq!(agent.max_attempts, 3);
        assert_eq!(agent.model.as_deref(), Some("o1"));
        assert_eq!(agent.retry, RetryPolicy::none());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[limits]\nmax_attempts = \"many\"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.limits.max_attempts = 0;
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);

        let mut config = Config::default();
        config.renderer.quality = "ultra".into();
        assert!(config.validate().unwrap_err().message().contains("ultra"));

        let mut config = Config::default();
        config.renderer.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[paths]\noutput_dir = \"videos\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.paths.output_dir, PathBuf::from("videos"));

        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = Config::default();
        config.provider.api_key_env = Some("MANIMCRAFT_TEST_KEY_THAT_IS_NEVER_SET".into());
        let err = config.provider_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert!(err.message().contains("MANIMCRAFT_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
