//! Layered settings.
//!
//! [`Settings`] are extracted with figment, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a YAML file (`--config`, or `note-interpreter.yaml` in the working
//!    directory when present)
//! 3. `NOTE_INTERPRETER_*` environment variables, `__` separating nested
//!    keys (`NOTE_INTERPRETER_LLM__MODEL=gpt-4o-mini`)
//!
//! The binary applies CLI flags on top. API keys are never part of the
//! settings; they come from `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::agent::clarify::{ClarificationLoop, DEFAULT_MAX_ROUNDS};
use crate::agent::input::{AnswerMode, PlainTextPolicy};
use crate::api::anthropic::{AnthropicClient, DEFAULT_ANTHROPIC_MODEL};
use crate::api::client::{ChatClient, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::api::openai::{DEFAULT_OPENAI_MODEL, OpenAiClient};
use crate::api::retry::RetryConfig;
use crate::error::{Error, Result};
use crate::io::read_yaml;
use crate::prompt::builder::SystemPromptBuilder;
use crate::tools::provider::ProviderKind;

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "note-interpreter.yaml";
pub const ENV_PREFIX: &str = "NOTE_INTERPRETER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// `openai` or `anthropic`.
    pub provider: String,
    /// Model id; the provider's default when unset.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries of transient failures per call.
    pub max_retries: u32,
    /// Override of the vendor endpoint URL.
    pub base_url: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi.to_string(),
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 120,
            max_retries: 2,
            base_url: None,
        }
    }
}

impl LlmSettings {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        self.provider.parse()
    }

    /// Configured model, or the provider default.
    pub fn model_name(&self) -> Result<String> {
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return Ok(model.to_string());
        }
        Ok(match self.provider_kind()? {
            ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        }
        .to_string())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_retries(self.max_retries)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub log_to_file: bool,
    pub log_dir: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub max_clarification_rounds: u32,
    pub answer_mode: AnswerMode,
    pub plain_text_policy: PlainTextPolicy,
    /// YAML prompt layout.
    pub prompt_config: PathBuf,
    pub classification_file: Option<PathBuf>,
    pub schema_file: Option<PathBuf>,
    pub parameters_file: Option<PathBuf>,
    pub logging: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            max_clarification_rounds: DEFAULT_MAX_ROUNDS,
            answer_mode: AnswerMode::default(),
            plain_text_policy: PlainTextPolicy::default(),
            prompt_config: PathBuf::from("resources/prompt_config.yaml"),
            classification_file: None,
            schema_file: None,
            parameters_file: None,
            logging: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Extract and validate settings. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(Error::Config(format!(
                    "settings file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_SETTINGS_FILE),
        };
        debug!("Loading settings (file: {})", file.display());

        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Yaml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::Config(format!("invalid settings: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.llm.provider_kind()?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config(format!(
                "llm.temperature {} is outside 0..=2",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::Config("llm.max_tokens must be positive".into()));
        }
        crate::logging::parse_level(&self.logging.level)?;
        Ok(())
    }

    /// A clarification loop wired from these settings. Optional YAML
    /// documents (classification, schema, parameters) are read here.
    pub fn clarification_loop(&self, client: Arc<dyn ChatClient>) -> Result<ClarificationLoop> {
        let mut agent = ClarificationLoop::new(client, SystemPromptBuilder::new(&self.prompt_config))
            .with_max_rounds(self.max_clarification_rounds)
            .with_answer_mode(self.answer_mode)
            .with_plain_text_policy(self.plain_text_policy)
            .with_retry(self.llm.retry())
            .with_llm_params(self.llm.max_tokens, self.llm.temperature);

        if let Some(config) = load_optional(self.classification_file.as_deref())? {
            agent = agent.with_classification(config);
        }
        if let Some(schema) = load_optional(self.schema_file.as_deref())? {
            agent = agent.with_schema(schema);
        }
        if let Some(parameters) = load_optional(self.parameters_file.as_deref())? {
            agent = agent.with_parameters(parameters);
        }
        Ok(agent)
    }
}

fn load_optional(path: Option<&Path>) -> Result<Option<Value>> {
    path.map(|p| read_yaml(p)).transpose()
}

/// Environment variable holding the API key for `kind`.
pub fn api_key_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "OPENAI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
    }
}

/// Build the chat client for `settings`, reading the key from the
/// environment. A missing key is a configuration error.
pub fn build_client(settings: &LlmSettings) -> Result<Arc<dyn ChatClient>> {
    let kind = settings.provider_kind()?;
    let var = api_key_var(kind);
    let key = std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("{var} is not set")))?;
    client_with_key(settings, key)
}

/// Build the chat client for `settings` with an explicit key.
pub fn client_with_key(settings: &LlmSettings, key: String) -> Result<Arc<dyn ChatClient>> {
    let model = settings.model_name()?;
    let timeout = Duration::from_secs(settings.timeout_secs);
    let client: Arc<dyn ChatClient> = match settings.provider_kind()? {
        ProviderKind::OpenAi => {
            let client = OpenAiClient::with_timeout(key, model, timeout)?;
            match &settings.base_url {
                Some(url) => Arc::new(client.with_base_url(url)),
                None => Arc::new(client),
            }
        }
        ProviderKind::Anthropic => {
            let client = AnthropicClient::with_timeout(key, model, timeout)?;
            match &settings.base_url {
                Some(url) => Arc::new(client.with_base_url(url)),
                None => Arc::new(client),
            }
        }
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.max_clarification_rounds, 3);
        assert_eq!(settings.answer_mode, AnswerMode::Batch);
        assert_eq!(settings.llm.model_name().unwrap(), DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            "llm:\n  provider: anthropic\n  temperature: 0.0\nmax_clarification_rounds: 5\nanswer_mode: per_question\n",
        )
        .unwrap();
        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.llm.provider_kind().unwrap(), ProviderKind::Anthropic);
        assert_eq!(settings.llm.model_name().unwrap(), DEFAULT_ANTHROPIC_MODEL);
        assert_eq!(settings.max_clarification_rounds, 5);
        assert_eq!(settings.answer_mode, AnswerMode::PerQuestion);
        assert_eq!(settings.llm.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/no/such/settings.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.llm.provider = "mystery".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.llm.temperature = 2.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.llm.max_tokens = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn client_matches_provider() {
        let mut llm = LlmSettings {
            provider: "Anthropic".into(),
            model: Some("claude-test".into()),
            ..Default::default()
        };
        let client = client_with_key(&llm, "key".into()).unwrap();
        assert_eq!(client.provider(), ProviderKind::Anthropic);
        assert_eq!(client.model(), "claude-test");

        llm.provider = "openai".into();
        llm.base_url = Some("http://localhost:8080/v1/chat/completions".into());
        let client = client_with_key(&llm, "key".into()).unwrap();
        assert_eq!(client.provider(), ProviderKind::OpenAi);
    }

    #[test]
    fn loop_reads_optional_documents() {
        let dir = tempfile::tempdir().unwrap();
        let classification = dir.path().join("classification.yaml");
        std::fs::write(&classification, "entity_types: [task]\nintents: ['@DO']\n").unwrap();
        let settings = Settings {
            classification_file: Some(classification),
            max_clarification_rounds: 7,
            ..Default::default()
        };
        let client: Arc<dyn ChatClient> = Arc::new(crate::api::scripted::ScriptedClient::new());
        let agent = settings.clarification_loop(client).unwrap();
        assert_eq!(agent.max_rounds(), 7);

        let broken = Settings {
            schema_file: Some(dir.path().join("missing.yaml")),
            ..Default::default()
        };
        let client: Arc<dyn ChatClient> = Arc::new(crate::api::scripted::ScriptedClient::new());
        assert!(broken.clarification_loop(client).is_err());
    }
}
