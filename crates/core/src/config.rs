use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub negotiation: NegotiationConfig,
    /// Power name to model id. Powers not listed use `llm.default_model`.
    pub models: BTreeMap<String, String>,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub default_model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub openai: VendorConfig,
    pub anthropic: VendorConfig,
    pub gemini: VendorConfig,
    pub deepseek: VendorConfig,
    pub openrouter: VendorConfig,
    pub ollama: VendorConfig,
}

#[derive(Clone, Debug)]
pub struct VendorConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationConfig {
    pub max_rounds: u32,
    pub early_exit: bool,
    pub max_concurrency: usize,
    pub history_phases: usize,
    pub planning: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptsConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Model vendors reachable through the generation contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmVendor {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    OpenRouter,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub default_model: Option<String>,
    pub log_level: Option<String>,
    pub max_rounds: Option<u32>,
    pub early_exit: Option<bool>,
    pub prompts_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl LlmVendor {
    pub const ALL: [LlmVendor; 6] = [
        LlmVendor::OpenAi,
        LlmVendor::Anthropic,
        LlmVendor::Gemini,
        LlmVendor::DeepSeek,
        LlmVendor::OpenRouter,
        LlmVendor::Ollama,
    ];

    /// Picks the vendor serving `model_id` from substrings of the id.
    pub fn for_model(model_id: &str) -> Self {
        let lowered = model_id.trim().to_ascii_lowercase();
        if lowered.starts_with("ollama/") {
            Self::Ollama
        } else if lowered.contains("claude") {
            Self::Anthropic
        } else if lowered.contains("gemini") {
            Self::Gemini
        } else if lowered.contains("deepseek") {
            Self::DeepSeek
        } else if lowered.contains("openrouter") || lowered.contains("quasar") {
            Self::OpenRouter
        } else {
            Self::OpenAi
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    /// Prefix of the vendor's conventional `<PREFIX>_API_KEY` / `<PREFIX>_BASE_URL` variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI",
            Self::Anthropic => "ANTHROPIC",
            Self::Gemini => "GEMINI",
            Self::DeepSeek => "DEEPSEEK",
            Self::OpenRouter => "OPENROUTER",
            Self::Ollama => "OLLAMA",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

impl fmt::Display for LlmVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VendorConfig {
    fn for_vendor(vendor: LlmVendor) -> Self {
        Self { api_key: None, base_url: vendor.default_base_url().to_string() }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

impl LlmConfig {
    pub fn vendor(&self, vendor: LlmVendor) -> &VendorConfig {
        match vendor {
            LlmVendor::OpenAi => &self.openai,
            LlmVendor::Anthropic => &self.anthropic,
            LlmVendor::Gemini => &self.gemini,
            LlmVendor::DeepSeek => &self.deepseek,
            LlmVendor::OpenRouter => &self.openrouter,
            LlmVendor::Ollama => &self.ollama,
        }
    }

    fn vendor_mut(&mut self, vendor: LlmVendor) -> &mut VendorConfig {
        match vendor {
            LlmVendor::OpenAi => &mut self.openai,
            LlmVendor::Anthropic => &mut self.anthropic,
            LlmVendor::Gemini => &mut self.gemini,
            LlmVendor::DeepSeek => &mut self.deepseek,
            LlmVendor::OpenRouter => &mut self.openrouter,
            LlmVendor::Ollama => &mut self.ollama,
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            early_exit: false,
            max_concurrency: 7,
            history_phases: 5,
            planning: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                default_model: "gpt-4o-mini".to_string(),
                timeout_secs: 120,
                max_tokens: 2000,
                temperature: None,
                openai: VendorConfig::for_vendor(LlmVendor::OpenAi),
                anthropic: VendorConfig::for_vendor(LlmVendor::Anthropic),
                gemini: VendorConfig::for_vendor(LlmVendor::Gemini),
                deepseek: VendorConfig::for_vendor(LlmVendor::DeepSeek),
                openrouter: VendorConfig::for_vendor(LlmVendor::OpenRouter),
                ollama: VendorConfig::for_vendor(LlmVendor::Ollama),
            },
            negotiation: NegotiationConfig::default(),
            models: BTreeMap::new(),
            prompts: PromptsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Model assigned to `power`, falling back to the default model.
    pub fn model_for(&self, power: &str) -> &str {
        self.models
            .iter()
            .find(|(assigned, _)| assigned.eq_ignore_ascii_case(power))
            .map(|(_, model)| model.as_str())
            .unwrap_or(&self.llm.default_model)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(default_model) = llm.default_model {
                self.llm.default_model = default_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = Some(temperature);
            }
            let vendors = [
                (LlmVendor::OpenAi, llm.openai),
                (LlmVendor::Anthropic, llm.anthropic),
                (LlmVendor::Gemini, llm.gemini),
                (LlmVendor::DeepSeek, llm.deepseek),
                (LlmVendor::OpenRouter, llm.openrouter),
                (LlmVendor::Ollama, llm.ollama),
            ];
            for (vendor, vendor_patch) in vendors {
                let Some(vendor_patch) = vendor_patch else {
                    continue;
                };
                let target = self.llm.vendor_mut(vendor);
                if let Some(api_key_value) = vendor_patch.api_key {
                    target.api_key = Some(secret_value(api_key_value));
                }
                if let Some(base_url) = vendor_patch.base_url {
                    target.base_url = base_url;
                }
            }
        }

        if let Some(negotiation) = patch.negotiation {
            if let Some(max_rounds) = negotiation.max_rounds {
                self.negotiation.max_rounds = max_rounds;
            }
            if let Some(early_exit) = negotiation.early_exit {
                self.negotiation.early_exit = early_exit;
            }
            if let Some(max_concurrency) = negotiation.max_concurrency {
                self.negotiation.max_concurrency = max_concurrency;
            }
            if let Some(history_phases) = negotiation.history_phases {
                self.negotiation.history_phases = history_phases;
            }
            if let Some(planning) = negotiation.planning {
                self.negotiation.planning = planning;
            }
        }

        if let Some(models) = patch.models {
            self.models.extend(models);
        }

        if let Some(prompts) = patch.prompts {
            if let Some(dir) = prompts.dir {
                self.prompts.dir = Some(dir);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PARLEY_LLM_DEFAULT_MODEL") {
            self.llm.default_model = value;
        }
        if let Some(value) = read_env("PARLEY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PARLEY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("PARLEY_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_LLM_TEMPERATURE") {
            self.llm.temperature = Some(parse_f32("PARLEY_LLM_TEMPERATURE", &value)?);
        }
        for vendor in LlmVendor::ALL {
            let prefix = vendor.env_prefix();
            if let Some(value) = read_env(&format!("{prefix}_API_KEY")) {
                self.llm.vendor_mut(vendor).api_key = Some(secret_value(value));
            }
            if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
                self.llm.vendor_mut(vendor).base_url = value;
            }
        }

        if let Some(value) = read_env("PARLEY_NEGOTIATION_MAX_ROUNDS") {
            self.negotiation.max_rounds = parse_u32("PARLEY_NEGOTIATION_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_EARLY_EXIT") {
            self.negotiation.early_exit = parse_bool("PARLEY_NEGOTIATION_EARLY_EXIT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_MAX_CONCURRENCY") {
            self.negotiation.max_concurrency =
                parse_usize("PARLEY_NEGOTIATION_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_HISTORY_PHASES") {
            self.negotiation.history_phases =
                parse_usize("PARLEY_NEGOTIATION_HISTORY_PHASES", &value)?;
        }
        if let Some(value) = read_env("PARLEY_NEGOTIATION_PLANNING") {
            self.negotiation.planning = parse_bool("PARLEY_NEGOTIATION_PLANNING", &value)?;
        }

        if let Some(value) = read_env("PARLEY_MODELS") {
            self.models.extend(parse_model_assignments("PARLEY_MODELS", &value)?);
        }
        if let Some(value) = read_env("PARLEY_PROMPTS_DIR") {
            self.prompts.dir = Some(PathBuf::from(value));
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(default_model) = overrides.default_model {
            self.llm.default_model = default_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(max_rounds) = overrides.max_rounds {
            self.negotiation.max_rounds = max_rounds;
        }
        if let Some(early_exit) = overrides.early_exit {
            self.negotiation.early_exit = early_exit;
        }
        if let Some(prompts_dir) = overrides.prompts_dir {
            self.prompts.dir = Some(prompts_dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_negotiation(&self.negotiation)?;
        validate_models(&self.models)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.default_model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.default_model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if let Some(temperature) = llm.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Validation(
                "llm.temperature must be in range 0.0..=2.0".to_string(),
            ));
        }
    }

    for vendor in LlmVendor::ALL {
        let base_url = llm.vendor(vendor).base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "llm.{vendor}.base_url must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_negotiation(negotiation: &NegotiationConfig) -> Result<(), ConfigError> {
    if negotiation.max_concurrency == 0 {
        return Err(ConfigError::Validation(
            "negotiation.max_concurrency must be greater than zero".to_string(),
        ));
    }

    if negotiation.history_phases == 0 {
        return Err(ConfigError::Validation(
            "negotiation.history_phases must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_models(models: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    if let Some((power, _)) =
        models.iter().find(|(power, model)| power.trim().is_empty() || model.trim().is_empty())
    {
        return Err(ConfigError::Validation(format!(
            "models entry `{power}` must name both a power and a model"
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_env(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_env(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_env(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_env(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| invalid_env(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_env(key, value))
}

/// `FRANCE=gpt-4o,ENGLAND=claude-3-5-sonnet` style assignment list.
fn parse_model_assignments(
    key: &str,
    value: &str,
) -> Result<Vec<(String, String)>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (power, model) = entry.split_once('=').ok_or_else(|| invalid_env(key, value))?;
            Ok((power.trim().to_ascii_uppercase(), model.trim().to_string()))
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    negotiation: Option<NegotiationPatch>,
    models: Option<BTreeMap<String, String>>,
    prompts: Option<PromptsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    default_model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    openai: Option<VendorPatch>,
    anthropic: Option<VendorPatch>,
    gemini: Option<VendorPatch>,
    deepseek: Option<VendorPatch>,
    openrouter: Option<VendorPatch>,
    ollama: Option<VendorPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct VendorPatch {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NegotiationPatch {
    max_rounds: Option<u32>,
    early_exit: Option<bool>,
    max_concurrency: Option<usize>,
    history_phases: Option<usize>,
    planning: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptsPatch {
    dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmVendor, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.negotiation.max_rounds == 3, "default round budget should be 3")?;
        ensure(!config.negotiation.early_exit, "early exit should be off by default")?;
        ensure(config.llm.timeout_secs == 120, "default timeout should be 120s")?;
        ensure(config.model_for("FRANCE") == "gpt-4o-mini", "default model should apply")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PARLEY_ANTHROPIC_KEY", "sk-ant-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("parley.toml");
            fs::write(
                &path,
                r#"
[llm.anthropic]
api_key = "${TEST_PARLEY_ANTHROPIC_KEY}"

[models]
ENGLAND = "claude-3-5-sonnet-20241022"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.llm.anthropic.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(
                key.as_deref() == Some("sk-ant-from-env"),
                "anthropic key should be interpolated from environment",
            )?;
            ensure(
                config.model_for("england") == "claude-3-5-sonnet-20241022",
                "model assignment lookup should ignore case",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_PARLEY_ANTHROPIC_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_LOG_LEVEL", "warn");
        env::set_var("PARLEY_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["PARLEY_LOG_LEVEL", "PARLEY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_NEGOTIATION_MAX_ROUNDS", "4");
        env::set_var("PARLEY_LLM_DEFAULT_MODEL", "gpt-4o");
        env::set_var("PARLEY_MODELS", "italy=deepseek-chat, TURKEY = gemini-1.5-pro");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("parley.toml");
            fs::write(
                &path,
                r#"
[llm]
default_model = "o3-mini"

[negotiation]
max_rounds = 2
max_concurrency = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    max_rounds: Some(5),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.negotiation.max_rounds == 5, "override round budget should win")?;
            ensure(config.negotiation.max_concurrency == 3, "file concurrency should apply")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.llm.default_model == "gpt-4o",
                "env default model should win over file and defaults",
            )?;
            ensure(config.model_for("ITALY") == "deepseek-chat", "env assignment should apply")?;
            ensure(config.model_for("TURKEY") == "gemini-1.5-pro", "assignments are trimmed")?;
            Ok(())
        })();

        clear_vars(&[
            "PARLEY_NEGOTIATION_MAX_ROUNDS",
            "PARLEY_LLM_DEFAULT_MODEL",
            "PARLEY_MODELS",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_NEGOTIATION_MAX_CONCURRENCY", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("negotiation.max_concurrency")
            );
            ensure(has_message, "validation failure should mention negotiation.max_concurrency")
        })();

        clear_vars(&["PARLEY_NEGOTIATION_MAX_CONCURRENCY"]);
        result
    }

    #[test]
    fn malformed_env_value_is_reported_with_its_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("PARLEY_NEGOTIATION_EARLY_EXIT", "sometimes");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "PARLEY_NEGOTIATION_EARLY_EXIT", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("malformed boolean should be rejected".to_string()),
        };

        clear_vars(&["PARLEY_NEGOTIATION_EARLY_EXIT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPENAI_API_KEY", "sk-openai-secret-value");
        env::set_var("OPENROUTER_API_KEY", "sk-or-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("sk-openai-secret-value"),
                "debug output should not contain the openai key",
            )?;
            ensure(
                !debug.contains("sk-or-secret-value"),
                "debug output should not contain the openrouter key",
            )?;
            ensure(config.llm.openai.has_api_key(), "openai key should be loaded")?;
            ensure(!config.llm.gemini.has_api_key(), "gemini key should be absent")?;
            Ok(())
        })();

        clear_vars(&["OPENAI_API_KEY", "OPENROUTER_API_KEY"]);
        result
    }

    #[test]
    fn vendor_detection_follows_model_id_substrings() {
        assert_eq!(LlmVendor::for_model("claude-3-5-haiku-20241022"), LlmVendor::Anthropic);
        assert_eq!(LlmVendor::for_model("gemini-2.0-flash"), LlmVendor::Gemini);
        assert_eq!(LlmVendor::for_model("deepseek-reasoner"), LlmVendor::DeepSeek);
        assert_eq!(LlmVendor::for_model("openrouter/quasar-alpha"), LlmVendor::OpenRouter);
        assert_eq!(LlmVendor::for_model("quasar-alpha"), LlmVendor::OpenRouter);
        assert_eq!(LlmVendor::for_model("ollama/llama3.1"), LlmVendor::Ollama);
        assert_eq!(LlmVendor::for_model("gpt-4o-mini"), LlmVendor::OpenAi);
        assert!(!LlmVendor::Ollama.requires_api_key());
    }
}
