use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use parley_core::config::{AppConfig, LlmVendor, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigField {
    key: String,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    precedence: &'static str,
    fields: Vec<ConfigField>,
}

struct Sources {
    file_doc: Option<Value>,
    file_path: Option<PathBuf>,
}

impl Sources {
    fn field(&self, key: &str, value: impl Into<String>, env_keys: &[&str]) -> ConfigField {
        ConfigField { key: key.to_string(), value: value.into(), source: self.source(key, env_keys) }
    }

    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    };

    let file_path = detect_config_path(options.config_path.as_deref());
    let sources = Sources { file_doc: load_config_file_doc(file_path.as_deref()), file_path };
    let report = ConfigReport {
        command: COMMAND,
        status: "ok",
        precedence: "env > file > default",
        fields: effective_fields(&config, &sources),
    };
    CommandResult::report(COMMAND, 0, &report)
}

fn effective_fields(config: &AppConfig, sources: &Sources) -> Vec<ConfigField> {
    let llm = &config.llm;
    let negotiation = &config.negotiation;
    let mut fields = vec![
        sources.field("llm.default_model", &llm.default_model, &["PARLEY_LLM_DEFAULT_MODEL"]),
        sources.field("llm.timeout_secs", llm.timeout_secs.to_string(), &["PARLEY_LLM_TIMEOUT_SECS"]),
        sources.field("llm.max_tokens", llm.max_tokens.to_string(), &["PARLEY_LLM_MAX_TOKENS"]),
        sources.field(
            "llm.temperature",
            llm.temperature.map(|value| value.to_string()).unwrap_or_else(|| "<unset>".to_string()),
            &["PARLEY_LLM_TEMPERATURE"],
        ),
    ];

    for vendor in LlmVendor::ALL {
        let vendor_config = llm.vendor(vendor);
        let prefix = vendor.env_prefix();
        let api_key = vendor_config
            .api_key
            .as_ref()
            .map(|key| redact_token(key.expose_secret()))
            .unwrap_or_else(|| "<unset>".to_string());
        fields.push(sources.field(
            &format!("llm.{}.api_key", vendor.as_str()),
            api_key,
            &[format!("{prefix}_API_KEY").as_str()],
        ));
        fields.push(sources.field(
            &format!("llm.{}.base_url", vendor.as_str()),
            &vendor_config.base_url,
            &[format!("{prefix}_BASE_URL").as_str()],
        ));
    }

    fields.extend([
        sources.field(
            "negotiation.max_rounds",
            negotiation.max_rounds.to_string(),
            &["PARLEY_NEGOTIATION_MAX_ROUNDS"],
        ),
        sources.field(
            "negotiation.early_exit",
            negotiation.early_exit.to_string(),
            &["PARLEY_NEGOTIATION_EARLY_EXIT"],
        ),
        sources.field(
            "negotiation.max_concurrency",
            negotiation.max_concurrency.to_string(),
            &["PARLEY_NEGOTIATION_MAX_CONCURRENCY"],
        ),
        sources.field(
            "negotiation.history_phases",
            negotiation.history_phases.to_string(),
            &["PARLEY_NEGOTIATION_HISTORY_PHASES"],
        ),
        sources.field(
            "negotiation.planning",
            negotiation.planning.to_string(),
            &["PARLEY_NEGOTIATION_PLANNING"],
        ),
    ]);

    for (power, model) in &config.models {
        fields.push(sources.field(&format!("models.{power}"), model, &["PARLEY_MODELS"]));
    }

    fields.extend([
        sources.field(
            "prompts.dir",
            config
                .prompts
                .dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "<built-in>".to_string()),
            &["PARLEY_PROMPTS_DIR"],
        ),
        sources.field(
            "logging.level",
            &config.logging.level,
            &["PARLEY_LOGGING_LEVEL", "PARLEY_LOG_LEVEL"],
        ),
        sources.field(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["PARLEY_LOGGING_FORMAT", "PARLEY_LOG_FORMAT"],
        ),
    ]);
    fields
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("parley.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/parley.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_the_vendor_prefix() {
        assert_eq!(redact_token("sk-ant-secret"), "sk-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc = "[llm.anthropic]\nbase_url = \"http://localhost\"\n"
            .parse::<toml::Value>()
            .expect("valid toml");
        assert!(contains_path(&doc, "llm.anthropic.base_url"));
        assert!(!contains_path(&doc, "llm.openai.base_url"));
    }
}
