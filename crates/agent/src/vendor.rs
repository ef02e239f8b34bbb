//! Vendor factory and the two HTTP shapes behind it: the Anthropic
//! messages API and OpenAI-compatible chat completions (OpenAI, Gemini's
//! compatibility endpoint, DeepSeek, OpenRouter, Ollama). No retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::{LlmConfig, VendorConfig};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::llm::{GenerationError, ModelClient};

pub use parley_core::LlmVendor;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Clone, Debug)]
struct RequestSettings {
    model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout_secs: u64,
}

/// Builds the client serving `model_id`. Fails only when the vendor needs
/// an api key and none is configured, or the HTTP client cannot be built.
pub fn load_model_client(
    model_id: &str,
    llm: &LlmConfig,
    system_prompt: &str,
) -> Result<Arc<dyn ModelClient>, GenerationError> {
    let vendor = LlmVendor::for_model(model_id);
    let vendor_config = llm.vendor(vendor);
    if vendor.requires_api_key() && !vendor_config.has_api_key() {
        return Err(GenerationError::MissingApiKey { vendor });
    }

    let settings = RequestSettings {
        model: vendor_model_name(vendor, model_id),
        system_prompt: system_prompt.to_string(),
        max_tokens: llm.max_tokens,
        temperature: llm.temperature,
        timeout_secs: llm.timeout_secs,
    };
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(llm.timeout_secs))
        .build()
        .map_err(|error| GenerationError::Transport(error.to_string()))?;

    tracing::debug!(
        event_name = "llm.client.loaded",
        model = model_id,
        vendor = %vendor,
        base_url = %vendor_config.base_url,
        "model client initialised"
    );

    let client: Arc<dyn ModelClient> = match vendor {
        LlmVendor::Anthropic => Arc::new(AnthropicClient {
            http,
            display_name: model_id.to_string(),
            endpoint: endpoint(vendor_config, "messages"),
            api_key: vendor_config.api_key.clone(),
            settings,
        }),
        _ => Arc::new(OpenAiCompatibleClient {
            http,
            vendor,
            display_name: model_id.to_string(),
            endpoint: endpoint(vendor_config, "chat/completions"),
            api_key: vendor_config.api_key.clone(),
            settings,
        }),
    };
    Ok(client)
}

/// Model id as the vendor's API expects it.
pub fn vendor_model_name(vendor: LlmVendor, model_id: &str) -> String {
    let model_id = model_id.trim();
    match vendor {
        LlmVendor::Ollama => model_id.strip_prefix("ollama/").unwrap_or(model_id).to_string(),
        LlmVendor::OpenRouter if !model_id.starts_with("openrouter/") && !model_id.contains('/') => {
            format!("openrouter/{model_id}")
        }
        _ => model_id.to_string(),
    }
}

fn endpoint(vendor_config: &VendorConfig, path: &str) -> String {
    format!("{}/{path}", vendor_config.base_url.trim_end_matches('/'))
}

fn transport_error(error: reqwest::Error, timeout_secs: u64) -> GenerationError {
    if error.is_timeout() {
        GenerationError::Timeout { secs: timeout_secs }
    } else {
        GenerationError::Transport(error.to_string())
    }
}

async fn read_json(
    response: reqwest::Response,
    timeout_secs: u64,
) -> Result<Value, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        });
    }
    response.json::<Value>().await.map_err(|error| {
        if error.is_decode() {
            GenerationError::MalformedResponse(error.to_string())
        } else {
            transport_error(error, timeout_secs)
        }
    })
}

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    vendor: LlmVendor,
    display_name: String,
    endpoint: String,
    api_key: Option<SecretString>,
    settings: RequestSettings,
}

impl OpenAiCompatibleClient {
    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": [
                { "role": "system", "content": self.settings.system_prompt },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.settings.max_tokens,
        });
        if let Some(temperature) = self.settings.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut request = self.http.post(&self.endpoint).json(&self.request_body(prompt));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| transport_error(error, self.settings.timeout_secs))?;
        let raw = read_json(response, self.settings.timeout_secs).await?;

        let content = raw["choices"][0]["message"]["content"].as_str().ok_or_else(|| {
            GenerationError::MalformedResponse(format!(
                "{} response has no choices[0].message.content",
                self.vendor
            ))
        })?;
        Ok(content.trim().to_string())
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    display_name: String,
    endpoint: String,
    api_key: Option<SecretString>,
    settings: RequestSettings,
}

impl AnthropicClient {
    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "system": self.settings.system_prompt,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(temperature) = self.settings.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(GenerationError::MissingApiKey { vendor: LlmVendor::Anthropic })?;

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|error| transport_error(error, self.settings.timeout_secs))?;
        let raw = read_json(response, self.settings.timeout_secs).await?;

        let text = raw["content"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        Ok(text.trim().to_string())
    }
}
