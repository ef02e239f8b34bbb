use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::LlmVendor;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("no api key configured for {vendor}; set {}_API_KEY", .vendor.env_prefix())]
    MissingApiKey { vendor: LlmVendor },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("vendor returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("vendor response could not be read: {0}")]
    MalformedResponse(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("{0}")]
    Unavailable(String),
}

/// Text-in, text-out generation against one model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Generates and trims; whitespace-only output counts as a failure.
pub async fn generate_checked(
    client: &dyn ModelClient,
    prompt: &str,
) -> Result<String, GenerationError> {
    let text = client.generate(prompt).await?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(trimmed.to_string())
}

/// Generation boundary used by the order and planning paths: failures are
/// logged and surface as empty text for the parser to classify.
pub async fn generate_text(client: &dyn ModelClient, prompt: &str) -> String {
    match generate_checked(client, prompt).await {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(
                event_name = "llm.generate.failed",
                model = client.model_name(),
                error = %error,
                "generation failed; continuing with empty response"
            );
            String::new()
        }
    }
}

#[derive(Clone, Debug)]
enum ScriptStep {
    Reply(String),
    Fail(String),
}

/// Replays canned responses in order and repeats the last one once the
/// script runs out. Records every prompt it receives.
#[derive(Debug)]
pub struct ScriptedModelClient {
    model_name: String,
    delay: Option<Duration>,
    steps: Mutex<VecDeque<ScriptStep>>,
    last: Mutex<Option<ScriptStep>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModelClient {
    pub fn new<I, S>(model_name: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model_name: model_name.into(),
            delay: None,
            steps: Mutex::new(
                replies.into_iter().map(|reply| ScriptStep::Reply(reply.into())).collect(),
            ),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails with `message`.
    pub fn failing(model_name: impl Into<String>, message: impl Into<String>) -> Self {
        let client = Self::new(model_name, Vec::<String>::new());
        client.push(ScriptStep::Fail(message.into()));
        client
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.push(ScriptStep::Reply(reply.into()));
        self
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(ScriptStep::Fail(message.into()));
        self
    }

    /// Sleeps before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or_default()
    }

    fn push(&self, step: ScriptStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
    }

    fn next_step(&self) -> Option<ScriptStep> {
        let next = self.steps.lock().ok().and_then(|mut steps| steps.pop_front());
        let mut last = self.last.lock().ok()?;
        match next {
            Some(step) => {
                *last = Some(step.clone());
                Some(step)
            }
            None => last.clone(),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_step() {
            Some(ScriptStep::Reply(reply)) => Ok(reply),
            Some(ScriptStep::Fail(message)) => Err(GenerationError::Unavailable(message)),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{generate_checked, generate_text, GenerationError, ModelClient, ScriptedModelClient};

    #[tokio::test]
    async fn scripted_client_replays_then_repeats_last_reply() {
        let client = ScriptedModelClient::new("scripted", ["first", "second"]);

        assert_eq!(client.generate("a").await, Ok("first".to_string()));
        assert_eq!(client.generate("b").await, Ok("second".to_string()));
        assert_eq!(client.generate("c").await, Ok("second".to_string()));
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failures_surface_as_empty_text_at_the_boundary() {
        let client = ScriptedModelClient::failing("scripted", "vendor down");

        assert_eq!(generate_text(&client, "prompt").await, "");
        assert_eq!(
            generate_checked(&client, "prompt").await,
            Err(GenerationError::Unavailable("vendor down".to_string()))
        );
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn whitespace_only_output_is_an_empty_response() {
        let client = ScriptedModelClient::new("scripted", ["  \n "]).then_reply("  ok  ");

        assert_eq!(generate_checked(&client, "p").await, Err(GenerationError::EmptyResponse));
        assert_eq!(generate_checked(&client, "p").await, Ok("ok".to_string()));
    }
}
