//! OpenAI chat completions (`POST /chat/completions`).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use kidsafe_core::config::Settings;
use kidsafe_core::error::Error;
use kidsafe_core::http::JsonClient;
use kidsafe_core::traits::{ChatMessage, ChatModel};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiChat {
    client: JsonClient,
    model: String,
}

impl OpenAiChat {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self { client: JsonClient::new(base_url, api_key, timeout)?, model: model.to_string() })
    }

    /// `None` when no OpenAI key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let Some(key) = settings.credentials.openai() else { return Ok(None) };
        let llm = &settings.llm;
        Ok(Some(Self::new(&llm.base_url, key, &llm.chat_model, Duration::from_secs(llm.request_timeout_secs))?))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model(&self) -> &str { &self.model }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let req = CompletionRequest { model: &self.model, messages, temperature };
        let resp: CompletionResponse = self.client.post("chat/completions", &req).await?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Operation(format!("{} returned no completion", self.model)))?;
        debug!("{} completed {} chars", self.model, content.len());
        Ok(content)
    }
}
