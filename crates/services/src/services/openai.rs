use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use ts_rs::TS;

use super::config::OpenAiConfig;

const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
const IMAGE_SIZES: &[&str] = &["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("OpenAI API key not configured")]
    NotConfigured,
    #[error("OpenAI authentication failed")]
    AuthFailed,
    #[error("OpenAI rate limit exceeded")]
    RateLimited,
    #[error("OpenAI rejected the request: {0}")]
    InvalidRequest(String),
    #[error("OpenAI service unavailable: {0}")]
    Unavailable(String),
    #[error("OpenAI API error: {0}")]
    ApiError(String),
    #[error("HTTP request error: {0}")]
    Request(String),
}

impl OpenAiError {
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            OpenAiError::RateLimited | OpenAiError::Unavailable(_) | OpenAiError::Request(_)
        )
    }
}

impl From<reqwest::Error> for OpenAiError {
    fn from(err: reqwest::Error) -> Self {
        OpenAiError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GeneratedText {
    pub text: String,
    pub model: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct GeneratedImage {
    pub url: String,
    pub revised_prompt: Option<String>,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, OpenAiError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(OpenAiError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| OpenAiError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model,
            image_model: config.image_model,
        })
    }

    fn retry_policy() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(20))
            .with_max_times(2)
            .with_jitter()
    }

    pub async fn generate_text(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<GeneratedText, OpenAiError> {
        let body = chat_body(&self.text_model, prompt, system, max_tokens);
        let url = format!("{}/chat/completions", self.base_url);

        let response: ChatResponse = (|| async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&body)
                .send()
                .await?;
            check_status(response)
                .await?
                .json::<ChatResponse>()
                .await
                .map_err(|e| OpenAiError::ApiError(e.to_string()))
        })
        .retry(Self::retry_policy())
        .when(|e: &OpenAiError| e.should_retry())
        .notify(|err: &OpenAiError, dur: Duration| {
            tracing::warn!(
                "OpenAI call failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                err
            );
        })
        .await?;

        let text = response
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| OpenAiError::ApiError("completion contained no text".to_string()))?;

        Ok(GeneratedText {
            text: text.trim().to_string(),
            model: response.model,
            prompt_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
        })
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        size: Option<&str>,
    ) -> Result<GeneratedImage, OpenAiError> {
        let size = size.unwrap_or(DEFAULT_IMAGE_SIZE);
        if !IMAGE_SIZES.contains(&size) {
            return Err(OpenAiError::InvalidRequest(format!(
                "unsupported image size {size}"
            )));
        }

        let url = format!("{}/images/generations", self.base_url);
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": size,
        });

        // Billed per call; no retry.
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let images: ImagesResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| OpenAiError::ApiError(e.to_string()))?;

        let image = images
            .data
            .into_iter()
            .find(|d| d.url.is_some())
            .ok_or_else(|| OpenAiError::ApiError("response contained no image url".to_string()))?;

        Ok(GeneratedImage {
            url: image.url.unwrap_or_default(),
            revised_prompt: image.revised_prompt,
            model: self.image_model.clone(),
        })
    }
}

fn chat_body(model: &str, prompt: &str, system: Option<&str>, max_tokens: Option<u32>) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));

    let mut body = json!({ "model": model, "messages": messages });
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

async fn check_status(response: Response) -> Result<Response, OpenAiError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(OpenAiError::AuthFailed),
        StatusCode::TOO_MANY_REQUESTS => Err(OpenAiError::RateLimited),
        StatusCode::BAD_REQUEST => {
            let error_text = response.text().await.unwrap_or_default();
            Err(OpenAiError::InvalidRequest(extract_error_message(&error_text)))
        }
        status if status.is_server_error() => Err(OpenAiError::Unavailable(status.to_string())),
        _ => {
            let error_text = response.text().await.unwrap_or_default();
            Err(OpenAiError::ApiError(extract_error_message(&error_text)))
        }
    }
}

/// Pull `error.message` out of an OpenAI error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
