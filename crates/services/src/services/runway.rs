use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use ts_rs::TS;

use super::config::RunwayConfig;

const RUNWAY_API_VERSION: &str = "2024-11-06";
const RATIOS: &[&str] = &["1280:720", "720:1280", "1104:832", "832:1104", "960:960", "1584:672"];

#[derive(Debug, Error)]
pub enum RunwayError {
    #[error("RunwayML API key not configured")]
    NotConfigured,
    #[error("RunwayML authentication failed")]
    AuthFailed,
    #[error("RunwayML rate limit exceeded")]
    RateLimited,
    #[error("RunwayML task not found: {0}")]
    TaskNotFound(String),
    #[error("RunwayML rejected the request: {0}")]
    InvalidRequest(String),
    #[error("RunwayML service unavailable: {0}")]
    Unavailable(String),
    #[error("RunwayML API error: {0}")]
    ApiError(String),
    #[error("HTTP request error: {0}")]
    Request(String),
}

impl RunwayError {
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            RunwayError::RateLimited | RunwayError::Unavailable(_) | RunwayError::Request(_)
        )
    }
}

impl From<reqwest::Error> for RunwayError {
    fn from(err: reqwest::Error) -> Self {
        RunwayError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ImageToVideoRequest {
    pub prompt_image: String,
    #[ts(optional)]
    pub prompt_text: Option<String>,
    #[ts(optional)]
    pub ratio: Option<String>,
    #[ts(optional)]
    pub duration: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunwayTaskState {
    Pending,
    Throttled,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl RunwayTaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunwayTaskState::Succeeded | RunwayTaskState::Failed | RunwayTaskState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RunwayTask {
    pub id: String,
    pub status: RunwayTaskState,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug)]
pub struct RunwayClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl RunwayClient {
    pub fn new(config: RunwayConfig) -> Result<Self, RunwayError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(RunwayError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RunwayError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
        })
    }

    /// Create an image-to-video task and return its id.
    pub async fn image_to_video(&self, request: &ImageToVideoRequest) -> Result<String, RunwayError> {
        let body = image_to_video_body(&self.model, request)?;
        let response = self
            .client
            .post(format!("{}/image_to_video", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("X-Runway-Version", RUNWAY_API_VERSION)
            .json(&body)
            .send()
            .await?;

        let task: CreatedTask = check_status(response, "image_to_video")
            .await?
            .json()
            .await
            .map_err(|e| RunwayError::ApiError(e.to_string()))?;
        tracing::info!("RunwayML task created: {}", task.id);
        Ok(task.id)
    }

    pub async fn task_status(&self, task_id: &str) -> Result<RunwayTask, RunwayError> {
        (|| async {
            let response = self
                .client
                .get(format!("{}/tasks/{}", self.base_url, task_id))
                .bearer_auth(self.api_key.expose_secret())
                .header("X-Runway-Version", RUNWAY_API_VERSION)
                .send()
                .await?;
            check_status(response, task_id)
                .await?
                .json::<RunwayTask>()
                .await
                .map_err(|e| RunwayError::ApiError(e.to_string()))
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(10))
                .with_max_times(3),
        )
        .when(|e: &RunwayError| e.should_retry())
        .await
    }
}

fn image_to_video_body(model: &str, request: &ImageToVideoRequest) -> Result<Value, RunwayError> {
    if request.prompt_image.trim().is_empty() {
        return Err(RunwayError::InvalidRequest("prompt_image is required".to_string()));
    }
    let ratio = request.ratio.as_deref().unwrap_or(RATIOS[0]);
    if !RATIOS.contains(&ratio) {
        return Err(RunwayError::InvalidRequest(format!("unsupported ratio {ratio}")));
    }
    let duration = request.duration.unwrap_or(5);
    if duration != 5 && duration != 10 {
        return Err(RunwayError::InvalidRequest(
            "duration must be 5 or 10 seconds".to_string(),
        ));
    }

    let mut body = json!({
        "model": model,
        "promptImage": request.prompt_image,
        "ratio": ratio,
        "duration": duration,
    });
    if let Some(text) = &request.prompt_text {
        body["promptText"] = json!(text);
    }
    Ok(body)
}

async fn check_status(response: Response, resource: &str) -> Result<Response, RunwayError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RunwayError::AuthFailed),
        StatusCode::NOT_FOUND => Err(RunwayError::TaskNotFound(resource.to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(RunwayError::RateLimited),
        StatusCode::BAD_REQUEST => {
            let error_text = response.text().await.unwrap_or_default();
            Err(RunwayError::InvalidRequest(error_text))
        }
        status if status.is_server_error() => Err(RunwayError::Unavailable(status.to_string())),
        _ => {
            let error_text = response.text().await.unwrap_or_default();
            Err(RunwayError::ApiError(error_text))
        }
    }
}
