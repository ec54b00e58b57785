use std::{collections::HashMap, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use ts_rs::TS;

use super::{
    config::HeyGenConfig,
    template_variables::{TemplateVariable, VariableType},
};

#[derive(Debug, Error)]
pub enum HeyGenError {
    #[error("HeyGen API key not configured")]
    NotConfigured,
    #[error("HeyGen authentication failed - invalid API key")]
    AuthFailed,
    #[error("HeyGen rate limit exceeded")]
    RateLimited,
    #[error("HeyGen resource not found: {0}")]
    NotFound(String),
    #[error("HeyGen service unavailable: {0}")]
    Unavailable(String),
    #[error("HeyGen API error: {0}")]
    ApiError(String),
    #[error("HTTP request error: {0}")]
    Request(String),
}

impl HeyGenError {
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            HeyGenError::RateLimited | HeyGenError::Unavailable(_) | HeyGenError::Request(_)
        )
    }
}

impl From<reqwest::Error> for HeyGenError {
    fn from(err: reqwest::Error) -> Self {
        HeyGenError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct HeyGenTemplate {
    pub template_id: String,
    pub name: String,
    #[serde(default)]
    pub thumbnail_image_url: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Option<Value>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TemplatesData {
    #[serde(default)]
    templates: Vec<HeyGenTemplate>,
}

#[derive(Debug, Deserialize)]
struct TemplateDetailData {
    #[serde(default)]
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    video_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    Pending,
    Waiting,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl VideoState {
    pub fn is_terminal(self) -> bool {
        matches!(self, VideoState::Completed | VideoState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct VideoStatus {
    #[serde(alias = "id")]
    pub video_id: String,
    pub status: VideoState,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    #[ts(type = "unknown")]
    pub error: Option<Value>,
}

/// Values for one render of a template, keyed by variable name.
#[derive(Debug, Clone, Default)]
pub struct VideoRender {
    pub title: Option<String>,
    pub caption: bool,
    pub test: bool,
    pub values: HashMap<String, String>,
}

#[derive(Debug)]
pub struct HeyGenClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
}

impl HeyGenClient {
    pub fn new(config: HeyGenConfig) -> Result<Self, HeyGenError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(HeyGenError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HeyGenError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn retry_policy() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30))
            .with_max_times(3)
            .with_jitter()
    }

    /// `{base}/v2/template/{id}` plus any trailing segments, with the id
    /// encoded as a single path segment.
    fn template_url(&self, template_id: &str, trailing: &[&str]) -> Result<Url, HeyGenError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| HeyGenError::Request(format!("invalid HeyGen base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| HeyGenError::Request(format!("invalid HeyGen base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["v2", "template", template_id])
            .extend(trailing);
        Ok(url)
    }

    /// All templates visible to the API key.
    pub async fn list_templates(&self) -> Result<Vec<HeyGenTemplate>, HeyGenError> {
        (|| async {
            let url = format!("{}/v2/templates", self.base_url);
            let response = self
                .client
                .get(&url)
                .header("X-Api-Key", self.api_key.expose_secret())
                .send()
                .await?;
            let data: TemplatesData = unwrap_envelope(check_status(response, "templates").await?).await?;
            Ok(data.templates)
        })
        .retry(Self::retry_policy())
        .when(|e: &HeyGenError| e.should_retry())
        .notify(|err: &HeyGenError, dur: Duration| {
            tracing::warn!(
                "HeyGen API call failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                err
            );
        })
        .await
    }

    /// Raw variable description of a template, in whatever shape HeyGen sends it.
    pub async fn get_template_variables(&self, template_id: &str) -> Result<Value, HeyGenError> {
        let url = self.template_url(template_id, &[])?;
        (|| async {
            let response = self
                .client
                .get(url.clone())
                .header("X-Api-Key", self.api_key.expose_secret())
                .send()
                .await?;
            let data: TemplateDetailData =
                unwrap_envelope(check_status(response, template_id).await?).await?;
            Ok(data.variables)
        })
        .retry(Self::retry_policy())
        .when(|e: &HeyGenError| e.should_retry())
        .await
    }

    /// Start rendering a template. Returns the HeyGen video id.
    ///
    /// Not retried: a timed-out request may still have started a render.
    pub async fn generate_video(
        &self,
        template_id: &str,
        variables: &[TemplateVariable],
        render: &VideoRender,
    ) -> Result<String, HeyGenError> {
        let url = self.template_url(template_id, &["generate"])?;
        let body = build_generate_body(variables, render);

        let response = self
            .client
            .post(url)
            .header("X-Api-Key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let data: GenerateData = unwrap_envelope(check_status(response, template_id).await?).await?;

        tracing::info!("HeyGen render started for template {}: {}", template_id, data.video_id);
        Ok(data.video_id)
    }

    pub async fn video_status(&self, video_id: &str) -> Result<VideoStatus, HeyGenError> {
        (|| async {
            let url = format!("{}/v1/video_status.get", self.base_url);
            let response = self
                .client
                .get(&url)
                .query(&[("video_id", video_id)])
                .header("X-Api-Key", self.api_key.expose_secret())
                .send()
                .await?;
            unwrap_envelope(check_status(response, video_id).await?).await
        })
        .retry(Self::retry_policy())
        .when(|e: &HeyGenError| e.should_retry())
        .await
    }
}

async fn check_status(response: Response, resource: &str) -> Result<Response, HeyGenError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HeyGenError::AuthFailed),
        StatusCode::NOT_FOUND => Err(HeyGenError::NotFound(resource.to_string())),
        StatusCode::TOO_MANY_REQUESTS => Err(HeyGenError::RateLimited),
        status if status.is_server_error() => {
            let error_text = response.text().await.unwrap_or_default();
            Err(HeyGenError::Unavailable(format!("{status}: {error_text}")))
        }
        _ => {
            let error_text = response.text().await.unwrap_or_default();
            Err(HeyGenError::ApiError(error_text))
        }
    }
}

async fn unwrap_envelope<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, HeyGenError> {
    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| HeyGenError::ApiError(e.to_string()))?;

    if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
        return Err(HeyGenError::ApiError(error.to_string()));
    }
    envelope
        .data
        .ok_or_else(|| HeyGenError::ApiError("response did not contain data".to_string()))
}

/// Build the `generate` payload. Each supplied value is wrapped in the
/// property object HeyGen expects for the variable's type.
pub fn build_generate_body(variables: &[TemplateVariable], render: &VideoRender) -> Value {
    let mut payload = serde_json::Map::new();

    for variable in variables {
        let Some(value) = render.values.get(&variable.name) else {
            continue;
        };
        let (kind, properties) = match variable.variable_type {
            VariableType::Text => ("text", json!({ "content": value })),
            VariableType::Image => ("image", json!({ "url": value, "fit": "cover" })),
            VariableType::Video => ("video", json!({ "url": value, "play_style": "fit_to_scene" })),
            VariableType::Audio => ("audio", json!({ "url": value })),
        };
        payload.insert(
            variable.name.clone(),
            json!({ "name": variable.name, "type": kind, "properties": properties }),
        );
    }

    let mut body = json!({
        "caption": render.caption,
        "test": render.test,
        "variables": payload,
    });
    if let Some(title) = &render.title {
        body["title"] = json!(title);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_should_retry() {
        assert!(HeyGenError::RateLimited.should_retry());
        assert!(HeyGenError::Unavailable("502".into()).should_retry());
        assert!(HeyGenError::Request("timeout".into()).should_retry());
        assert!(!HeyGenError::AuthFailed.should_retry());
        assert!(!HeyGenError::NotFound("tpl".into()).should_retry());
    }

    #[test]
    fn empty_key_is_not_configured() {
        let result = HeyGenClient::new(HeyGenConfig {
            api_key: SecretString::from(String::new()),
            base_url: "https://api.heygen.com".into(),
        });
        assert!(matches!(result, Err(HeyGenError::NotConfigured)));
    }

    #[test]
    fn template_ids_stay_inside_one_path_segment() {
        let client = HeyGenClient::new(HeyGenConfig {
            api_key: SecretString::from("hg_test".to_string()),
            base_url: "https://api.heygen.com/".into(),
        })
        .unwrap();

        assert_eq!(
            client.template_url("tpl_1", &["generate"]).unwrap().as_str(),
            "https://api.heygen.com/v2/template/tpl_1/generate"
        );
        assert_eq!(
            client.template_url("a/b?c#d", &[]).unwrap().as_str(),
            "https://api.heygen.com/v2/template/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn generate_body_wraps_values_by_type() {
        let variables = vec![
            TemplateVariable::text("product_name", None),
            TemplateVariable::new("hero", VariableType::Image, None),
            TemplateVariable::text("unused", None),
        ];
        let render = VideoRender {
            title: Some("Spring launch".into()),
            values: HashMap::from([
                ("product_name".to_string(), "Widget".to_string()),
                ("hero".to_string(), "https://img.example.com/w.png".to_string()),
            ]),
            ..Default::default()
        };

        let body = build_generate_body(&variables, &render);
        assert_eq!(body["title"], "Spring launch");
        assert_eq!(body["test"], false);
        assert_eq!(body["variables"]["product_name"]["type"], "text");
        assert_eq!(body["variables"]["product_name"]["properties"]["content"], "Widget");
        assert_eq!(
            body["variables"]["hero"]["properties"]["url"],
            "https://img.example.com/w.png"
        );
        assert!(body["variables"].get("unused").is_none());
    }

    #[test]
    fn video_status_accepts_heygen_shape() {
        let status: VideoStatus = serde_json::from_value(json!({
            "id": "vid_123",
            "status": "completed",
            "video_url": "https://files.heygen.ai/vid_123.mp4",
            "duration": 12.5
        }))
        .unwrap();
        assert_eq!(status.video_id, "vid_123");
        assert_eq!(status.status, VideoState::Completed);
        assert!(status.status.is_terminal());

        let odd: VideoStatus =
            serde_json::from_value(json!({ "id": "v", "status": "queued" })).unwrap();
        assert_eq!(odd.status, VideoState::Unknown);
        assert!(!odd.status.is_terminal());
    }
}
