//! Signed uploads to Cloudinary.

use std::{collections::BTreeMap, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use chrono::Utc;
use reqwest::{
    Client, Response, StatusCode,
    multipart::{Form, Part},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;

use super::config::CloudinaryConfig;

/// Total attempts per upload, including the first.
pub const UPLOAD_ATTEMPTS: usize = 3;
const UPLOAD_MIN_DELAY: Duration = Duration::from_secs(1);
const UPLOAD_MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CloudinaryError {
    #[error("Cloudinary credentials not configured")]
    NotConfigured,
    #[error("Cloudinary authentication failed")]
    AuthFailed,
    #[error("Cloudinary rate limit exceeded")]
    RateLimited,
    #[error("Cloudinary rejected the upload: {0}")]
    Rejected(String),
    #[error("Cloudinary service unavailable: {0}")]
    Unavailable(String),
    #[error("Cloudinary API error: {0}")]
    ApiError(String),
    #[error("HTTP request error: {0}")]
    Request(String),
}

impl CloudinaryError {
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            CloudinaryError::RateLimited
                | CloudinaryError::Unavailable(_)
                | CloudinaryError::Request(_)
        )
    }
}

impl From<reqwest::Error> for CloudinaryError {
    fn from(err: reqwest::Error) -> Self {
        CloudinaryError::Request(err.to_string())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
    #[default]
    Auto,
}

/// What to upload: file contents or a remote URL Cloudinary fetches itself.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes { data: Bytes, file_name: String },
    RemoteUrl(String),
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub folder: Option<String>,
    pub public_id: Option<String>,
    pub resource_type: ResourceType,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UploadedMedia {
    pub public_id: String,
    pub secure_url: String,
    pub resource_type: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug)]
pub struct CloudinaryClient {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
    base_url: String,
    default_folder: Option<String>,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Result<Self, CloudinaryError> {
        if config.cloud_name.is_empty()
            || config.api_key.is_empty()
            || config.api_secret.expose_secret().is_empty()
        {
            return Err(CloudinaryError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CloudinaryError::Request(e.to_string()))?;

        Ok(Self {
            client,
            cloud_name: config.cloud_name,
            api_key: config.api_key,
            api_secret: config.api_secret,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_folder: config.upload_folder,
        })
    }

    fn endpoint(&self, resource_type: ResourceType, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url, self.cloud_name, resource_type, action
        )
    }

    /// Upload with up to [`UPLOAD_ATTEMPTS`] tries and capped exponential backoff.
    pub async fn upload(
        &self,
        source: UploadSource,
        options: UploadOptions,
    ) -> Result<UploadedMedia, CloudinaryError> {
        let folder = options.folder.clone().or_else(|| self.default_folder.clone());
        let url = self.endpoint(options.resource_type, "upload");

        (|| async {
            let params = self.signed_params(&folder, &options);
            let mut form = Form::new();
            for (key, value) in params {
                form = form.text(key, value);
            }
            form = match &source {
                UploadSource::Bytes { data, file_name } => form.part(
                    "file",
                    Part::stream(reqwest::Body::from(data.clone())).file_name(file_name.clone()),
                ),
                UploadSource::RemoteUrl(remote) => form.text("file", remote.clone()),
            };

            let response = self.client.post(&url).multipart(form).send().await?;
            let response = check_status(response).await?;
            response
                .json::<UploadedMedia>()
                .await
                .map_err(|e| CloudinaryError::ApiError(e.to_string()))
        })
        .retry(upload_backoff())
        .when(|e: &CloudinaryError| e.should_retry())
        .notify(|err: &CloudinaryError, dur: Duration| {
            tracing::warn!(
                "Cloudinary upload failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                err
            );
        })
        .await
    }

    /// Delete an asset. Returns false when Cloudinary had nothing to delete.
    pub async fn destroy(
        &self,
        public_id: &str,
        resource_type: ResourceType,
    ) -> Result<bool, CloudinaryError> {
        // `auto` is only valid for uploads.
        let resource_type = match resource_type {
            ResourceType::Auto => ResourceType::Image,
            other => other,
        };
        let timestamp = Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("public_id".to_string(), public_id.to_string());
        params.insert("timestamp".to_string(), timestamp);
        let signature = sign_params(&params, self.api_secret.expose_secret());
        params.insert("api_key".to_string(), self.api_key.clone());
        params.insert("signature".to_string(), signature);

        let response = self
            .client
            .post(self.endpoint(resource_type, "destroy"))
            .form(&params)
            .send()
            .await?;
        let result: DestroyResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CloudinaryError::ApiError(e.to_string()))?;

        match result.result.as_str() {
            "ok" => Ok(true),
            "not found" => Ok(false),
            other => Err(CloudinaryError::ApiError(other.to_string())),
        }
    }

    fn signed_params(
        &self,
        folder: &Option<String>,
        options: &UploadOptions,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("timestamp".to_string(), Utc::now().timestamp().to_string());
        if let Some(folder) = folder {
            params.insert("folder".to_string(), folder.clone());
        }
        if let Some(public_id) = &options.public_id {
            params.insert("public_id".to_string(), public_id.clone());
        }
        if !options.tags.is_empty() {
            params.insert("tags".to_string(), options.tags.join(","));
        }

        let signature = sign_params(&params, self.api_secret.expose_secret());
        params.insert("api_key".to_string(), self.api_key.clone());
        params.insert("signature".to_string(), signature);
        params
    }
}

fn upload_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(UPLOAD_MIN_DELAY)
        .with_max_delay(UPLOAD_MAX_DELAY)
        .with_factor(2.0)
        .with_max_times(UPLOAD_ATTEMPTS - 1)
}

/// Cloudinary request signature: SHA-1 over the sorted `key=value` pairs
/// joined with `&`, immediately followed by the API secret.
pub fn sign_params(params: &BTreeMap<String, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

async fn check_status(response: Response) -> Result<Response, CloudinaryError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CloudinaryError::AuthFailed),
        StatusCode::TOO_MANY_REQUESTS => Err(CloudinaryError::RateLimited),
        status if status.is_server_error() => {
            let error_text = response.text().await.unwrap_or_default();
            Err(CloudinaryError::Unavailable(format!("{status}: {error_text}")))
        }
        _ => {
            let error_text = response.text().await.unwrap_or_default();
            Err(CloudinaryError::Rejected(error_text))
        }
    }
}
