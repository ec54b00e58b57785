use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use db::models::{
    generated_asset::{AssetSource, AssetStatus, AssetType, CreateGeneratedAsset, GeneratedAsset},
    template_assignment::TemplateAssignment,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::services::{
    heygen::{HeyGenError, VideoRender, VideoState, VideoStatus},
    openai::{GeneratedImage, GeneratedText, OpenAiError},
    runway::{ImageToVideoRequest, RunwayError, RunwayTask, RunwayTaskState},
    template_variables::{TemplateVariable, validate_values},
};
use sqlx::SqlitePool;
use ts_rs::TS;
use utils::response::{ApiResponse, FieldError};

use super::clients::resolve_optional;
use crate::{DeploymentImpl, error::ApiError, validation::Validator};

const MAX_PROMPT_LEN: usize = 4_000;
const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Deserialize, TS)]
pub struct GenerateVideoRequest {
    pub template_id: String,
    #[ts(optional)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub values: HashMap<String, String>,
    #[ts(optional)]
    pub title: Option<String>,
    #[serde(default)]
    pub caption: bool,
    #[serde(default)]
    pub test: bool,
}

#[derive(Debug, Serialize, TS)]
pub struct VideoJob {
    pub video_id: String,
    pub variables: Vec<TemplateVariable>,
    pub asset: GeneratedAsset,
}

#[derive(Debug, Serialize, TS)]
pub struct VideoJobStatus {
    pub status: VideoStatus,
    /// `true` once HeyGen will not change the job again.
    pub finished: bool,
    pub asset: Option<GeneratedAsset>,
}

impl VideoJobStatus {
    fn new(status: VideoStatus, asset: Option<GeneratedAsset>) -> Self {
        Self {
            finished: status.status.is_terminal(),
            status,
            asset,
        }
    }
}

#[derive(Debug, Deserialize, TS)]
pub struct GenerateTextRequest {
    pub prompt: String,
    #[ts(optional)]
    pub system: Option<String>,
    #[ts(optional)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, TS)]
pub struct GenerateImageRequest {
    pub prompt: String,
    #[ts(optional)]
    pub size: Option<String>,
    #[ts(optional)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, TS)]
pub struct ImageResult {
    pub image: GeneratedImage,
    pub asset: GeneratedAsset,
}

#[derive(Debug, Deserialize, TS)]
pub struct GenerateRunwayRequest {
    #[serde(flatten)]
    pub request: ImageToVideoRequest,
    #[ts(optional)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, TS)]
pub struct RunwayJob {
    pub task_id: String,
    pub asset: GeneratedAsset,
}

#[derive(Debug, Serialize, TS)]
pub struct RunwayJobStatus {
    pub task: RunwayTask,
    pub finished: bool,
    pub asset: Option<GeneratedAsset>,
}

impl RunwayJobStatus {
    fn new(task: RunwayTask, asset: Option<GeneratedAsset>) -> Self {
        Self {
            finished: task.status.is_terminal(),
            task,
            asset,
        }
    }
}

/// Reject values that do not fit the resolved template.
fn check_values(
    variables: &[TemplateVariable],
    values: &HashMap<String, String>,
) -> Result<(), ApiError> {
    let errors = validate_values(variables, values)
        .into_iter()
        .map(|v| FieldError::new(format!("values.{}", v.variable), v.message))
        .collect();
    ApiError::ensure_valid(errors)
}

fn video_asset_status(state: VideoState) -> Option<AssetStatus> {
    match state {
        VideoState::Pending | VideoState::Waiting => Some(AssetStatus::Pending),
        VideoState::Processing => Some(AssetStatus::Processing),
        VideoState::Completed => Some(AssetStatus::Completed),
        VideoState::Failed => Some(AssetStatus::Failed),
        VideoState::Unknown => None,
    }
}

fn runway_asset_status(state: RunwayTaskState) -> Option<AssetStatus> {
    match state {
        RunwayTaskState::Pending | RunwayTaskState::Throttled => Some(AssetStatus::Pending),
        RunwayTaskState::Running => Some(AssetStatus::Processing),
        RunwayTaskState::Succeeded => Some(AssetStatus::Completed),
        RunwayTaskState::Failed | RunwayTaskState::Cancelled => Some(AssetStatus::Failed),
        RunwayTaskState::Unknown => None,
    }
}

/// Bring a recorded asset in line with the vendor's view of the job.
async fn sync_asset(
    pool: &SqlitePool,
    source: AssetSource,
    external_id: &str,
    status: Option<AssetStatus>,
    url: Option<&str>,
) -> Result<Option<GeneratedAsset>, ApiError> {
    let Some(asset) = GeneratedAsset::find_by_external_id(pool, source, external_id).await? else {
        return Ok(None);
    };
    match status {
        Some(next) if asset.status() != Some(next) || (url.is_some() && asset.url.as_deref() != url) => {
            tracing::info!("Asset {} ({} {}) is now {}", asset.id, source, external_id, next);
            Ok(Some(GeneratedAsset::update_status(pool, asset.id, next, url).await?))
        }
        _ => Ok(Some(asset)),
    }
}

async fn generate_video(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<GenerateVideoRequest>,
) -> Result<Json<ApiResponse<VideoJob>>, ApiError> {
    let heygen = deployment.heygen().ok_or(HeyGenError::NotConfigured)?;
    let template_id = payload.template_id.trim();

    let mut validator = Validator::new();
    validator.required("template_id", template_id, 128);
    if let Some(title) = &payload.title {
        validator.max_chars("title", title, MAX_TITLE_LEN);
    }
    ApiError::ensure_valid(validator.finish())?;

    let pool = &deployment.db().pool;
    let client = resolve_optional(pool, payload.client_id.as_deref()).await?;
    if let Some(client) = &client
        && !TemplateAssignment::is_assigned(pool, client.id, template_id).await?
    {
        return Err(ApiError::Forbidden(format!(
            "Template {} is not assigned to client {}",
            template_id, client.client_id
        )));
    }

    let resolved = deployment
        .template_manager()
        .resolve(template_id, false)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("No variables found for template {template_id}"))
        })?;
    check_values(&resolved.variables, &payload.values)?;

    let render = VideoRender {
        title: payload.title.clone(),
        caption: payload.caption,
        test: payload.test,
        values: payload.values.clone(),
    };
    let video_id = heygen
        .generate_video(template_id, &resolved.variables, &render)
        .await?;

    let asset = GeneratedAsset::create(
        pool,
        CreateGeneratedAsset {
            client_config_id: client.map(|c| c.id),
            source: AssetSource::HeyGen,
            asset_type: AssetType::Video,
            url: None,
            external_id: Some(video_id.clone()),
            status: Some(AssetStatus::Pending),
            prompt: payload.title,
            metadata: Some(json!({
                "template_id": template_id,
                "values": payload.values,
                "test": payload.test,
                "variable_source": resolved.source,
            })),
        },
    )
    .await?;

    Ok(Json(ApiResponse::success(VideoJob {
        video_id,
        variables: resolved.variables,
        asset,
    })))
}

async fn video_status(
    State(deployment): State<DeploymentImpl>,
    Path(video_id): Path<String>,
) -> Result<Json<ApiResponse<VideoJobStatus>>, ApiError> {
    let heygen = deployment.heygen().ok_or(HeyGenError::NotConfigured)?;
    let status = heygen.video_status(&video_id).await?;

    let asset = sync_asset(
        &deployment.db().pool,
        AssetSource::HeyGen,
        &video_id,
        video_asset_status(status.status),
        status.video_url.as_deref(),
    )
    .await?;

    Ok(Json(ApiResponse::success(VideoJobStatus::new(status, asset))))
}

async fn generate_text(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<GenerateTextRequest>,
) -> Result<Json<ApiResponse<GeneratedText>>, ApiError> {
    let mut validator = Validator::new();
    validator
        .required("prompt", &payload.prompt, MAX_PROMPT_LEN)
        .range("max_tokens", payload.max_tokens, 1, 4_096);
    if let Some(system) = &payload.system {
        validator.max_chars("system", system, MAX_PROMPT_LEN);
    }
    ApiError::ensure_valid(validator.finish())?;

    let openai = deployment.openai().ok_or(OpenAiError::NotConfigured)?;
    let text = openai
        .generate_text(&payload.prompt, payload.system.as_deref(), payload.max_tokens)
        .await?;
    Ok(Json(ApiResponse::success(text)))
}

async fn generate_image(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<GenerateImageRequest>,
) -> Result<Json<ApiResponse<ImageResult>>, ApiError> {
    ApiError::ensure_valid(
        Validator::new()
            .required("prompt", &payload.prompt, MAX_PROMPT_LEN)
            .finish(),
    )?;

    let openai = deployment.openai().ok_or(OpenAiError::NotConfigured)?;
    let pool = &deployment.db().pool;
    let client = resolve_optional(pool, payload.client_id.as_deref()).await?;

    let image = openai
        .generate_image(&payload.prompt, payload.size.as_deref())
        .await?;

    let asset = GeneratedAsset::create(
        pool,
        CreateGeneratedAsset {
            client_config_id: client.map(|c| c.id),
            source: AssetSource::OpenAi,
            asset_type: AssetType::Image,
            url: Some(image.url.clone()),
            external_id: None,
            status: Some(AssetStatus::Completed),
            prompt: Some(payload.prompt),
            metadata: Some(json!({
                "model": image.model,
                "size": payload.size,
                "revised_prompt": image.revised_prompt,
            })),
        },
    )
    .await?;

    Ok(Json(ApiResponse::success(ImageResult { image, asset })))
}

async fn generate_runway(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<GenerateRunwayRequest>,
) -> Result<Json<ApiResponse<RunwayJob>>, ApiError> {
    let mut validator = Validator::new();
    validator
        .required("prompt_image", &payload.request.prompt_image, 2_048)
        .http_url("prompt_image", Some(payload.request.prompt_image.as_str()));
    if let Some(text) = &payload.request.prompt_text {
        validator.max_chars("prompt_text", text, 1_000);
    }
    ApiError::ensure_valid(validator.finish())?;

    let runway = deployment.runway().ok_or(RunwayError::NotConfigured)?;
    let pool = &deployment.db().pool;
    let client = resolve_optional(pool, payload.client_id.as_deref()).await?;

    let task_id = runway.image_to_video(&payload.request).await?;

    let asset = GeneratedAsset::create(
        pool,
        CreateGeneratedAsset {
            client_config_id: client.map(|c| c.id),
            source: AssetSource::RunwayMl,
            asset_type: AssetType::Video,
            url: None,
            external_id: Some(task_id.clone()),
            status: Some(AssetStatus::Pending),
            prompt: payload.request.prompt_text.clone(),
            metadata: Some(json!({
                "prompt_image": payload.request.prompt_image,
                "ratio": payload.request.ratio,
                "duration": payload.request.duration,
            })),
        },
    )
    .await?;

    Ok(Json(ApiResponse::success(RunwayJob { task_id, asset })))
}

async fn runway_status(
    State(deployment): State<DeploymentImpl>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<RunwayJobStatus>>, ApiError> {
    let runway = deployment.runway().ok_or(RunwayError::NotConfigured)?;
    let task = runway.task_status(&task_id).await?;

    let asset = sync_asset(
        &deployment.db().pool,
        AssetSource::RunwayMl,
        &task_id,
        runway_asset_status(task.status),
        task.output.first().map(String::as_str),
    )
    .await?;

    Ok(Json(ApiResponse::success(RunwayJobStatus::new(task, asset))))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/generate/video", post(generate_video))
        .route("/generate/video/{video_id}/status", get(video_status))
        .route("/generate/text", post(generate_text))
        .route("/generate/image", post(generate_image))
        .route("/generate/runway", post(generate_runway))
        .route("/generate/runway/{task_id}", get(runway_status))
}
