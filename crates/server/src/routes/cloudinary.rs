use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{delete, post},
};
use bytes::Bytes;
use db::models::generated_asset::{
    AssetSource, AssetStatus, AssetType, CreateGeneratedAsset, GeneratedAsset,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::cloudinary::{
    CloudinaryError, ResourceType, UploadOptions, UploadSource, UploadedMedia,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use super::clients::resolve_optional;
use crate::{DeploymentImpl, error::ApiError, validation::Validator};

const MAX_FOLDER_LEN: usize = 200;
const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "m4a", "aac", "ogg", "flac"];

#[derive(Debug, Serialize, TS)]
pub struct UploadResult {
    pub media: UploadedMedia,
    pub asset: GeneratedAsset,
}

#[derive(Debug, Serialize, TS)]
pub struct DestroyResult {
    pub public_id: String,
    #[ts(optional)]
    pub removed_asset: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DestroyQuery {
    pub resource_type: Option<ResourceType>,
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(Bytes, String)>,
    url: Option<String>,
    folder: Option<String>,
    resource_type: Option<String>,
    client_id: Option<String>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let data = field.bytes().await?;
                    form.file = Some((data, file_name));
                }
                "url" => form.url = non_blank(field.text().await?),
                "folder" => form.folder = non_blank(field.text().await?),
                "resource_type" => form.resource_type = non_blank(field.text().await?),
                "client_id" => form.client_id = non_blank(field.text().await?),
                other => tracing::debug!("Ignoring unexpected upload field '{}'", other),
            }
        }
        Ok(form)
    }

    /// Checks the form and splits it into what the uploader needs.
    fn into_upload(self) -> Result<(UploadSource, ResourceType, Option<String>, Option<String>), ApiError> {
        let mut validator = Validator::new();

        let resource_type = match self.resource_type.as_deref() {
            None => ResourceType::Auto,
            Some(raw) => raw.to_lowercase().parse::<ResourceType>().unwrap_or_else(|_| {
                validator.error("resource_type", "must be one of image, video, raw or auto");
                ResourceType::Auto
            }),
        };
        if let Some(folder) = &self.folder {
            validator.max_chars("folder", folder, MAX_FOLDER_LEN);
        }
        validator.http_url("url", self.url.as_deref());

        let source = match (self.file, self.url) {
            (Some((data, _)), _) if data.is_empty() => {
                validator.error("file", "is empty");
                None
            }
            (Some((data, file_name)), None) => Some(UploadSource::Bytes { data, file_name }),
            (None, Some(url)) => Some(UploadSource::RemoteUrl(url)),
            (Some(_), Some(_)) => {
                validator.error("file", "provide either a file or a url, not both");
                None
            }
            (None, None) => {
                validator.error("file", "a file or a url is required");
                None
            }
        };

        ApiError::ensure_valid(validator.finish())?;
        let source = source.ok_or_else(|| ApiError::BadRequest("Nothing to upload".to_string()))?;
        Ok((source, resource_type, self.folder, self.client_id))
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn asset_type_for(media: &UploadedMedia) -> AssetType {
    match media.resource_type.as_str() {
        "video" => {
            let is_audio = media
                .format
                .as_deref()
                .is_some_and(|f| AUDIO_FORMATS.contains(&f.to_lowercase().as_str()));
            if is_audio { AssetType::Audio } else { AssetType::Video }
        }
        "raw" => AssetType::Text,
        _ => AssetType::Image,
    }
}

async fn upload(
    State(deployment): State<DeploymentImpl>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResult>>, ApiError> {
    let cloudinary = deployment
        .cloudinary()
        .cloned()
        .ok_or(CloudinaryError::NotConfigured)?;

    let (source, resource_type, folder, client_id) =
        UploadForm::read(&mut multipart).await?.into_upload()?;

    let pool = &deployment.db().pool;
    let client = resolve_optional(pool, client_id.as_deref()).await?;
    let mut tags = vec!["marketing".to_string()];
    if let Some(client) = &client {
        tags.push(client.client_id.clone());
    }

    let media = cloudinary
        .upload(
            source,
            UploadOptions {
                folder,
                public_id: None,
                resource_type,
                tags,
            },
        )
        .await?;
    tracing::info!("Uploaded {} to Cloudinary", media.public_id);

    let asset = GeneratedAsset::create(
        pool,
        CreateGeneratedAsset {
            client_config_id: client.map(|c| c.id),
            source: AssetSource::Cloudinary,
            asset_type: asset_type_for(&media),
            url: Some(media.secure_url.clone()),
            external_id: Some(media.public_id.clone()),
            status: Some(AssetStatus::Completed),
            prompt: None,
            metadata: serde_json::to_value(&media).ok(),
        },
    )
    .await?;

    Ok(Json(ApiResponse::success(UploadResult { media, asset })))
}

/// Public ids containing `/` must arrive percent-encoded as one path segment.
async fn destroy(
    State(deployment): State<DeploymentImpl>,
    Path(public_id): Path<String>,
    Query(query): Query<DestroyQuery>,
) -> Result<Json<ApiResponse<DestroyResult>>, ApiError> {
    let cloudinary = deployment.cloudinary().ok_or(CloudinaryError::NotConfigured)?;

    let resource_type = query.resource_type.unwrap_or(ResourceType::Image);
    if !cloudinary.destroy(&public_id, resource_type).await? {
        return Err(ApiError::NotFound(format!(
            "Cloudinary has no {} named {}",
            resource_type, public_id
        )));
    }

    let pool = &deployment.db().pool;
    let removed_asset =
        match GeneratedAsset::find_by_external_id(pool, AssetSource::Cloudinary, &public_id).await? {
            Some(asset) => {
                GeneratedAsset::delete(pool, asset.id).await?;
                Some(asset.id)
            }
            None => None,
        };
    tracing::info!("Destroyed Cloudinary {} {}", resource_type, public_id);

    Ok(Json(ApiResponse::success(DestroyResult {
        public_id,
        removed_asset,
    })))
}

pub fn router(max_upload_bytes: usize) -> Router<DeploymentImpl> {
    Router::new()
        .route(
            "/cloudinary/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/cloudinary/{public_id}", delete(destroy))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    };
    use services::services::config::Config;

    use super::*;
    use crate::routes::test_support::TestApp;

    const BOUNDARY: &str = "----upload-boundary";

    fn multipart_request(fields: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, file_name, value) in fields {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method(Method::POST)
            .uri("/api/cloudinary/upload")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn configured_app_with_limit(max_upload_mb: Option<&'static str>) -> TestApp {
        let config = Config::from_lookup(|key| {
            match key {
                "CLOUDINARY_CLOUD_NAME" => Some("demo"),
                "CLOUDINARY_API_KEY" => Some("key"),
                "CLOUDINARY_API_SECRET" => Some("secret"),
                "CLOUDINARY_API_BASE" => Some("http://127.0.0.1:9"),
                "MAX_UPLOAD_MB" => max_upload_mb,
                _ => None,
            }
            .map(str::to_string)
        });
        TestApp::with_config(config).await
    }

    async fn configured_app() -> TestApp {
        configured_app_with_limit(None).await
    }

    #[tokio::test]
    async fn upload_without_cloudinary_is_unavailable() {
        let app = TestApp::new().await;
        let (status, body) = app
            .send(multipart_request(&[("url", None, "https://example.com/a.png")]))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);

        let (status, _) = app.request(Method::DELETE, "/api/cloudinary/a", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn upload_requires_exactly_one_source() {
        let app = configured_app().await;

        let (status, body) = app
            .send(multipart_request(&[("folder", None, "campaigns")]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_data"][0]["field"], "file");

        let (status, body) = app
            .send(multipart_request(&[
                ("file", Some("logo.png"), "PNGDATA"),
                ("url", None, "https://example.com/a.png"),
                ("resource_type", None, "hologram"),
            ]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<_> = body["error_data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(fields, vec!["resource_type", "file"]);
    }

    #[tokio::test]
    async fn files_over_two_megabytes_are_read_in_full() {
        let app = configured_app().await;
        let video = "v".repeat(3 * 1024 * 1024);

        // Both sources given: the form is rejected only after the whole file was read.
        let (status, body) = app
            .send(multipart_request(&[
                ("file", Some("launch.mp4"), video.as_str()),
                ("url", None, "https://example.com/launch.mp4"),
            ]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_data"][0]["field"], "file");
        assert_eq!(
            body["error_data"][0]["message"],
            "provide either a file or a url, not both"
        );
    }

    #[tokio::test]
    async fn files_over_the_configured_limit_are_too_large() {
        let app = configured_app_with_limit(Some("1")).await;
        let video = "v".repeat(2 * 1024 * 1024);

        let (status, body) = app
            .send(multipart_request(&[("file", Some("launch.mp4"), video.as_str())]))
            .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn audio_formats_are_classified_as_audio() {
        let media = |resource_type: &str, format: &str| UploadedMedia {
            public_id: "p".into(),
            secure_url: "https://res.example.com/p".into(),
            resource_type: resource_type.into(),
            format: Some(format.into()),
            bytes: None,
            width: None,
            height: None,
            duration: None,
        };
        assert_eq!(asset_type_for(&media("video", "MP3")), AssetType::Audio);
        assert_eq!(asset_type_for(&media("video", "mp4")), AssetType::Video);
        assert_eq!(asset_type_for(&media("image", "png")), AssetType::Image);
        assert_eq!(asset_type_for(&media("raw", "pdf")), AssetType::Text);
    }
}
