use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::{
    client_config::ClientConfigError, fallback_variable::FallbackVariableError,
    generated_asset::GeneratedAssetError, template_assignment::TemplateAssignmentError,
};
use deployment::DeploymentError;
use services::services::{
    cloudinary::CloudinaryError, heygen::HeyGenError, openai::OpenAiError, runway::RunwayError,
    supabase::SupabaseError, template_manager::TemplateManagerError,
};
use thiserror::Error;
use utils::response::{ApiResponse, FieldError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    ClientConfig(#[from] ClientConfigError),
    #[error(transparent)]
    TemplateAssignment(#[from] TemplateAssignmentError),
    #[error(transparent)]
    FallbackVariable(#[from] FallbackVariableError),
    #[error(transparent)]
    GeneratedAsset(#[from] GeneratedAssetError),
    #[error(transparent)]
    HeyGen(#[from] HeyGenError),
    #[error(transparent)]
    OpenAi(#[from] OpenAiError),
    #[error(transparent)]
    Runway(#[from] RunwayError),
    #[error(transparent)]
    Cloudinary(#[from] CloudinaryError),
    #[error(transparent)]
    Supabase(#[from] SupabaseError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl From<TemplateManagerError> for ApiError {
    fn from(err: TemplateManagerError) -> Self {
        match err {
            TemplateManagerError::HeyGenNotConfigured => ApiError::HeyGen(HeyGenError::NotConfigured),
            TemplateManagerError::HeyGen(e) => ApiError::HeyGen(e),
        }
    }
}

impl ApiError {
    /// `Ok` when no field failed, otherwise a 400 carrying every failure.
    pub fn ensure_valid(errors: Vec<FieldError>) -> Result<(), ApiError> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ClientConfig(e) => match e {
                ClientConfigError::NotFound => StatusCode::NOT_FOUND,
                ClientConfigError::AlreadyExists(_) => StatusCode::CONFLICT,
                ClientConfigError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::TemplateAssignment(e) => match e {
                TemplateAssignmentError::NotFound => StatusCode::NOT_FOUND,
                TemplateAssignmentError::AlreadyExists(_) => StatusCode::CONFLICT,
                TemplateAssignmentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::FallbackVariable(e) => match e {
                FallbackVariableError::NotFound => StatusCode::NOT_FOUND,
                FallbackVariableError::AlreadyExists(_) => StatusCode::CONFLICT,
                FallbackVariableError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::GeneratedAsset(e) => match e {
                GeneratedAssetError::NotFound => StatusCode::NOT_FOUND,
                GeneratedAssetError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::HeyGen(e) => match e {
                HeyGenError::NotConfigured | HeyGenError::Unavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                HeyGenError::NotFound(_) => StatusCode::NOT_FOUND,
                HeyGenError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                HeyGenError::AuthFailed | HeyGenError::ApiError(_) | HeyGenError::Request(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ApiError::OpenAi(e) => match e {
                OpenAiError::NotConfigured | OpenAiError::Unavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                OpenAiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                OpenAiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                OpenAiError::AuthFailed | OpenAiError::ApiError(_) | OpenAiError::Request(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ApiError::Runway(e) => match e {
                RunwayError::NotConfigured | RunwayError::Unavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RunwayError::TaskNotFound(_) => StatusCode::NOT_FOUND,
                RunwayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                RunwayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                RunwayError::AuthFailed | RunwayError::ApiError(_) | RunwayError::Request(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            ApiError::Cloudinary(e) => match e {
                CloudinaryError::NotConfigured | CloudinaryError::Unavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CloudinaryError::Rejected(_) => StatusCode::BAD_REQUEST,
                CloudinaryError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                CloudinaryError::AuthFailed
                | CloudinaryError::ApiError(_)
                | CloudinaryError::Request(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Supabase(e) => match e {
                SupabaseError::InvalidToken => StatusCode::UNAUTHORIZED,
                SupabaseError::NotConfigured
                | SupabaseError::Unavailable(_)
                | SupabaseError::Request(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Deployment(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Multipart(_) | ApiError::Validation(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Database(_)
            | ApiError::Deployment(_)
            | ApiError::ClientConfig(ClientConfigError::Database(_))
            | ApiError::TemplateAssignment(TemplateAssignmentError::Database(_))
            | ApiError::FallbackVariable(FallbackVariableError::Database(_))
            | ApiError::GeneratedAsset(GeneratedAssetError::Database(_)) => {
                "Internal server error".to_string()
            }
            ApiError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "The upload is larger than this server accepts.".to_string()
            }
            ApiError::Multipart(_) => {
                "Failed to read the upload. Please ensure the file is valid and try again.".to_string()
            }
            ApiError::ServiceUnavailable(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }

        let message = self.message();
        match self {
            ApiError::Validation(errors) => {
                let body = ApiResponse::<(), Vec<FieldError>>::error_with_data(&message, errors);
                (status, Json(body)).into_response()
            }
            _ => (status, Json(ApiResponse::<()>::error(&message))).into_response(),
        }
    }
}
