use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use db::models::client_config::{ClientConfig, CreateClientConfig, UpdateClientConfig};
use deployment::Deployment;
use sqlx::SqlitePool;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, validation::Validator};

const MAX_CLIENT_ID_LEN: usize = 64;
const MAX_DISPLAY_NAME_LEN: usize = 120;

/// Resolve an optional client reference (slug or UUID) from a request body.
pub(crate) async fn resolve_optional(
    pool: &SqlitePool,
    key: Option<&str>,
) -> Result<Option<ClientConfig>, ApiError> {
    match key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => Ok(Some(ClientConfig::resolve(pool, key).await?)),
        None => Ok(None),
    }
}

async fn list_clients(
    State(deployment): State<DeploymentImpl>,
) -> Result<Json<ApiResponse<Vec<ClientConfig>>>, ApiError> {
    let clients = ClientConfig::find_all(&deployment.db().pool).await?;
    Ok(Json(ApiResponse::success(clients)))
}

async fn get_client(
    State(deployment): State<DeploymentImpl>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<ClientConfig>>, ApiError> {
    let client = ClientConfig::resolve(&deployment.db().pool, &key).await?;
    Ok(Json(ApiResponse::success(client)))
}

async fn create_client(
    State(deployment): State<DeploymentImpl>,
    Json(mut payload): Json<CreateClientConfig>,
) -> Result<Json<ApiResponse<ClientConfig>>, ApiError> {
    payload.client_id = payload.client_id.trim().to_string();
    payload.display_name = payload.display_name.trim().to_string();

    ApiError::ensure_valid(
        Validator::new()
            .required("client_id", &payload.client_id, MAX_CLIENT_ID_LEN)
            .slug("client_id", &payload.client_id)
            .required("display_name", &payload.display_name, MAX_DISPLAY_NAME_LEN)
            .hex_color("brand_color", payload.brand_color.as_deref())
            .http_url("logo_url", payload.logo_url.as_deref())
            .finish(),
    )?;

    let client = ClientConfig::create(&deployment.db().pool, payload).await?;
    tracing::info!("Created client config {} ({})", client.client_id, client.id);
    Ok(Json(ApiResponse::success(client)))
}

async fn update_client(
    State(deployment): State<DeploymentImpl>,
    Path(key): Path<String>,
    Json(payload): Json<UpdateClientConfig>,
) -> Result<Json<ApiResponse<ClientConfig>>, ApiError> {
    let mut validator = Validator::new();
    if let Some(name) = &payload.display_name {
        validator.required("display_name", name, MAX_DISPLAY_NAME_LEN);
    }
    ApiError::ensure_valid(
        validator
            .hex_color("brand_color", payload.brand_color.as_deref())
            .http_url("logo_url", payload.logo_url.as_deref())
            .finish(),
    )?;

    let pool = &deployment.db().pool;
    let existing = ClientConfig::resolve(pool, &key).await?;
    let client = ClientConfig::update(pool, existing.id, payload).await?;
    Ok(Json(ApiResponse::success(client)))
}

async fn delete_client(
    State(deployment): State<DeploymentImpl>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let pool = &deployment.db().pool;
    let existing = ClientConfig::resolve(pool, &key).await?;
    ClientConfig::delete(pool, existing.id).await?;
    tracing::info!("Deleted client config {}", existing.client_id);
    Ok(Json(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/{id}", get(get_client))
}

pub fn admin_router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/clients", axum::routing::post(create_client))
        .route(
            "/clients/{id}",
            axum::routing::patch(update_client).delete(delete_client),
        )
}
