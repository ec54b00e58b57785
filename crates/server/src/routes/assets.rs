use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use db::models::{
    client_config::ClientConfig,
    generated_asset::{AssetFilter, AssetSource, GeneratedAsset},
};
use deployment::Deployment;
use serde::Deserialize;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, validation::Validator};

#[derive(Debug, Deserialize)]
pub struct ListAssetsQuery {
    pub client_id: Option<String>,
    pub source: Option<AssetSource>,
    pub approved: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveAssetRequest {
    #[serde(default = "default_approved")]
    pub approved: bool,
}

fn default_approved() -> bool {
    true
}

async fn list_assets(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<ListAssetsQuery>,
) -> Result<Json<ApiResponse<Vec<GeneratedAsset>>>, ApiError> {
    ApiError::ensure_valid(
        Validator::new()
            .range("limit", query.limit, 1, 500)
            .finish(),
    )?;

    let pool = &deployment.db().pool;
    let client_config_id = match &query.client_id {
        Some(key) => Some(ClientConfig::resolve(pool, key).await?.id),
        None => None,
    };
    let filter = AssetFilter {
        client_config_id,
        source: query.source,
        approved: query.approved,
        limit: query.limit,
    };

    let assets = GeneratedAsset::list(pool, &filter).await?;
    Ok(Json(ApiResponse::success(assets)))
}

async fn get_asset(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GeneratedAsset>>, ApiError> {
    let asset = GeneratedAsset::find_by_id(&deployment.db().pool, id).await?;
    Ok(Json(ApiResponse::success(asset)))
}

async fn approve_asset(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    payload: Option<Json<ApproveAssetRequest>>,
) -> Result<Json<ApiResponse<GeneratedAsset>>, ApiError> {
    let approved = payload.map(|Json(p)| p.approved).unwrap_or(true);
    let asset = GeneratedAsset::set_approved(&deployment.db().pool, id, approved).await?;
    tracing::info!("Asset {} approval set to {}", asset.id, approved);
    Ok(Json(ApiResponse::success(asset)))
}

/// Removes the record only; files stay wherever the vendor stored them.
async fn delete_asset(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    GeneratedAsset::delete(&deployment.db().pool, id).await?;
    Ok(Json(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/assets", get(list_assets))
        .route("/assets/{id}", get(get_asset).delete(delete_asset))
        .route("/assets/{id}/approve", post(approve_asset))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use db::models::generated_asset::{AssetStatus, AssetType, CreateGeneratedAsset};
    use serde_json::json;

    use super::*;
    use crate::routes::test_support::TestApp;

    async fn seed(app: &TestApp, client_config_id: Option<Uuid>, source: AssetSource) -> GeneratedAsset {
        GeneratedAsset::create(
            &app.deployment.db().pool,
            CreateGeneratedAsset {
                client_config_id,
                source,
                asset_type: AssetType::Image,
                url: Some("https://res.example.com/a.png".into()),
                external_id: None,
                status: Some(AssetStatus::Completed),
                prompt: None,
                metadata: Some(json!({ "width": 1024 })),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn list_filters_by_client_source_and_approval() {
        let app = TestApp::new().await;
        let (_, client) = app
            .request(
                Method::POST,
                "/api/clients",
                Some(json!({ "client_id": "acme", "display_name": "Acme" })),
            )
            .await;
        let client_uuid: Uuid = client["data"]["id"].as_str().unwrap().parse().unwrap();

        let mine = seed(&app, Some(client_uuid), AssetSource::OpenAi).await;
        seed(&app, Some(client_uuid), AssetSource::Cloudinary).await;
        seed(&app, None, AssetSource::OpenAi).await;

        let (_, by_client) = app.request(Method::GET, "/api/assets?client_id=acme", None).await;
        assert_eq!(by_client["data"].as_array().unwrap().len(), 2);

        let (_, by_source) = app
            .request(Method::GET, "/api/assets?client_id=acme&source=openai", None)
            .await;
        assert_eq!(by_source["data"][0]["id"], mine.id.to_string());

        let (status, approved) = app
            .request(
                Method::POST,
                &format!("/api/assets/{}/approve", mine.id),
                Some(json!({ "approved": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["data"]["is_approved"], true);

        let (_, only_approved) = app.request(Method::GET, "/api/assets?approved=true", None).await;
        assert_eq!(only_approved["data"].as_array().unwrap().len(), 1);

        let (status, _) = app.request(Method::GET, "/api/assets?client_id=ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_and_delete_asset() {
        let app = TestApp::new().await;
        let asset = seed(&app, None, AssetSource::Manual).await;
        let uri = format!("/api/assets/{}", asset.id);

        let (status, body) = app.request(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["source"], "manual");

        let (status, _) = app.request(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.request(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_out_of_range_limit() {
        let app = TestApp::new().await;
        let (status, body) = app.request(Method::GET, "/api/assets?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_data"][0]["field"], "limit");
    }
}
