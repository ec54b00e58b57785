use axum::{Json, extract::State};
use deployment::Deployment;
use serde::Serialize;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::DeploymentImpl;

#[derive(Debug, Serialize, TS)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub integrations: Vec<String>,
}

pub async fn health_check(State(deployment): State<DeploymentImpl>) -> Json<ApiResponse<HealthStatus>> {
    let integrations = [
        ("heygen", deployment.heygen().is_some()),
        ("openai", deployment.openai().is_some()),
        ("runwayml", deployment.runway().is_some()),
        ("cloudinary", deployment.cloudinary().is_some()),
        ("supabase", deployment.supabase().is_some()),
    ]
    .into_iter()
    .filter_map(|(name, enabled)| enabled.then(|| name.to_string()))
    .collect();

    Json(ApiResponse::success(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        integrations,
    }))
}
