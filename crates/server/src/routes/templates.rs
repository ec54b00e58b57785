//! Template catalogue, per-client template assignments and the stored
//! fallback variables that back the resolution chain.

use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use db::models::{
    client_config::ClientConfig,
    fallback_variable::{CreateFallbackVariable, FallbackVariable},
    template_assignment::{CreateTemplateAssignment, TemplateAssignment},
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::{
    heygen::HeyGenTemplate,
    template_manager::{ResolvedTemplate, TemplateCacheStats},
    template_variables::{VariableType, clean_variable_name},
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, validation::Validator};

const MAX_TEMPLATE_ID_LEN: usize = 128;
const MAX_VARIABLE_NAME_LEN: usize = 100;
const MAX_CHAR_LIMIT: i64 = 5_000;

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct InvalidateCacheRequest {
    #[ts(optional)]
    pub template_id: Option<String>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateAssignmentRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize, TS)]
pub struct ReplaceFallbackVariables {
    pub variables: Vec<CreateFallbackVariable>,
}

#[derive(Debug, Serialize, TS)]
pub struct DeletedCount {
    pub deleted: u64,
}

async fn list_heygen_templates(
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<ApiResponse<Vec<HeyGenTemplate>>>, ApiError> {
    let templates = deployment
        .template_manager()
        .list_templates(query.refresh)
        .await?;
    Ok(Json(ApiResponse::success(templates.as_ref().clone())))
}

async fn get_template_variables(
    State(deployment): State<DeploymentImpl>,
    Path(template_id): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<ApiResponse<ResolvedTemplate>>, ApiError> {
    let resolved = deployment
        .template_manager()
        .resolve(&template_id, query.refresh)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("No variables found for template {template_id}"))
        })?;
    Ok(Json(ApiResponse::success(resolved)))
}

async fn invalidate_cache(
    State(deployment): State<DeploymentImpl>,
    payload: Option<Json<InvalidateCacheRequest>>,
) -> Result<Json<ApiResponse<TemplateCacheStats>>, ApiError> {
    let manager = deployment.template_manager();
    match payload.and_then(|Json(p)| p.template_id) {
        Some(template_id) => {
            manager.invalidate(&template_id).await;
            tracing::info!("Invalidated cached variables for template {}", template_id);
        }
        None => {
            manager.invalidate_all().await;
            tracing::info!("Invalidated the template cache");
        }
    }
    Ok(Json(ApiResponse::success(manager.stats().await)))
}

async fn cache_stats(
    State(deployment): State<DeploymentImpl>,
) -> Json<ApiResponse<TemplateCacheStats>> {
    Json(ApiResponse::success(deployment.template_manager().stats().await))
}

async fn list_client_templates(
    State(deployment): State<DeploymentImpl>,
    Path(client_key): Path<String>,
    Query(query): Query<AssignmentQuery>,
) -> Result<Json<ApiResponse<Vec<TemplateAssignment>>>, ApiError> {
    let pool = &deployment.db().pool;
    let client = ClientConfig::resolve(pool, &client_key).await?;
    let assignments = TemplateAssignment::find_by_client(pool, client.id, query.active_only).await?;
    Ok(Json(ApiResponse::success(assignments)))
}

async fn assign_template(
    State(deployment): State<DeploymentImpl>,
    Path(client_key): Path<String>,
    Json(mut payload): Json<CreateTemplateAssignment>,
) -> Result<Json<ApiResponse<TemplateAssignment>>, ApiError> {
    payload.template_id = payload.template_id.trim().to_string();
    let mut validator = Validator::new();
    validator.required("template_id", &payload.template_id, MAX_TEMPLATE_ID_LEN);
    if let Some(name) = &payload.template_name {
        validator.max_chars("template_name", name, 200);
    }
    ApiError::ensure_valid(validator.finish())?;

    let pool = &deployment.db().pool;
    let client = ClientConfig::resolve(pool, &client_key).await?;
    let assignment = TemplateAssignment::assign(pool, client.id, payload).await?;
    tracing::info!(
        "Assigned template {} to client {}",
        assignment.template_id,
        client.client_id
    );
    Ok(Json(ApiResponse::success(assignment)))
}

async fn update_assignment(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAssignmentRequest>,
) -> Result<Json<ApiResponse<TemplateAssignment>>, ApiError> {
    let assignment =
        TemplateAssignment::set_active(&deployment.db().pool, id, payload.is_active).await?;
    Ok(Json(ApiResponse::success(assignment)))
}

async fn delete_assignment(
    State(deployment): State<DeploymentImpl>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    TemplateAssignment::delete(&deployment.db().pool, id).await?;
    Ok(Json(ApiResponse::success(())))
}

async fn get_fallback_variables(
    State(deployment): State<DeploymentImpl>,
    Path(template_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<FallbackVariable>>>, ApiError> {
    let variables = FallbackVariable::find_by_template(&deployment.db().pool, &template_id).await?;
    Ok(Json(ApiResponse::success(variables)))
}

async fn replace_fallback_variables(
    State(deployment): State<DeploymentImpl>,
    Path(template_id): Path<String>,
    Json(payload): Json<ReplaceFallbackVariables>,
) -> Result<Json<ApiResponse<Vec<FallbackVariable>>>, ApiError> {
    let variables = clean_fallback_variables(payload.variables)?;

    let stored =
        FallbackVariable::replace_for_template(&deployment.db().pool, &template_id, variables)
            .await?;
    deployment.template_manager().invalidate(&template_id).await;
    tracing::info!(
        "Stored {} fallback variables for template {}",
        stored.len(),
        template_id
    );
    Ok(Json(ApiResponse::success(stored)))
}

async fn delete_fallback_variables(
    State(deployment): State<DeploymentImpl>,
    Path(template_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedCount>>, ApiError> {
    let deleted = FallbackVariable::delete_by_template(&deployment.db().pool, &template_id).await?;
    deployment.template_manager().invalidate(&template_id).await;
    Ok(Json(ApiResponse::success(DeletedCount { deleted })))
}

/// Normalize names and types and reject anything the resolver could not use.
fn clean_fallback_variables(
    variables: Vec<CreateFallbackVariable>,
) -> Result<Vec<CreateFallbackVariable>, ApiError> {
    let mut validator = Validator::new();
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(variables.len());

    for (index, mut variable) in variables.into_iter().enumerate() {
        let field = |name: &str| format!("variables[{index}].{name}");

        variable.variable_name = clean_variable_name(&variable.variable_name);
        validator.required(
            &field("variable_name"),
            &variable.variable_name,
            MAX_VARIABLE_NAME_LEN,
        );
        if !variable.variable_name.is_empty() && !seen.insert(variable.variable_name.clone()) {
            validator.error(&field("variable_name"), "is duplicated");
        }

        if let Some(raw) = &variable.variable_type {
            match raw.trim().to_ascii_lowercase().parse::<VariableType>() {
                Ok(kind) => variable.variable_type = Some(kind.to_string()),
                Err(_) => {
                    validator.error(&field("variable_type"), "must be text, image, video or audio");
                }
            }
        }
        validator.range(&field("char_limit"), variable.char_limit, 1, MAX_CHAR_LIMIT);
        validator.range(&field("display_order"), variable.display_order, 0, i64::from(u16::MAX));

        cleaned.push(variable);
    }

    ApiError::ensure_valid(validator.finish())?;
    Ok(cleaned)
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/templates/heygen/list", get(list_heygen_templates))
        .route("/templates/cache/stats", get(cache_stats))
        .route("/templates/{template_id}/variables", get(get_template_variables))
        .route(
            "/templates/client/{client_id}/templates",
            get(list_client_templates),
        )
        .route(
            "/templates/{template_id}/fallback-variables",
            get(get_fallback_variables),
        )
}

pub fn admin_router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/templates/cache/invalidate", post(invalidate_cache))
        .route(
            "/templates/client/{client_id}/templates",
            post(assign_template),
        )
        .route(
            "/templates/assignments/{id}",
            patch(update_assignment).delete(delete_assignment),
        )
        .route(
            "/templates/{template_id}/fallback-variables",
            axum::routing::put(replace_fallback_variables).delete(delete_fallback_variables),
        )
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::routes::test_support::TestApp;

    const BUILTIN_TEMPLATE: &str = "a3f1c2d4e5b6478899aabbccddeeff01";

    #[tokio::test]
    async fn variables_resolve_from_builtin_table_then_stored_fallbacks() {
        let app = TestApp::new().await;

        let (status, body) = app
            .request(Method::GET, &format!("/api/templates/{BUILTIN_TEMPLATE}/variables"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["source"], "builtin");
        assert_eq!(body["data"]["variables"][0]["name"], "product_name");
        assert_eq!(body["data"]["variables"][0]["charLimit"], 40);

        let (status, _) = app
            .request(
                Method::PUT,
                &format!("/api/templates/{BUILTIN_TEMPLATE}/fallback-variables"),
                Some(json!({ "variables": [
                    { "variable_name": "{{ headline }}", "char_limit": 60 },
                    { "variable_name": "hero", "variable_type": "IMAGE" }
                ]})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        // the write invalidated the cached builtin answer
        let (_, body) = app
            .request(Method::GET, &format!("/api/templates/{BUILTIN_TEMPLATE}/variables"), None)
            .await;
        assert_eq!(body["data"]["source"], "database");
        assert_eq!(
            body["data"]["variables"],
            json!([
                { "name": "headline", "type": "text", "charLimit": 60 },
                { "name": "hero", "type": "image", "charLimit": null }
            ])
        );

        let (_, deleted) = app
            .request(
                Method::DELETE,
                &format!("/api/templates/{BUILTIN_TEMPLATE}/fallback-variables"),
                None,
            )
            .await;
        assert_eq!(deleted["data"]["deleted"], 2);
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let app = TestApp::new().await;
        let (status, body) = app
            .request(Method::GET, "/api/templates/nope/variables", None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn fallback_variable_validation() {
        let app = TestApp::new().await;
        let (status, body) = app
            .request(
                Method::PUT,
                "/api/templates/tpl_1/fallback-variables",
                Some(json!({ "variables": [
                    { "variable_name": "cta" },
                    { "variable_name": "cta", "variable_type": "hologram", "char_limit": 0 }
                ]})),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields: Vec<_> = body["error_data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            fields,
            vec![
                "variables[1].variable_name",
                "variables[1].variable_type",
                "variables[1].char_limit"
            ]
        );
    }

    #[tokio::test]
    async fn heygen_list_is_unavailable_without_credentials() {
        let app = TestApp::new().await;
        let (status, _) = app.request(Method::GET, "/api/templates/heygen/list", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn client_template_assignments() {
        let app = TestApp::new().await;
        app.request(
            Method::POST,
            "/api/clients",
            Some(json!({ "client_id": "acme", "display_name": "Acme" })),
        )
        .await;

        let (status, created) = app
            .request(
                Method::POST,
                "/api/templates/client/acme/templates",
                Some(json!({ "template_id": "tpl_1", "template_name": "Launch" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let assignment_id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .request(
                Method::POST,
                "/api/templates/client/acme/templates",
                Some(json!({ "template_id": "tpl_1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, updated) = app
            .request(
                Method::PATCH,
                &format!("/api/templates/assignments/{assignment_id}"),
                Some(json!({ "is_active": false })),
            )
            .await;
        assert_eq!(updated["data"]["is_active"], false);

        let (_, active) = app
            .request(Method::GET, "/api/templates/client/acme/templates?active_only=true", None)
            .await;
        assert!(active["data"].as_array().unwrap().is_empty());
        let (_, all) = app
            .request(Method::GET, "/api/templates/client/acme/templates", None)
            .await;
        assert_eq!(all["data"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .request(Method::GET, "/api/templates/client/missing/templates", None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cache_invalidation_and_stats() {
        let app = TestApp::new().await;
        app.request(Method::GET, &format!("/api/templates/{BUILTIN_TEMPLATE}/variables"), None)
            .await;
        let (_, stats) = app.request(Method::GET, "/api/templates/cache/stats", None).await;
        assert_eq!(stats["data"]["entry_count"], 1);

        let (status, after) = app
            .request(Method::POST, "/api/templates/cache/invalidate", Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["data"]["entry_count"], 0);
    }

    #[test]
    fn cleaning_normalizes_names_and_types() {
        let cleaned = clean_fallback_variables(vec![CreateFallbackVariable {
            variable_name: " {{product_name}} ".into(),
            variable_type: Some("Video".into()),
            char_limit: None,
            display_order: None,
        }])
        .unwrap();
        assert_eq!(cleaned[0].variable_name, "product_name");
        assert_eq!(cleaned[0].variable_type.as_deref(), Some("video"));
    }
}
