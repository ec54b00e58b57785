use std::sync::Once;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use deployment::Deployment;
use services::services::supabase::AuthUser;

use crate::{DeploymentImpl, error::ApiError};

static LOCAL_ADMIN_WARNING: Once = Once::new();

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Identify the caller. Without an identity provider every request runs as
/// the local admin.
pub async fn current_user(
    deployment: &DeploymentImpl,
    token: Option<&str>,
) -> Result<AuthUser, ApiError> {
    let Some(supabase) = deployment.supabase() else {
        LOCAL_ADMIN_WARNING.call_once(|| {
            tracing::warn!(
                "Supabase is not configured; all requests are treated as the local admin"
            );
        });
        return Ok(AuthUser::local_admin());
    };

    let token = token.ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
    Ok(supabase.get_user(token).await?)
}

pub async fn require_auth(
    State(deployment): State<DeploymentImpl>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).map(str::to_string);
    let user = current_user(&deployment, token.as_deref()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(deployment): State<DeploymentImpl>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).map(str::to_string);
    let user = current_user(&deployment, token.as_deref()).await?;
    if !user.is_admin() {
        tracing::info!("Rejected non-admin user {} on {}", user.id, request.uri().path());
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
