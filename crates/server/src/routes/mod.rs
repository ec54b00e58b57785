use axum::{
    Router,
    middleware,
    routing::{IntoMakeService, get},
};
use deployment::Deployment;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    DeploymentImpl,
    middleware::{request_id_middleware, require_admin, require_auth},
};

pub mod assets;
pub mod clients;
pub mod cloudinary;
pub mod generate;
pub mod health;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_support;

/// Every `/api` route with auth, request ids and CORS applied.
pub fn api_router(deployment: DeploymentImpl) -> Router {
    let admin_routes = Router::new()
        .merge(clients::admin_router())
        .merge(templates::admin_router())
        .route_layer(middleware::from_fn_with_state(
            deployment.clone(),
            require_admin,
        ));

    let user_routes = Router::new()
        .merge(clients::router())
        .merge(templates::router())
        .merge(generate::router())
        .merge(assets::router())
        .merge(cloudinary::router(deployment.max_upload_bytes()))
        .route_layer(middleware::from_fn_with_state(
            deployment.clone(),
            require_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .merge(admin_routes)
        .merge(user_routes)
        .with_state(deployment)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
}

pub fn router(deployment: DeploymentImpl) -> IntoMakeService<Router> {
    Router::new()
        .nest("/api", api_router(deployment))
        .into_make_service()
}
