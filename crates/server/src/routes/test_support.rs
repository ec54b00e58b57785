use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Builder,
    },
};
use db::DBService;
use serde_json::Value;
use services::services::config::Config;
use tower::ServiceExt;

use crate::{DeploymentImpl, routes::api_router};

/// The API router over an in-memory database with no vendors configured.
pub struct TestApp {
    pub deployment: DeploymentImpl,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let db = DBService::new_in_memory().await.unwrap();
        let deployment = DeploymentImpl::from_parts(db, config);
        let router = Router::new().nest("/api", api_router(deployment.clone()));
        Self { deployment, router }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(json_request(Request::builder().method(method).uri(uri), body))
            .await
    }

    /// Like [`TestApp::request`], sending `token` as the bearer token.
    pub async fn request_as(
        &self,
        token: &str,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        self.send(json_request(builder, body)).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

fn json_request(builder: Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap()
}
