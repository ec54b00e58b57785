use anyhow::Error as AnyhowError;
use deployment::{Deployment, DeploymentError};
use server::{DeploymentImpl, routes};
use sqlx::Error as SqlxError;
use strip_ansi_escapes::strip;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, prelude::*};
use utils::sentry::{init_once, sentry_layer};

const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Error)]
pub enum ContentStudioError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

fn port_from_env() -> u16 {
    let raw = std::env::var("BACKEND_PORT").or_else(|_| std::env::var("PORT"));
    match raw {
        Ok(value) => {
            let cleaned = String::from_utf8(strip(value.as_bytes())).unwrap_or(value);
            cleaned.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Invalid port '{}', falling back to {}", cleaned.trim(), DEFAULT_PORT);
                DEFAULT_PORT
            })
        }
        Err(_) => DEFAULT_PORT,
    }
}

#[tokio::main]
async fn main() -> Result<(), ContentStudioError> {
    dotenv::dotenv().ok();
    let _sentry = init_once();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},deployment={level},local_deployment={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).map_err(AnyhowError::from)?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .with(sentry_layer())
        .init();

    let deployment = DeploymentImpl::new().await?;

    let prefetch = deployment.clone();
    tokio::spawn(async move {
        prefetch.prefetch_templates().await;
    });

    let app_router = routes::router(deployment);

    let port = port_from_env();
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();
    tracing::info!("Server running on http://{host}:{actual_port}");

    axum::serve(listener, app_router).await?;
    Ok(())
}
