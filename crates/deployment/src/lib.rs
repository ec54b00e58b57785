use std::sync::Arc;

use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use db::DBService;
use services::services::{
    cloudinary::CloudinaryClient,
    heygen::HeyGenClient,
    openai::OpenAiClient,
    runway::RunwayClient,
    supabase::SupabaseAuth,
    template_manager::TemplateManager,
};
use sqlx::Error as SqlxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

/// Everything a request handler needs: storage, the template resolver and
/// whichever vendor clients are configured.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn db(&self) -> &DBService;

    fn template_manager(&self) -> &Arc<TemplateManager>;

    fn heygen(&self) -> Option<&Arc<HeyGenClient>>;

    fn openai(&self) -> Option<&Arc<OpenAiClient>>;

    fn runway(&self) -> Option<&Arc<RunwayClient>>;

    fn cloudinary(&self) -> Option<&Arc<CloudinaryClient>>;

    /// `None` means requests are not authenticated.
    fn supabase(&self) -> Option<&Arc<SupabaseAuth>>;

    /// Body limit for the upload route, in bytes.
    fn max_upload_bytes(&self) -> usize;

    /// Warm the template list cache so the first dashboard load is fast.
    async fn prefetch_templates(&self) {
        if self.heygen().is_none() {
            return;
        }
        match self.template_manager().list_templates(false).await {
            Ok(list) => tracing::info!("Prefetched {} HeyGen templates", list.len()),
            Err(e) => tracing::warn!("Failed to prefetch HeyGen templates: {}", e),
        }
    }
}
