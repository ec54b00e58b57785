use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    cloudinary::CloudinaryClient,
    config::Config,
    heygen::HeyGenClient,
    openai::OpenAiClient,
    runway::RunwayClient,
    supabase::SupabaseAuth,
    template_manager::TemplateManager,
};

#[derive(Clone)]
pub struct LocalDeployment {
    db: DBService,
    template_manager: Arc<TemplateManager>,
    heygen: Option<Arc<HeyGenClient>>,
    openai: Option<Arc<OpenAiClient>>,
    runway: Option<Arc<RunwayClient>>,
    cloudinary: Option<Arc<CloudinaryClient>>,
    supabase: Option<Arc<SupabaseAuth>>,
    max_upload_bytes: usize,
}

impl LocalDeployment {
    /// Wire up clients for every configured integration.
    pub fn from_parts(db: DBService, config: Config) -> Self {
        let enabled = config.enabled_integrations();
        if enabled.is_empty() {
            tracing::warn!("No vendor integrations configured");
        } else {
            tracing::info!("Enabled integrations: {}", enabled.join(", "));
        }

        let Config {
            heygen,
            openai,
            runway,
            cloudinary,
            supabase,
            template_cache,
            upload,
        } = config;

        let heygen = build_client("HeyGen", heygen, HeyGenClient::new);
        let openai = build_client("OpenAI", openai, OpenAiClient::new);
        let runway = build_client("RunwayML", runway, RunwayClient::new);
        let cloudinary = build_client("Cloudinary", cloudinary, CloudinaryClient::new);
        let supabase = build_client("Supabase", supabase, SupabaseAuth::new);

        let template_manager = Arc::new(TemplateManager::new(
            db.pool.clone(),
            heygen.clone(),
            &template_cache,
        ));

        Self {
            db,
            template_manager,
            heygen,
            openai,
            runway,
            cloudinary,
            supabase,
            max_upload_bytes: upload.max_bytes,
        }
    }
}

fn build_client<C, T, E>(
    name: &str,
    config: Option<C>,
    build: impl FnOnce(C) -> Result<T, E>,
) -> Option<Arc<T>>
where
    E: std::fmt::Display,
{
    match build(config?) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::error!("Failed to initialise {} client: {}", name, e);
            None
        }
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = Config::from_env();
        let db = DBService::new().await?;
        Ok(Self::from_parts(db, config))
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn template_manager(&self) -> &Arc<TemplateManager> {
        &self.template_manager
    }

    fn heygen(&self) -> Option<&Arc<HeyGenClient>> {
        self.heygen.as_ref()
    }

    fn openai(&self) -> Option<&Arc<OpenAiClient>> {
        self.openai.as_ref()
    }

    fn runway(&self) -> Option<&Arc<RunwayClient>> {
        self.runway.as_ref()
    }

    fn cloudinary(&self) -> Option<&Arc<CloudinaryClient>> {
        self.cloudinary.as_ref()
    }

    fn supabase(&self) -> Option<&Arc<SupabaseAuth>> {
        self.supabase.as_ref()
    }

    fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }
}

#[cfg(test)]
mod tests {
    use services::services::config::TemplateCacheConfig;

    use super::*;

    #[tokio::test]
    async fn empty_config_disables_every_integration() {
        let db = DBService::new_in_memory().await.unwrap();
        let deployment = LocalDeployment::from_parts(db, Config::default());

        assert!(deployment.heygen().is_none());
        assert!(deployment.openai().is_none());
        assert!(deployment.runway().is_none());
        assert!(deployment.cloudinary().is_none());
        assert!(deployment.supabase().is_none());
        assert_eq!(deployment.template_manager().stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn configured_client_is_built() {
        let db = DBService::new_in_memory().await.unwrap();
        let config = Config::from_lookup(|key| match key {
            "HEYGEN_API_KEY" => Some("hg-test".to_string()),
            "MAX_UPLOAD_MB" => Some("8".to_string()),
            _ => None,
        });
        assert_eq!(config.template_cache.ttl_secs, TemplateCacheConfig::default().ttl_secs);

        let deployment = LocalDeployment::from_parts(db, config);
        assert!(deployment.heygen().is_some());
        assert!(deployment.openai().is_none());
        assert_eq!(deployment.max_upload_bytes(), 8 * 1024 * 1024);
    }
}
