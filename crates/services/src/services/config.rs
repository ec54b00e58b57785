//! Environment-driven configuration for the vendor integrations.
//!
//! Every vendor section is optional: a missing key disables that integration
//! and the routes depending on it answer with 503.

use secrecy::SecretString;

pub const DEFAULT_TEMPLATE_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_TEMPLATE_CACHE_CAPACITY: u64 = 1_000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;

const HEYGEN_API_BASE: &str = "https://api.heygen.com";
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const RUNWAYML_API_BASE: &str = "https://api.dev.runwayml.com/v1";
const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug)]
pub struct HeyGenConfig {
    pub api_key: SecretString,
    pub base_url: String,
}

#[derive(Debug)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
}

#[derive(Debug)]
pub struct RunwayConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub base_url: String,
    pub upload_folder: Option<String>,
}

#[derive(Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: SecretString,
}

#[derive(Debug)]
pub struct TemplateCacheConfig {
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for TemplateCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TEMPLATE_CACHE_TTL_SECS,
            max_capacity: DEFAULT_TEMPLATE_CACHE_CAPACITY,
        }
    }
}

/// Largest request body accepted by the upload route.
#[derive(Debug)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

#[derive(Debug, Default)]
pub struct Config {
    pub heygen: Option<HeyGenConfig>,
    pub openai: Option<OpenAiConfig>,
    pub runway: Option<RunwayConfig>,
    pub cloudinary: Option<CloudinaryConfig>,
    pub supabase: Option<SupabaseConfig>,
    pub template_cache: TemplateCacheConfig,
    pub upload: UploadConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let heygen = get("HEYGEN_API_KEY").map(|key| HeyGenConfig {
            api_key: SecretString::from(key),
            base_url: get("HEYGEN_API_BASE").unwrap_or_else(|| HEYGEN_API_BASE.to_string()),
        });

        let openai = get("OPENAI_API_KEY").map(|key| OpenAiConfig {
            api_key: SecretString::from(key),
            base_url: get("OPENAI_API_BASE").unwrap_or_else(|| OPENAI_API_BASE.to_string()),
            text_model: get("OPENAI_TEXT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            image_model: get("OPENAI_IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string()),
        });

        let runway = get("RUNWAYML_API_KEY").map(|key| RunwayConfig {
            api_key: SecretString::from(key),
            base_url: get("RUNWAYML_API_BASE").unwrap_or_else(|| RUNWAYML_API_BASE.to_string()),
            model: get("RUNWAYML_MODEL").unwrap_or_else(|| "gen4_turbo".to_string()),
        });

        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret: SecretString::from(api_secret),
                base_url: get("CLOUDINARY_API_BASE")
                    .unwrap_or_else(|| CLOUDINARY_API_BASE.to_string()),
                upload_folder: get("CLOUDINARY_UPLOAD_FOLDER"),
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!(
                    "Cloudinary is partially configured; CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET are all required"
                );
                None
            }
        };

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key: SecretString::from(anon_key),
            }),
            _ => None,
        };

        let template_cache = TemplateCacheConfig {
            ttl_secs: get("TEMPLATE_CACHE_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TEMPLATE_CACHE_TTL_SECS),
            max_capacity: get("TEMPLATE_CACHE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TEMPLATE_CACHE_CAPACITY),
        };

        let upload = UploadConfig {
            max_bytes: get("MAX_UPLOAD_MB")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|mb| *mb > 0)
                .unwrap_or(DEFAULT_MAX_UPLOAD_MB)
                .saturating_mul(1024 * 1024),
        };

        Self {
            heygen,
            openai,
            runway,
            cloudinary,
            supabase,
            template_cache,
            upload,
        }
    }

    /// Names of the integrations that have credentials, for startup logging.
    pub fn enabled_integrations(&self) -> Vec<&'static str> {
        [
            ("heygen", self.heygen.is_some()),
            ("openai", self.openai.is_some()),
            ("runwayml", self.runway.is_some()),
            ("cloudinary", self.cloudinary.is_some()),
            ("supabase", self.supabase.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.then_some(name))
        .collect()
    }
}
