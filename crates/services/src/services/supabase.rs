use std::time::Duration;

use moka::future::Cache;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ts_rs::TS;

use super::config::SupabaseConfig;

const TOKEN_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Supabase is not configured")]
    NotConfigured,
    #[error("Invalid or expired access token")]
    InvalidToken,
    #[error("Supabase auth service unavailable: {0}")]
    Unavailable(String),
    #[error("HTTP request error: {0}")]
    Request(String),
}

impl From<reqwest::Error> for SupabaseError {
    fn from(err: reqwest::Error) -> Self {
        SupabaseError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

/// The caller behind a request, as reported by Supabase auth.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub role: UserRole,
}

impl AuthUser {
    /// Stand-in identity used when no identity provider is configured.
    pub fn local_admin() -> Self {
        Self {
            id: "local".to_string(),
            email: None,
            role: UserRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    app_metadata: Value,
}

impl From<SupabaseUser> for AuthUser {
    fn from(user: SupabaseUser) -> Self {
        let role = match user.app_metadata.get("role").and_then(Value::as_str) {
            Some(r) if r.eq_ignore_ascii_case("admin") => UserRole::Admin,
            _ => UserRole::User,
        };
        AuthUser {
            id: user.id,
            email: user.email,
            role,
        }
    }
}

pub struct SupabaseAuth {
    client: Client,
    url: String,
    anon_key: SecretString,
    verified: Cache<String, AuthUser>,
}

impl std::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAuth").field("url", &self.url).finish()
    }
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Result<Self, SupabaseError> {
        if config.url.is_empty() || config.anon_key.expose_secret().is_empty() {
            return Err(SupabaseError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url,
            anon_key: config.anon_key,
            verified: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(TOKEN_CACHE_TTL)
                .build(),
        })
    }

    /// Resolve an access token to its user. Successful lookups are cached briefly.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, SupabaseError> {
        if let Some(user) = self.verified.get(access_token).await {
            return Ok(user);
        }

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.url))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SupabaseError::InvalidToken);
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(SupabaseError::Unavailable(format!("{status}: {body}")));
            }
        }

        let user: AuthUser = response
            .json::<SupabaseUser>()
            .await
            .map_err(|e| SupabaseError::Unavailable(e.to_string()))?
            .into();
        self.remember(access_token, user.clone()).await;
        Ok(user)
    }

    /// Accept `access_token` as `user` until the cache entry expires.
    pub async fn remember(&self, access_token: &str, user: AuthUser) {
        self.verified.insert(access_token.to_string(), user).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn role_comes_from_app_metadata() {
        let admin: AuthUser = serde_json::from_value::<SupabaseUser>(json!({
            "id": "u1",
            "email": "ops@example.com",
            "role": "authenticated",
            "app_metadata": { "provider": "email", "role": "Admin" }
        }))
        .unwrap()
        .into();
        assert!(admin.is_admin());
        assert_eq!(admin.email.as_deref(), Some("ops@example.com"));

        let user: AuthUser = serde_json::from_value::<SupabaseUser>(json!({
            "id": "u2",
            "email": null
        }))
        .unwrap()
        .into();
        assert_eq!(user.role, UserRole::User);
    }

    #[tokio::test]
    async fn remembered_tokens_skip_the_network() {
        let auth = SupabaseAuth::new(SupabaseConfig {
            url: "http://127.0.0.1:9".into(),
            anon_key: SecretString::from("anon".to_string()),
        })
        .unwrap();
        let editor = AuthUser {
            id: "u2".into(),
            email: Some("editor@example.com".into()),
            role: UserRole::User,
        };

        auth.remember("tok_editor", editor).await;
        let user = auth.get_user("tok_editor").await.unwrap();
        assert_eq!(user.id, "u2");
        assert!(!user.is_admin());
    }

    #[test]
    fn missing_settings_are_not_configured() {
        let result = SupabaseAuth::new(SupabaseConfig {
            url: String::new(),
            anon_key: SecretString::from("anon".to_string()),
        });
        assert!(matches!(result, Err(SupabaseError::NotConfigured)));
    }
}
