use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::is_unique_violation;

#[derive(Debug, Error)]
pub enum ClientConfigError {
    #[error(transparent)]
    Database(sqlx::Error),
    #[error("Client config not found")]
    NotFound,
    #[error("Client id already in use: {0}")]
    AlreadyExists(String),
}

impl From<sqlx::Error> for ClientConfigError {
    fn from(err: sqlx::Error) -> Self {
        ClientConfigError::Database(err)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ClientConfig {
    pub id: Uuid,
    pub client_id: String,
    pub display_name: String,
    pub brand_color: Option<String>,
    pub logo_url: Option<String>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateClientConfig {
    pub client_id: String,
    pub display_name: String,
    #[ts(optional)]
    pub brand_color: Option<String>,
    #[ts(optional)]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateClientConfig {
    #[ts(optional)]
    pub display_name: Option<String>,
    #[ts(optional)]
    pub brand_color: Option<String>,
    #[ts(optional)]
    pub logo_url: Option<String>,
}

impl ClientConfig {
    pub async fn create(
        pool: &SqlitePool,
        data: CreateClientConfig,
    ) -> Result<Self, ClientConfigError> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, ClientConfig>(
            r#"
            INSERT INTO client_configs (id, client_id, display_name, brand_color, logo_url)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.client_id)
        .bind(&data.display_name)
        .bind(&data.brand_color)
        .bind(&data.logo_url)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ClientConfigError::AlreadyExists(data.client_id.clone())
            } else {
                ClientConfigError::Database(e)
            }
        })
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, ClientConfigError> {
        let clients = sqlx::query_as::<_, ClientConfig>(
            r#"SELECT * FROM client_configs ORDER BY display_name ASC"#,
        )
        .fetch_all(pool)
        .await?;
        Ok(clients)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Self, ClientConfigError> {
        sqlx::query_as::<_, ClientConfig>(r#"SELECT * FROM client_configs WHERE id = ?1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(ClientConfigError::NotFound)
    }

    pub async fn find_by_client_id(
        pool: &SqlitePool,
        client_id: &str,
    ) -> Result<Self, ClientConfigError> {
        sqlx::query_as::<_, ClientConfig>(r#"SELECT * FROM client_configs WHERE client_id = ?1"#)
            .bind(client_id)
            .fetch_optional(pool)
            .await?
            .ok_or(ClientConfigError::NotFound)
    }

    /// Look up a client by row UUID or by its `client_id` slug.
    pub async fn resolve(pool: &SqlitePool, key: &str) -> Result<Self, ClientConfigError> {
        match Uuid::parse_str(key) {
            Ok(id) => match Self::find_by_id(pool, id).await {
                Err(ClientConfigError::NotFound) => Self::find_by_client_id(pool, key).await,
                other => other,
            },
            Err(_) => Self::find_by_client_id(pool, key).await,
        }
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: UpdateClientConfig,
    ) -> Result<Self, ClientConfigError> {
        sqlx::query_as::<_, ClientConfig>(
            r#"
            UPDATE client_configs SET
                display_name = COALESCE(?2, display_name),
                brand_color = COALESCE(?3, brand_color),
                logo_url = COALESCE(?4, logo_url),
                updated_at = datetime('now', 'subsec')
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.display_name)
        .bind(&data.brand_color)
        .bind(&data.logo_url)
        .fetch_optional(pool)
        .await?
        .ok_or(ClientConfigError::NotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), ClientConfigError> {
        let result = sqlx::query(r#"DELETE FROM client_configs WHERE id = ?1"#)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ClientConfigError::NotFound);
        }
        Ok(())
    }
}
