use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GeneratedAssetError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Generated asset not found")]
    NotFound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetSource {
    HeyGen,
    OpenAi,
    RunwayMl,
    Cloudinary,
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetType {
    Video,
    Image,
    Text,
    Audio,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GeneratedAsset {
    pub id: Uuid,
    pub client_config_id: Option<Uuid>,
    pub source: String,
    pub asset_type: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub status: String,
    pub prompt: Option<String>,
    pub metadata: Option<String>,
    pub is_approved: bool,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateGeneratedAsset {
    #[ts(optional)]
    pub client_config_id: Option<Uuid>,
    pub source: AssetSource,
    pub asset_type: AssetType,
    #[ts(optional)]
    pub url: Option<String>,
    #[ts(optional)]
    pub external_id: Option<String>,
    #[ts(optional)]
    pub status: Option<AssetStatus>,
    #[ts(optional)]
    pub prompt: Option<String>,
    #[ts(optional)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct AssetFilter {
    #[ts(optional)]
    pub client_config_id: Option<Uuid>,
    #[ts(optional)]
    pub source: Option<AssetSource>,
    #[ts(optional)]
    pub approved: Option<bool>,
    #[ts(optional)]
    pub limit: Option<i64>,
}

impl GeneratedAsset {
    pub async fn create(
        pool: &SqlitePool,
        data: CreateGeneratedAsset,
    ) -> Result<Self, GeneratedAssetError> {
        let status = data.status.unwrap_or(AssetStatus::Pending).to_string();
        let metadata = data.metadata.map(|v| v.to_string());

        let asset = sqlx::query_as::<_, GeneratedAsset>(
            r#"
            INSERT INTO generated_assets (
                id, client_config_id, source, asset_type, url, external_id, status, prompt, metadata
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.client_config_id)
        .bind(data.source.to_string())
        .bind(data.asset_type.to_string())
        .bind(&data.url)
        .bind(&data.external_id)
        .bind(status)
        .bind(&data.prompt)
        .bind(metadata)
        .fetch_one(pool)
        .await?;

        Ok(asset)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Self, GeneratedAssetError> {
        sqlx::query_as::<_, GeneratedAsset>(r#"SELECT * FROM generated_assets WHERE id = ?1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(GeneratedAssetError::NotFound)
    }

    pub async fn find_by_external_id(
        pool: &SqlitePool,
        source: AssetSource,
        external_id: &str,
    ) -> Result<Option<Self>, GeneratedAssetError> {
        let asset = sqlx::query_as::<_, GeneratedAsset>(
            r#"
            SELECT * FROM generated_assets
            WHERE source = ?1 AND external_id = ?2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(source.to_string())
        .bind(external_id)
        .fetch_optional(pool)
        .await?;
        Ok(asset)
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &AssetFilter,
    ) -> Result<Vec<Self>, GeneratedAssetError> {
        let assets = sqlx::query_as::<_, GeneratedAsset>(
            r#"
            SELECT * FROM generated_assets
            WHERE (?1 IS NULL OR client_config_id = ?1)
              AND (?2 IS NULL OR source = ?2)
              AND (?3 IS NULL OR is_approved = ?3)
            ORDER BY created_at DESC
            LIMIT ?4
            "#,
        )
        .bind(filter.client_config_id)
        .bind(filter.source.map(|s| s.to_string()))
        .bind(filter.approved)
        .bind(filter.limit.unwrap_or(100))
        .fetch_all(pool)
        .await?;
        Ok(assets)
    }

    /// Record a status change; `url` is only overwritten when provided.
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: AssetStatus,
        url: Option<&str>,
    ) -> Result<Self, GeneratedAssetError> {
        sqlx::query_as::<_, GeneratedAsset>(
            r#"
            UPDATE generated_assets SET
                status = ?2,
                url = COALESCE(?3, url),
                updated_at = datetime('now', 'subsec')
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(url)
        .fetch_optional(pool)
        .await?
        .ok_or(GeneratedAssetError::NotFound)
    }

    pub async fn set_approved(
        pool: &SqlitePool,
        id: Uuid,
        approved: bool,
    ) -> Result<Self, GeneratedAssetError> {
        sqlx::query_as::<_, GeneratedAsset>(
            r#"
            UPDATE generated_assets SET
                is_approved = ?2,
                updated_at = datetime('now', 'subsec')
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approved)
        .fetch_optional(pool)
        .await?
        .ok_or(GeneratedAssetError::NotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), GeneratedAssetError> {
        let result = sqlx::query(r#"DELETE FROM generated_assets WHERE id = ?1"#)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GeneratedAssetError::NotFound);
        }
        Ok(())
    }

    pub fn status(&self) -> Option<AssetStatus> {
        self.status.parse().ok()
    }
}
