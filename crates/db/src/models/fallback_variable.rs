use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::is_unique_violation;

#[derive(Debug, Error)]
pub enum FallbackVariableError {
    #[error(transparent)]
    Database(sqlx::Error),
    #[error("Fallback variable not found")]
    NotFound,
    #[error("Variable {0} already exists for this template")]
    AlreadyExists(String),
}

impl From<sqlx::Error> for FallbackVariableError {
    fn from(err: sqlx::Error) -> Self {
        FallbackVariableError::Database(err)
    }
}

/// A template placeholder stored locally, used when the template API does not
/// report its own variable schema.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct FallbackVariable {
    pub id: Uuid,
    pub template_id: String,
    pub variable_name: String,
    pub variable_type: String,
    pub char_limit: Option<i64>,
    pub display_order: i64,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateFallbackVariable {
    pub variable_name: String,
    #[ts(optional)]
    pub variable_type: Option<String>,
    #[ts(optional)]
    pub char_limit: Option<i64>,
    #[ts(optional)]
    pub display_order: Option<i64>,
}

impl FallbackVariable {
    pub async fn create(
        pool: &SqlitePool,
        template_id: &str,
        data: CreateFallbackVariable,
    ) -> Result<Self, FallbackVariableError> {
        let display_order = match data.display_order {
            Some(order) => order,
            None => Self::next_display_order(pool, template_id).await?,
        };

        sqlx::query_as::<_, FallbackVariable>(
            r#"
            INSERT INTO fallback_variables (id, template_id, variable_name, variable_type, char_limit, display_order)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(template_id)
        .bind(&data.variable_name)
        .bind(data.variable_type.as_deref().unwrap_or("text"))
        .bind(data.char_limit)
        .bind(display_order)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                FallbackVariableError::AlreadyExists(data.variable_name.clone())
            } else {
                FallbackVariableError::Database(e)
            }
        })
    }

    async fn next_display_order(
        pool: &SqlitePool,
        template_id: &str,
    ) -> Result<i64, FallbackVariableError> {
        let next: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(MAX(display_order) + 1, 0) FROM fallback_variables WHERE template_id = ?1"#,
        )
        .bind(template_id)
        .fetch_one(pool)
        .await?;
        Ok(next)
    }

    pub async fn find_by_template(
        pool: &SqlitePool,
        template_id: &str,
    ) -> Result<Vec<Self>, FallbackVariableError> {
        let variables = sqlx::query_as::<_, FallbackVariable>(
            r#"
            SELECT * FROM fallback_variables
            WHERE template_id = ?1
            ORDER BY display_order ASC, variable_name ASC
            "#,
        )
        .bind(template_id)
        .fetch_all(pool)
        .await?;
        Ok(variables)
    }

    /// Replace every stored variable of a template in one transaction.
    /// Entries without an explicit order keep their position in `variables`.
    pub async fn replace_for_template(
        pool: &SqlitePool,
        template_id: &str,
        variables: Vec<CreateFallbackVariable>,
    ) -> Result<Vec<Self>, FallbackVariableError> {
        let mut tx = pool.begin().await?;

        sqlx::query(r#"DELETE FROM fallback_variables WHERE template_id = ?1"#)
            .bind(template_id)
            .execute(&mut *tx)
            .await?;

        let mut stored = Vec::with_capacity(variables.len());
        for (index, data) in variables.into_iter().enumerate() {
            let row = sqlx::query_as::<_, FallbackVariable>(
                r#"
                INSERT INTO fallback_variables (id, template_id, variable_name, variable_type, char_limit, display_order)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(template_id)
            .bind(&data.variable_name)
            .bind(data.variable_type.as_deref().unwrap_or("text"))
            .bind(data.char_limit)
            .bind(data.display_order.unwrap_or(index as i64))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    FallbackVariableError::AlreadyExists(data.variable_name.clone())
                } else {
                    FallbackVariableError::Database(e)
                }
            })?;
            stored.push(row);
        }

        tx.commit().await?;
        stored.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.variable_name.cmp(&b.variable_name))
        });
        Ok(stored)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), FallbackVariableError> {
        let result = sqlx::query(r#"DELETE FROM fallback_variables WHERE id = ?1"#)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FallbackVariableError::NotFound);
        }
        Ok(())
    }

    /// Returns the number of rows removed.
    pub async fn delete_by_template(
        pool: &SqlitePool,
        template_id: &str,
    ) -> Result<u64, FallbackVariableError> {
        let result = sqlx::query(r#"DELETE FROM fallback_variables WHERE template_id = ?1"#)
            .bind(template_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
