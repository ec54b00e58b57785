use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::is_unique_violation;

#[derive(Debug, Error)]
pub enum TemplateAssignmentError {
    #[error(transparent)]
    Database(sqlx::Error),
    #[error("Template assignment not found")]
    NotFound,
    #[error("Template {0} is already assigned to this client")]
    AlreadyExists(String),
}

impl From<sqlx::Error> for TemplateAssignmentError {
    fn from(err: sqlx::Error) -> Self {
        TemplateAssignmentError::Database(err)
    }
}

/// Links a client to a HeyGen template it is allowed to render.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct TemplateAssignment {
    pub id: Uuid,
    pub client_config_id: Uuid,
    pub template_id: String,
    pub template_name: Option<String>,
    pub is_active: bool,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateTemplateAssignment {
    pub template_id: String,
    #[ts(optional)]
    pub template_name: Option<String>,
    #[ts(optional)]
    pub is_active: Option<bool>,
}

impl TemplateAssignment {
    pub async fn assign(
        pool: &SqlitePool,
        client_config_id: Uuid,
        data: CreateTemplateAssignment,
    ) -> Result<Self, TemplateAssignmentError> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, TemplateAssignment>(
            r#"
            INSERT INTO template_assignments (id, client_config_id, template_id, template_name, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(client_config_id)
        .bind(&data.template_id)
        .bind(&data.template_name)
        .bind(data.is_active.unwrap_or(true))
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TemplateAssignmentError::AlreadyExists(data.template_id.clone())
            } else {
                TemplateAssignmentError::Database(e)
            }
        })
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Self, TemplateAssignmentError> {
        sqlx::query_as::<_, TemplateAssignment>(
            r#"SELECT * FROM template_assignments WHERE id = ?1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(TemplateAssignmentError::NotFound)
    }

    pub async fn find_by_client(
        pool: &SqlitePool,
        client_config_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<Self>, TemplateAssignmentError> {
        let assignments = sqlx::query_as::<_, TemplateAssignment>(
            r#"
            SELECT * FROM template_assignments
            WHERE client_config_id = ?1
              AND (?2 = 0 OR is_active = 1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(client_config_id)
        .bind(active_only)
        .fetch_all(pool)
        .await?;
        Ok(assignments)
    }

    /// True when the client has an active assignment for the template.
    pub async fn is_assigned(
        pool: &SqlitePool,
        client_config_id: Uuid,
        template_id: &str,
    ) -> Result<bool, TemplateAssignmentError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM template_assignments
            WHERE client_config_id = ?1 AND template_id = ?2 AND is_active = 1
            "#,
        )
        .bind(client_config_id)
        .bind(template_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn set_active(
        pool: &SqlitePool,
        id: Uuid,
        is_active: bool,
    ) -> Result<Self, TemplateAssignmentError> {
        sqlx::query_as::<_, TemplateAssignment>(
            r#"
            UPDATE template_assignments SET
                is_active = ?2,
                updated_at = datetime('now', 'subsec')
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(pool)
        .await?
        .ok_or(TemplateAssignmentError::NotFound)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<(), TemplateAssignmentError> {
        let result = sqlx::query(r#"DELETE FROM template_assignments WHERE id = ?1"#)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TemplateAssignmentError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        client_config::ClientConfig,
        test_utils::{create_test_client, setup_test_pool},
    };

    fn template(id: &str) -> CreateTemplateAssignment {
        CreateTemplateAssignment {
            template_id: id.into(),
            template_name: Some(format!("Template {id}")),
            is_active: None,
        }
    }

    #[tokio::test]
    async fn active_filter_hides_deactivated_templates() {
        let pool = setup_test_pool().await;
        let client = create_test_client(&pool, "acme").await;

        let first = TemplateAssignment::assign(&pool, client, template("tpl_a"))
            .await
            .unwrap();
        TemplateAssignment::assign(&pool, client, template("tpl_b"))
            .await
            .unwrap();
        assert!(first.is_active);

        TemplateAssignment::set_active(&pool, first.id, false)
            .await
            .unwrap();

        let all = TemplateAssignment::find_by_client(&pool, client, false)
            .await
            .unwrap();
        let active = TemplateAssignment::find_by_client(&pool, client, true)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].template_id, "tpl_b");

        assert!(!TemplateAssignment::is_assigned(&pool, client, "tpl_a").await.unwrap());
        assert!(TemplateAssignment::is_assigned(&pool, client, "tpl_b").await.unwrap());
    }

    #[tokio::test]
    async fn same_template_cannot_be_assigned_twice() {
        let pool = setup_test_pool().await;
        let client = create_test_client(&pool, "acme").await;

        TemplateAssignment::assign(&pool, client, template("tpl_a"))
            .await
            .unwrap();
        let err = TemplateAssignment::assign(&pool, client, template("tpl_a"))
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateAssignmentError::AlreadyExists(_)));

        let other = create_test_client(&pool, "globex").await;
        TemplateAssignment::assign(&pool, other, template("tpl_a"))
            .await
            .expect("different clients may share a template");
    }

    #[tokio::test]
    async fn deleting_client_cascades_to_assignments() {
        let pool = setup_test_pool().await;
        let client = create_test_client(&pool, "acme").await;
        let assignment = TemplateAssignment::assign(&pool, client, template("tpl_a"))
            .await
            .unwrap();

        ClientConfig::delete(&pool, client).await.unwrap();

        assert!(matches!(
            TemplateAssignment::find_by_id(&pool, assignment.id).await,
            Err(TemplateAssignmentError::NotFound)
        ));
    }
}
