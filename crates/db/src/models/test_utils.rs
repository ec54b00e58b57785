use sqlx::SqlitePool;
use uuid::Uuid;

use super::client_config::{ClientConfig, CreateClientConfig};
use crate::DBService;

pub(crate) async fn setup_test_pool() -> SqlitePool {
    DBService::new_in_memory()
        .await
        .expect("failed to open sqlite memory db")
        .pool
}

pub(crate) async fn create_test_client(pool: &SqlitePool, client_id: &str) -> Uuid {
    ClientConfig::create(
        pool,
        CreateClientConfig {
            client_id: client_id.to_string(),
            display_name: format!("{client_id} display"),
            brand_color: None,
            logo_url: None,
        },
    )
    .await
    .expect("failed to create test client")
    .id
}
