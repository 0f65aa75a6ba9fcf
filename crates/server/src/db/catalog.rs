//! `PostgreSQL` catalog reads.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{CatalogStore, RepositoryError};
use crate::models::CategoryCount;

pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn category_counts(&self) -> Result<Vec<CategoryCount>, RepositoryError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) FROM products GROUP BY category ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect())
    }
}
