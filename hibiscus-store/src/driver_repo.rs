use async_trait::async_trait;
use hibiscus_core::repository::DriverRepository;
use hibiscus_core::{CoreResult, Driver};
use serde_json::Value;
use sqlx::PgPool;

use crate::database::{map_json_error, map_sqlx_error};

pub struct PgDriverRepository {
    pool: PgPool,
}

impl PgDriverRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DriverRow {
    doc: Value,
}

impl TryFrom<DriverRow> for Driver {
    type Error = hibiscus_core::CoreError;

    fn try_from(row: DriverRow) -> Result<Self, Self::Error> {
        serde_json::from_value(row.doc).map_err(map_json_error)
    }
}

#[async_trait]
impl DriverRepository for PgDriverRepository {
    async fn create(&self, driver: &Driver) -> CoreResult<()> {
        let doc = serde_json::to_value(driver).map_err(map_json_error)?;
        sqlx::query("INSERT INTO drivers (id, created_at, doc) VALUES ($1, $2, $3)")
            .bind(&driver.id)
            .bind(driver.created_at)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> CoreResult<Option<Driver>> {
        let row = sqlx::query_as::<_, DriverRow>("SELECT doc FROM drivers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(Driver::try_from).transpose()
    }

    async fn list(&self) -> CoreResult<Vec<Driver>> {
        let rows = sqlx::query_as::<_, DriverRow>("SELECT doc FROM drivers ORDER BY doc ->> 'name'")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(Driver::try_from).collect()
    }

    async fn list_active(&self) -> CoreResult<Vec<Driver>> {
        let rows = sqlx::query_as::<_, DriverRow>(
            "SELECT doc FROM drivers WHERE COALESCE((doc ->> 'active')::boolean, true) ORDER BY doc ->> 'name'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(Driver::try_from).collect()
    }

    async fn save(&self, driver: &Driver) -> CoreResult<bool> {
        let doc = serde_json::to_value(driver).map_err(map_json_error)?;
        let result = sqlx::query("UPDATE drivers SET doc = $2 WHERE id = $1")
            .bind(&driver.id)
            .bind(doc)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM drivers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
