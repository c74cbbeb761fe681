use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::models::{EventType, RegistryEntry};

use super::{NewRegistryEntry, RegistryStore, Store, StoreError, StoreFuture, parse_event_type};

const REGISTRY_COLUMNS: &str =
    "id, user_id, product_key, event_type, product_name, brand, times_logged, created_at, updated_at";

impl RegistryStore for Store {
    fn find_registry_entry<'a>(
        &'a self,
        user_id: Uuid,
        product_key: &'a str,
    ) -> StoreFuture<'a, Option<RegistryEntry>> {
        Box::pin(async move {
            let mut tx = self.begin_as(user_id).await?;
            let row = sqlx::query(&format!(
                "SELECT {REGISTRY_COLUMNS}
                 FROM user_product_registry
                 WHERE user_id = $1 AND product_key = $2"
            ))
            .bind(user_id)
            .bind(product_key)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            row.map(|row| registry_entry_from_row(&row)).transpose()
        })
    }

    fn list_registry_entries<'a>(&'a self, user_id: Uuid) -> StoreFuture<'a, Vec<RegistryEntry>> {
        Box::pin(async move {
            let mut tx = self.begin_as(user_id).await?;
            let rows = sqlx::query(&format!(
                "SELECT {REGISTRY_COLUMNS}
                 FROM user_product_registry
                 WHERE user_id = $1
                 ORDER BY times_logged DESC, product_key ASC"
            ))
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            rows.iter().map(registry_entry_from_row).collect()
        })
    }

    fn upsert_registry_entry<'a>(
        &'a self,
        entry: NewRegistryEntry,
    ) -> StoreFuture<'a, RegistryEntry> {
        Box::pin(async move {
            let mut tx = self.begin_as(entry.user_id).await?;
            let row = sqlx::query(&format!(
                "INSERT INTO user_product_registry
                    (id, user_id, product_key, event_type, product_name, brand, times_logged)
                 VALUES ($1, $2, $3, $4, $5, $6, 1)
                 ON CONFLICT (user_id, product_key)
                 DO UPDATE SET
                    event_type = EXCLUDED.event_type,
                    product_name = EXCLUDED.product_name,
                    brand = COALESCE(EXCLUDED.brand, user_product_registry.brand),
                    times_logged = user_product_registry.times_logged + 1,
                    updated_at = NOW()
                 RETURNING {REGISTRY_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(entry.user_id)
            .bind(&entry.product_key)
            .bind(entry.event_type.as_str())
            .bind(&entry.product_name)
            .bind(entry.brand.as_deref())
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            registry_entry_from_row(&row)
        })
    }

    fn increment_registry_usage<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
    ) -> StoreFuture<'a, RegistryEntry> {
        Box::pin(async move {
            let mut tx = self.begin_as(user_id).await?;
            let row = sqlx::query(&format!(
                "UPDATE user_product_registry
                 SET times_logged = times_logged + 1,
                     updated_at = NOW()
                 WHERE id = $1 AND user_id = $2
                 RETURNING {REGISTRY_COLUMNS}"
            ))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            row.map(|row| registry_entry_from_row(&row))
                .transpose()?
                .ok_or(StoreError::NotFound("registry entry"))
        })
    }
}

impl Store {
    pub async fn delete_registry_entry(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.begin_as(user_id).await?;
        let result = sqlx::query("DELETE FROM user_product_registry WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_registry_entries(
        &self,
        user_id: Uuid,
        event_type: Option<EventType>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.begin_as(user_id).await?;
        let count = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM user_product_registry
             WHERE user_id = $1
               AND ($2::text IS NULL OR event_type = $2)",
        )
        .bind(user_id)
        .bind(event_type.map(EventType::as_str))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(count)
    }
}

fn registry_entry_from_row(row: &PgRow) -> Result<RegistryEntry, StoreError> {
    let event_type: String = row.try_get("event_type")?;

    Ok(RegistryEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_key: row.try_get("product_key")?,
        event_type: parse_event_type(&event_type)?,
        product_name: row.try_get("product_name")?,
        brand: row.try_get("brand")?,
        times_logged: row.try_get("times_logged")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
