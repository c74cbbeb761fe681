use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::models::{AuditMetadata, AuditRecord, AuditStatus, EventType};

use super::{AuditStore, AuditUpdate, NewAuditRecord, Store, StoreError, StoreFuture, parse_event_type};

const AUDIT_COLUMNS: &str = "id, user_id, raw_text, record_type, value, unit, status, nlp_model, metadata, created_at, updated_at";
const REDACTED: &str = "[REDACTED]";

impl AuditStore for Store {
    fn insert_audit_record<'a>(&'a self, record: NewAuditRecord) -> StoreFuture<'a, AuditRecord> {
        Box::pin(async move {
            let metadata = serde_json::to_value(&record.metadata)
                .map_err(|err| StoreError::InvalidData(format!("audit metadata: {err}")))?;

            let mut tx = self.begin_as(record.user_id).await?;
            let row = sqlx::query(&format!(
                "INSERT INTO voice_records
                    (id, user_id, raw_text, record_type, value, unit, status, nlp_model, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 RETURNING {AUDIT_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(record.user_id)
            .bind(&record.raw_text)
            .bind(record.record_type.map(EventType::as_str))
            .bind(record.value)
            .bind(record.unit.as_deref())
            .bind(AuditStatus::Pending.as_str())
            .bind(record.nlp_model.as_deref())
            .bind(metadata)
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            audit_record_from_row(&row)
        })
    }

    fn update_audit_record<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
        update: AuditUpdate,
    ) -> StoreFuture<'a, AuditRecord> {
        Box::pin(async move {
            let mut tx = self.begin_as(user_id).await?;
            let row = sqlx::query(&format!(
                "UPDATE voice_records
                 SET status = $3,
                     record_type = COALESCE($4, record_type),
                     value = COALESCE($5, value),
                     unit = COALESCE($6, unit),
                     nlp_model = COALESCE($7, nlp_model),
                     updated_at = NOW()
                 WHERE id = $1 AND user_id = $2
                   AND status IN ('pending', 'awaiting_user_clarification')
                 RETURNING {AUDIT_COLUMNS}"
            ))
            .bind(id)
            .bind(user_id)
            .bind(update.status.as_str())
            .bind(update.record_type.map(EventType::as_str))
            .bind(update.value)
            .bind(update.unit.as_deref())
            .bind(update.nlp_model.as_deref())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                tx.commit().await?;
                return audit_record_from_row(&row);
            }

            let current: Option<String> = sqlx::query_scalar(
                "SELECT status FROM voice_records WHERE id = $1 AND user_id = $2",
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            match current {
                Some(status) => Err(StoreError::TerminalStatus(parse_audit_status(&status)?)),
                None => Err(StoreError::NotFound("audit record")),
            }
        })
    }

    fn get_audit_record<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
    ) -> StoreFuture<'a, Option<AuditRecord>> {
        Box::pin(async move {
            let mut tx = self.begin_as(user_id).await?;
            let row = sqlx::query(&format!(
                "SELECT {AUDIT_COLUMNS} FROM voice_records WHERE id = $1 AND user_id = $2"
            ))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            row.map(|row| audit_record_from_row(&row)).transpose()
        })
    }
}

impl Store {
    /// Newest-first page of a user's audit trail.
    pub async fn list_audit_records(
        &self,
        user_id: Uuid,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<AuditRecord>, Option<String>), StoreError> {
        let cursor = parse_cursor(cursor)?;

        let mut tx = self.begin_as(user_id).await?;
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS}
             FROM voice_records
             WHERE user_id = $1
               AND (
                 $2::timestamptz IS NULL
                 OR created_at < $2
                 OR (created_at = $2 AND id < $3)
               )
             ORDER BY created_at DESC, id DESC
             LIMIT $4"
        ))
        .bind(user_id)
        .bind(cursor.as_ref().map(|(ts, _)| *ts))
        .bind(cursor.as_ref().map(|(_, id)| *id))
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let items = rows
            .iter()
            .map(audit_record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = if items.len() == limit {
            items
                .last()
                .map(|record| encode_cursor(record.created_at, record.id))
        } else {
            None
        };

        Ok((items, next_cursor))
    }
}

fn parse_audit_status(status: &str) -> Result<AuditStatus, StoreError> {
    AuditStatus::parse(status)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown audit status persisted: {status}")))
}

fn audit_record_from_row(row: &PgRow) -> Result<AuditRecord, StoreError> {
    let record_type: Option<String> = row.try_get("record_type")?;
    let status: String = row.try_get("status")?;
    let metadata: Value = row.try_get("metadata")?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        raw_text: row.try_get("raw_text")?,
        record_type: record_type.as_deref().map(parse_event_type).transpose()?,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
        status: parse_audit_status(&status)?,
        nlp_model: row.try_get("nlp_model")?,
        metadata: serde_json::from_value::<AuditMetadata>(metadata)
            .map_err(|err| StoreError::InvalidData(format!("audit metadata: {err}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<(DateTime<Utc>, Uuid)>, StoreError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let (timestamp_micros, id) = cursor.split_once('|').ok_or(StoreError::InvalidCursor)?;
    let timestamp_micros = timestamp_micros
        .parse::<i64>()
        .map_err(|_| StoreError::InvalidCursor)?;
    let timestamp =
        DateTime::from_timestamp_micros(timestamp_micros).ok_or(StoreError::InvalidCursor)?;
    let id = Uuid::parse_str(id).map_err(|_| StoreError::InvalidCursor)?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(timestamp: DateTime<Utc>, id: Uuid) -> String {
    format!("{}|{}", timestamp.timestamp_micros(), id)
}

fn is_sensitive_metadata_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("token")
        || key.contains("secret")
        || key.contains("password")
        || key.contains("authorization")
        || key.contains("api_key")
        || key.contains("apikey")
}

/// Masks values under credential-looking keys before they reach the audit row.
pub fn redact_sensitive_metadata(extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    extra
        .iter()
        .map(|(key, value)| {
            if is_sensitive_metadata_key(key) {
                (key.clone(), REDACTED.to_string())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
