use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use crate::models::VoiceEvent;

use super::{
    EventStore, NewVoiceEvent, Store, StoreError, StoreFuture, parse_capture_method,
    parse_event_type,
};

const EVENT_COLUMNS: &str =
    "id, user_id, event_type, event_data, event_time, source_record_id, capture_method, created_at";

impl EventStore for Store {
    fn insert_voice_event<'a>(&'a self, event: NewVoiceEvent) -> StoreFuture<'a, VoiceEvent> {
        Box::pin(async move {
            let mut tx = self.begin_as(event.user_id).await?;
            let row = sqlx::query(&format!(
                "INSERT INTO voice_events
                    (id, user_id, event_type, event_data, event_time, source_record_id, capture_method)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING {EVENT_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(event.user_id)
            .bind(event.event_type.as_str())
            .bind(&event.event_data)
            .bind(event.event_time)
            .bind(event.source_record_id)
            .bind(event.capture_method.as_str())
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;

            voice_event_from_row(&row)
        })
    }

    fn list_voice_events<'a>(
        &'a self,
        user_id: Uuid,
        limit: usize,
    ) -> StoreFuture<'a, Vec<VoiceEvent>> {
        Box::pin(async move {
            let mut tx = self.begin_as(user_id).await?;
            let rows = sqlx::query(&format!(
                "SELECT {EVENT_COLUMNS}
                 FROM voice_events
                 WHERE user_id = $1
                 ORDER BY event_time DESC, id DESC
                 LIMIT $2"
            ))
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            rows.iter().map(voice_event_from_row).collect()
        })
    }
}

fn voice_event_from_row(row: &PgRow) -> Result<VoiceEvent, StoreError> {
    let event_type: String = row.try_get("event_type")?;
    let capture_method: String = row.try_get("capture_method")?;

    Ok(VoiceEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_type: parse_event_type(&event_type)?,
        event_data: row.try_get("event_data")?,
        event_time: row.try_get("event_time")?,
        source_record_id: row.try_get("source_record_id")?,
        capture_method: parse_capture_method(&capture_method)?,
        created_at: row.try_get("created_at")?,
    })
}
