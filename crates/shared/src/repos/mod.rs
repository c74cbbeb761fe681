use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuditMetadata, AuditRecord, AuditStatus, CaptureMethod, EventType, RegistryEntry, VoiceEvent,
};

pub mod audit;
pub mod events;
pub mod memory;
pub mod registry;

pub use memory::MemoryStore;

const INSUFFICIENT_PRIVILEGE_SQLSTATE: &str = "42501";

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("row-level authorization denied the operation: {0}")]
    PermissionDenied(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid cursor")]
    InvalidCursor,
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("audit record is already {}", .0.as_str())]
    TerminalStatus(AuditStatus),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.code().as_deref() == Some(INSUFFICIENT_PRIVILEGE_SQLSTATE)
        {
            return Self::PermissionDenied(db_err.message().to_string());
        }
        Self::Database(err)
    }
}

#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub user_id: Uuid,
    pub raw_text: String,
    pub record_type: Option<EventType>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub nlp_model: Option<String>,
    pub metadata: AuditMetadata,
}

/// Status change plus the classification fields known at that point.
/// `None` fields keep their stored value.
#[derive(Debug, Clone)]
pub struct AuditUpdate {
    pub status: AuditStatus,
    pub record_type: Option<EventType>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub nlp_model: Option<String>,
}

impl AuditUpdate {
    pub fn status_only(status: AuditStatus) -> Self {
        Self {
            status,
            record_type: None,
            value: None,
            unit: None,
            nlp_model: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRegistryEntry {
    pub user_id: Uuid,
    pub product_key: String,
    pub event_type: EventType,
    pub product_name: String,
    pub brand: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewVoiceEvent {
    pub user_id: Uuid,
    pub event_type: EventType,
    pub event_data: Value,
    pub event_time: DateTime<Utc>,
    pub source_record_id: Uuid,
    pub capture_method: CaptureMethod,
}

pub trait AuditStore: Send + Sync {
    fn insert_audit_record<'a>(&'a self, record: NewAuditRecord) -> StoreFuture<'a, AuditRecord>;

    /// Fails with [`StoreError::NotFound`] when no row matches `(user_id, id)`.
    fn update_audit_record<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
        update: AuditUpdate,
    ) -> StoreFuture<'a, AuditRecord>;

    fn get_audit_record<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
    ) -> StoreFuture<'a, Option<AuditRecord>>;
}

pub trait RegistryStore: Send + Sync {
    fn find_registry_entry<'a>(
        &'a self,
        user_id: Uuid,
        product_key: &'a str,
    ) -> StoreFuture<'a, Option<RegistryEntry>>;

    fn list_registry_entries<'a>(&'a self, user_id: Uuid) -> StoreFuture<'a, Vec<RegistryEntry>>;

    /// Inserts the entry with `times_logged = 1`, or bumps the counter and
    /// refreshes name/type/brand when `(user_id, product_key)` already exists.
    fn upsert_registry_entry<'a>(&'a self, entry: NewRegistryEntry)
    -> StoreFuture<'a, RegistryEntry>;

    fn increment_registry_usage<'a>(
        &'a self,
        user_id: Uuid,
        id: Uuid,
    ) -> StoreFuture<'a, RegistryEntry>;
}

pub trait EventStore: Send + Sync {
    fn insert_voice_event<'a>(&'a self, event: NewVoiceEvent) -> StoreFuture<'a, VoiceEvent>;

    fn list_voice_events<'a>(
        &'a self,
        user_id: Uuid,
        limit: usize,
    ) -> StoreFuture<'a, Vec<VoiceEvent>>;
}

/// Postgres-backed store. Every statement runs in a transaction that first
/// binds `app.user_id`, which the row-level security policies compare against.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub(crate) async fn begin_as(
        &self,
        user_id: Uuid,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('app.user_id', $1, true)")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

pub(crate) fn parse_event_type(value: &str) -> Result<EventType, StoreError> {
    EventType::parse(value)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown event type persisted: {value}")))
}

pub(crate) fn parse_capture_method(value: &str) -> Result<CaptureMethod, StoreError> {
    CaptureMethod::parse(value).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown capture method persisted: {value}"))
    })
}
