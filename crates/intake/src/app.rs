use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use shared::config::{ConfigError, IntakeConfig};
use shared::identity::{IdentityError, validate_user_id};
use shared::intake::{IntakeError, IntakeOutcome, IntakePipeline, IntakeRequest, PendingConfirmation};
use shared::llm::{OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig};
use shared::repos::{AuditStore, EventStore, MemoryStore, RegistryStore, Store, StoreError};
use shared::search::{OpenFdaCatalog, OpenFoodFactsCatalog, ProductCatalog, ProductResolver, SearchError};
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::{Command, ConfirmOptions, HistoryOptions, Selection, SubmitOptions};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    OpenRouter(#[from] OpenRouterConfigError),
    #[error(transparent)]
    Catalog(#[from] SearchError),
    #[error("failed to connect to postgres: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migrations(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error("failed to read pending confirmation {path}: {source}")]
    PendingFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pending confirmation {path} is not valid: {source}")]
    PendingJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode output: {0}")]
    Output(#[source] serde_json::Error),
    #[error("`{0}` needs DATABASE_URL: the pending intake is stored there")]
    DatabaseRequired(&'static str),
}

pub async fn run(command: Command) -> Result<(), AppError> {
    let config = IntakeConfig::from_env()?;

    match config.database_url.as_deref() {
        Some(database_url) => {
            let store = Store::connect(database_url, config.database_max_connections).await?;
            let migrator = sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await?;
            migrator.run(store.pool()).await?;
            info!("using postgres store");
            execute(Arc::new(store), &config, command).await
        }
        None => {
            require_database_for(&command)?;
            warn!("DATABASE_URL is not set; using an in-memory store that is discarded on exit");
            execute(Arc::new(MemoryStore::new()), &config, command).await
        }
    }
}

/// Commands that read state left behind by an earlier run cannot use the
/// throwaway in-memory store.
fn require_database_for(command: &Command) -> Result<(), AppError> {
    match command {
        Command::Confirm(_) => Err(AppError::DatabaseRequired("confirm")),
        Command::Submit(_) | Command::History(_) => Ok(()),
    }
}

async fn execute<S>(store: Arc<S>, config: &IntakeConfig, command: Command) -> Result<(), AppError>
where
    S: AuditStore + RegistryStore + EventStore + 'static,
{
    match command {
        Command::History(options) => history(store.as_ref(), options).await,
        Command::Submit(options) => submit(&build_pipeline(store, config)?, options).await,
        Command::Confirm(options) => confirm(&build_pipeline(store, config)?, options).await,
    }
}

fn build_pipeline<S>(store: Arc<S>, config: &IntakeConfig) -> Result<IntakePipeline, AppError>
where
    S: AuditStore + RegistryStore + EventStore + 'static,
{
    let gateway = OpenRouterGateway::new(OpenRouterGatewayConfig::from_env()?)?;
    info!(model = gateway.model(), "classifier gateway ready");

    let search = &config.search;
    let catalogs: Vec<Arc<dyn ProductCatalog>> = vec![
        Arc::new(OpenFoodFactsCatalog::new(
            &search.open_food_facts_search_url,
            search.catalog_timeout_ms,
        )?),
        Arc::new(OpenFdaCatalog::new(
            &search.open_fda_label_url,
            search.catalog_timeout_ms,
        )?),
    ];

    Ok(IntakePipeline::new(
        store,
        Arc::new(gateway),
        ProductResolver::new(catalogs, search.max_candidates),
    )
    .with_fuzzy_min_score(config.registry_fuzzy_min_score)
    .with_default_time_zone(&config.default_time_zone))
}

async fn submit(pipeline: &IntakePipeline, options: SubmitOptions) -> Result<(), AppError> {
    let mut request = IntakeRequest::new(options.user_id.as_str(), options.text)
        .with_capture_method(options.capture_method);
    if let Some(time_zone) = options.time_zone {
        request = request.with_time_zone(time_zone);
    }

    let outcome = pipeline.submit(request).await?;
    let Some(pending) = outcome.pending.clone() else {
        return print_json(&outcome);
    };

    match options.selection {
        Selection::Ask => print_json(&outcome),
        Selection::Keep => finish(pipeline, &options.user_id, pending, None).await,
        Selection::Candidate(index) => {
            finish(pipeline, &options.user_id, pending, Some(index)).await
        }
    }
}

async fn confirm(pipeline: &IntakePipeline, options: ConfirmOptions) -> Result<(), AppError> {
    let pending = read_pending(&options.pending_path)?;
    let selection = match options.selection {
        Selection::Candidate(index) => Some(index),
        Selection::Ask | Selection::Keep => None,
    };
    finish(pipeline, &options.user_id, pending, selection).await
}

async fn finish(
    pipeline: &IntakePipeline,
    user_id: &str,
    pending: PendingConfirmation,
    selection: Option<usize>,
) -> Result<(), AppError> {
    let outcome: IntakeOutcome = pipeline.confirm(user_id, pending, selection).await?;
    print_json(&outcome)
}

async fn history<S>(store: &S, options: HistoryOptions) -> Result<(), AppError>
where
    S: EventStore,
{
    let user_id = validate_user_id(options.user_id.as_str(), "history")?;
    let events = store
        .list_voice_events(user_id.as_uuid(), options.limit)
        .await?;
    print_json(&events)
}

fn read_pending(path: &Path) -> Result<PendingConfirmation, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AppError::PendingFile {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AppError::PendingJson {
        path: path.display().to_string(),
        source,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let encoded = serde_json::to_string_pretty(value).map_err(AppError::Output)?;
    println!("{encoded}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{AppError, require_database_for};
    use crate::cli::{Command, ConfirmOptions, HistoryOptions, Selection};

    #[test]
    fn confirm_without_a_database_is_rejected_up_front() {
        let confirm = Command::Confirm(ConfirmOptions {
            user_id: "0b6f1c9e-3c1d-4f4e-9a55-6f1f7f2b9c10".to_string(),
            pending_path: PathBuf::from("pending.json"),
            selection: Selection::Candidate(0),
        });
        let err = require_database_for(&confirm).expect_err("confirm needs postgres");
        assert!(matches!(err, AppError::DatabaseRequired("confirm")));
        assert!(err.to_string().contains("DATABASE_URL"));

        let history = Command::History(HistoryOptions {
            user_id: "0b6f1c9e-3c1d-4f4e-9a55-6f1f7f2b9c10".to_string(),
            limit: 10,
        });
        assert!(require_database_for(&history).is_ok());
    }
}
