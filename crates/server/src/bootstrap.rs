use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use barkline_agent::HttpLlmClient;
use barkline_core::config::{AppConfig, ConfigError, LoadOptions};
use barkline_core::pipeline::{
    DraftQueue, EscalationLog, SnapshotError, SnapshotStore, Watermark,
};
use barkline_db::repositories::{
    SqlBookingRepository, SqlClientRepository, SqlMessageRepository, SqlScheduleRepository,
    SqlSnapshotStore,
};
use barkline_db::{connect_with_settings, migrations, DbPool};

use crate::delivery::{DeliveryError, PortalDeliveryClient};
use crate::knowledge::KnowledgeStore;
use crate::pipeline::{OwnerDirectory, Pipeline, PipelineParts, Repositories};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<Pipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("pipeline state restore failed: {0}")]
    SnapshotRestore(#[from] SnapshotError),
    #[error("llm client construction failed: {0}")]
    Llm(#[source] anyhow::Error),
    #[error("delivery client construction failed: {0}")]
    Delivery(#[from] DeliveryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let snapshots: Arc<dyn SnapshotStore> = Arc::new(SqlSnapshotStore::new(db_pool.clone()));
    let drafts = DraftQueue::restore(snapshots.clone()).await?;
    let escalations = EscalationLog::restore(snapshots.clone()).await?;
    let watermark = match Watermark::restore(snapshots.as_ref()).await? {
        Some(last_seen) => Watermark::new(last_seen),
        None => Watermark::unprimed(),
    };
    // restored drafts floor the mark so a restart never re-drafts a message
    // that already has a draft waiting for review
    if let Some(max_drafted) = drafts.max_message_id().await {
        watermark.advance_to(max_drafted.0);
    }
    let pending_drafts = drafts.len().await;

    let repos = Repositories {
        messages: Arc::new(SqlMessageRepository::new(db_pool.clone())),
        bookings: Arc::new(SqlBookingRepository::new(db_pool.clone())),
        schedule: Arc::new(SqlScheduleRepository::new(db_pool.clone())),
        clients: Arc::new(SqlClientRepository::new(db_pool.clone())),
    };

    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let delivery = PortalDeliveryClient::from_config(&config.delivery)?;
    let knowledge = KnowledgeStore::new(
        config.pipeline.knowledge_path.clone(),
        config.pipeline.scheduling_doc_path.clone(),
    );
    let owners = OwnerDirectory::from_config(&config.pipeline);

    let pipeline = Arc::new(Pipeline::new(PipelineParts {
        repos,
        drafts,
        escalations,
        watermark,
        snapshots,
        llm: Arc::new(llm),
        delivery: Arc::new(delivery),
        knowledge,
        owners,
        batch_size: config.pipeline.batch_size,
    }));

    info!(
        event_name = "system.bootstrap.pipeline_ready",
        pending_drafts,
        "message pipeline restored"
    );

    Ok(Application { config, db_pool, pipeline })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use barkline_core::config::{ConfigOverrides, LoadOptions};
    use barkline_core::domain::{Draft, InboundMessage, MessageId};
    use barkline_core::pipeline::{DraftQueue, SnapshotStore, Watermark};
    use barkline_db::repositories::SqlSnapshotStore;
    use barkline_db::{connect_with_settings, migrations};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_config() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                poll_interval_secs: Some(2),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("poll_interval_secs"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_the_scan_path() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('groomers', 'bookings', 'clients', 'messages', 'pipeline_snapshots')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline tables");

        // empty salon: the scan still answers, over every active groomer
        let conflicts =
            app.pipeline.conflict_report().await.expect("conflict scan should succeed");
        assert!(conflicts.is_empty());

        let drafts = app.pipeline.list_drafts().await.expect("draft listing should succeed");
        assert!(drafts.is_empty());

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn restore_floors_the_watermark_at_the_newest_drafted_message() {
        let url = "sqlite://file:barkline_restore_floor?mode=memory&cache=shared";
        // the setup pool stays open so the shared database survives into
        // the bootstrapped application's own pool
        let setup_pool = connect_with_settings(url, 1, 5).await.unwrap();
        migrations::run_pending(&setup_pool).await.unwrap();

        // message 3 is still unhandled and already has a draft waiting for
        // review, but the stored watermark lags behind it
        sqlx::query(
            "INSERT INTO messages (id, phone, body, outbound, handled) \
             VALUES (3, '6155550101', 'got anything friday?', 0, 0)",
        )
        .execute(&setup_pool)
        .await
        .unwrap();

        let store: Arc<dyn SnapshotStore> = Arc::new(SqlSnapshotStore::new(setup_pool.clone()));
        let drafts = DraftQueue::new(store.clone());
        let message = InboundMessage {
            id: MessageId(3),
            client_id: None,
            phone: "6155550101".to_string(),
            body: "got anything friday?".to_string(),
            received_at: Utc::now(),
        };
        drafts
            .insert(Draft::inbound(&message, "Client".to_string(), Vec::new(), String::new()))
            .await
            .unwrap();
        Watermark::new(1).persist(store.as_ref()).await.unwrap();

        let app = bootstrap(valid_overrides(url)).await.unwrap();
        let outcome = app.pipeline.run_cycle().await.unwrap();

        // the restored draft floored the mark past the stale stored value,
        // so message 3 is not even refetched, let alone drafted again
        assert!(!outcome.primed);
        assert_eq!(outcome.drafted, 0);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(app.pipeline.list_drafts().await.unwrap().len(), 1);

        app.db_pool.close().await;
        setup_pool.close().await;
    }
}
