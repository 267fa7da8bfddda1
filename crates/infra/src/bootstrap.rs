//! Composition root: wires store, collaborators and services from a
//! [`QuotingConfig`].

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use quoteforge_costing::CostEngine;
use quoteforge_events::{EventEnvelope, InMemoryEventBus};

use crate::config::QuotingConfig;
use crate::delivery::{LogMailer, Mailer, PlainTextRenderer};
use crate::notifier::{BusWebhookSink, ChannelNotifier};
use crate::parameters::{CostParameterSource, InMemoryParameterSource, PostgresParameterSource};
use crate::services::{CostCalculationService, QuoteService, QuoteSettings};
use crate::store::{InMemoryQuotingStore, PostgresQuotingStore, QuotingStore};

/// Bus carrying wrapped lifecycle notifications.
pub type NotificationBus = InMemoryEventBus<EventEnvelope<Value>>;

/// Running engine: both services plus the notification plumbing.
pub struct Engine {
    pub costing: CostCalculationService,
    pub quotes: QuoteService,
    /// Subscribe here to observe committed lifecycle events.
    pub notifications: Arc<NotificationBus>,
    notifier_task: JoinHandle<()>,
}

impl Engine {
    /// Build against an explicit store (tests, embedding).
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_store(
        config: &QuotingConfig,
        store: Arc<dyn QuotingStore>,
        parameters: Arc<dyn CostParameterSource>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let engine = CostEngine::new(config.default_margin).context("invalid default margin")?;

        let notifications: Arc<NotificationBus> = Arc::new(InMemoryEventBus::new());
        let (notifier, notifier_task) =
            ChannelNotifier::spawn(BusWebhookSink::new(Arc::clone(&notifications)));

        let costing = CostCalculationService::new(Arc::clone(&store), parameters, engine);
        let quotes = QuoteService::new(
            store,
            Arc::new(notifier),
            Arc::new(PlainTextRenderer),
            mailer,
            QuoteSettings::from(config),
        );

        Ok(Self {
            costing,
            quotes,
            notifications,
            notifier_task,
        })
    }

    /// Build from configuration: Postgres when a database URL is set, the
    /// in-memory store otherwise.
    pub async fn from_config(config: &QuotingConfig) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

        match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(url)
                    .await
                    .context("failed to connect to postgres")?;

                let store = PostgresQuotingStore::new(pool.clone());
                store
                    .ensure_schema()
                    .await
                    .context("failed to apply quoting schema")?;
                info!(max_connections = config.db_max_connections, "using postgres quoting store");

                Self::with_store(
                    config,
                    Arc::new(store),
                    Arc::new(PostgresParameterSource::new(pool)),
                    mailer,
                )
            }
            None => {
                warn!("QUOTEFORGE_DATABASE_URL not set; using in-memory quoting store");
                Self::with_store(
                    config,
                    Arc::new(InMemoryQuotingStore::new()),
                    Arc::new(InMemoryParameterSource::new()),
                    mailer,
                )
            }
        }
    }

    /// Drop the services and wait until queued notifications are delivered.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let Engine {
            costing,
            quotes,
            notifications,
            notifier_task,
        } = self;
        drop(quotes);
        drop(costing);
        notifier_task
            .await
            .context("notification task panicked")?;
        drop(notifications);
        Ok(())
    }
}

/// Load configuration from the environment, install logging and build the
/// engine.
pub async fn start() -> anyhow::Result<Engine> {
    let config = QuotingConfig::from_env().context("invalid quoting configuration")?;
    quoteforge_observability::tracing::init(config.log_format);
    Engine::from_config(&config).await
}
