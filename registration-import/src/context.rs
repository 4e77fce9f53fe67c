use std::sync::Arc;

use anyhow::Error;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    config::{Config, StoreBackend},
    pipeline::IngestionPipeline,
    progress::ProgressSink,
    store::{MemoryRegistrationStore, PgRegistrationStore, RegistrationStore},
};

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn RegistrationStore>,
    // Cancelled on shutdown, every pipeline built from this context observes it
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let store: Arc<dyn RegistrationStore> = match config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory registration store");
                Arc::new(MemoryRegistrationStore::new())
            }
            StoreBackend::Postgres => {
                let options = PgPoolOptions::new().max_connections(config.max_pg_connections);
                let pool = options.connect(&config.database_url).await?;
                let store = PgRegistrationStore::new(pool);
                if config.run_migrations {
                    store.migrate().await?;
                }
                info!("Using postgres registration store");
                Arc::new(store)
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: &Config, store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            config: config.clone(),
            store,
            shutdown: CancellationToken::new(),
        }
    }

    /// A pipeline for one upload. Each run gets a child token, so a single upload can
    /// be cancelled without shutting everything down.
    pub fn pipeline(&self, sink: Arc<dyn ProgressSink>) -> IngestionPipeline {
        IngestionPipeline::new(self.store.clone(), sink, self.config.pipeline_options())
            .with_cancellation(self.shutdown.child_token())
    }

    pub fn spawn_shutdown_listener(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal, cancelling running imports");
                shutdown.cancel();
            }
        });
    }
}
