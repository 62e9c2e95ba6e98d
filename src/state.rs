use crate::config::{AppConfig, StoreBackend};
use crate::users::{
    memory_store::MemoryUserStore, pg_store::PgUserStore, store::UserStore, UserRepository,
};
use anyhow::Context;
use sqlx::{migrate::Migrator, PgPool};
use std::sync::Arc;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations. The unique index on `username` is created here,
/// so a failure must stop startup.
pub async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    MIGRATOR.run(db).await.context("run migrations")?;
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub users: UserRepository,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match config.backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                run_migrations(&db).await?;
                Arc::new(PgUserStore::new(db))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory user store; data is lost on exit");
                Arc::new(MemoryUserStore::new())
            }
        };

        Ok(Self::from_parts(store, Arc::new(config)))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self {
            users: UserRepository::new(store),
            config,
        }
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_parts(Arc::new(MemoryUserStore::new()), Arc::new(config))
    }
}
