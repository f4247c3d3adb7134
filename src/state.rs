use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StoreBackend};
use crate::store::{MemoryStore, MenuStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MenuStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
                Arc::new(PgStore::connect(url, config.db_max_connections).await?)
                    as Arc<dyn MenuStore>
            }
            StoreBackend::Memory => {
                tracing::warn!("using the in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new()) as Arc<dyn MenuStore>
            }
        };
        let clock = Arc::new(SystemClock::new(config.utc_offset_hours)) as Arc<dyn Clock>;

        Ok(Self::from_parts(store, clock, config))
    }

    pub fn from_parts(
        store: Arc<dyn MenuStore>,
        clock: Arc<dyn Clock>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state whose clock is pinned to Monday 2025-01-20.
    pub fn fake() -> Self {
        Self::fake_on(time::macros::date!(2025 - 01 - 20))
    }

    pub fn fake_on(today: time::Date) -> Self {
        Self::fake_with(Arc::new(MemoryStore::new()), today)
    }

    pub fn fake_with(store: Arc<MemoryStore>, today: time::Date) -> Self {
        let config = Arc::new(AppConfig {
            store_backend: StoreBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            utc_offset_hours: 0,
        });
        Self::from_parts(store, Arc::new(crate::clock::FixedClock(today)), config)
    }
}
