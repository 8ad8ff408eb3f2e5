use std::sync::Arc;

use crate::config::Config;
use crate::services::DatabaseService;

pub struct AppState {
    pub db: DatabaseService,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let db = DatabaseService::open(&config.database_path)?;
        Ok(Arc::new(Self { db, config }))
    }

    pub fn with_database(db: DatabaseService, config: Config) -> Arc<Self> {
        Arc::new(Self { db, config })
    }

    pub fn session_lifetime(&self) -> chrono::Duration {
        self.config.session_lifetime()
    }
}
