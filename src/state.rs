use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::repository::Repository;
use crate::service::Service;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub config: Config,
}

impl AppState {
    /// Wires SQLite repositories and services from the loaded config.
    pub fn new(pool: DbPool, config: Config) -> Self {
        let repo = Repository::sqlite(pool, config.database.timeout());
        let service = Service::new(repo, &config.auth);
        Self {
            service: Arc::new(service),
            config,
        }
    }
}
