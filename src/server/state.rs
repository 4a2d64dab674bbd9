//! Application state shared across handlers.

use crate::activity::ActivityService;
use crate::auth::AuthService;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::db::Database;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
    /// Books and categories.
    pub catalog: Arc<CatalogService>,
    /// Bookmarks, progress, reviews.
    pub activity: Arc<ActivityService>,
}

impl AppState {
    /// Wire the services over one database handle.
    pub fn new(config: Config, db: Database) -> Self {
        let auth = AuthService::new(
            db.clone(),
            config.auth.session_days,
            config.auth.registration_enabled(),
        );
        let catalog = CatalogService::new(db.clone(), config.catalog);
        let activity = ActivityService::new(db.clone(), config.catalog);

        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
            catalog: Arc::new(catalog),
            activity: Arc::new(activity),
        }
    }
}
