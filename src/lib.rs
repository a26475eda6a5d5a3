//! Shelfmark library lending server
//!
//! REST JSON API over a book catalog, member accounts and the borrowing
//! lifecycle (request, approval, loan, return and fines).

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Wire services over the repository
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
