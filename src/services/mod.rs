//! Business logic services

pub mod auth;
pub mod borrowings;
pub mod catalog;
pub mod uploads;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub borrowings: borrowings::BorrowingsService,
    pub uploads: uploads::UploadsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            users: users::UsersService::new(repository.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            borrowings: borrowings::BorrowingsService::new(repository, config.borrowings.clone()),
            uploads: uploads::UploadsService::new(config.uploads.clone()),
        }
    }
}
