//! Library lending tracker
//!
//! Manages books, patrons and loans over a REST JSON API. The loan service
//! keeps book availability consistent with open loans and derives overdue
//! status whenever loans are read.

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
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository, &config.loans);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
