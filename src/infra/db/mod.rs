//! Postgres-backed repository implementations.

mod categories;
pub mod connection;
mod posts;
mod roles;
mod settings;
mod users;
mod util;

pub use connection::{ConnectError, ConnectionCache, Connector, PgConnector, Readiness};
pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{postgres::PgPool, query};

use crate::{
    application::repos::{HealthRepo, RepoError},
    config::DatabaseSettings,
    infra::error::InfraError,
};

/// Repositories sharing one lazily connected pool.
#[derive(Clone)]
pub struct PostgresRepositories {
    connections: Arc<ConnectionCache<PgConnector>>,
}

impl PostgresRepositories {
    pub fn new(connections: Arc<ConnectionCache<PgConnector>>) -> Self {
        Self { connections }
    }

    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        let connector = PgConnector::new(settings.clone());
        Self::new(Arc::new(ConnectionCache::new(
            connector,
            settings.url.clone(),
        )))
    }

    pub async fn pool(&self) -> Result<PgPool, RepoError> {
        self.connections
            .get_connection()
            .await
            .map_err(RepoError::from)
    }

    pub fn readiness(&self) -> Readiness {
        self.connections.readiness()
    }

    pub async fn run_migrations(&self) -> Result<(), InfraError> {
        let pool = self
            .connections
            .get_connection()
            .await
            .map_err(|err| match err {
                ConnectError::Configuration(message) => InfraError::configuration(message),
                ConnectError::Connection(message) => InfraError::database(message),
            })?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(())
    }

}

#[async_trait]
impl HealthRepo for PostgresRepositories {
    async fn health_check(&self) -> Result<(), RepoError> {
        let pool = self.pool().await?;
        query("SELECT 1")
            .execute(&pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
