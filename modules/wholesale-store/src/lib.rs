//! Persistence Gateway (spec §4.5): a thin `sqlx` wrapper around Postgres.
//! Grounded in `run_log.rs`'s bind-and-execute query style, generalized
//! from one append-only event table to the full product/job/schedule
//! schema this system needs.

mod accounts;
mod dedup;
pub mod error;
mod jobs;
mod products;
mod schedules;
mod lease;

#[cfg(feature = "test-utils")]
pub mod testutil;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use error::StoreError;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
