use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("row failed to decode: {0}")]
    Decode(String),

    #[error("a job is already active for supplier {0}")]
    ActiveJobExists(String),
}
