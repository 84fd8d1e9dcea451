use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Attempt to acquire or renew the scheduler leader lease (§6): the
    /// lease row is claimed only if unheld, expired, or already held by
    /// `holder`. Returns `true` if `holder` now holds the lease.
    pub async fn acquire_leader_lease(&self, lease_key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now: DateTime<Utc> = Utc::now();
        let expires_at = now + ttl;
        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_leader (lease_key, holder, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (lease_key) DO UPDATE SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
            WHERE scheduler_leader.expires_at < $4 OR scheduler_leader.holder = $2
            "#,
        )
        .bind(lease_key)
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn release_leader_lease(&self, lease_key: &str, holder: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduler_leader WHERE lease_key = $1 AND holder = $2")
            .bind(lease_key)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
