use chrono::{DateTime, Utc};
use sqlx::FromRow;
use wholesale_common::types::{ConnectionState, SupplierAccount};

use crate::error::StoreError;
use crate::Store;

#[derive(FromRow)]
struct AccountRow {
    supplier_tag: String,
    display_name: String,
    auth_material: Vec<u8>,
    connection_state: String,
    auto_collect: bool,
    default_interval_secs: i64,
    collect_categories: Option<serde_json::Value>,
    recent_window_days: i32,
    max_products_per_run: i64,
    last_connected_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl AccountRow {
    fn into_account(self) -> Result<SupplierAccount, StoreError> {
        let connection_state = match self.connection_state.as_str() {
            "disconnected" => ConnectionState::Disconnected,
            "testing" => ConnectionState::Testing,
            "connected" => ConnectionState::Connected,
            "error" => ConnectionState::Error,
            other => return Err(StoreError::Decode(format!("unknown connection_state: {other}"))),
        };
        Ok(SupplierAccount {
            supplier_tag: self.supplier_tag,
            display_name: self.display_name,
            auth_material: self.auth_material,
            connection_state,
            auto_collect: self.auto_collect,
            default_interval_secs: self.default_interval_secs.max(0) as u64,
            collect_categories: self
                .collect_categories
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            recent_window_days: self.recent_window_days.max(0) as u32,
            max_products_per_run: self.max_products_per_run.max(0) as usize,
            last_connected_at: self.last_connected_at,
            last_error: self.last_error,
        })
    }
}

impl Store {
    pub async fn upsert_account(&self, account: &SupplierAccount) -> Result<(), StoreError> {
        let connection_state = match account.connection_state {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Testing => "testing",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        sqlx::query(
            r#"
            INSERT INTO supplier_accounts (
                supplier_tag, display_name, auth_material, connection_state, auto_collect,
                default_interval_secs, collect_categories, recent_window_days,
                max_products_per_run, last_connected_at, last_error
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
            ON CONFLICT (supplier_tag) DO UPDATE SET
                display_name = EXCLUDED.display_name, auth_material = EXCLUDED.auth_material,
                connection_state = EXCLUDED.connection_state, auto_collect = EXCLUDED.auto_collect,
                default_interval_secs = EXCLUDED.default_interval_secs,
                collect_categories = EXCLUDED.collect_categories,
                recent_window_days = EXCLUDED.recent_window_days,
                max_products_per_run = EXCLUDED.max_products_per_run,
                last_connected_at = EXCLUDED.last_connected_at, last_error = EXCLUDED.last_error
            "#,
        )
        .bind(&account.supplier_tag)
        .bind(&account.display_name)
        .bind(&account.auth_material)
        .bind(connection_state)
        .bind(account.auto_collect)
        .bind(account.default_interval_secs as i64)
        .bind(account.collect_categories.as_ref().map(|c| serde_json::to_value(c).unwrap_or_default()))
        .bind(account.recent_window_days as i32)
        .bind(account.max_products_per_run as i64)
        .bind(account.last_connected_at)
        .bind(&account.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_account(&self, supplier_tag: &str) -> Result<Option<SupplierAccount>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM supplier_accounts WHERE supplier_tag = $1")
            .bind(supplier_tag)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountRow::into_account).transpose()
    }
}
