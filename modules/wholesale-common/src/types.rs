//! The canonical data model (spec §3): `CanonicalProduct`, `RawRecord`,
//! `SupplierAccount`, `CollectionJob`, `Schedule`, `DuplicateGroup`, and the
//! small enums that tag them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A supplier's short tag, e.g. `"zentrade"`, `"ownerclan"`, `"domeggook"`.
/// Part of the natural key `(supplier_tag, supplier_product_id)`.
pub type SupplierTag = String;

// ---------------------------------------------------------------------------
// CollectionMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    All,
    Recent,
    Category,
    Updated,
    New,
}

impl fmt::Display for CollectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollectionMode::All => "all",
            CollectionMode::Recent => "recent",
            CollectionMode::Category => "category",
            CollectionMode::Updated => "updated",
            CollectionMode::New => "new",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CollectionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "recent" => Ok(Self::Recent),
            "category" => Ok(Self::Category),
            "updated" => Ok(Self::Updated),
            "new" => Ok(Self::New),
            other => Err(format!("unknown collection mode: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// CollectionFilters (§4.4)
// ---------------------------------------------------------------------------

/// Filter configuration applied by the Filter Stage. Filters compose as
/// conjunction; unknown keys coming from an external caller are ignored
/// with a warning at the deserialization boundary (not modeled here — that
/// boundary is outside this crate's scope).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionFilters {
    /// Inclusive window against the supplier's *source-reported* date
    /// (see SPEC_FULL.md Open Question resolution), not `first_seen_at`.
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    /// Drop products with `stock_quantity == 0` or `in_stock == false`.
    /// Defaults to `true` via `CollectionFilters::default_stock_only`.
    pub stock_only: Option<bool>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub max_products: Option<usize>,
}

impl CollectionFilters {
    pub fn stock_only(&self) -> bool {
        self.stock_only.unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// ProductOptions (§3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductOptions {
    None,
    Flat { attributes: HashMap<String, String> },
    Combinatorial { combinations: Vec<Combination> },
}

impl Default for ProductOptions {
    fn default() -> Self {
        ProductOptions::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combination {
    /// attribute group name -> selected value, e.g. `"color" -> "black"`.
    pub selections: HashMap<String, String>,
    pub price_delta: i64,
    pub stock_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub sku: Option<String>,
    pub name: String,
    pub price: u64,
    pub stock_quantity: u32,
    pub in_stock: bool,
    pub image_url: Option<String>,
    pub attributes: HashMap<String, String>,
}

/// Free-form but recognized shipping keys (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub shipping_cost: Option<u64>,
    pub free_shipping_min: Option<u64>,
    pub carrier_hint: Option<String>,
    pub origin: Option<String>,
    pub returnable: Option<bool>,
    pub tax_free: Option<bool>,
}

// ---------------------------------------------------------------------------
// CanonicalProduct (§3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalProduct {
    pub supplier_tag: SupplierTag,
    pub supplier_product_id: String,
    pub supplier_sku: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category_path: Option<String>,
    pub wholesale_price: u64,
    pub retail_price: Option<u64>,
    pub discount_percent: Option<u8>,
    pub stock_quantity: u32,
    pub in_stock: bool,
    pub main_image_url: Option<String>,
    pub additional_image_urls: Vec<String>,
    pub options: ProductOptions,
    pub variants: Vec<ProductVariant>,
    pub shipping: ShippingInfo,
    pub raw: serde_json::Value,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl CanonicalProduct {
    pub fn natural_key(&self) -> (SupplierTag, String) {
        (self.supplier_tag.clone(), self.supplier_product_id.clone())
    }

    /// Check the invariants spec §3 requires. Returns the first violation
    /// found, if any — callers (normalizer, store) decide what to do.
    pub fn validate(&self) -> Result<(), String> {
        if self.supplier_product_id.is_empty() {
            return Err("supplier_product_id must not be empty".into());
        }
        if let Some(retail) = self.retail_price {
            if retail < self.wholesale_price {
                return Err("retail_price must be >= wholesale_price".into());
            }
        }
        if self.stock_quantity > 0 && !self.in_stock {
            return Err("stock_quantity > 0 requires in_stock = true".into());
        }
        if let Some(pct) = self.discount_percent {
            if pct > 100 {
                return Err("discount_percent must be in [0, 100]".into());
            }
        }
        if let ProductOptions::Combinatorial { combinations } = &self.options {
            // every combination must reference a subset of declared groups —
            // declared groups are the union of selection keys across all
            // combinations, so this really only catches empty combinations.
            if combinations.iter().any(|c| c.selections.is_empty()) {
                return Err("combinatorial option has an empty combination".into());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// Adapter output prior to normalization. Transient — lives only on the
/// producer side of the in-memory channel (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub supplier_tag: SupplierTag,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SupplierAccount
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Testing,
    Connected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierAccount {
    pub supplier_tag: SupplierTag,
    pub display_name: String,
    /// Encrypted at rest; the store decrypts into `SupplierCredentials`
    /// only in memory, for the duration of one orchestrator run.
    pub auth_material: Vec<u8>,
    pub connection_state: ConnectionState,
    pub auto_collect: bool,
    pub default_interval_secs: u64,
    pub collect_categories: Option<Vec<String>>,
    pub recent_window_days: u32,
    pub max_products_per_run: usize,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// CollectionJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

/// Bounded error list — the orchestrator records at most the last N errors
/// per job (§7). Push silently drops the oldest entry once full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundedErrors {
    cap: usize,
    items: Vec<String>,
}

impl BoundedErrors {
    pub fn new(cap: usize) -> Self {
        Self { cap, items: Vec::new() }
    }

    pub fn push(&mut self, error: impl Into<String>) {
        if self.items.len() == self.cap {
            self.items.remove(0);
        }
        self.items.push(error.into());
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionJob {
    pub job_id: Uuid,
    pub supplier_tag: SupplierTag,
    pub mode: CollectionMode,
    pub filters: CollectionFilters,
    pub max_products: usize,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub products_found: u64,
    pub products_collected: u64,
    pub products_updated: u64,
    pub products_failed: u64,
    pub errors: BoundedErrors,
}

impl CollectionJob {
    pub fn new(supplier_tag: SupplierTag, mode: CollectionMode, filters: CollectionFilters, max_products: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            supplier_tag,
            mode,
            filters,
            max_products,
            state: JobState::Pending,
            started_at: None,
            finished_at: None,
            products_found: 0,
            products_collected: 0,
            products_updated: 0,
            products_failed: 0,
            errors: BoundedErrors::new(100),
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some(f - s),
            _ => None,
        }
    }

    /// `success_rate = collected / max(total_found, 1) * 100` (original
    /// `CollectionResult.summary`, carried as a derived accessor).
    pub fn success_rate(&self) -> f64 {
        self.products_collected as f64 / self.products_found.max(1) as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: Uuid,
    pub supplier_tag: SupplierTag,
    pub name: String,
    /// RFC 5545 recurrence rule string, e.g. `"FREQ=HOURLY;INTERVAL=6"`.
    pub rrule: String,
    pub timezone: String,
    pub mode: CollectionMode,
    pub filters: CollectionFilters,
    pub max_products: usize,
    pub active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub skipped_runs: u64,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// DuplicateGroup (§4.6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Name,
    Keywords,
    Model,
    Sku,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub product_key: (SupplierTag, String),
    pub similarity: f64,
    pub match_reason: MatchReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub group_id: Uuid,
    pub representative_product_key: (SupplierTag, String),
    pub members: Vec<DuplicateMember>,
    pub method: String,
    pub threshold: f64,
    pub best_deal_key: (SupplierTag, String),
    pub potential_savings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(wholesale: u64, retail: Option<u64>, stock: u32, in_stock: bool) -> CanonicalProduct {
        CanonicalProduct {
            supplier_tag: "zentrade".into(),
            supplier_product_id: "p1".into(),
            supplier_sku: None,
            name: "Widget".into(),
            description: None,
            category_path: None,
            wholesale_price: wholesale,
            retail_price: retail,
            discount_percent: None,
            stock_quantity: stock,
            in_stock,
            main_image_url: None,
            additional_image_urls: vec![],
            options: ProductOptions::None,
            variants: vec![],
            shipping: ShippingInfo::default(),
            raw: serde_json::Value::Null,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn validate_rejects_retail_below_wholesale() {
        assert!(product(1000, Some(500), 0, false).validate().is_err());
    }

    #[test]
    fn validate_rejects_stock_without_in_stock_flag() {
        assert!(product(1000, None, 5, false).validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_product() {
        assert!(product(1000, Some(1500), 5, true).validate().is_ok());
    }

    #[test]
    fn bounded_errors_drops_oldest() {
        let mut errors = BoundedErrors::new(2);
        errors.push("a");
        errors.push("b");
        errors.push("c");
        assert_eq!(errors.as_slice(), &["b", "c"]);
    }

    #[test]
    fn job_success_rate_guards_against_zero_found() {
        let job = CollectionJob::new("zentrade".into(), CollectionMode::All, CollectionFilters::default(), 100);
        assert_eq!(job.success_rate(), 0.0);
    }
}
