use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Authenticating,
    Ready,
    Collecting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub connected: bool,
    pub response_time_ms: u64,
    pub api_info: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierCategory {
    pub id: String,
    pub name: String,
    pub level: u32,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockInfo {
    pub supplier_product_id: String,
    pub stock_quantity: u32,
    pub in_stock: bool,
}

/// What `SupplierAdapter::collect` returns once the channel is drained or
/// `max_products`/cancellation stops it early.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub products_found: u64,
    pub products_yielded: u64,
}

/// Per-XML-supplier heuristic for deriving `stock_quantity` when the feed
/// only carries a boolean-ish in/out-of-stock flag (SPEC_FULL.md Open
/// Question: zentrade's `runout` flag never carries a real quantity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XmlStockPolicy {
    /// `stock_quantity = 1` when in stock, `0` otherwise.
    RunoutFlag,
    /// Always report `stock_quantity = 1` when `in_stock` regardless of feed noise.
    AlwaysInStock,
}
