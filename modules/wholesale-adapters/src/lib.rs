//! Supplier adapter capability set (spec §4.1) and three concrete
//! implementations grounded in the wholesalers this system was built to
//! replace: a cookie-auth XML feed, a JWT GraphQL API, and a keyed REST API.

pub mod error;
pub mod graphql_adapter;
pub mod rest_adapter;
pub mod types;
pub mod xml_adapter;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use wholesale_common::types::{CollectionFilters, CollectionMode, RawRecord};

pub use error::AdapterError;
pub use graphql_adapter::GraphQlAdapter;
pub use rest_adapter::KeyedRestAdapter;
pub use types::{AdapterState, CollectionStats, ConnectionTestResult, StockInfo, SupplierCategory, XmlStockPolicy};
pub use xml_adapter::XmlAdapter;

/// The capability set every supplier integration implements (§4.1). A
/// `collect` call streams records onto `tx` rather than returning a `Vec`
/// so a slow consumer naturally backpressures a fast supplier feed.
#[async_trait]
pub trait SupplierAdapter: Send + Sync {
    fn supplier_tag(&self) -> &str;
    fn base_url(&self) -> &str;
    fn rate_limit_per_minute(&self) -> u32;

    async fn authenticate(&self) -> Result<(), AdapterError>;
    async fn test_connection(&self) -> Result<ConnectionTestResult, AdapterError>;
    async fn list_categories(&self) -> Result<Vec<SupplierCategory>, AdapterError>;

    /// Stream raw records matching `mode`/`filters` onto `tx`, stopping
    /// after `max_products` or when `tx` is closed (consumer gone /
    /// cancellation). Returns counts for job progress reporting.
    async fn collect(
        &self,
        mode: CollectionMode,
        filters: &CollectionFilters,
        max_products: usize,
        tx: mpsc::Sender<RawRecord>,
    ) -> Result<CollectionStats, AdapterError>;

    async fn fetch_detail(&self, supplier_product_id: &str) -> Result<RawRecord, AdapterError>;

    /// Look up current stock for a batch of ids in one round trip, per
    /// §4.1 (`fetch_stock(ids) → map<id, {qty, in_stock}>`). Ids the
    /// supplier has no record of are simply absent from the returned map.
    async fn fetch_stock(&self, supplier_product_ids: &[String]) -> Result<HashMap<String, StockInfo>, AdapterError>;
}
