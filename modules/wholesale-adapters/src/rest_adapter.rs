//! Keyed REST adapter, grounded in `domeggook_api.py`: an API-key query
//! param on every call, categories listed up front, products paged per
//! category until `current_page >= total_pages`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wholesale_common::types::{CollectionFilters, CollectionMode, RawRecord};
use wholesale_http::RateLimitedClient;

use crate::error::AdapterError;
use crate::types::{CollectionStats, ConnectionTestResult, StockInfo, SupplierCategory};
use crate::SupplierAdapter;

const PAGE_SIZE: u32 = 100;

pub struct KeyedRestAdapter {
    supplier_tag: String,
    base_url: String,
    api_key: String,
    client: Arc<RateLimitedClient>,
}

impl KeyedRestAdapter {
    pub fn new(supplier_tag: impl Into<String>, api_key: impl Into<String>, client: Arc<RateLimitedClient>) -> Self {
        Self {
            supplier_tag: supplier_tag.into(),
            base_url: "https://openapi.domeggook.com".to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    async fn get_json(&self, path: &str, extra: &str) -> Result<serde_json::Value, AdapterError> {
        let url = format!("{}{}?api_key={}&version=4.1{}", self.base_url, path, self.api_key, extra);
        let resp = self.client.get(&url).await?;
        resp.json().await.map_err(|e| AdapterError::Http(wholesale_http::HttpError::from(e)))
    }

    async fn page(&self, category_code: &str, page: u32) -> Result<(Vec<serde_json::Value>, u32, u32), AdapterError> {
        let extra = format!("&category_code={category_code}&page={page}&limit={PAGE_SIZE}");
        let data = self.get_json("/api/product/list", &extra).await?;
        let items = data
            .get("products")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let pagination = data.get("pagination").cloned().unwrap_or_default();
        let current_page = pagination.get("current_page").and_then(|v| v.as_u64()).unwrap_or(page as u64) as u32;
        let total_pages = pagination.get("total_pages").and_then(|v| v.as_u64()).unwrap_or(current_page as u64) as u32;
        Ok((items, current_page, total_pages))
    }
}

#[async_trait]
impl SupplierAdapter for KeyedRestAdapter {
    fn supplier_tag(&self) -> &str {
        &self.supplier_tag
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rate_limit_per_minute(&self) -> u32 {
        60
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        self.get_json("/api/category/list", "").await.map(|_| ())
    }

    async fn test_connection(&self) -> Result<ConnectionTestResult, AdapterError> {
        let started = Instant::now();
        match self.authenticate().await {
            Ok(()) => Ok(ConnectionTestResult {
                connected: true,
                response_time_ms: started.elapsed().as_millis() as u64,
                api_info: None,
                error: None,
            }),
            Err(e) => Ok(ConnectionTestResult {
                connected: false,
                response_time_ms: started.elapsed().as_millis() as u64,
                api_info: None,
                error: Some(e.to_string()),
            }),
        }
    }

    async fn list_categories(&self) -> Result<Vec<SupplierCategory>, AdapterError> {
        let data = self.get_json("/api/category/list", "").await?;
        let categories = data.get("categories").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        Ok(categories
            .into_iter()
            .filter_map(|c| {
                Some(SupplierCategory {
                    id: c.get("code")?.as_str()?.to_string(),
                    name: c.get("name")?.as_str().unwrap_or_default().to_string(),
                    level: c.get("level").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                    parent_id: c.get("parent_code").and_then(|v| v.as_str()).map(str::to_string),
                })
            })
            .collect())
    }

    async fn collect(
        &self,
        mode: CollectionMode,
        filters: &CollectionFilters,
        max_products: usize,
        tx: mpsc::Sender<RawRecord>,
    ) -> Result<CollectionStats, AdapterError> {
        let categories = if filters.categories.is_empty() {
            self.list_categories().await?.into_iter().map(|c| c.id).collect()
        } else {
            filters.categories.clone()
        };

        let mut stats = CollectionStats::default();
        'categories: for category_code in categories {
            let mut page = 1u32;
            loop {
                let (items, current_page, total_pages) = self.page(&category_code, page).await?;
                stats.products_found += items.len() as u64;
                for item in items {
                    if stats.products_yielded as usize >= max_products {
                        break 'categories;
                    }
                    if mode == CollectionMode::Recent && !within_date_window(item.get("reg_date"), filters) {
                        continue;
                    }
                    let record = RawRecord { supplier_tag: self.supplier_tag.clone(), payload: harmonize(&item), fetched_at: Utc::now() };
                    if tx.send(record).await.is_err() {
                        warn!(supplier = %self.supplier_tag, "collection channel closed, stopping early");
                        break 'categories;
                    }
                    stats.products_yielded += 1;
                }
                if current_page >= total_pages || total_pages == 0 {
                    break;
                }
                page += 1;
            }
        }
        info!(supplier = %self.supplier_tag, found = stats.products_found, yielded = stats.products_yielded, "domeggook collection finished");
        Ok(stats)
    }

    async fn fetch_detail(&self, supplier_product_id: &str) -> Result<RawRecord, AdapterError> {
        let extra = format!("&product_id={supplier_product_id}");
        let item = self.get_json("/api/product/detail", &extra).await?;
        Ok(RawRecord { supplier_tag: self.supplier_tag.clone(), payload: harmonize(&item), fetched_at: Utc::now() })
    }

    async fn fetch_stock(&self, supplier_product_ids: &[String]) -> Result<std::collections::HashMap<String, StockInfo>, AdapterError> {
        // domeggook has no batch stock endpoint, so the "one round trip"
        // contract is approximated with concurrent per-id detail fetches.
        let fetches = supplier_product_ids.iter().map(|id| async move {
            let record = self.fetch_detail(id).await?;
            let stock_quantity = record.payload.get("stock_quantity").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            Ok::<_, AdapterError>((id.clone(), StockInfo { supplier_product_id: id.clone(), stock_quantity, in_stock: stock_quantity > 0 }))
        });
        let results = futures::future::join_all(fetches).await;
        let mut out = std::collections::HashMap::with_capacity(supplier_product_ids.len());
        for result in results {
            match result {
                Ok((id, info)) => {
                    out.insert(id, info);
                }
                Err(e) => warn!(error = %e, "fetch_stock: skipping id that failed to resolve"),
            }
        }
        Ok(out)
    }
}

/// Check `reg_date` (`%Y-%m-%d %H:%M:%S`, naive/no timezone) against the
/// filter's inclusive date window, mirroring
/// `DomeggookAPI._is_recent_product`. Items with no parseable date are
/// kept rather than silently dropped.
fn within_date_window(reg_date: Option<&serde_json::Value>, filters: &CollectionFilters) -> bool {
    let Some(parsed) = reg_date
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .map(|naive| naive.and_utc())
    else {
        return true;
    };
    if let Some(from) = filters.date_from {
        if parsed < from {
            return false;
        }
    }
    if let Some(to) = filters.date_to {
        if parsed > to {
            return false;
        }
    }
    true
}

/// Map a `/api/product/list` item into the harmonized intermediate shape,
/// the way `DomeggookAPI._parse_product` built a `ProductData` instance.
fn harmonize(item: &serde_json::Value) -> serde_json::Value {
    let stock_quantity = item.get("stock_quantity").and_then(|v| v.as_u64()).unwrap_or(0);
    serde_json::json!({
        "supplier_product_id": item.get("product_id").and_then(|v| v.as_str()).unwrap_or_default(),
        "supplier_sku": item.get("seller_managed_code").and_then(|v| v.as_str()),
        "name": item.get("product_nm").and_then(|v| v.as_str()).unwrap_or_default(),
        "category_path": item.get("category_code").and_then(|v| v.as_str()),
        "wholesale_price": item.get("price").and_then(|v| v.as_u64()).unwrap_or(0),
        "retail_price": item.get("consumer_price").and_then(|v| v.as_u64()),
        "stock_quantity": stock_quantity,
        "in_stock": stock_quantity > 0,
        "main_image_url": item.get("main_image_url").and_then(|v| v.as_str()),
        "additional_image_urls": item.get("additional_images").and_then(|v| v.as_array()).cloned().unwrap_or_default(),
        "raw": item,
    })
}
