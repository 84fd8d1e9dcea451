//! Token-auth GraphQL adapter, grounded in `ownerclan_api.py`: a
//! separate auth endpoint issuing a bearer token with an `expiresIn`,
//! refreshed 5 minutes before expiry, and cursor-paginated product keys.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use wholesale_common::types::{CollectionFilters, CollectionMode, RawRecord};
use wholesale_http::RateLimitedClient;

use crate::error::AdapterError;
use crate::types::{CollectionStats, ConnectionTestResult, StockInfo, SupplierCategory};
use crate::SupplierAdapter;

/// Detail fetches are batched via `items(keys: [...])`; capped per the
/// wire-exact limit the external interface documents (distinct from the
/// key-listing page size, which the API bounds separately).
const DETAIL_BATCH_MAX: usize = 5_000;
const KEY_PAGE_SIZE: u32 = 1_000;

struct TokenState {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct GraphQlAdapter {
    supplier_tag: String,
    base_url: String,
    auth_url: String,
    username: String,
    password: String,
    client: Arc<RateLimitedClient>,
    token: Mutex<Option<TokenState>>,
}

impl GraphQlAdapter {
    pub fn new(
        supplier_tag: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        client: Arc<RateLimitedClient>,
    ) -> Self {
        Self {
            supplier_tag: supplier_tag.into(),
            base_url: "https://api-sandbox.ownerclan.com/v1/graphql".to_string(),
            auth_url: "https://auth-sandbox.ownerclan.com/auth".to_string(),
            username: username.into(),
            password: password.into(),
            client,
            token: Mutex::new(None),
        }
    }

    async fn ensure_token(&self) -> Result<String, AdapterError> {
        {
            let guard = self.token.lock().await;
            if let Some(state) = guard.as_ref() {
                if state.expires_at > Utc::now() {
                    return Ok(state.token.clone());
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, AdapterError> {
        let body = json!({
            "service": "ownerclan",
            "userType": "seller",
            "username": self.username,
            "password": self.password,
        });
        let resp = self
            .client
            .request(reqwest::Method::POST, &self.auth_url, |b| b.json(&body))
            .await?;
        let parsed: serde_json::Value = resp.json().await.map_err(wholesale_http::HttpError::from)?;
        let token = parsed
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AdapterError::AuthFailed("missing token in auth response".to_string()))?
            .to_string();
        let expires_in = parsed.get("expiresIn").and_then(|v| v.as_i64()).unwrap_or(3600);
        // Refresh 5 minutes early so an in-flight collection never hits an
        // expired token mid-page.
        let expires_at = Utc::now() + ChronoDuration::seconds(expires_in) - ChronoDuration::seconds(300);
        let mut guard = self.token.lock().await;
        *guard = Some(TokenState { token: token.clone(), expires_at });
        Ok(token)
    }

    async fn graphql_request(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value, AdapterError> {
        let token = self.ensure_token().await?;
        let body = json!({ "query": query, "variables": variables });
        let url = self.base_url.clone();
        let resp = self
            .client
            .request(reqwest::Method::POST, &url, move |b| b.bearer_auth(&token).json(&body))
            .await?;
        let parsed: serde_json::Value = resp.json().await.map_err(wholesale_http::HttpError::from)?;
        if let Some(errors) = parsed.get("errors") {
            return Err(AdapterError::GraphQl(errors.to_string()));
        }
        parsed.get("data").cloned().ok_or_else(|| AdapterError::Parse("graphql response missing data".to_string()))
    }

    async fn collect_product_keys(&self, filters: &CollectionFilters, max_products: usize) -> Result<Vec<String>, AdapterError> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let variables = json!({
                "first": KEY_PAGE_SIZE,
                "after": cursor,
                "categories": filters.categories,
                "keywords": filters.keywords,
            });
            let data = self
                .graphql_request(
                    "query($first:Int,$after:String,$categories:[String!],$keywords:[String!]){\
                        allItems(first:$first, after:$after, categories:$categories, keywords:$keywords){\
                            edges{node{key}} pageInfo{hasNextPage endCursor}}}",
                    variables,
                )
                .await?;
            let edges = data["allItems"]["edges"].as_array().cloned().unwrap_or_default();
            for edge in edges {
                if let Some(key) = edge["node"]["key"].as_str() {
                    keys.push(key.to_string());
                    if keys.len() >= max_products {
                        return Ok(keys);
                    }
                }
            }
            let page_info = &data["allItems"]["pageInfo"];
            if page_info["hasNextPage"].as_bool() != Some(true) {
                break;
            }
            cursor = page_info["endCursor"].as_str().map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(keys)
    }
}

/// Check `updatedAt` (an ISO-8601 timestamp) against the filter's inclusive
/// date window, mirroring `OwnerClanAPI._is_recent_product`. Items with no
/// parseable timestamp are kept rather than silently dropped.
fn within_date_window(updated_at: Option<&serde_json::Value>, filters: &CollectionFilters) -> bool {
    let Some(parsed) = updated_at
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
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

/// Map an `items(keys:[...])` node into the harmonized intermediate shape
/// the normalizer expects, the way `OwnerClanAPI.get_product_detail` built
/// a `ProductData` instance from the raw GraphQL response.
fn harmonize(item: &serde_json::Value) -> serde_json::Value {
    let stock_quantity = item.get("stockQuantity").and_then(|v| v.as_u64()).unwrap_or(0);
    let images: Vec<String> = item
        .get("images")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    json!({
        "supplier_product_id": item.get("key").and_then(|v| v.as_str()).unwrap_or_default(),
        "supplier_sku": item.get("model").and_then(|v| v.as_str()),
        "name": item.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
        "category_path": item["category"].get("id").and_then(|v| v.as_str()),
        "wholesale_price": item.get("price").and_then(|v| v.as_u64()).unwrap_or(0),
        "stock_quantity": stock_quantity,
        "in_stock": stock_quantity > 0,
        "main_image_url": images.first(),
        "additional_image_urls": images.iter().skip(1).collect::<Vec<_>>(),
        "raw": item,
    })
}

#[async_trait]
impl SupplierAdapter for GraphQlAdapter {
    fn supplier_tag(&self) -> &str {
        &self.supplier_tag
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rate_limit_per_minute(&self) -> u32 {
        120
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        self.refresh_token().await.map(|_| ())
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
        let data = self
            .graphql_request(
                "query{allItems(first:1000){edges{node{category{id name level}}}}}",
                json!({}),
            )
            .await?;
        let mut seen = std::collections::HashSet::new();
        let mut categories = Vec::new();
        for edge in data["allItems"]["edges"].as_array().cloned().unwrap_or_default() {
            let cat = &edge["node"]["category"];
            if let Some(id) = cat["id"].as_str() {
                if seen.insert(id.to_string()) {
                    categories.push(SupplierCategory {
                        id: id.to_string(),
                        name: cat["name"].as_str().unwrap_or_default().to_string(),
                        level: cat["level"].as_u64().unwrap_or(0) as u32,
                        parent_id: None,
                    });
                }
            }
        }
        Ok(categories)
    }

    async fn collect(
        &self,
        mode: CollectionMode,
        filters: &CollectionFilters,
        max_products: usize,
        tx: mpsc::Sender<RawRecord>,
    ) -> Result<CollectionStats, AdapterError> {
        let keys = self.collect_product_keys(filters, max_products).await?;
        info!(supplier = %self.supplier_tag, key_count = keys.len(), "ownerclan product keys collected");

        let mut stats = CollectionStats { products_found: keys.len() as u64, products_yielded: 0 };
        for chunk in keys.chunks(DETAIL_BATCH_MAX) {
            let data = self
                .graphql_request(
                    "query($keys:[String!]!){items(keys:$keys){key name model price stockQuantity category{id} images updatedAt}}",
                    json!({ "keys": chunk }),
                )
                .await?;
            for item in data["items"].as_array().cloned().unwrap_or_default() {
                if stats.products_yielded as usize >= max_products {
                    return Ok(stats);
                }
                if mode == CollectionMode::Recent && !within_date_window(item.get("updatedAt"), filters) {
                    continue;
                }
                let record = RawRecord { supplier_tag: self.supplier_tag.clone(), payload: harmonize(&item), fetched_at: Utc::now() };
                if tx.send(record).await.is_err() {
                    warn!(supplier = %self.supplier_tag, "collection channel closed, stopping early");
                    return Ok(stats);
                }
                stats.products_yielded += 1;
            }
        }
        Ok(stats)
    }

    async fn fetch_detail(&self, supplier_product_id: &str) -> Result<RawRecord, AdapterError> {
        let data = self
            .graphql_request(
                "query($key:String!){item(key:$key){key name model price stockQuantity category{id} images}}",
                json!({ "key": supplier_product_id }),
            )
            .await?;
        let item = data.get("item").cloned().ok_or_else(|| AdapterError::Parse(format!("no item for key {supplier_product_id}")))?;
        Ok(RawRecord { supplier_tag: self.supplier_tag.clone(), payload: harmonize(&item), fetched_at: Utc::now() })
    }

    async fn fetch_stock(&self, supplier_product_ids: &[String]) -> Result<std::collections::HashMap<String, StockInfo>, AdapterError> {
        let mut out = std::collections::HashMap::with_capacity(supplier_product_ids.len());
        for chunk in supplier_product_ids.chunks(DETAIL_BATCH_MAX) {
            let data = self
                .graphql_request("query($keys:[String!]!){items(keys:$keys){key stockQuantity}}", json!({ "keys": chunk }))
                .await?;
            for item in data["items"].as_array().cloned().unwrap_or_default() {
                let Some(key) = item.get("key").and_then(|v| v.as_str()) else { continue };
                let stock_quantity = item.get("stockQuantity").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                out.insert(key.to_string(), StockInfo { supplier_product_id: key.to_string(), stock_quantity, in_stock: stock_quantity > 0 });
            }
        }
        Ok(out)
    }
}
