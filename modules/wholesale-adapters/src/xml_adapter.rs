//! Cookie/key XML feed adapter, grounded in `zentrade_api.py`: a single
//! `product_api.php` endpoint returning a `<zentrade><product>...</product></zentrade>`
//! document, auth via a static id/key pair rather than a token exchange.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wholesale_common::types::{CollectionFilters, CollectionMode, RawRecord};
use wholesale_http::RateLimitedClient;

use crate::error::AdapterError;
use crate::types::{CollectionStats, ConnectionTestResult, StockInfo, SupplierCategory, XmlStockPolicy};
use crate::SupplierAdapter;

pub struct XmlAdapter {
    supplier_tag: String,
    base_url: String,
    id: String,
    m_skey: String,
    stock_policy: XmlStockPolicy,
    client: Arc<RateLimitedClient>,
}

impl XmlAdapter {
    pub fn new(supplier_tag: impl Into<String>, id: impl Into<String>, m_skey: impl Into<String>, client: Arc<RateLimitedClient>) -> Self {
        Self {
            supplier_tag: supplier_tag.into(),
            base_url: "https://www.zentrade.co.kr/shop/proc".to_string(),
            id: id.into(),
            m_skey: m_skey.into(),
            stock_policy: XmlStockPolicy::RunoutFlag,
            client,
        }
    }

    pub fn with_stock_policy(mut self, policy: XmlStockPolicy) -> Self {
        self.stock_policy = policy;
        self
    }

    fn endpoint(&self, extra_params: &str) -> String {
        format!(
            "{}/product_api.php?id={}&m_skey={}{}",
            self.base_url, self.id, self.m_skey, extra_params
        )
    }

    /// Resolve the feed's `runout` attribute through `self.stock_policy`.
    /// `AlwaysInStock` exists for feeds whose `runout` flag is known to be
    /// unreliable (stuck at "in stock" or vice versa) and treats every
    /// product as in stock regardless of what the attribute says.
    fn in_stock_for(&self, runout_flag_in_stock: bool) -> bool {
        match self.stock_policy {
            XmlStockPolicy::RunoutFlag => runout_flag_in_stock,
            XmlStockPolicy::AlwaysInStock => true,
        }
    }

    fn stock_quantity_for(&self, in_stock: bool) -> u32 {
        if in_stock {
            1
        } else {
            0
        }
    }

    fn parse_products(&self, body: &str) -> Result<Vec<serde_json::Value>, AdapterError> {
        let doc = roxmltree::Document::parse(body).map_err(|e| AdapterError::Parse(e.to_string()))?;
        let root = doc.root_element();
        let mut out = Vec::new();
        for product in root.children().filter(|n| n.has_tag_name("product")) {
            let code = product.attribute("code").unwrap_or_default().to_string();
            let name = text_of(&product, "name");
            let category_path = text_of(&product, "dome_category");

            let price = product.children().find(|n| n.has_tag_name("price"));
            let buy_price: u64 = price
                .and_then(|p| p.attribute("buyprice"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let consumer_price: Option<u64> = price.and_then(|p| p.attribute("consumerprice")).and_then(|v| v.parse().ok());

            let status = product.children().find(|n| n.has_tag_name("status"));
            let runout = status.and_then(|s| s.attribute("runout")).unwrap_or("0");
            let in_stock = self.in_stock_for(runout != "1");
            let opendate = status.and_then(|s| s.attribute("opendate")).unwrap_or_default().to_string();

            let images: Vec<String> = product
                .children()
                .find(|n| n.has_tag_name("listimg"))
                .map(|listimg| {
                    (1..=5)
                        .filter_map(|i| listimg.attribute(format!("url{i}").as_str()))
                        .filter(|u| !u.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let options = parse_options(&product);

            let discount_rate = consumer_price
                .filter(|&c| c > 0 && c >= buy_price)
                .map(|c| ((c - buy_price) as f64 / c as f64 * 100.0) as u8);

            out.push(serde_json::json!({
                "supplier_product_id": code,
                "name": name,
                "category_path": category_path,
                "wholesale_price": buy_price,
                "retail_price": consumer_price,
                "discount_percent": discount_rate,
                "stock_quantity": self.stock_quantity_for(in_stock),
                "in_stock": in_stock,
                "opendate": opendate,
                "images": images,
                "options": options,
            }));
        }
        Ok(out)
    }
}

fn text_of(node: &roxmltree::Node<'_, '_>, tag: &str) -> String {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.text())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// `<option opt1nm="색상">red^|^0^|^0^|^https://...↑=↑blue^|^0^|^0^|^https://...</option>`
/// item separator `↑=↑`, field separator `^|^`: name/price_delta/stock/image_url.
fn parse_options(product: &roxmltree::Node<'_, '_>) -> Vec<serde_json::Value> {
    let Some(option_node) = product.children().find(|n| n.has_tag_name("option")) else {
        return Vec::new();
    };
    let Some(raw) = option_node.text() else { return Vec::new() };
    raw.split("↑=↑")
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            let fields: Vec<&str> = item.split("^|^").collect();
            serde_json::json!({
                "name": fields.first().unwrap_or(&"").trim(),
                "price_delta": fields.get(1).and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(0),
                "stock_quantity": fields.get(2).and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0),
                "image_url": fields.get(3).map(|v| v.trim()).unwrap_or(""),
            })
        })
        .collect()
}

#[async_trait]
impl SupplierAdapter for XmlAdapter {
    fn supplier_tag(&self) -> &str {
        &self.supplier_tag
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rate_limit_per_minute(&self) -> u32 {
        30
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        let resp = self.client.get(&self.endpoint("")).await?;
        let body = resp.text().await.map_err(wholesale_http::HttpError::from)?;
        if body.contains("error") && !body.contains("<product") {
            return Err(AdapterError::AuthFailed("zentrade rejected id/m_skey".to_string()));
        }
        Ok(())
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
        let resp = self.client.get(&self.endpoint("")).await?;
        let body = resp.text().await.map_err(wholesale_http::HttpError::from)?;
        let products = self.parse_products(&body)?;
        let mut seen = std::collections::HashSet::new();
        let mut categories = Vec::new();
        for p in products {
            if let Some(path) = p.get("category_path").and_then(|v| v.as_str()) {
                if !path.is_empty() && seen.insert(path.to_string()) {
                    categories.push(SupplierCategory { id: path.to_string(), name: path.to_string(), level: 0, parent_id: None });
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
        let mut extra = String::new();
        if mode == CollectionMode::Recent {
            if let Some(from) = filters.date_from {
                extra.push_str(&format!("&opendate_s={}", from.format("%Y-%m-%d")));
            }
            if let Some(to) = filters.date_to {
                extra.push_str(&format!("&opendate_e={}", to.format("%Y-%m-%d")));
            }
        }
        if filters.stock_only() {
            extra.push_str("&runout=0");
        }

        let resp = self.client.get(&self.endpoint(&extra)).await?;
        let body = resp.text().await.map_err(wholesale_http::HttpError::from)?;
        let products = self.parse_products(&body)?;

        let mut stats = CollectionStats::default();
        stats.products_found = products.len() as u64;
        info!(supplier = %self.supplier_tag, found = stats.products_found, "zentrade feed fetched");

        for payload in products {
            if stats.products_yielded as usize >= max_products {
                break;
            }
            let record = RawRecord { supplier_tag: self.supplier_tag.clone(), payload, fetched_at: Utc::now() };
            if tx.send(record).await.is_err() {
                warn!(supplier = %self.supplier_tag, "collection channel closed, stopping early");
                break;
            }
            stats.products_yielded += 1;
        }
        Ok(stats)
    }

    async fn fetch_detail(&self, supplier_product_id: &str) -> Result<RawRecord, AdapterError> {
        let resp = self.client.get(&self.endpoint("")).await?;
        let body = resp.text().await.map_err(wholesale_http::HttpError::from)?;
        let products = self.parse_products(&body)?;
        products
            .into_iter()
            .find(|p| p.get("supplier_product_id").and_then(|v| v.as_str()) == Some(supplier_product_id))
            .map(|payload| RawRecord { supplier_tag: self.supplier_tag.clone(), payload, fetched_at: Utc::now() })
            .ok_or_else(|| AdapterError::Parse(format!("product {supplier_product_id} not found in feed")))
    }

    async fn fetch_stock(&self, supplier_product_ids: &[String]) -> Result<std::collections::HashMap<String, StockInfo>, AdapterError> {
        let resp = self.client.get(&self.endpoint("")).await?;
        let body = resp.text().await.map_err(wholesale_http::HttpError::from)?;
        let products = self.parse_products(&body)?;
        let wanted: std::collections::HashSet<&str> = supplier_product_ids.iter().map(String::as_str).collect();
        Ok(products
            .into_iter()
            .filter_map(|p| {
                let id = p.get("supplier_product_id")?.as_str()?.to_string();
                if !wanted.contains(id.as_str()) {
                    return None;
                }
                let in_stock = p.get("in_stock").and_then(|v| v.as_bool()).unwrap_or(false);
                let stock_quantity = p.get("stock_quantity").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                Some((id.clone(), StockInfo { supplier_product_id: id, stock_quantity, in_stock }))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_xml() -> &'static str {
        r#"<zentrade>
            <product code="A100">
                <name>Widget</name>
                <dome_category>Electronics&gt;Audio</dome_category>
                <price buyprice="1000" consumerprice="1500"/>
                <status runout="0" opendate="2026-01-01"/>
                <listimg url1="//cdn.example.com/a.jpg"/>
                <option opt1nm="color"><![CDATA[red^|^0^|^5^|^//cdn.example.com/red.jpg↑=↑blue^|^100^|^2^|^//cdn.example.com/blue.jpg]]></option>
            </product>
        </zentrade>"#
    }

    fn adapter() -> XmlAdapter {
        XmlAdapter::new("zentrade", "id", "key", Arc::new(RateLimitedClient::new(wholesale_http::HostLimits::default())))
    }

    #[test]
    fn parses_products_and_options() {
        let a = adapter();
        let products = a.parse_products(sample_xml()).unwrap();
        assert_eq!(products.len(), 1);
        let p = &products[0];
        assert_eq!(p["supplier_product_id"], "A100");
        assert_eq!(p["wholesale_price"], 1000);
        assert_eq!(p["stock_quantity"], 1);
        let options = p["options"].as_array().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0]["name"], "red");
        assert_eq!(options[1]["price_delta"], 100);
    }

    #[test]
    fn stock_policy_runout_flag_zeroes_out_of_stock() {
        let a = adapter();
        let out_of_stock_xml = sample_xml().replace(r#"runout="0""#, r#"runout="1""#);
        let products = a.parse_products(&out_of_stock_xml).unwrap();
        assert_eq!(products[0]["stock_quantity"], 0);
        assert_eq!(products[0]["in_stock"], false);
    }

    #[test]
    fn stock_policy_always_in_stock_overrides_runout_flag() {
        let a = adapter().with_stock_policy(XmlStockPolicy::AlwaysInStock);
        let out_of_stock_xml = sample_xml().replace(r#"runout="0""#, r#"runout="1""#);
        let products = a.parse_products(&out_of_stock_xml).unwrap();
        assert_eq!(products[0]["stock_quantity"], 1);
        assert_eq!(products[0]["in_stock"], true);
    }
}
