//! The Normalizer (spec §4.3): a pure function turning one adapter's
//! harmonized [`RawRecord`] into a [`CanonicalProduct`]. Grounded in
//! `data_normalizer.py`'s per-field cleaning methods, generalized to run
//! in a fixed order so the same input always produces the same output.

pub mod error;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use wholesale_common::text;
use wholesale_common::types::{CanonicalProduct, Combination, ProductOptions, RawRecord, ShippingInfo};

pub use error::NormalizeError;

const NAME_MAX_CHARS: usize = 500;
const DESCRIPTION_MAX_BYTES: usize = 64 * 1024;
const CATEGORY_MAX_CHARS: usize = 500;
const ID_MAX_CHARS: usize = 100;

/// Normalize one raw record. `existing` carries forward `first_seen_at`
/// when this is a re-collection of a product already on file; `now` is
/// injected rather than read from the clock so the function is pure.
pub fn normalize(
    record: &RawRecord,
    existing: Option<&CanonicalProduct>,
    now: DateTime<Utc>,
) -> Result<CanonicalProduct, NormalizeError> {
    let payload = &record.payload;

    // Step 1: required identity fields, capped and trimmed.
    let supplier_product_id = str_field(payload, "supplier_product_id")
        .filter(|s| !s.is_empty())
        .ok_or(NormalizeError::MissingField("supplier_product_id"))?;
    let supplier_product_id = text::truncate_to(&supplier_product_id, ID_MAX_CHARS);
    let supplier_sku = str_field(payload, "supplier_sku").map(|s| text::truncate_to(&s, ID_MAX_CHARS));

    // Step 2: HTML strip + entity decode (text::strip_html covers both).
    // Step 3: whitespace collapse + field-cap truncation (clean_field/clean_long_field).
    let name = text::clean_field(&str_field(payload, "name").unwrap_or_default(), NAME_MAX_CHARS);
    let description = str_field(payload, "description").map(|d| text::clean_long_field(&d, DESCRIPTION_MAX_BYTES));

    // Step 4: category path rebuild (separator unification, empty-segment drop).
    let category_path = str_field(payload, "category_path")
        .and_then(|c| text::normalize_category_path(&c))
        .map(|c| text::truncate_to(&c, CATEGORY_MAX_CHARS));

    // Step 5: price coercion.
    let wholesale_price = price_from(payload, "wholesale_price").unwrap_or(0);
    let retail_price = price_from(payload, "retail_price").filter(|&p| p >= wholesale_price);

    // Step 6: stock coercion, in_stock boolean coercion.
    let stock_quantity = stock_from(payload, "stock_quantity").unwrap_or(0);
    let in_stock = bool_from(payload, "in_stock").unwrap_or(stock_quantity > 0);
    // stock_quantity > 0 must imply in_stock; a feed that disagrees defers
    // to its own explicit in_stock flag and zeroes the quantity instead.
    let stock_quantity = if stock_quantity > 0 && !in_stock { 0 } else { stock_quantity };

    // Step 7: image URL validation + protocol-relative rewrite.
    let main_image_url = str_field(payload, "main_image_url").and_then(|u| text::normalize_image_url(&u));
    let additional_image_urls: Vec<String> = payload
        .get("additional_image_urls")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().and_then(text::normalize_image_url)).collect())
        .unwrap_or_default();

    // Step 8: option/variant normalization.
    let options = options_from(payload);

    // Step 9: discount_percent — trust an explicit supplier value, else derive.
    let discount_percent = payload
        .get("discount_percent")
        .and_then(|v| v.as_u64())
        .map(|v| v.min(100) as u8)
        .or_else(|| derive_discount_percent(wholesale_price, retail_price));

    let first_seen_at = existing.map(|p| p.first_seen_at).unwrap_or(now);

    let product = CanonicalProduct {
        supplier_tag: record.supplier_tag.clone(),
        supplier_product_id,
        supplier_sku,
        name,
        description,
        category_path,
        wholesale_price,
        retail_price,
        discount_percent,
        stock_quantity,
        in_stock,
        main_image_url,
        additional_image_urls,
        options,
        variants: Vec::new(),
        shipping: ShippingInfo::default(),
        raw: payload.get("raw").cloned().unwrap_or_else(|| payload.clone()),
        first_seen_at,
        last_seen_at: now,
    };

    product.validate().map_err(NormalizeError::Invalid)?;
    Ok(product)
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn price_from(payload: &Value, key: &str) -> Option<u64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => Some(text::normalize_price(s)),
        _ => None,
    }
}

fn stock_from(payload: &Value, key: &str) -> Option<u32> {
    match payload.get(key)? {
        Value::Number(n) => n.as_i64().map(text::normalize_stock),
        Value::String(s) => s.parse::<i64>().ok().map(text::normalize_stock),
        _ => None,
    }
}

fn bool_from(payload: &Value, key: &str) -> Option<bool> {
    match payload.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(text::coerce_bool(s)),
        Value::Number(n) => Some(n.as_i64().unwrap_or(0) != 0),
        _ => None,
    }
}

/// `discount_rate = (retail - wholesale) / retail * 100`, matching
/// `ZentradeAPI`'s rounding toward zero.
fn derive_discount_percent(wholesale_price: u64, retail_price: Option<u64>) -> Option<u8> {
    let retail = retail_price?;
    if retail == 0 || retail < wholesale_price {
        return None;
    }
    let pct = ((retail - wholesale_price) as f64 / retail as f64 * 100.0) as u64;
    Some(pct.min(100) as u8)
}

fn options_from(payload: &Value) -> ProductOptions {
    let Some(items) = payload.get("options").and_then(|v| v.as_array()) else {
        return ProductOptions::None;
    };
    if items.is_empty() {
        return ProductOptions::None;
    }
    let combinations: Vec<Combination> = items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?;
            if name.is_empty() {
                return None;
            }
            let mut selections = HashMap::new();
            selections.insert("option".to_string(), name.to_string());
            Some(Combination {
                selections,
                price_delta: item.get("price_delta").and_then(|v| v.as_i64()).unwrap_or(0),
                stock_quantity: item.get("stock_quantity").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            })
        })
        .collect();
    if combinations.is_empty() {
        ProductOptions::None
    } else {
        ProductOptions::Combinatorial { combinations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(payload: Value) -> RawRecord {
        RawRecord { supplier_tag: "zentrade".to_string(), payload, fetched_at: Utc::now() }
    }

    #[test]
    fn normalizes_a_well_formed_record() {
        let r = record(json!({
            "supplier_product_id": "A100",
            "name": "<b>Widget</b>  Pro",
            "category_path": "Electronics / Audio",
            "wholesale_price": 1000,
            "retail_price": 1500,
            "stock_quantity": 5,
            "in_stock": true,
            "main_image_url": "//cdn.example.com/a.jpg",
        }));
        let product = normalize(&r, None, Utc::now()).unwrap();
        assert_eq!(product.name, "Widget Pro");
        assert_eq!(product.category_path.as_deref(), Some("Electronics > Audio"));
        assert_eq!(product.main_image_url.as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(product.discount_percent, Some(33));
    }

    #[test]
    fn preserves_first_seen_at_across_recollection() {
        let r = record(json!({ "supplier_product_id": "A100", "name": "Widget", "wholesale_price": 1000 }));
        let first_seen = Utc::now() - chrono::Duration::days(10);
        let existing = normalize(&r, None, first_seen).unwrap();
        let updated = normalize(&r, Some(&existing), Utc::now()).unwrap();
        assert_eq!(updated.first_seen_at, first_seen);
        assert!(updated.last_seen_at > first_seen);
    }

    #[test]
    fn zero_quantity_enforced_when_feed_flags_out_of_stock() {
        let r = record(json!({
            "supplier_product_id": "A100",
            "name": "Widget",
            "wholesale_price": 1000,
            "stock_quantity": 5,
            "in_stock": false,
        }));
        let product = normalize(&r, None, Utc::now()).unwrap();
        assert_eq!(product.stock_quantity, 0);
        assert!(!product.in_stock);
    }

    #[test]
    fn missing_supplier_product_id_is_rejected() {
        let r = record(json!({ "name": "Widget" }));
        assert!(normalize(&r, None, Utc::now()).is_err());
    }

    #[test]
    fn is_idempotent_given_same_input_and_clock() {
        let r = record(json!({ "supplier_product_id": "A100", "name": "Widget", "wholesale_price": 1000 }));
        let now = Utc::now();
        let a = normalize(&r, None, now).unwrap();
        let b = normalize(&r, None, now).unwrap();
        assert_eq!(a.name, b.name);
        assert_eq!(a.wholesale_price, b.wholesale_price);
        assert_eq!(a.first_seen_at, b.first_seen_at);
    }
}
