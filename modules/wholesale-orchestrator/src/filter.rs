use wholesale_common::types::{CanonicalProduct, CollectionFilters};

/// Apply the Filter Stage (§4.4) to one normalized product. Filters
/// compose as conjunction; an empty filter set passes everything.
///
/// `date_from`/`date_to` are deliberately absent here: they're checked
/// against each supplier's source-reported date before normalization
/// (every adapter's `collect()` applies the window itself), since
/// `CanonicalProduct` only carries `first_seen_at`/`last_seen_at`, not
/// the raw feed's own timestamp.
pub fn passes(product: &CanonicalProduct, filters: &CollectionFilters) -> bool {
    if filters.stock_only() && !product.in_stock {
        return false;
    }
    if let Some(min) = filters.price_min {
        if product.wholesale_price < min {
            return false;
        }
    }
    if let Some(max) = filters.price_max {
        if product.wholesale_price > max {
            return false;
        }
    }
    if !filters.categories.is_empty() {
        let in_category = product
            .category_path
            .as_deref()
            .map(|path| filters.categories.iter().any(|c| path.starts_with(c.as_str())))
            .unwrap_or(false);
        if !in_category {
            return false;
        }
    }
    if !filters.keywords.is_empty() {
        let haystack = searchable_text(product);
        if !filters.keywords.iter().any(|k| haystack.contains(&k.to_lowercase())) {
            return false;
        }
    }
    if !filters.exclude_keywords.is_empty() {
        let haystack = searchable_text(product);
        if filters.exclude_keywords.iter().any(|k| haystack.contains(&k.to_lowercase())) {
            return false;
        }
    }
    true
}

/// Lowercased `name` + `description`, the combined field a keyword must
/// appear in (or be absent from) per §4.4.
fn searchable_text(product: &CanonicalProduct) -> String {
    let mut text = product.name.to_lowercase();
    if let Some(description) = &product.description {
        text.push(' ');
        text.push_str(&description.to_lowercase());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wholesale_common::types::{ProductOptions, ShippingInfo};

    fn product(price: u64, in_stock: bool, category: &str, name: &str) -> CanonicalProduct {
        CanonicalProduct {
            supplier_tag: "zentrade".into(),
            supplier_product_id: "1".into(),
            supplier_sku: None,
            name: name.to_string(),
            description: None,
            category_path: Some(category.to_string()),
            wholesale_price: price,
            retail_price: None,
            discount_percent: None,
            stock_quantity: if in_stock { 1 } else { 0 },
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
    fn stock_only_drops_out_of_stock() {
        let filters = CollectionFilters { stock_only: Some(true), ..Default::default() };
        assert!(!passes(&product(1000, false, "Electronics", "Widget"), &filters));
    }

    #[test]
    fn price_range_filters_outliers() {
        let filters = CollectionFilters { price_min: Some(500), price_max: Some(1500), ..Default::default() };
        assert!(passes(&product(1000, true, "Electronics", "Widget"), &filters));
        assert!(!passes(&product(2000, true, "Electronics", "Widget"), &filters));
    }

    #[test]
    fn exclude_keywords_take_precedence() {
        let filters = CollectionFilters { exclude_keywords: vec!["refurbished".to_string()], ..Default::default() };
        assert!(!passes(&product(1000, true, "Electronics", "Refurbished Widget"), &filters));
    }

    #[test]
    fn keyword_matches_description_when_absent_from_name() {
        let filters = CollectionFilters { keywords: vec!["bluetooth".to_string()], ..Default::default() };
        let mut p = product(1000, true, "Electronics", "Widget");
        p.description = Some("Bluetooth-enabled widget".to_string());
        assert!(passes(&p, &filters));
    }
}
