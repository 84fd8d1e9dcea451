//! Integration tests for product upsert and lease behavior.
//!
//! Requirements: Docker (for Postgres via testcontainers)
//!
//! Run with: cargo test -p wholesale-store --features test-utils --test products_test

#![cfg(feature = "test-utils")]

use chrono::{Duration, Utc};
use wholesale_common::types::{CanonicalProduct, ProductOptions, ShippingInfo};
use wholesale_store::testutil::postgres_store;

fn sample_product(supplier_product_id: &str) -> CanonicalProduct {
    let now = Utc::now();
    CanonicalProduct {
        supplier_tag: "zentrade".to_string(),
        supplier_product_id: supplier_product_id.to_string(),
        supplier_sku: Some("SKU-1".to_string()),
        name: "Stainless Steel Tumbler".to_string(),
        description: Some("500ml double-wall tumbler".to_string()),
        category_path: Some("Kitchen/Drinkware".to_string()),
        wholesale_price: 4_500,
        retail_price: Some(9_900),
        discount_percent: None,
        stock_quantity: 12,
        in_stock: true,
        main_image_url: Some("https://example.com/tumbler.jpg".to_string()),
        additional_image_urls: vec![],
        options: ProductOptions::None,
        variants: vec![],
        shipping: ShippingInfo::default(),
        raw: serde_json::json!({"source": "test"}),
        first_seen_at: now,
        last_seen_at: now,
    }
}

#[tokio::test]
async fn upsert_then_find_round_trips() {
    let (_container, store) = postgres_store().await;
    let product = sample_product("p-1");

    let inserted = store.upsert_product(&product).await.expect("upsert");
    assert!(inserted);

    let found = store
        .find_product(&product.supplier_tag, &product.supplier_product_id)
        .await
        .expect("find")
        .expect("product present");
    assert_eq!(found.name, product.name);
    assert_eq!(found.wholesale_price, product.wholesale_price);
}

#[tokio::test]
async fn reupsert_preserves_first_seen_at() {
    let (_container, store) = postgres_store().await;
    let mut product = sample_product("p-2");
    product.first_seen_at = Utc::now() - Duration::days(30);

    store.upsert_product(&product).await.expect("first upsert");

    let mut updated = product.clone();
    updated.wholesale_price = 5_000;
    updated.first_seen_at = Utc::now();
    let was_inserted = store.upsert_product(&updated).await.expect("second upsert");
    assert!(!was_inserted);

    let found = store
        .find_product(&product.supplier_tag, &product.supplier_product_id)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(found.wholesale_price, 5_000);
    assert_eq!(found.first_seen_at, product.first_seen_at);
}

#[tokio::test]
async fn bulk_upsert_reports_inserted_and_updated_counts() {
    let (_container, store) = postgres_store().await;
    let existing = sample_product("p-3");
    store.upsert_product(&existing).await.expect("seed");

    let batch = vec![existing.clone(), sample_product("p-4")];
    let (inserted, updated, failed, errors) = store.bulk_upsert(&batch, 10).await.expect("bulk upsert");
    assert_eq!(inserted, 1);
    assert_eq!(updated, 1);
    assert_eq!(failed, 0);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn bulk_upsert_isolates_a_failing_row() {
    let (_container, store) = postgres_store().await;
    // A NUL byte is not representable in a Postgres TEXT column; the row
    // fails at the database level while the rest of the batch must survive.
    let bad = sample_product("p-5\0bad");
    let good = sample_product("p-6");

    let batch = vec![bad, good.clone()];
    let (inserted, updated, failed, errors) = store.bulk_upsert(&batch, 10).await.expect("bulk upsert");
    assert_eq!(inserted, 1);
    assert_eq!(updated, 0);
    assert_eq!(failed, 1);
    assert_eq!(errors.len(), 1);

    let found = store
        .find_product(&good.supplier_tag, &good.supplier_product_id)
        .await
        .expect("find")
        .expect("good row still committed");
    assert_eq!(found.name, good.name);
}

#[tokio::test]
async fn leader_lease_is_exclusive_until_expiry() {
    let (_container, store) = postgres_store().await;

    let first = store
        .acquire_leader_lease("scheduler_leader", "holder-a", Duration::seconds(30))
        .await
        .expect("acquire");
    assert!(first);

    let second = store
        .acquire_leader_lease("scheduler_leader", "holder-b", Duration::seconds(30))
        .await
        .expect("acquire");
    assert!(!second, "a live lease must not be stolen by another holder");

    let renewed = store
        .acquire_leader_lease("scheduler_leader", "holder-a", Duration::seconds(30))
        .await
        .expect("renew");
    assert!(renewed, "the current holder must be able to renew its own lease");
}
