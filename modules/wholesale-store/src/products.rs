use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row};
use wholesale_common::types::{CanonicalProduct, ProductOptions, ProductVariant, ShippingInfo};

use crate::error::StoreError;
use crate::Store;

#[derive(FromRow)]
struct ProductRow {
    supplier_tag: String,
    supplier_product_id: String,
    supplier_sku: Option<String>,
    name: String,
    description: Option<String>,
    category_path: Option<String>,
    wholesale_price: i64,
    retail_price: Option<i64>,
    discount_percent: Option<i16>,
    stock_quantity: i32,
    in_stock: bool,
    main_image_url: Option<String>,
    additional_image_urls: serde_json::Value,
    options: serde_json::Value,
    variants: serde_json::Value,
    shipping: serde_json::Value,
    raw: serde_json::Value,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_canonical(self) -> Result<CanonicalProduct, StoreError> {
        Ok(CanonicalProduct {
            supplier_tag: self.supplier_tag,
            supplier_product_id: self.supplier_product_id,
            supplier_sku: self.supplier_sku,
            name: self.name,
            description: self.description,
            category_path: self.category_path,
            wholesale_price: self.wholesale_price.max(0) as u64,
            retail_price: self.retail_price.map(|p| p.max(0) as u64),
            discount_percent: self.discount_percent.map(|p| p.clamp(0, 100) as u8),
            stock_quantity: self.stock_quantity.max(0) as u32,
            in_stock: self.in_stock,
            main_image_url: self.main_image_url,
            additional_image_urls: serde_json::from_value(self.additional_image_urls).map_err(|e| StoreError::Decode(e.to_string()))?,
            options: serde_json::from_value::<ProductOptions>(self.options).map_err(|e| StoreError::Decode(e.to_string()))?,
            variants: serde_json::from_value::<Vec<ProductVariant>>(self.variants).map_err(|e| StoreError::Decode(e.to_string()))?,
            shipping: serde_json::from_value::<ShippingInfo>(self.shipping).map_err(|e| StoreError::Decode(e.to_string()))?,
            raw: self.raw,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
        })
    }
}

impl Store {
    /// Upsert one product on the natural key. Returns `true` when the row
    /// was newly inserted, `false` when an existing row was updated.
    pub async fn upsert_product(&self, product: &CanonicalProduct) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (
                supplier_tag, supplier_product_id, supplier_sku, name, description,
                category_path, wholesale_price, retail_price, discount_percent,
                stock_quantity, in_stock, main_image_url, additional_image_urls,
                options, variants, shipping, raw, first_seen_at, last_seen_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            ON CONFLICT (supplier_tag, supplier_product_id) DO UPDATE SET
                supplier_sku = EXCLUDED.supplier_sku,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                category_path = EXCLUDED.category_path,
                wholesale_price = EXCLUDED.wholesale_price,
                retail_price = EXCLUDED.retail_price,
                discount_percent = EXCLUDED.discount_percent,
                stock_quantity = EXCLUDED.stock_quantity,
                in_stock = EXCLUDED.in_stock,
                main_image_url = EXCLUDED.main_image_url,
                additional_image_urls = EXCLUDED.additional_image_urls,
                options = EXCLUDED.options,
                variants = EXCLUDED.variants,
                shipping = EXCLUDED.shipping,
                raw = EXCLUDED.raw,
                last_seen_at = EXCLUDED.last_seen_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&product.supplier_tag)
        .bind(&product.supplier_product_id)
        .bind(&product.supplier_sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category_path)
        .bind(product.wholesale_price as i64)
        .bind(product.retail_price.map(|p| p as i64))
        .bind(product.discount_percent.map(|p| p as i16))
        .bind(product.stock_quantity as i32)
        .bind(product.in_stock)
        .bind(&product.main_image_url)
        .bind(serde_json::to_value(&product.additional_image_urls).unwrap_or_default())
        .bind(serde_json::to_value(&product.options).unwrap_or_default())
        .bind(serde_json::to_value(&product.variants).unwrap_or_default())
        .bind(serde_json::to_value(&product.shipping).unwrap_or_default())
        .bind(&product.raw)
        .bind(product.first_seen_at)
        .bind(product.last_seen_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<bool, _>("inserted"))
    }

    /// Upsert `products` in batches of `batch_size`, each batch inside its
    /// own transaction (§4.5 `bulk_upsert`). Each row is nested in its own
    /// savepoint so a single bad record rolls back to the savepoint and is
    /// recorded as a failure rather than aborting the rest of the batch.
    /// Returns `(inserted, updated, failed, errors)`.
    pub async fn bulk_upsert(&self, products: &[CanonicalProduct], batch_size: usize) -> Result<(u64, u64, u64, Vec<String>), StoreError> {
        let mut inserted = 0u64;
        let mut updated = 0u64;
        let mut failed = 0u64;
        let mut errors = Vec::new();
        for chunk in products.chunks(batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;
            for product in chunk {
                let mut savepoint = tx.begin().await?;
                match self.upsert_product_tx(&mut savepoint, product).await {
                    Ok(was_inserted) => {
                        savepoint.commit().await?;
                        if was_inserted {
                            inserted += 1;
                        } else {
                            updated += 1;
                        }
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        failed += 1;
                        errors.push(format!("{}/{}: {e}", product.supplier_tag, product.supplier_product_id));
                    }
                }
            }
            tx.commit().await?;
        }
        Ok((inserted, updated, failed, errors))
    }

    async fn upsert_product_tx(&self, tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, product: &CanonicalProduct) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (
                supplier_tag, supplier_product_id, supplier_sku, name, description,
                category_path, wholesale_price, retail_price, discount_percent,
                stock_quantity, in_stock, main_image_url, additional_image_urls,
                options, variants, shipping, raw, first_seen_at, last_seen_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            ON CONFLICT (supplier_tag, supplier_product_id) DO UPDATE SET
                supplier_sku = EXCLUDED.supplier_sku,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                category_path = EXCLUDED.category_path,
                wholesale_price = EXCLUDED.wholesale_price,
                retail_price = EXCLUDED.retail_price,
                discount_percent = EXCLUDED.discount_percent,
                stock_quantity = EXCLUDED.stock_quantity,
                in_stock = EXCLUDED.in_stock,
                main_image_url = EXCLUDED.main_image_url,
                additional_image_urls = EXCLUDED.additional_image_urls,
                options = EXCLUDED.options,
                variants = EXCLUDED.variants,
                shipping = EXCLUDED.shipping,
                raw = EXCLUDED.raw,
                last_seen_at = EXCLUDED.last_seen_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&product.supplier_tag)
        .bind(&product.supplier_product_id)
        .bind(&product.supplier_sku)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category_path)
        .bind(product.wholesale_price as i64)
        .bind(product.retail_price.map(|p| p as i64))
        .bind(product.discount_percent.map(|p| p as i16))
        .bind(product.stock_quantity as i32)
        .bind(product.in_stock)
        .bind(&product.main_image_url)
        .bind(serde_json::to_value(&product.additional_image_urls).unwrap_or_default())
        .bind(serde_json::to_value(&product.options).unwrap_or_default())
        .bind(serde_json::to_value(&product.variants).unwrap_or_default())
        .bind(serde_json::to_value(&product.shipping).unwrap_or_default())
        .bind(&product.raw)
        .bind(product.first_seen_at)
        .bind(product.last_seen_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.get::<bool, _>("inserted"))
    }

    pub async fn list_recent_product_keys(&self, supplier_tag: &str, since: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT supplier_product_id FROM products WHERE supplier_tag = $1 AND last_seen_at >= $2",
        )
        .bind(supplier_tag)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn find_product(&self, supplier_tag: &str, supplier_product_id: &str) -> Result<Option<CanonicalProduct>, StoreError> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT * FROM products WHERE supplier_tag = $1 AND supplier_product_id = $2",
        )
        .bind(supplier_tag)
        .bind(supplier_product_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProductRow::into_canonical).transpose()
    }

    /// Load every product for a supplier (or all suppliers when `None`),
    /// used by the deduplication batch job.
    pub async fn load_products_for_dedup(&self, supplier_tag: Option<&str>) -> Result<Vec<CanonicalProduct>, StoreError> {
        let rows: Vec<ProductRow> = match supplier_tag {
            Some(tag) => sqlx::query_as("SELECT * FROM products WHERE supplier_tag = $1").bind(tag).fetch_all(&self.pool).await?,
            None => sqlx::query_as("SELECT * FROM products").fetch_all(&self.pool).await?,
        };
        rows.into_iter().map(ProductRow::into_canonical).collect()
    }
}
