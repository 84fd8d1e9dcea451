use sqlx::FromRow;
use wholesale_common::types::{DuplicateGroup, DuplicateMember, MatchReason};

use crate::error::StoreError;
use crate::Store;

#[derive(FromRow)]
struct GroupRow {
    group_id: uuid::Uuid,
    representative_supplier_tag: String,
    representative_supplier_product_id: String,
    members: serde_json::Value,
    method: String,
    threshold: f64,
    best_deal_supplier_tag: String,
    best_deal_supplier_product_id: String,
    potential_savings: i64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedMember {
    supplier_tag: String,
    supplier_product_id: String,
    similarity: f64,
    match_reason: MatchReason,
}

impl Store {
    pub async fn replace_duplicate_groups(&self, groups: &[DuplicateGroup]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM duplicate_groups").execute(&mut *tx).await?;
        for group in groups {
            let members: Vec<SerializedMember> = group
                .members
                .iter()
                .map(|m| SerializedMember {
                    supplier_tag: m.product_key.0.clone(),
                    supplier_product_id: m.product_key.1.clone(),
                    similarity: m.similarity,
                    match_reason: m.match_reason,
                })
                .collect();
            sqlx::query(
                r#"
                INSERT INTO duplicate_groups (
                    group_id, representative_supplier_tag, representative_supplier_product_id,
                    members, method, threshold, best_deal_supplier_tag,
                    best_deal_supplier_product_id, potential_savings
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
                "#,
            )
            .bind(group.group_id)
            .bind(&group.representative_product_key.0)
            .bind(&group.representative_product_key.1)
            .bind(serde_json::to_value(&members).unwrap_or_default())
            .bind(&group.method)
            .bind(group.threshold)
            .bind(&group.best_deal_key.0)
            .bind(&group.best_deal_key.1)
            .bind(group.potential_savings as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_duplicate_groups(&self) -> Result<Vec<DuplicateGroup>, StoreError> {
        let rows: Vec<GroupRow> = sqlx::query_as("SELECT * FROM duplicate_groups").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let members: Vec<SerializedMember> =
                    serde_json::from_value(row.members).map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(DuplicateGroup {
                    group_id: row.group_id,
                    representative_product_key: (row.representative_supplier_tag, row.representative_supplier_product_id),
                    members: members
                        .into_iter()
                        .map(|m| DuplicateMember {
                            product_key: (m.supplier_tag, m.supplier_product_id),
                            similarity: m.similarity,
                            match_reason: m.match_reason,
                        })
                        .collect(),
                    method: row.method,
                    threshold: row.threshold,
                    best_deal_key: (row.best_deal_supplier_tag, row.best_deal_supplier_product_id),
                    potential_savings: row.potential_savings.max(0) as u64,
                })
            })
            .collect()
    }
}
