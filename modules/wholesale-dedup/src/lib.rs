//! Deduplicator (spec §4.6): partition by category, score candidate pairs
//! by name similarity / keyword overlap / exact SKU match, union-find the
//! matches into groups. Grounded in `duplicate_finder.py`'s layered
//! `find_duplicates` (name similarity + keyword + model/SKU, merged and
//! rescored) generalized from "candidates for one product" to "groups
//! over the whole catalog".

mod ngram;
mod tfidf;
mod union_find;

use std::collections::{HashMap, HashSet};

use uuid::Uuid;
use wholesale_common::types::{CanonicalProduct, DuplicateGroup, DuplicateMember, MatchReason, SupplierTag};

use tfidf::{cosine_similarity, Vectorizer};
use union_find::UnionFind;

pub const DEFAULT_THRESHOLD: f64 = 0.7;
const KEYWORD_JACCARD_THRESHOLD: f64 = 0.6;
const EXACT_MATCH_BASE_SCORE: f64 = 0.9;

/// Particles dropped from keyword extraction, the same set
/// `duplicate_finder.py._extract_keywords` filters out.
const STOPWORDS: &[&str] = &["은", "는", "이", "가", "을", "를", "의", "에", "와", "과", "도", "로", "으로", "만", "라", "하"];

/// Lowercase, collapse to alphanumeric/whitespace only, and squash runs of
/// whitespace, mirroring `duplicate_finder.py._preprocess_name`. Applied
/// before both TF-IDF vectorization and keyword extraction so `"Wireless
/// Mouse"` and `"wireless mouse"` produce identical tokens.
fn preprocess_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered.chars().map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' }).collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One scored candidate match between two products, prior to grouping.
struct Candidate {
    a: usize,
    b: usize,
    score: f64,
    reason: MatchReason,
}

/// Find duplicate groups across `products`, using the caller-supplied
/// `threshold` for name-similarity matches (§4.6 default `0.7`).
pub fn find_duplicate_groups(products: &[CanonicalProduct], threshold: f64) -> Vec<DuplicateGroup> {
    let partitions = partition_by_category(products);
    let mut candidates = Vec::new();

    for indices in partitions.values() {
        if indices.len() < 2 {
            continue;
        }
        let names: Vec<String> = indices.iter().map(|&i| preprocess_name(&products[i].name)).collect();
        let vectorizer = Vectorizer::fit(&names);
        let vectors: Vec<_> = names.iter().map(|n| vectorizer.vectorize(n)).collect();
        let keyword_sets: Vec<HashSet<String>> = names.iter().map(|n| keywords_of(n)).collect();

        for (pi, &i) in indices.iter().enumerate() {
            for (pj, &j) in indices.iter().enumerate().skip(pi + 1) {
                if let Some(candidate) = score_pair(products, i, j, &vectors[pi], &vectors[pj], &keyword_sets[pi], &keyword_sets[pj], threshold) {
                    candidates.push(candidate);
                }
            }
        }
    }

    tracing::debug!(candidate_count = candidates.len(), "scored duplicate candidates");
    group_candidates(products, candidates, threshold)
}

fn partition_by_category(products: &[CanonicalProduct]) -> HashMap<String, Vec<usize>> {
    let mut partitions: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, p) in products.iter().enumerate() {
        let key = p.category_path.clone().unwrap_or_else(|| "uncategorized".to_string());
        partitions.entry(key).or_default().push(i);
    }
    partitions
}

fn keywords_of(name: &str) -> HashSet<String> {
    preprocess_name(name)
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

#[allow(clippy::too_many_arguments)]
fn score_pair(
    products: &[CanonicalProduct],
    i: usize,
    j: usize,
    vec_i: &tfidf::Vector,
    vec_j: &tfidf::Vector,
    keywords_i: &HashSet<String>,
    keywords_j: &HashSet<String>,
    threshold: f64,
) -> Option<Candidate> {
    let name_similarity = cosine_similarity(vec_i, vec_j);

    let exact_match = matches!(
        (&products[i].supplier_sku, &products[j].supplier_sku),
        (Some(a), Some(b)) if !a.is_empty() && a == b
    );
    if exact_match {
        let score = (EXACT_MATCH_BASE_SCORE + name_similarity * 0.1).min(1.0);
        return Some(Candidate { a: i, b: j, score, reason: MatchReason::Sku });
    }

    if name_similarity >= threshold {
        return Some(Candidate { a: i, b: j, score: name_similarity, reason: MatchReason::Name });
    }

    let keyword_overlap = jaccard(keywords_i, keywords_j);
    if keyword_overlap >= KEYWORD_JACCARD_THRESHOLD {
        return Some(Candidate { a: i, b: j, score: keyword_overlap, reason: MatchReason::Keywords });
    }

    None
}

fn group_candidates(products: &[CanonicalProduct], candidates: Vec<Candidate>, threshold: f64) -> Vec<DuplicateGroup> {
    let mut uf = UnionFind::new(products.len());
    // Keep the strongest-scoring reason observed for each pair's edge, to
    // attribute a sensible `match_reason` to each member once grouped.
    let mut best_reason: HashMap<(usize, usize), (f64, MatchReason)> = HashMap::new();
    for c in &candidates {
        uf.union(c.a, c.b);
        let key = (c.a.min(c.b), c.a.max(c.b));
        best_reason
            .entry(key)
            .and_modify(|(score, reason)| {
                if c.score > *score {
                    *score = c.score;
                    *reason = c.reason;
                }
            })
            .or_insert((c.score, c.reason));
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..products.len() {
        let root = uf.find(i);
        clusters.entry(root).or_default().push(i);
    }

    clusters
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| build_group(products, &members, &best_reason, threshold))
        .collect()
}

fn build_group(
    products: &[CanonicalProduct],
    members: &[usize],
    best_reason: &HashMap<(usize, usize), (f64, MatchReason)>,
    threshold: f64,
) -> DuplicateGroup {
    let best_deal_idx = *members
        .iter()
        .min_by_key(|&&i| products[i].wholesale_price)
        .expect("non-empty cluster");
    let representative_idx = members[0];
    let max_price = members.iter().map(|&i| products[i].wholesale_price).max().unwrap_or(0);
    let min_price = products[best_deal_idx].wholesale_price;

    let duplicate_members = members
        .iter()
        .map(|&i| {
            let key = (representative_idx.min(i), representative_idx.max(i));
            let (score, reason) = best_reason.get(&key).copied().unwrap_or((1.0, MatchReason::Name));
            DuplicateMember {
                product_key: key_of(&products[i]),
                similarity: if i == representative_idx { 1.0 } else { score },
                match_reason: reason,
            }
        })
        .collect();

    DuplicateGroup {
        group_id: Uuid::new_v4(),
        representative_product_key: key_of(&products[representative_idx]),
        members: duplicate_members,
        method: "char_ngram_tfidf_cosine".to_string(),
        threshold,
        best_deal_key: key_of(&products[best_deal_idx]),
        potential_savings: max_price.saturating_sub(min_price),
    }
}

fn key_of(p: &CanonicalProduct) -> (SupplierTag, String) {
    p.natural_key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wholesale_common::types::{ProductOptions, ShippingInfo};

    fn product(id: &str, name: &str, category: &str, price: u64, sku: Option<&str>) -> CanonicalProduct {
        CanonicalProduct {
            supplier_tag: "zentrade".to_string(),
            supplier_product_id: id.to_string(),
            supplier_sku: sku.map(str::to_string),
            name: name.to_string(),
            description: None,
            category_path: Some(category.to_string()),
            wholesale_price: price,
            retail_price: None,
            discount_percent: None,
            stock_quantity: 1,
            in_stock: true,
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
    fn groups_near_identical_names_in_same_category() {
        let products = vec![
            product("1", "Wireless Bluetooth Mouse", "Electronics > Mice", 8000, None),
            product("2", "Wireless Bluetooth Mouse Pro", "Electronics > Mice", 7500, None),
            product("3", "USB-C Charging Cable", "Electronics > Cables", 3000, None),
        ];
        let groups = find_duplicate_groups(&products, DEFAULT_THRESHOLD);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[0].best_deal_key.1, "2");
        assert_eq!(groups[0].potential_savings, 500);
    }

    #[test]
    fn case_and_punctuation_differences_still_group() {
        let products = vec![
            product("1", "Wireless Mouse!!", "Electronics > Mice", 8000, None),
            product("2", "wireless   mouse", "Electronics > Mice", 7900, None),
        ];
        let groups = find_duplicate_groups(&products, DEFAULT_THRESHOLD);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn different_categories_never_grouped() {
        let products = vec![
            product("1", "Wireless Mouse", "Electronics > Mice", 8000, None),
            product("2", "Wireless Mouse", "Home > Kitchen", 8000, None),
        ];
        assert!(find_duplicate_groups(&products, DEFAULT_THRESHOLD).is_empty());
    }

    #[test]
    fn exact_sku_match_groups_regardless_of_name_drift() {
        let products = vec![
            product("1", "Bluetooth Speaker v1", "Audio", 5000, Some("SKU-123")),
            product("2", "Completely Different Listing Title", "Audio", 4800, Some("SKU-123")),
        ];
        let groups = find_duplicate_groups(&products, DEFAULT_THRESHOLD);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members[0].match_reason, MatchReason::Sku);
    }
}
