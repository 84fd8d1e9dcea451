use std::collections::HashMap;

use crate::ngram::{char_ngrams, term_frequencies};

/// A TF-IDF vectorizer fit over one partition's document set, mirroring
/// `sklearn.feature_extraction.text.TfidfVectorizer(analyzer='char_wb',
/// ngram_range=(2,4))`: idf is computed once over the whole partition,
/// then every document is weighted against it.
pub struct Vectorizer {
    idf: HashMap<String, f64>,
    doc_count: usize,
}

pub type Vector = HashMap<String, f64>;

impl Vectorizer {
    pub fn fit(documents: &[String]) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let grams = char_ngrams(doc);
            let mut seen = std::collections::HashSet::new();
            for gram in grams {
                if seen.insert(gram.clone()) {
                    *doc_freq.entry(gram).or_insert(0) += 1;
                }
            }
        }
        let doc_count = documents.len().max(1);
        let idf = doc_freq
            .into_iter()
            .map(|(gram, df)| {
                // smoothed idf, always positive: ln((1+N)/(1+df)) + 1
                let weight = ((1.0 + doc_count as f64) / (1.0 + df as f64)).ln() + 1.0;
                (gram, weight)
            })
            .collect();
        Self { idf, doc_count }
    }

    pub fn vectorize(&self, document: &str) -> Vector {
        let grams = char_ngrams(document);
        let tf = term_frequencies(&grams);
        tf.into_iter()
            .filter_map(|(gram, freq)| self.idf.get(gram).map(|idf| (gram.to_string(), freq * idf)))
            .collect()
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }
}

/// Cosine similarity between two sparse TF-IDF vectors.
pub fn cosine_similarity(a: &Vector, b: &Vector) -> f64 {
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = smaller.iter().filter_map(|(k, v)| larger.get(k).map(|v2| v * v2)).sum();
    let norm_a = (a.values().map(|v| v * v).sum::<f64>()).sqrt();
    let norm_b = (b.values().map(|v| v * v).sum::<f64>()).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_close_to_one() {
        let v = Vectorizer::fit(&["Wireless Mouse Pro".to_string(), "USB Cable".to_string()]);
        let a = v.vectorize("Wireless Mouse Pro");
        let b = v.vectorize("Wireless Mouse Pro");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dissimilar_names_score_low() {
        let v = Vectorizer::fit(&["Wireless Mouse Pro".to_string(), "USB Cable".to_string()]);
        let a = v.vectorize("Wireless Mouse Pro");
        let b = v.vectorize("USB Cable");
        assert!(cosine_similarity(&a, &b) < 0.3);
    }
}
