use std::collections::HashMap;

/// Character n-grams over `[2, 4]`, word-boundary padded (`char_wb`
/// behavior from `TfidfVectorizer(analyzer='char_wb', ngram_range=(2,4))`):
/// each whitespace-delimited word is padded with a single leading/trailing
/// space before n-grams are taken, so n-grams never cross word boundaries.
pub fn char_ngrams(text: &str) -> Vec<String> {
    let mut grams = Vec::new();
    for word in text.split_whitespace() {
        let padded = format!(" {word} ");
        let chars: Vec<char> = padded.chars().collect();
        for n in 2..=4usize {
            if chars.len() < n {
                continue;
            }
            for window in chars.windows(n) {
                grams.push(window.iter().collect());
            }
        }
    }
    grams
}

/// Term-frequency map for one document's n-grams.
pub fn term_frequencies(grams: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for gram in grams {
        *counts.entry(gram.as_str()).or_insert(0.0) += 1.0;
    }
    let total: f64 = counts.values().sum();
    if total > 0.0 {
        for v in counts.values_mut() {
            *v /= total;
        }
    }
    counts
}
