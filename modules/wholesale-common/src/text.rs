//! Text/number coercion primitives shared by the normalizer and the
//! adapters. Grounded in the original `data_normalizer.py`: strip tags,
//! decode entities, collapse whitespace, clamp numbers.

use std::borrow::Cow;

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static CATEGORY_SEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*[>/\\]\s*").unwrap());
static NON_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d.,-]").unwrap());

/// Strip HTML tags and decode the handful of entities suppliers actually
/// send (`&amp;`, `&lt;`, `&gt;`, `&quot;`, `&#39;`, numeric refs).
pub fn strip_html(input: &str) -> String {
    let no_tags = TAG_RE.replace_all(input, " ");
    decode_entities(&no_tags).into_owned()
}

fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        if let Some(semi) = rest.find(';') {
            let entity = &rest[1..semi];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "#39" | "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix('#')
                    .and_then(|n| n.parse::<u32>().ok())
                    .and_then(char::from_u32),
            };
            match decoded {
                Some(c) => {
                    out.push(c);
                    rest = &rest[semi + 1..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            }
        } else {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Collapse runs of whitespace to a single space and trim the ends.
pub fn collapse_whitespace(input: &str) -> String {
    WHITESPACE_RE.replace_all(input.trim(), " ").into_owned()
}

/// Clean a short text field (name, title): strip tags, collapse whitespace,
/// truncate to `max_chars` on a char boundary.
pub fn clean_field(input: &str, max_chars: usize) -> String {
    let cleaned = collapse_whitespace(&strip_html(input));
    truncate_chars(&cleaned, max_chars)
}

/// Clean a long text field (description): strip tags, limit blank-line
/// runs to two, trim, truncate to `max_bytes`.
pub fn clean_long_field(input: &str, max_bytes: usize) -> String {
    let stripped = strip_html(input);
    let limited = BLANK_LINES_RE.replace_all(&stripped, "\n\n");
    let trimmed = limited.trim();
    truncate_bytes(trimmed, max_bytes)
}

/// Truncate a short identifier-like field to `max_chars` on a char boundary,
/// without the tag-stripping/whitespace-collapsing `clean_field` applies.
pub fn truncate_to(input: &str, max_chars: usize) -> String {
    truncate_chars(input.trim(), max_chars)
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect()
}

fn truncate_bytes(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    input[..end].to_string()
}

/// Rebuild a category path: accept `>`, `/`, `\` as input separators,
/// rejoin non-empty segments with ` > `.
pub fn normalize_category_path(input: &str) -> Option<String> {
    let unified = CATEGORY_SEP_RE.replace_all(input.trim(), " > ");
    let segments: Vec<&str> = unified
        .split('>')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join(" > "))
    }
}

/// Coerce a supplier price string/number into non-negative integer minor
/// currency units: strip non-digit/comma/dot, remove commas, round, clamp.
pub fn normalize_price(input: &str) -> u64 {
    let cleaned = NON_PRICE_RE.replace_all(input, "");
    let no_commas = cleaned.replace(',', "");
    if no_commas.is_empty() {
        return 0;
    }
    match no_commas.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.round() as u64,
        _ => 0,
    }
}

/// Coerce a stock quantity to a non-negative integer.
pub fn normalize_stock(input: i64) -> u32 {
    if input < 0 {
        0
    } else {
        input.min(u32::MAX as i64) as u32
    }
}

const TRUTHY: &[&str] = &["true", "1", "yes", "y", "in_stock", "active"];

/// Coerce a boolean-ish string per the recognized truthy set (§4.3 step 5).
pub fn coerce_bool(input: &str) -> bool {
    TRUTHY.contains(&input.trim().to_lowercase().as_str())
}

/// Validate and normalize an image URL: require scheme + host, rewrite
/// protocol-relative URLs (`//…`) to `https://…`. Returns `None` if invalid.
pub fn normalize_image_url(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let candidate = if let Some(rest) = input.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        input.to_string()
    };
    let url = url::Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(clean_field("<b>Lake  Street</b>\n Church", 500), "Lake Street Church");
    }

    #[test]
    fn truncates_name_to_cap() {
        let long = "x".repeat(600);
        assert_eq!(clean_field(&long, 500).chars().count(), 500);
    }

    #[test]
    fn normalizes_category_path_separators() {
        assert_eq!(
            normalize_category_path("Electronics / Audio \\ Headphones"),
            Some("Electronics > Audio > Headphones".to_string())
        );
    }

    #[test]
    fn normalize_category_path_drops_empty_segments() {
        assert_eq!(normalize_category_path(" > > "), None);
    }

    #[test]
    fn normalizes_price_with_commas_and_currency() {
        assert_eq!(normalize_price("₩12,500"), 12_500);
        assert_eq!(normalize_price(""), 0);
        assert_eq!(normalize_price("-5"), 0);
    }

    #[test]
    fn coerces_bool_truthy_set() {
        assert!(coerce_bool("Y"));
        assert!(coerce_bool("ACTIVE"));
        assert!(!coerce_bool("no"));
    }

    #[test]
    fn validates_and_rewrites_protocol_relative_image_url() {
        assert_eq!(
            normalize_image_url("//cdn.example.com/a.jpg"),
            Some("https://cdn.example.com/a.jpg".to_string())
        );
        assert_eq!(normalize_image_url("not a url"), None);
        assert_eq!(normalize_image_url(""), None);
    }
}
