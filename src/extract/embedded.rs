//! Structured data embedded in page markup.
//!
//! Pages often ship their state as JSON, either in
//! `<script type="application/ld+json">` blocks or as global assignments like
//! `window.__INITIAL_DATA__ = {...};`.
//!
//! Everything here is best effort: a block that fails to parse is skipped and
//! a path that does not resolve is simply "not found".

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Price paths tried after any caller-supplied ones
pub const DEFAULT_PRICE_PATHS: &[&str] = &[
    "$.offers.price",
    "$.price",
    "$.priceSpecification.price",
    "$.offers[0].price",
    "$.rooms[0].price",
    "$.data.price",
];

static WINDOW_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"window\.__\w+__\s*=\s*").expect("window assignment pattern should compile")
});

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Parse a path like `$.data.hotels[*].rooms[0].price`.
///
/// Returns `None` for malformed paths (unclosed or non-numeric brackets).
pub fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let path = path.trim();
    let path = path
        .strip_prefix("$.")
        .or_else(|| path.strip_prefix('$'))
        .unwrap_or(path);

    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(ch) => inner.push(ch),
                        None => return None,
                    }
                }
                let inner = inner.trim();
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    segments.push(Segment::Index(inner.parse().ok()?));
                }
            }
            _ => key.push(c),
        }
    }

    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }

    Some(segments)
}

/// Every value matching `path`, expanding wildcards.
pub fn extract_all<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let Some(segments) = parse_path(path) else {
        debug!("Malformed path: {}", path);
        return Vec::new();
    };

    let mut current = vec![value];
    for segment in &segments {
        let mut next = Vec::new();
        for node in current {
            match segment {
                Segment::Key(key) => {
                    if let Some(child) = node.as_object().and_then(|o| o.get(key)) {
                        next.push(child);
                    }
                }
                Segment::Index(i) => {
                    if let Some(child) = node.as_array().and_then(|a| a.get(*i)) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => {
                    if let Some(items) = node.as_array() {
                        next.extend(items.iter());
                    }
                }
            }
        }
        current = next;
    }

    current
}

/// First value matching `path`.
pub fn extract<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    extract_all(value, path).into_iter().next()
}

/// Parse every embedded JSON block in `markup`, in document order per kind:
/// structured-data scripts first, then window assignments.
pub fn find_blocks(markup: &str) -> Vec<Value> {
    let mut blocks = Vec::new();

    let document = Html::parse_document(markup);
    if let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for script in document.select(&selector) {
            let text = script.text().collect::<String>();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => blocks.push(value),
                Err(e) => debug!("Skipping malformed structured-data block: {}", e),
            }
        }
    }

    for assignment in WINDOW_ASSIGNMENT.find_iter(markup) {
        let rest = &markup[assignment.end()..];
        if !rest.starts_with(['{', '[']) {
            continue;
        }

        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => blocks.push(value),
            Some(Err(e)) => debug!("Skipping malformed window data block: {}", e),
            None => {}
        }
    }

    blocks
}

/// First value for `path` across every embedded block.
pub fn extract_value(markup: &str, path: &str) -> Option<Value> {
    find_blocks(markup)
        .iter()
        .find_map(|block| extract(block, path).cloned())
}

/// Every value for `path` across every embedded block.
pub fn extract_all_values(markup: &str, path: &str) -> Vec<Value> {
    find_blocks(markup)
        .iter()
        .flat_map(|block| extract_all(block, path).into_iter().cloned())
        .collect()
}

/// A price found in embedded data, with the path that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPrice {
    pub value: f64,
    pub path: String,
}

/// Try `paths` then [`DEFAULT_PRICE_PATHS`], returning the first match that
/// coerces to a number.
pub fn extract_price(markup: &str, paths: &[&str]) -> Option<EmbeddedPrice> {
    let blocks = find_blocks(markup);
    if blocks.is_empty() {
        return None;
    }

    for path in paths.iter().chain(DEFAULT_PRICE_PATHS.iter()) {
        let Some(found) = blocks.iter().find_map(|block| extract(block, path)) else {
            continue;
        };

        if let Some(value) = coerce_number(found) {
            debug!("Found embedded price {} at path: {}", value, path);
            return Some(EmbeddedPrice {
                value,
                path: path.to_string(),
            });
        }
    }

    None
}

/// Numbers pass through; strings are stripped to digits and dots.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_loose_number(s),
        _ => None,
    }
}

/// Parse the leading number out of text like `₪ 1,234.50`.
pub fn parse_loose_number(text: &str) -> Option<f64> {
    let cleaned = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>();

    // Stop at a second decimal point
    let end = cleaned
        .match_indices('.')
        .nth(1)
        .map_or(cleaned.len(), |(i, _)| i);

    let number = &cleaned[..end];
    if !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_indexed_path() {
        let data = json!({ "a": { "b": [{ "c": 5 }] } });

        assert_eq!(extract(&data, "a.b[0].c"), Some(&json!(5)));
        assert_eq!(extract(&data, "$.a.b[0].c"), Some(&json!(5)));
        assert_eq!(extract(&data, "a.b[3].c"), None);
        assert_eq!(extract(&data, "a.x.c"), None);
        assert_eq!(extract(&data, "a.b[oops].c"), None);
        assert_eq!(extract(&data, "a.b[0"), None);
    }

    #[test]
    fn test_extract_all_expands_wildcards() {
        let data = json!({ "items": [{ "p": 1 }, { "p": 2 }, { "q": 3 }] });

        let values = extract_all(&data, "items[*].p");
        assert_eq!(values, vec![&json!(1), &json!(2)]);
        assert_eq!(extract(&data, "items[*].p"), Some(&json!(1)));

        let nested = json!({ "hotels": [{ "rooms": [{ "price": 10 }, { "price": 20 }] }, { "rooms": [{ "price": 30 }] }] });
        let prices = extract_all(&nested, "$.hotels[*].rooms[*].price");
        assert_eq!(prices.len(), 3);

        assert!(extract_all(&data, "items.p").is_empty());
    }

    #[test]
    fn test_malformed_block_is_skipped() {
        let markup = r#"
<html><head>
<script type="application/ld+json">{"@type": "Hotel", "offers": {"price": "412.00"}}</script>
<script type="application/ld+json">{"@type": "Hotel", "offers": </script>
</head><body></body></html>
"#;
        let blocks = find_blocks(markup);
        assert_eq!(blocks.len(), 1);

        let price = extract_price(markup, &[]).unwrap();
        assert_eq!(price.value, 412.0);
        assert_eq!(price.path, "$.offers.price");
    }

    #[test]
    fn test_window_assignment_blocks() {
        let markup = r#"
<script>
window.__INITIAL_DATA__ = {"data": {"price": 780, "note": "a }; inside"}};
window.__BROKEN__ = {"data": ;
window.__FLAG__ = true;
</script>
"#;
        let blocks = find_blocks(markup);
        assert_eq!(blocks.len(), 1);
        assert_eq!(extract_value(markup, "data.note"), Some(json!("a }; inside")));
        assert_eq!(extract_price(markup, &[]).map(|p| p.value), Some(780.0));
    }

    #[test]
    fn test_caller_paths_take_precedence() {
        let markup = r#"<script type="application/ld+json">{"price": 100, "deal": {"total": "₪ 1,234.50"}}</script>"#;

        let price = extract_price(markup, &["$.deal.total"]).unwrap();
        assert_eq!(price.value, 1234.5);
        assert_eq!(price.path, "$.deal.total");

        let fallback = extract_price(markup, &["$.missing"]).unwrap();
        assert_eq!(fallback.value, 100.0);
    }

    #[test]
    fn test_non_numeric_values_are_skipped() {
        let markup = r#"<script type="application/ld+json">{"offers": {"price": "call us"}, "price": 95}</script>"#;
        assert_eq!(extract_price(markup, &[]).map(|p| p.value), Some(95.0));

        assert_eq!(extract_price("<html>no data</html>", &[]), None);
        assert_eq!(parse_loose_number("1.2.3"), Some(1.2));
        assert_eq!(parse_loose_number("..."), None);
    }

    #[test]
    fn test_extract_all_values_across_blocks() {
        let markup = r#"
<script type="application/ld+json">{"rooms": [{"price": 1}, {"price": 2}]}</script>
<script type="application/ld+json">{"rooms": [{"price": 3}]}</script>
"#;
        let values = extract_all_values(markup, "rooms[*].price");
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
    }
}
