/// One `start-end` entry from a `Range` header, each side optional:
/// `(Some(s), Some(e))` = explicit range, `(Some(s), None)` = "from s to EOF",
/// `(None, Some(n))` = "last n bytes", `(None, None)` = unparsable half (kept as an empty pair
/// rather than dropped, preserving sequence order per the spec).
pub type ContentRange = (Option<u64>, Option<u64>);

/// Parses a `Range` header value such as `bytes=0-499`, `bytes=-500`, `bytes=500-`, or a
/// comma-separated list of those. Returns an empty vector if the value doesn't match the
/// `bytes=` grammar at all. Mirrors `original_source/Http.cpp::ParseRange`, rewritten as a
/// straight-line tokenizer instead of a regex per the spec's resolved parsing-strategy question.
pub fn parse(field: &str) -> Vec<ContentRange> {
    let field = field.trim();
    let Some(rest) = field.strip_prefix("bytes") else {
        return Vec::new();
    };
    let rest = rest.trim_start();
    let Some(rest) = rest.strip_prefix('=') else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    for part in rest.split(',') {
        let part = part.trim();
        let Some(dash) = part.find('-') else {
            return Vec::new();
        };
        let (start_str, end_str) = (part[..dash].trim(), part[dash + 1..].trim());

        let start = if start_str.is_empty() {
            None
        } else {
            match start_str.parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => return Vec::new(),
            }
        };
        let end = if end_str.is_empty() {
            None
        } else {
            match end_str.parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => return Vec::new(),
            }
        };

        ranges.push((start, end));
    }

    ranges
}
