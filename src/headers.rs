//! Parsing of the raw mail header block stored with each patch.

use serde_json::{Map, Value};

/// Split an RFC 822 header block into `(name, value)` pairs in order.
///
/// Folded continuation lines (starting with a space or tab) are joined onto
/// the previous header. Parsing stops at the first blank line. Lines that are
/// neither a header nor a continuation are skipped.
pub fn parse_headers(raw: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }

        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim_start());
            }
            continue;
        }

        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                continue;
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }
    }

    headers
}

/// Render headers as a JSON object. A name that appears once maps to its
/// value; a repeated name maps to the list of all its values.
pub fn headers_to_json(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();

    for (name, value) in parse_headers(raw) {
        match map.get_mut(&name) {
            None => {
                map.insert(name, Value::String(value));
            }
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
        }
    }

    map
}
