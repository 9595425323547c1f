use serde_json::Value;

// Anti-hijacking prefixes some endpoints put in front of JSON bodies
const JSON_PREFIXES: &[&str] = &[")]}'", "while(1);", "for(;;);"];

/// Parses a JSON body, retrying once on failure.
///
/// A body that is itself a JSON string (double-encoded payload) is re-parsed.
/// A body that fails to parse is cleaned of BOM, prefixes and trailing
/// separators and parsed one more time; after that it is abandoned.
pub fn parse_lenient(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::String(inner)) => serde_json::from_str(&inner).ok(),
        Ok(value) => Some(value),
        Err(_) => {
            let mut cleaned = text.trim().trim_start_matches('\u{feff}');
            for prefix in JSON_PREFIXES {
                cleaned = cleaned.strip_prefix(prefix).unwrap_or(cleaned);
            }
            let cleaned = cleaned.trim().trim_end_matches(';');
            match serde_json::from_str::<Value>(cleaned).ok()? {
                Value::String(inner) => serde_json::from_str(&inner).ok(),
                value => Some(value),
            }
        }
    }
}

/// Integer view of a JSON value: integral numbers and all-digit strings.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                s.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Follows a dotted path of object keys.
pub fn at_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn double_encoded_body_is_reparsed() {
        let body = serde_json::to_string(&json!({"a": 1}).to_string()).unwrap();
        assert_eq!(parse_lenient(&body), Some(json!({"a": 1})));
    }

    #[test]
    fn prefixed_body_is_retried_once() {
        assert_eq!(parse_lenient(")]}'\n{\"a\": 2}"), Some(json!({"a": 2})));
        assert_eq!(parse_lenient("not json at all"), None);
    }

    #[test]
    fn integers_from_numbers_and_digit_strings() {
        assert_eq!(as_integer(&json!(13)), Some(13));
        assert_eq!(as_integer(&json!(13.0)), Some(13));
        assert_eq!(as_integer(&json!("218")), Some(218));
        assert_eq!(as_integer(&json!("21a")), None);
        assert_eq!(as_integer(&json!(1.5)), None);
        assert_eq!(as_integer(&json!(true)), None);
    }

    #[test]
    fn path_lookup() {
        let v = json!({"props": {"pageProps": {"areaId": 5}}});
        assert_eq!(at_path(&v, &["props", "pageProps", "areaId"]), Some(&json!(5)));
        assert_eq!(at_path(&v, &["props", "missing"]), None);
    }
}
