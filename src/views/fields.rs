//! `?fields=` selection: callers may request a subset of the projected
//! fields. Unknown names are silently ignored (permissive-filter policy);
//! no parameter keeps everything.

use serde_json::Value;
use std::collections::BTreeSet;

/// Parse the comma-separated `fields` parameter. Empty segments and a
/// trailing comma are tolerated; an effectively empty value means
/// "no restriction" and yields `None`.
pub fn parse_fields_param(raw: &str) -> Option<BTreeSet<String>> {
    let set: BTreeSet<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if set.is_empty() { None } else { Some(set) }
}

/// Retain only the requested fields on a JSON object. Requested names that
/// do not exist are not an error.
pub fn select_fields(value: &mut Value, requested: &BTreeSet<String>) {
    if let Value::Object(map) = value {
        map.retain(|key, _| requested.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subset_is_kept_and_rest_dropped() {
        let mut value = json!({ "id": 1, "name": "a", "url": "u" });
        let requested = parse_fields_param("id,url").unwrap();
        select_fields(&mut value, &requested);
        assert_eq!(value, json!({ "id": 1, "url": "u" }));
    }

    #[test]
    fn unknown_names_are_ignored() {
        let mut value = json!({ "id": 1 });
        let requested = parse_fields_param("id,nope").unwrap();
        select_fields(&mut value, &requested);
        assert_eq!(value, json!({ "id": 1 }));
    }

    #[test]
    fn trailing_comma_and_spaces_are_tolerated() {
        let requested = parse_fields_param(" id , name ,").unwrap();
        assert_eq!(requested.len(), 2);
        assert!(requested.contains("id"));
        assert!(requested.contains("name"));
    }

    #[test]
    fn empty_param_means_no_restriction() {
        assert!(parse_fields_param("").is_none());
        assert!(parse_fields_param(" , ,").is_none());
    }
}
