//! Input scrubbing applied by the request pipeline before any handler runs.

use serde_json::Value;

/// A key MongoDB would read as an operator or a dotted path.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Same test for query parameter names, which may carry bracket syntax such
/// as `author[$ne]`.
pub fn is_operator_param(name: &str) -> bool {
    is_operator_key(name) || name.contains("[$")
}

/// Drops operator keys at any depth. Returns the removed keys.
pub fn strip_operator_keys(value: &mut Value) -> Vec<String> {
    let mut removed = Vec::new();
    strip_into(value, &mut removed);
    removed
}

fn strip_into(value: &mut Value, removed: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| {
                let keep = !is_operator_key(key);
                if !keep {
                    removed.push(key.clone());
                }
                keep
            });
            for child in map.values_mut() {
                strip_into(child, removed);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_into(item, removed);
            }
        }
        _ => {}
    }
}

pub fn escape_html(input: &str) -> String {
    if !input.contains(['<', '>']) {
        return input.to_string();
    }
    input.replace('<', "&lt;").replace('>', "&gt;")
}

/// Escapes every string value at any depth. Keys are left alone.
pub fn escape_html_values(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains(['<', '>']) {
                *s = escape_html(s);
            }
        }
        Value::Object(map) => map.values_mut().for_each(escape_html_values),
        Value::Array(items) => items.iter_mut().for_each(escape_html_values),
        _ => {}
    }
}

/// Keeps the last value of a repeated parameter, at the position where the
/// name first appeared. Returns the names that were repeated.
pub fn collapse_repeated(pairs: &mut Vec<(String, String)>) -> Vec<String> {
    let mut collapsed: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut repeated = Vec::new();

    for (name, value) in pairs.drain(..) {
        match collapsed.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                if !repeated.contains(&name) {
                    repeated.push(name);
                }
                slot.1 = value;
            }
            None => collapsed.push((name, value)),
        }
    }

    *pairs = collapsed;
    repeated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_nested_operators() {
        let mut body = json!({
            "email": {"$gt": ""},
            "$where": "sleep(1000)",
            "profile.admin": true,
            "tags": [{"$ne": 1, "name": "rust"}],
            "title": "ok"
        });

        let removed = strip_operator_keys(&mut body);

        assert_eq!(body, json!({"email": {}, "tags": [{"name": "rust"}], "title": "ok"}));
        assert_eq!(removed.len(), 4);
    }

    #[test]
    fn operator_params() {
        assert!(is_operator_param("author[$ne]"));
        assert!(is_operator_param("$where"));
        assert!(is_operator_param("a.b"));
        assert!(!is_operator_param("author"));
    }

    #[test]
    fn escapes_string_values_only() {
        let mut body = json!({
            "<b>": "<script>alert(1)</script>",
            "nested": ["a > b", 3, null]
        });
        escape_html_values(&mut body);
        assert_eq!(
            body,
            json!({
                "<b>": "&lt;script&gt;alert(1)&lt;/script&gt;",
                "nested": ["a &gt; b", 3, null]
            })
        );
    }

    #[test]
    fn last_repeated_value_wins() {
        let mut pairs = vec![
            ("sort".to_string(), "title".to_string()),
            ("page".to_string(), "1".to_string()),
            ("sort".to_string(), "date".to_string()),
        ];
        let repeated = collapse_repeated(&mut pairs);
        assert_eq!(
            pairs,
            vec![
                ("sort".to_string(), "date".to_string()),
                ("page".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(repeated, vec!["sort".to_string()]);
    }
}
