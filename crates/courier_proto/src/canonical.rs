//! Canonical JSON used as the signature input.
//!
//! Rules (all clients must agree byte-for-byte):
//! - object keys sorted by code point, recursively;
//! - any object member whose value is `null` is omitted, at every depth;
//! - array elements keep their original order;
//! - no whitespace between tokens;
//! - strings and numbers use standard JSON escaping/format.
//!
//! Sorting is done here explicitly rather than relying on `serde_json::Map`
//! ordering, which flips to insertion order under `preserve_order`.

use serde_json::Value;

pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_value(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        // Scalars: serde_json's compact Display is already canonical.
        scalar => out.push_str(&scalar.to_string()),
    }
}
