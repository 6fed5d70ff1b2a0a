//! Canonical JSON rendering with recursively sorted object keys.
//!
//! Used wherever a JSON value participates in identity (variables keys,
//! field argument keys, composite entity ids) so the rendering does not depend
//! on map insertion order or on serde_json's `preserve_order` feature.

use serde_json::Value as JsonValue;

/// Renders `value` as compact JSON with object keys sorted at every level.
pub fn sorted_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_sorted(&mut out, value);
    out
}

fn write_sorted(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_sorted(out, &map[key]);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_sorted(out, item);
            }
            out.push(']');
        }
        JsonValue::String(s) => write_string(out, s),
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(out: &mut String, value: &str) {
    // serde_json's Display for a string value emits the escaped literal.
    out.push_str(&JsonValue::from(value).to_string());
}
