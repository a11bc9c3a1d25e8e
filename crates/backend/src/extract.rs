//! Field extraction from loosely-shaped status documents.
//!
//! Job-queue workers put the output image in different places depending
//! on the worker version: a top-level field, or an `output` value that may
//! be one object or a list of objects, each exposing inline base64, a URL,
//! or a `message` that holds the URL. The rules below are tried in a fixed
//! order and the first non-empty string wins.

use serde_json::Value;

/// Inline base64 image, if the document carries one.
///
/// Order: top-level `imageBase64`, then for each `output` item
/// `image_base64` followed by `image`.
pub fn image_base64(doc: &Value) -> Option<String> {
    if let Some(image) = string_field(doc, "imageBase64") {
        return Some(image);
    }
    output_items(doc.get("output"))
        .into_iter()
        .find_map(|item| string_field(item, "image_base64").or_else(|| string_field(item, "image")))
}

/// Remote image URL, if the document carries one.
///
/// Looks at `output` items, or at the document itself when there is no
/// `output`. For each item: a bare string, then `message`, `url`,
/// `image_url`.
pub fn image_url(doc: &Value) -> Option<String> {
    let items = match doc.get("output") {
        None | Some(Value::Null) => vec![doc],
        output => output_items(output),
    };
    items.into_iter().find_map(|item| match item {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => string_field(item, "message")
            .or_else(|| string_field(item, "url"))
            .or_else(|| string_field(item, "image_url")),
    })
}

/// A non-empty string field.
pub fn string_field(doc: &Value, key: &str) -> Option<String> {
    doc.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A numeric field as `f64`; non-numbers are ignored.
pub fn number_field(doc: &Value, key: &str) -> Option<f64> {
    doc.get(key).and_then(Value::as_f64)
}

/// Treat a single value as a one-element list; `null` and missing as empty.
fn output_items(output: Option<&Value>) -> Vec<&Value> {
    match output {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}
