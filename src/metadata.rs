use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cell::CellValue;

/// Flat key → value record describing a notebook entry, in insertion order.
pub type MetadataRecord = IndexMap<String, CellValue>;

const ENTRY_FIELDS: &[&str] = &[
    "id",
    "title",
    "date",
    "elabid",
    "created_at",
    "modified_at",
    "status_title",
    "tags",
    "fullname",
    "userid",
    "locked",
    "lockedby",
    "locked_at",
    "orcid",
];

/// Build a record from a notebook entry document.
///
/// Known entry fields are copied when present and not null. `experimentType`
/// comes from the entry's `metadata.extra_fields`, which is stored either as a
/// JSON string or as an object.
pub fn from_entry(entry: &Value) -> MetadataRecord {
    let mut record = MetadataRecord::new();

    for field in ENTRY_FIELDS {
        if let Some(value) = entry.get(*field).and_then(json_to_cell) {
            record.insert(field.to_string(), value);
        }
    }

    match experiment_type(entry) {
        Some(kind) => {
            debug!(experiment_type = %kind, "identified experiment type");
            record.insert("experimentType".to_string(), CellValue::Text(kind));
        }
        None => warn!("entry carries no metadata, experiment type unknown"),
    }

    record
}

/// Body text of a notebook entry, if any.
pub fn entry_body(entry: &Value) -> Option<&str> {
    entry.get("body").and_then(Value::as_str)
}

fn experiment_type(entry: &Value) -> Option<String> {
    let meta = match entry.get("metadata")? {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "entry metadata is not valid JSON");
                return None;
            }
        },
        Value::Null => return None,
        other => other.clone(),
    };

    let kind = meta
        .pointer("/extra_fields/experimentType/value")
        .and_then(Value::as_str)
        .map_or_else(|| "unknown".to_string(), str::to_string);
    Some(kind)
}

fn json_to_cell(value: &Value) -> Option<CellValue> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(CellValue::Text(s.clone())),
        Value::Number(n) => n.as_f64().map(CellValue::Number),
        Value::Bool(b) => Some(CellValue::Text(b.to_string())),
        other => Some(CellValue::Text(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copies_known_fields() {
        let entry = json!({
            "id": 1234,
            "title": "Permeability PES-30",
            "date": "2024-03-01",
            "locked": false,
            "tags": null,
            "body": "<p>ignored</p>",
            "metadata": null,
        });
        let record = from_entry(&entry);
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "title", "date", "locked"]);
        assert_eq!(record["id"], CellValue::Number(1234.0));
        assert_eq!(record["locked"], CellValue::text("false"));
    }

    #[test]
    fn experiment_type_from_string_metadata() {
        let entry = json!({
            "id": 1,
            "metadata": "{\"extra_fields\": {\"experimentType\": {\"value\": \"filtration\"}}}",
        });
        let record = from_entry(&entry);
        assert_eq!(record["experimentType"], CellValue::text("filtration"));
    }

    #[test]
    fn experiment_type_defaults_to_unknown() {
        let entry = json!({ "id": 1, "metadata": { "extra_fields": {} } });
        assert_eq!(from_entry(&entry)["experimentType"], CellValue::text("unknown"));

        let entry = json!({ "id": 1 });
        assert!(from_entry(&entry).get("experimentType").is_none());
    }

    #[test]
    fn body_lookup() {
        assert_eq!(entry_body(&json!({ "body": "| a | b |" })), Some("| a | b |"));
        assert_eq!(entry_body(&json!({})), None);
    }
}
