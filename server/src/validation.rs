//! Command payload/response validation (§4.7). A `CommandInfo` schema is
//! either a JSON-schema document or a struct-shape description; this is
//! the "represent the measured-values schema as data, write a reusable
//! validator that walks the data" re-architecture from Design Notes §9.

use crate::codec;
use serde_json::Value as Json;

pub fn validate_against_schema(schema: &Json, payload: &Json) -> Result<(), String> {
    if is_struct_shape_schema(schema) {
        return validate_against_shape(schema, payload);
    }
    let compiled = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
    let errors: Vec<String> = compiled
        .iter_errors(payload)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// A struct-shape schema is a bare shape string or a list of
/// `[name, type]` pairs (mirrors `CommandInfo.payload_schema`'s
/// `None | str | list[tuple[str, str]]` union in the original source) —
/// distinguished from a JSON-schema document by the absence of a
/// `"type"`/`"properties"`/`"$schema"` key at the top level.
fn is_struct_shape_schema(schema: &Json) -> bool {
    match schema {
        Json::String(_) => true,
        Json::Array(items) => items
            .iter()
            .all(|item| item.as_array().map(|a| a.len() == 2).unwrap_or(false)),
        _ => false,
    }
}

fn validate_against_shape(schema: &Json, payload: &Json) -> Result<(), String> {
    let shape = codec::shape_from_json(schema).map_err(|e| e.to_string())?;
    let bytes = payload
        .as_str()
        .and_then(|s| hex::decode(s).ok())
        .ok_or_else(|| "expected a hex-encoded byte payload for a struct-shape schema".to_string())?;
    if codec::validates_shape(&shape, &bytes) {
        Ok(())
    } else {
        Err("payload does not match declared struct shape".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_schema_payload_is_validated() {
        let schema = json!({ "type": "object", "properties": { "armed": { "type": "boolean" } }, "required": ["armed"] });
        assert!(validate_against_schema(&schema, &json!({ "armed": true })).is_ok());
        assert!(validate_against_schema(&schema, &json!({ "armed": "yes" })).is_err());
    }

    #[test]
    fn struct_shape_payload_is_validated() {
        let schema = json!("f");
        let shape = codec::parse_shape_str("f").unwrap();
        let bytes = codec::encode(&shape, 0.0, &codec::Value::Float(1.0)).unwrap();
        // only fields after the timestamp matter for schema validation.
        let field_bytes = &bytes[8..];
        let payload = json!(hex::encode(field_bytes));
        assert!(validate_against_schema(&schema, &payload).is_ok());
    }
}
