//! Canonical serialization and content hashing over [`Feature`](crate::spec::Feature).
//!
//! The hash must be bit-identical regardless of the in-memory field order of
//! the struct it was derived from, and must change for any observable change
//! to a hashed field (including whitespace inside a string). We get this by
//! projecting the feature into a `serde_json::Value` built from `Map`, whose
//! default (non `preserve_order`) backing store is a `BTreeMap` — key order
//! in the serialized output is therefore a structural property, not an
//! artifact of insertion order.

use crate::spec::Feature;
use serde_json::{Map, Value};

/// Build the canonical JSON `Value` for a feature, per the hashing algorithm.
pub fn canonical_value(feature: &Feature) -> Value {
    let mut obj = Map::new();
    obj.insert("id".to_string(), Value::String(feature.id.as_str().to_string()));
    obj.insert("title".to_string(), Value::String(feature.title.clone()));
    obj.insert("desc".to_string(), Value::String(feature.desc.clone()));
    obj.insert("priority".to_string(), Value::String(feature.priority.to_string()));
    obj.insert(
        "success".to_string(),
        Value::Array(feature.success.iter().cloned().map(Value::String).collect()),
    );
    obj.insert(
        "trace".to_string(),
        Value::Array(feature.trace.iter().cloned().map(Value::String).collect()),
    );

    if !feature.api.is_empty() {
        let apis: Vec<Value> = feature
            .api
            .iter()
            .map(|api| {
                let mut entry = Map::new();
                entry.insert("method".to_string(), Value::String(api.method.as_str().to_string()));
                entry.insert("path".to_string(), Value::String(api.path.clone()));
                if let Some(req) = &api.request {
                    if !req.is_empty() {
                        entry.insert("request".to_string(), Value::String(req.clone()));
                    }
                }
                if let Some(resp) = &api.response {
                    if !resp.is_empty() {
                        entry.insert("response".to_string(), Value::String(resp.clone()));
                    }
                }
                Value::Object(entry)
            })
            .collect();
        obj.insert("api".to_string(), Value::Array(apis));
    }

    Value::Object(obj)
}

/// Canonical compact JSON bytes for a feature — the exact input to BLAKE3.
pub fn canonical_bytes(feature: &Feature) -> Vec<u8> {
    // `serde_json::to_vec` on a `Value` backed by a `BTreeMap` emits keys in
    // sorted order at every nesting level, and preserves array order.
    serde_json::to_vec(&canonical_value(feature)).expect("canonical Value is always serializable")
}

/// Hash a feature with BLAKE3, returning 64 lowercase hex characters.
pub fn hash_feature(feature: &Feature) -> String {
    let bytes = canonical_bytes(feature);
    blake3::hash(&bytes).to_hex().to_string()
}
