//! Cache Key Module
//!
//! Deterministic key derivation from a namespace and a parameter object.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::Result;

// == Cache Key ==
/// Fixed-length opaque key: 32 lowercase hex characters of an XXH3-128 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// == Generate Key ==
/// Derives the cache key for `(namespace, params)`.
///
/// `params` is converted to a `serde_json::Value` and every object is rebuilt
/// with its keys sorted, so structurally equal inputs serialize identically
/// no matter the field order they were built in. The namespace is
/// length-prefixed so no `(namespace, params)` pair can spell out another one.
///
/// Fails only if `params` cannot be represented as JSON (for example a map
/// with non-string keys).
pub fn generate_key<P>(namespace: &str, params: &P) -> Result<CacheKey>
where
    P: Serialize + ?Sized,
{
    let canonical = serde_json::to_string(&canonicalize(serde_json::to_value(params)?))?;
    let material = format!("{}:{}:{}", namespace.len(), namespace, canonical);
    Ok(CacheKey(format!("{:032x}", xxh3_128(material.as_bytes()))))
}

/// Sorts object keys at every depth, whichever map backend serde_json uses.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
