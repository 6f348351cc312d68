use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::warn;

/// Reference to the source object named by an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub name: String,
}

/// Fields recovered by a single extraction strategy
#[derive(Debug, Default)]
struct PartialRef {
    bucket: Option<String>,
    name: Option<String>,
}

impl PartialRef {
    /// Fill fields still missing from `other`; earlier strategies win per field
    fn or(mut self, other: PartialRef) -> PartialRef {
        if self.bucket.is_none() {
            self.bucket = other.bucket;
        }
        if self.name.is_none() {
            self.name = other.name;
        }
        self
    }

    fn complete(self) -> Option<ObjectRef> {
        match (self.bucket, self.name) {
            (Some(bucket), Some(name)) => Some(ObjectRef { bucket, name }),
            _ => None,
        }
    }
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Top-level `bucket`/`name` fields (flat notification shape)
fn from_top_level(payload: &Value) -> PartialRef {
    PartialRef {
        bucket: non_empty_str(payload, "bucket"),
        name: non_empty_str(payload, "name"),
    }
}

/// `bucket`/`name` under a nested `data` object (CloudEvent shape)
fn from_nested_data(payload: &Value) -> PartialRef {
    match payload.get("data") {
        Some(data) if data.is_object() => PartialRef {
            bucket: non_empty_str(data, "bucket"),
            name: non_empty_str(data, "name"),
        },
        _ => PartialRef::default(),
    }
}

/// `data` as a base64-encoded JSON string (push-delivery shape).
/// Decode failures are logged and treated as "nothing found" so the
/// remaining strategies and the final validation still run.
fn from_base64_data(payload: &Value) -> PartialRef {
    let Some(encoded) = payload.get("data").and_then(Value::as_str) else {
        return PartialRef::default();
    };

    let decoded = match BASE64.decode(encoded) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "event data field is not valid base64");
            return PartialRef::default();
        }
    };

    match serde_json::from_slice::<Value>(&decoded) {
        Ok(inner) => PartialRef {
            bucket: non_empty_str(&inner, "bucket"),
            name: non_empty_str(&inner, "name"),
        },
        Err(e) => {
            warn!(error = %e, "base64 event data is not valid JSON");
            PartialRef::default()
        }
    }
}

/// Decode the source object reference from an inbound event payload.
///
/// Strategies are tried in order; per field the first non-empty value wins,
/// so a nested `data` value never overrides a present top-level value.
pub fn decode_object_ref(payload: &Value) -> Option<ObjectRef> {
    let strategies = [from_top_level, from_nested_data, from_base64_data];

    strategies
        .into_iter()
        .fold(PartialRef::default(), |acc, strategy| acc.or(strategy(payload)))
        .complete()
}
