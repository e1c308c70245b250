//! JSON helpers for the mock's patch handling.

use serde_json::{Map, Value};

/// Deep merge `patch` into `base`; objects merge key by key, anything else
/// is replaced.
pub fn merge_json(base: Value, patch: Value) -> Value {
	match (base, patch) {
		(Value::Object(mut base_map), Value::Object(patch_map)) => {
			for (key, patch_value) in patch_map {
				let base_value = base_map.remove(&key).unwrap_or(Value::Null);
				base_map.insert(key, merge_json(base_value, patch_value));
			}
			Value::Object(base_map)
		}
		(_, patch) => patch,
	}
}

/// Drop strategic merge patch directives (`$patch`, `$retainKeys`, ...),
/// which are server instructions rather than object content.
pub fn strip_strategic_merge_directives(value: Value) -> Value {
	match value {
		Value::Object(map) => Value::Object(
			map.into_iter()
				.filter(|(key, _)| !key.starts_with('$'))
				.map(|(key, val)| (key, strip_strategic_merge_directives(val)))
				.collect::<Map<_, _>>(),
		),
		Value::Array(arr) => Value::Array(
			arr.into_iter()
				.map(strip_strategic_merge_directives)
				.collect(),
		),
		other => other,
	}
}
