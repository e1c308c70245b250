//! Existence checks over raw resource listings.

use serde_json::Value;

/// Check whether a listing contains a resource named `needle`.
///
/// `haystack` is the raw payload of a list call: an object with an `items`
/// array whose entries carry `metadata.name`. Names are compared exactly.
/// Missing or malformed keys never match, they do not fail the lookup.
pub fn is_needle_in_haystack(needle: &str, haystack: &Value) -> bool {
	haystack
		.get("items")
		.and_then(Value::as_array)
		.is_some_and(|items| {
			items
				.iter()
				.any(|item| item.pointer("/metadata/name").and_then(Value::as_str) == Some(needle))
		})
}
