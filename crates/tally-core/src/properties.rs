// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key/value payload used for event properties and identity traits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A builder for event properties or traits.
///
/// Serializes as a plain JSON object.
///
/// # Example
///
/// ```
/// use tally_core::Properties;
///
/// let props = Properties::new()
///     .insert("plan", "pro")
///     .insert("seats", 12)
///     .insert("trial", false);
/// assert_eq!(props.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	inner: Map<String, Value>,
}

impl Properties {
	/// Creates an empty payload.
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair, replacing any previous value for the key.
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Merges `other` into this payload. Keys in `other` win.
	pub fn merge(mut self, other: Properties) -> Self {
		self.inner.extend(other.inner);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.inner)
	}
}

impl From<Properties> for Value {
	fn from(props: Properties) -> Self {
		props.into_value()
	}
}

/// Non-object values convert to an empty payload.
impl From<Value> for Properties {
	fn from(value: Value) -> Self {
		match value {
			Value::Object(map) => Self { inner: map },
			_ => Self::new(),
		}
	}
}

impl From<Map<String, Value>> for Properties {
	fn from(map: Map<String, Value>) -> Self {
		Self { inner: map }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_insert_mixed_values() {
		let props = Properties::new()
			.insert("plan", "pro")
			.insert("seats", 12)
			.insert("trial", false);

		assert_eq!(props.len(), 3);
		assert_eq!(props.get("plan"), Some(&Value::String("pro".to_string())));
		assert_eq!(props.get("seats"), Some(&Value::Number(12.into())));
		assert_eq!(props.get("trial"), Some(&Value::Bool(false)));
	}

	#[test]
	fn test_merge_prefers_other() {
		let base = Properties::new().insert("a", 1).insert("b", 2);
		let merged = base.merge(Properties::new().insert("b", 20).insert("c", 3));

		assert_eq!(merged.len(), 3);
		assert_eq!(merged.get("b"), Some(&Value::Number(20.into())));
	}

	#[test]
	fn test_serializes_as_plain_object() {
		let props = Properties::new().insert("plan", "pro");
		let json = serde_json::to_string(&props).unwrap();
		assert_eq!(json, r#"{"plan":"pro"}"#);
	}

	#[test]
	fn test_from_non_object_value_is_empty() {
		let props = Properties::from(Value::String("nope".to_string()));
		assert!(props.is_empty());
	}

	proptest! {
		#[test]
		fn len_counts_distinct_keys(keys in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
			let unique: std::collections::HashSet<_> = keys.iter().cloned().collect();
			let props = keys
				.iter()
				.fold(Properties::new(), |props, key| props.insert(key.clone(), "v"));
			prop_assert_eq!(props.len(), unique.len());
		}
	}
}
