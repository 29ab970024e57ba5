// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::{
	cmp::Ordering,
	fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

mod ordered_f64;
mod timestamp;
mod r#type;

pub use ordered_f64::OrderedF64;
pub use timestamp::Timestamp;
pub use r#type::Type;

/// A dynamically typed cell value.
///
/// Serializes untagged, so JSON carries plain scalars: `null`, `true`,
/// `1`, `1.5`, `"a"`. Integers deserialize as [`Value::Int8`]; timestamp
/// columns accept them through ingestion coercion.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
	/// Value is not defined (think null in common programming languages)
	Undefined,
	/// A boolean: true or false.
	Boolean(bool),
	/// An 8-byte signed integer
	Int8(i64),
	/// An 8-byte floating point
	Float8(OrderedF64),
	/// A UTF-8 encoded string
	Utf8(String),
	/// Milliseconds since the Unix epoch
	Timestamp(Timestamp),
}

impl Value {
	pub fn float8(value: f64) -> Self {
		Value::Float8(OrderedF64::new(value))
	}

	pub fn utf8(value: impl Into<String>) -> Self {
		Value::Utf8(value.into())
	}

	pub fn get_type(&self) -> Type {
		match self {
			Value::Undefined => Type::Undefined,
			Value::Boolean(_) => Type::Boolean,
			Value::Int8(_) => Type::Int8,
			Value::Float8(_) => Type::Float8,
			Value::Utf8(_) => Type::Utf8,
			Value::Timestamp(_) => Type::Timestamp,
		}
	}

	pub fn is_undefined(&self) -> bool {
		matches!(self, Value::Undefined)
	}

	/// Numeric reading of the value, when it has one.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int8(v) => Some(*v as f64),
			Value::Float8(v) => Some(v.value()),
			_ => None,
		}
	}

	fn type_rank(&self) -> u8 {
		match self {
			Value::Undefined => 0,
			Value::Boolean(_) => 1,
			Value::Int8(_) => 2,
			Value::Float8(_) => 2,
			Value::Utf8(_) => 3,
			Value::Timestamp(_) => 4,
		}
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Value::Undefined, Value::Undefined) => Ordering::Equal,
			(Value::Undefined, _) => Ordering::Less,
			(_, Value::Undefined) => Ordering::Greater,
			(Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
			(Value::Int8(a), Value::Int8(b)) => a.cmp(b),
			(Value::Float8(a), Value::Float8(b)) => a.cmp(b),
			(Value::Int8(a), Value::Float8(b)) => OrderedF64::new(*a as f64).cmp(b),
			(Value::Float8(a), Value::Int8(b)) => a.cmp(&OrderedF64::new(*b as f64)),
			(Value::Utf8(a), Value::Utf8(b)) => a.cmp(b),
			(Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
			(a, b) => a.type_rank().cmp(&b.type_rank()),
		}
	}
}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Undefined => write!(f, "undefined"),
			Value::Boolean(v) => write!(f, "{}", v),
			Value::Int8(v) => write!(f, "{}", v),
			Value::Float8(v) => write!(f, "{}", v),
			Value::Utf8(v) => write!(f, "{}", v),
			Value::Timestamp(v) => write!(f, "{}", v),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Boolean(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int8(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::float8(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::Utf8(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::Utf8(v)
	}
}

impl From<Timestamp> for Value {
	fn from(v: Timestamp) -> Self {
		Value::Timestamp(v)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_undefined_sorts_first() {
		let mut values = vec![Value::Int8(3), Value::Undefined, Value::Int8(1)];
		values.sort();
		assert_eq!(values[0], Value::Undefined);
		assert_eq!(values[1], Value::Int8(1));
	}

	#[test]
	fn test_numeric_cross_comparison() {
		assert!(Value::Int8(2) < Value::float8(2.5));
		assert!(Value::float8(3.5) > Value::Int8(3));
	}

	#[test]
	fn test_get_type() {
		assert_eq!(Value::utf8("a").get_type(), Type::Utf8);
		assert_eq!(Value::float8(1.0).get_type(), Type::Float8);
		assert_eq!(Value::Timestamp(Timestamp(0)).get_type(), Type::Timestamp);
	}

	#[test]
	fn test_float_values_hash_consistently() {
		use std::collections::HashSet;
		let mut set = HashSet::new();
		set.insert(Value::float8(0.0));
		assert!(set.contains(&Value::float8(-0.0)));
	}
}
