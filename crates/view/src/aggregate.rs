// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use prism_type::{Error, Result, Type, Value};
use serde::{Deserialize, Serialize};

/// Aggregate function applied to one column within a group.
///
/// Every supported aggregate can be recomputed from a group's member rows
/// alone, so a mutation only ever touches the groups it intersects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
	Sum,
	Count,
	Avg,
	Min,
	Max,
	/// Exact distinct count needs unbounded per-group memory; requesting
	/// it fails view construction.
	DistinctCount,
}

impl Aggregate {
	/// Default aggregate for a column: sum for numerics, count otherwise.
	pub fn default_for(ty: Type) -> Aggregate {
		if ty.is_numeric() {
			Aggregate::Sum
		} else {
			Aggregate::Count
		}
	}

	pub fn validate(self, column: &str, ty: Type) -> Result<()> {
		match self {
			Aggregate::DistinctCount => Err(Error::UnsupportedAggregate(format!(
				"distinct count on '{}' cannot be maintained incrementally",
				column
			))),
			Aggregate::Sum | Aggregate::Avg if !ty.is_numeric() => Err(Error::UnsupportedAggregate(
				format!("{:?} requires a numeric column, '{}' is {}", self, column, ty),
			)),
			_ => Ok(()),
		}
	}

	pub fn output_type(self, input: Type) -> Type {
		match self {
			Aggregate::Count => Type::Int8,
			Aggregate::Avg => Type::Float8,
			Aggregate::Sum | Aggregate::Min | Aggregate::Max => input,
			Aggregate::DistinctCount => Type::Int8,
		}
	}

	/// Aggregate the cells of one group. `cells` holds one value per
	/// member row, undefined included.
	pub fn apply(self, input: Type, cells: &[Value]) -> Value {
		match self {
			Aggregate::Count => Value::Int8(cells.len() as i64),
			Aggregate::Sum => sum(input, cells),
			Aggregate::Avg => avg(cells),
			Aggregate::Min => defined(cells).min().cloned().unwrap_or(Value::Undefined),
			Aggregate::Max => defined(cells).max().cloned().unwrap_or(Value::Undefined),
			// Rejected by validate; a group never computes this.
			Aggregate::DistinctCount => Value::Undefined,
		}
	}
}

fn defined(cells: &[Value]) -> impl Iterator<Item = &Value> {
	cells.iter().filter(|cell| !cell.is_undefined())
}

fn sum(input: Type, cells: &[Value]) -> Value {
	match input {
		Type::Int8 => {
			let mut total = 0i64;
			for cell in defined(cells) {
				if let Value::Int8(v) = cell {
					total += v;
				}
			}
			Value::Int8(total)
		}
		_ => {
			let mut total = 0f64;
			for cell in defined(cells) {
				if let Some(v) = cell.as_f64() {
					total += v;
				}
			}
			Value::float8(total)
		}
	}
}

fn avg(cells: &[Value]) -> Value {
	let mut total = 0f64;
	let mut count = 0usize;
	for cell in defined(cells) {
		if let Some(v) = cell.as_f64() {
			total += v;
			count += 1;
		}
	}
	if count == 0 {
		Value::Undefined
	} else {
		Value::float8(total / count as f64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sum_skips_undefined() {
		let cells = vec![Value::Int8(1), Value::Undefined, Value::Int8(2)];
		assert_eq!(Aggregate::Sum.apply(Type::Int8, &cells), Value::Int8(3));
	}

	#[test]
	fn test_count_counts_rows() {
		let cells = vec![Value::Undefined, Value::utf8("a")];
		assert_eq!(Aggregate::Count.apply(Type::Utf8, &cells), Value::Int8(2));
	}

	#[test]
	fn test_avg_of_nothing_is_undefined() {
		assert_eq!(Aggregate::Avg.apply(Type::Float8, &[Value::Undefined]), Value::Undefined);
	}

	#[test]
	fn test_min_max() {
		let cells = vec![Value::float8(2.0), Value::float8(-1.0), Value::Undefined];
		assert_eq!(Aggregate::Min.apply(Type::Float8, &cells), Value::float8(-1.0));
		assert_eq!(Aggregate::Max.apply(Type::Float8, &cells), Value::float8(2.0));
	}

	#[test]
	fn test_distinct_count_rejected() {
		let err = Aggregate::DistinctCount.validate("name", Type::Utf8).unwrap_err();
		assert!(matches!(err, Error::UnsupportedAggregate(_)));
	}

	#[test]
	fn test_sum_requires_numeric() {
		let err = Aggregate::Sum.validate("name", Type::Utf8).unwrap_err();
		assert!(matches!(err, Error::UnsupportedAggregate(_)));
	}

	#[test]
	fn test_default_aggregates() {
		assert_eq!(Aggregate::default_for(Type::Float8), Aggregate::Sum);
		assert_eq!(Aggregate::default_for(Type::Utf8), Aggregate::Count);
	}
}
