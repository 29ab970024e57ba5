// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use prism_type::{OrderedF64, Timestamp, Type, Value};

/// A single typed column: one densely packed vector per primitive type,
/// with per-cell definedness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnData {
	Boolean(Vec<Option<bool>>),
	Int8(Vec<Option<i64>>),
	Float8(Vec<Option<OrderedF64>>),
	Utf8(Vec<Option<String>>),
	Timestamp(Vec<Option<Timestamp>>),
}

impl ColumnData {
	/// `ty` must be a valid column type; [`crate::Schema`] guarantees that.
	pub fn new(ty: Type) -> Self {
		match ty {
			Type::Boolean => ColumnData::Boolean(Vec::new()),
			Type::Int8 => ColumnData::Int8(Vec::new()),
			Type::Float8 => ColumnData::Float8(Vec::new()),
			Type::Utf8 => ColumnData::Utf8(Vec::new()),
			Type::Timestamp => ColumnData::Timestamp(Vec::new()),
			Type::Undefined => unreachable!("schema rejects undefined column types"),
		}
	}

	pub fn ty(&self) -> Type {
		match self {
			ColumnData::Boolean(_) => Type::Boolean,
			ColumnData::Int8(_) => Type::Int8,
			ColumnData::Float8(_) => Type::Float8,
			ColumnData::Utf8(_) => Type::Utf8,
			ColumnData::Timestamp(_) => Type::Timestamp,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			ColumnData::Boolean(data) => data.len(),
			ColumnData::Int8(data) => data.len(),
			ColumnData::Float8(data) => data.len(),
			ColumnData::Utf8(data) => data.len(),
			ColumnData::Timestamp(data) => data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Append a value already coerced to this column's type.
	pub fn push(&mut self, value: Value) {
		match (self, value) {
			(ColumnData::Boolean(data), Value::Boolean(v)) => data.push(Some(v)),
			(ColumnData::Int8(data), Value::Int8(v)) => data.push(Some(v)),
			(ColumnData::Float8(data), Value::Float8(v)) => data.push(Some(v)),
			(ColumnData::Utf8(data), Value::Utf8(v)) => data.push(Some(v)),
			(ColumnData::Timestamp(data), Value::Timestamp(v)) => data.push(Some(v)),
			(ColumnData::Boolean(data), Value::Undefined) => data.push(None),
			(ColumnData::Int8(data), Value::Undefined) => data.push(None),
			(ColumnData::Float8(data), Value::Undefined) => data.push(None),
			(ColumnData::Utf8(data), Value::Undefined) => data.push(None),
			(ColumnData::Timestamp(data), Value::Undefined) => data.push(None),
			_ => unreachable!("value type checked during coercion"),
		}
	}

	/// Overwrite the cell at `position` with a value already coerced to
	/// this column's type.
	pub fn set(&mut self, position: usize, value: Value) {
		match (self, value) {
			(ColumnData::Boolean(data), Value::Boolean(v)) => data[position] = Some(v),
			(ColumnData::Int8(data), Value::Int8(v)) => data[position] = Some(v),
			(ColumnData::Float8(data), Value::Float8(v)) => data[position] = Some(v),
			(ColumnData::Utf8(data), Value::Utf8(v)) => data[position] = Some(v),
			(ColumnData::Timestamp(data), Value::Timestamp(v)) => data[position] = Some(v),
			(ColumnData::Boolean(data), Value::Undefined) => data[position] = None,
			(ColumnData::Int8(data), Value::Undefined) => data[position] = None,
			(ColumnData::Float8(data), Value::Undefined) => data[position] = None,
			(ColumnData::Utf8(data), Value::Undefined) => data[position] = None,
			(ColumnData::Timestamp(data), Value::Undefined) => data[position] = None,
			_ => unreachable!("value type checked during coercion"),
		}
	}

	pub fn get(&self, position: usize) -> Value {
		match self {
			ColumnData::Boolean(data) => data[position].map(Value::Boolean).unwrap_or(Value::Undefined),
			ColumnData::Int8(data) => data[position].map(Value::Int8).unwrap_or(Value::Undefined),
			ColumnData::Float8(data) => data[position].map(Value::Float8).unwrap_or(Value::Undefined),
			ColumnData::Utf8(data) => {
				data[position].clone().map(Value::Utf8).unwrap_or(Value::Undefined)
			}
			ColumnData::Timestamp(data) => {
				data[position].map(Value::Timestamp).unwrap_or(Value::Undefined)
			}
		}
	}

	pub fn swap_remove(&mut self, position: usize) {
		match self {
			ColumnData::Boolean(data) => {
				data.swap_remove(position);
			}
			ColumnData::Int8(data) => {
				data.swap_remove(position);
			}
			ColumnData::Float8(data) => {
				data.swap_remove(position);
			}
			ColumnData::Utf8(data) => {
				data.swap_remove(position);
			}
			ColumnData::Timestamp(data) => {
				data.swap_remove(position);
			}
		}
	}

	pub fn clear(&mut self) {
		match self {
			ColumnData::Boolean(data) => data.clear(),
			ColumnData::Int8(data) => data.clear(),
			ColumnData::Float8(data) => data.clear(),
			ColumnData::Utf8(data) => data.clear(),
			ColumnData::Timestamp(data) => data.clear(),
		}
	}
}
