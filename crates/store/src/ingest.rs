// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Row ingestion formats accepted by [`crate::Table::update`].
//!
//! Both formats resolve to the same internal representation, so equivalent
//! data produces identical table state regardless of how it arrived.

use std::collections::HashMap;

use prism_type::{Error, Result, Type, Value};
use prism_wire::decode_columns;

use crate::schema::Schema;

/// One row as a mapping from column name to value. Columns absent from the
/// mapping are left unspecified: on insert they become undefined, on an
/// index-overwrite they keep the row's current value. Keys that are not
/// schema columns are ignored.
pub type Record = HashMap<String, Value>;

/// A batch of rows for `Table::update`.
pub enum RowBatch {
	/// Sequence of records, one per row.
	Records(Vec<Record>),
	/// A pre-encoded columnar buffer in the wire column layout.
	Columnar(Vec<u8>),
}

impl From<Vec<Record>> for RowBatch {
	fn from(records: Vec<Record>) -> Self {
		RowBatch::Records(records)
	}
}

impl From<Vec<u8>> for RowBatch {
	fn from(buffer: Vec<u8>) -> Self {
		RowBatch::Columnar(buffer)
	}
}

/// A row resolved against a schema: one slot per schema column, `None` when
/// the batch did not specify the column.
pub(crate) type SparseRow = Vec<Option<Value>>;

impl RowBatch {
	pub(crate) fn into_sparse_rows(self, schema: &Schema) -> Result<Vec<SparseRow>> {
		match self {
			RowBatch::Records(records) => Ok(records
				.into_iter()
				.map(|record| {
					let mut row: SparseRow = vec![None; schema.len()];
					for (name, value) in record {
						if let Some(position) = schema.position(&name) {
							row[position] = Some(value);
						}
					}
					row
				})
				.collect()),
			RowBatch::Columnar(buffer) => {
				let columns = decode_columns(&buffer)?;

				let mut resolved = Vec::new();
				let mut row_count = None;
				for column in &columns {
					let Some(position) = schema.position(&column.name) else {
						continue;
					};
					let expected = schema.type_at(position);
					if column.ty != expected {
						return Err(Error::Schema(format!(
							"columnar buffer declares '{}' as {}, schema says {}",
							column.name, column.ty, expected
						)));
					}
					match row_count {
						None => row_count = Some(column.data.len()),
						Some(count) if count != column.data.len() => {
							return Err(Error::Codec(format!(
								"columnar buffer has ragged columns ({} vs {} rows)",
								count,
								column.data.len()
							)));
						}
						Some(_) => {}
					}
					resolved.push((position, &column.data));
				}

				let row_count = row_count.unwrap_or(0);
				let mut rows = Vec::with_capacity(row_count);
				for row_idx in 0..row_count {
					let mut row: SparseRow = vec![None; schema.len()];
					for (position, data) in &resolved {
						row[*position] = Some(data[row_idx].clone());
					}
					rows.push(row);
				}
				Ok(rows)
			}
		}
	}
}

/// Coerce a single cell to the column type.
///
/// Integers widen to floats and serve as epoch-millisecond timestamps;
/// everything else must match exactly.
pub(crate) fn coerce(column: &str, ty: Type, value: Value) -> Result<Value> {
	match (ty, value) {
		(_, Value::Undefined) => Ok(Value::Undefined),
		(Type::Boolean, value @ Value::Boolean(_)) => Ok(value),
		(Type::Int8, value @ Value::Int8(_)) => Ok(value),
		(Type::Float8, value @ Value::Float8(_)) => Ok(value),
		(Type::Float8, Value::Int8(v)) => Ok(Value::float8(v as f64)),
		(Type::Utf8, value @ Value::Utf8(_)) => Ok(value),
		(Type::Timestamp, value @ Value::Timestamp(_)) => Ok(value),
		(Type::Timestamp, Value::Int8(v)) => Ok(Value::Timestamp(v.into())),
		(ty, value) => Err(Error::TypeMismatch {
			column: column.to_string(),
			expected: ty,
			value: value.to_string(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use prism_wire::{FrameColumn, encode_columns};

	use super::*;

	fn schema() -> Schema {
		Schema::new([("name", Type::Utf8), ("price", Type::Float8)]).unwrap()
	}

	#[test]
	fn test_records_resolve_by_name() {
		let record = Record::from([("price".to_string(), Value::float8(1.0))]);
		let rows = RowBatch::Records(vec![record]).into_sparse_rows(&schema()).unwrap();
		assert_eq!(rows, vec![vec![None, Some(Value::float8(1.0))]]);
	}

	#[test]
	fn test_unknown_record_keys_ignored() {
		let record = Record::from([
			("name".to_string(), Value::utf8("A")),
			("ghost".to_string(), Value::Int8(1)),
		]);
		let rows = RowBatch::Records(vec![record]).into_sparse_rows(&schema()).unwrap();
		assert_eq!(rows[0], vec![Some(Value::utf8("A")), None]);
	}

	#[test]
	fn test_columnar_buffer_resolves_row_major() {
		let buffer = encode_columns(&[
			FrameColumn::new("name", Type::Utf8, vec![Value::utf8("A"), Value::utf8("B")]),
			FrameColumn::new("price", Type::Float8, vec![Value::float8(1.0), Value::float8(2.0)]),
		])
		.unwrap();
		let rows = RowBatch::Columnar(buffer).into_sparse_rows(&schema()).unwrap();
		assert_eq!(rows.len(), 2);
		assert_eq!(rows[1], vec![Some(Value::utf8("B")), Some(Value::float8(2.0))]);
	}

	#[test]
	fn test_columnar_type_mismatch_rejected() {
		let buffer =
			encode_columns(&[FrameColumn::new("price", Type::Int8, vec![Value::Int8(1)])]).unwrap();
		let err = RowBatch::Columnar(buffer).into_sparse_rows(&schema()).unwrap_err();
		assert!(matches!(err, Error::Schema(_)));
	}

	#[test]
	fn test_coerce_widens_int_to_float() {
		assert_eq!(coerce("price", Type::Float8, Value::Int8(3)).unwrap(), Value::float8(3.0));
	}

	#[test]
	fn test_coerce_rejects_string_for_float() {
		let err = coerce("price", Type::Float8, Value::utf8("abc")).unwrap_err();
		assert!(matches!(err, Error::TypeMismatch { .. }));
	}
}
