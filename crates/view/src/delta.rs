// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Minimal change sets between two output snapshots.

use std::hash::{DefaultHasher, Hash, Hasher};

use prism_store::RowId;
use prism_type::Value;

/// Identity of one output row.
///
/// Grouped views key their output by group-key values; raw views by the
/// underlying table row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutKey {
	Group(Vec<Value>),
	Row(RowId),
}

impl OutKey {
	/// Stable numeric identity carried on the wire. Raw rows use their
	/// row id; group keys hash deterministically.
	pub fn id(&self) -> u64 {
		match self {
			OutKey::Row(row) => row.0,
			OutKey::Group(values) => {
				let mut hasher = DefaultHasher::new();
				values.hash(&mut hasher);
				hasher.finish()
			}
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaOp {
	Insert,
	Update,
	Remove,
}

/// One row-level change within a delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaRecord {
	pub key: OutKey,
	pub op: DeltaOp,
	/// New output values for inserts and updates; last known values for
	/// removes.
	pub values: Vec<Value>,
}

/// The ordered set of output-row changes produced by one mutation, scoped
/// to one view.
///
/// Empty if and only if the mutation left the view's output value-equal,
/// so idempotent rewrites notify nobody.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
	pub records: Vec<DeltaRecord>,
	/// True when the view's output column set changed with this mutation
	/// (split-by views only). Subscribers should expect a new schema.
	pub schema_changed: bool,
}

impl Delta {
	pub fn is_empty(&self) -> bool {
		self.records.is_empty() && !self.schema_changed
	}
}

/// Diff one output row across a recomputation.
pub(crate) fn diff_row(key: &OutKey, old: Option<&Vec<Value>>, new: Option<&Vec<Value>>) -> Option<DeltaRecord> {
	match (old, new) {
		(None, None) => None,
		(Some(old), Some(new)) if old == new => None,
		(_, Some(new)) => Some(DeltaRecord {
			key: key.clone(),
			op: if old.is_some() {
				DeltaOp::Update
			} else {
				DeltaOp::Insert
			},
			values: new.clone(),
		}),
		(Some(old), None) => Some(DeltaRecord {
			key: key.clone(),
			op: DeltaOp::Remove,
			values: old.clone(),
		}),
	}
}
