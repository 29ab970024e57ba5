// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::fmt::{Display, Formatter};

use prism_type::Value;
use serde::{Deserialize, Serialize};

/// Identifies a row by insertion position. Monotonically increasing for the
/// lifetime of a table; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl Display for RowId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "row:{}", self.0)
	}
}

/// One physical row-level change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowDiff {
	Insert {
		row: RowId,
		post: Vec<Value>,
	},
	Update {
		row: RowId,
		pre: Vec<Value>,
		post: Vec<Value>,
	},
	Remove {
		row: RowId,
		pre: Vec<Value>,
	},
}

impl RowDiff {
	pub fn row(&self) -> RowId {
		match self {
			RowDiff::Insert {
				row,
				..
			} => *row,
			RowDiff::Update {
				row,
				..
			} => *row,
			RowDiff::Remove {
				row,
				..
			} => *row,
		}
	}
}

/// The ordered set of row-level changes produced by one mutation call.
///
/// Diffs appear in application order; a capacity eviction follows the insert
/// that triggered it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableChange {
	pub diffs: Vec<RowDiff>,
}

impl TableChange {
	pub fn new(diffs: Vec<RowDiff>) -> Self {
		Self {
			diffs,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.diffs.is_empty()
	}
}
