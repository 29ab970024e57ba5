// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::{cmp::Ordering, collections::HashMap};

use prism_type::Value;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

/// Declarative description of a view.
///
/// An empty `group_by` yields a raw (zero-sided) view: a filtered, sorted
/// projection of individual rows. A non-empty `group_by` yields one output
/// row per distinct group key, with `aggregates` applied per column.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ViewConfig {
	#[serde(default)]
	pub group_by: Vec<String>,
	#[serde(default)]
	pub split_by: Vec<String>,
	/// Aggregate per column; columns without an entry get the default for
	/// their type (sum for numerics, count otherwise).
	#[serde(default)]
	pub aggregates: HashMap<String, Aggregate>,
	/// Output columns. Empty means every schema column.
	#[serde(default)]
	pub columns: Vec<String>,
	#[serde(default)]
	pub sort: Vec<Sort>,
	#[serde(default)]
	pub filter: Vec<Filter>,
}

/// One sort term. Terms apply in declaration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sort {
	pub column: String,
	#[serde(default)]
	pub order: SortDir,
}

impl Sort {
	pub fn asc(column: impl Into<String>) -> Self {
		Self {
			column: column.into(),
			order: SortDir::Asc,
		}
	}

	pub fn desc(column: impl Into<String>) -> Self {
		Self {
			column: column.into(),
			order: SortDir::Desc,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
	#[default]
	Asc,
	Desc,
}

/// One filter predicate. Predicates are conjunctive: a row must satisfy
/// every filter to appear in the view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Filter {
	pub column: String,
	pub op: FilterOp,
	/// Comparison operand. Ignored by the null checks.
	#[serde(default = "undefined_value")]
	pub value: Value,
}

fn undefined_value() -> Value {
	Value::Undefined
}

impl Filter {
	pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
		Self {
			column: column.into(),
			op,
			value: value.into(),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
	#[serde(rename = "==")]
	Eq,
	#[serde(rename = "!=")]
	Ne,
	#[serde(rename = "<")]
	Lt,
	#[serde(rename = "<=")]
	Le,
	#[serde(rename = ">")]
	Gt,
	#[serde(rename = ">=")]
	Ge,
	#[serde(rename = "is null")]
	IsNull,
	#[serde(rename = "is not null")]
	IsNotNull,
}

impl FilterOp {
	/// Evaluate the predicate for one cell. Comparisons against an
	/// undefined cell are false; only the null checks see them.
	pub fn matches(self, cell: &Value, operand: &Value) -> bool {
		match self {
			FilterOp::IsNull => cell.is_undefined(),
			FilterOp::IsNotNull => !cell.is_undefined(),
			_ if cell.is_undefined() => false,
			FilterOp::Eq => cell.cmp(operand) == Ordering::Equal,
			FilterOp::Ne => cell.cmp(operand) != Ordering::Equal,
			FilterOp::Lt => cell.cmp(operand) == Ordering::Less,
			FilterOp::Le => cell.cmp(operand) != Ordering::Greater,
			FilterOp::Gt => cell.cmp(operand) == Ordering::Greater,
			FilterOp::Ge => cell.cmp(operand) != Ordering::Less,
		}
	}
}
