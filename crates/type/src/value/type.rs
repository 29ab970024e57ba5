// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The primitive type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
	Boolean,
	Int8,
	Float8,
	Utf8,
	Timestamp,
	/// The type of [`crate::Value::Undefined`]. Not a valid column type.
	Undefined,
}

impl Type {
	/// Wire tag for this type. Stable across releases.
	pub fn to_u8(self) -> u8 {
		match self {
			Type::Undefined => 0,
			Type::Boolean => 1,
			Type::Int8 => 2,
			Type::Float8 => 3,
			Type::Utf8 => 4,
			Type::Timestamp => 5,
		}
	}

	pub fn from_u8(tag: u8) -> Result<Self> {
		match tag {
			0 => Ok(Type::Undefined),
			1 => Ok(Type::Boolean),
			2 => Ok(Type::Int8),
			3 => Ok(Type::Float8),
			4 => Ok(Type::Utf8),
			5 => Ok(Type::Timestamp),
			_ => Err(Error::Codec(format!("unknown type tag {}", tag))),
		}
	}

	/// True for types a column may be declared with.
	pub fn is_column_type(self) -> bool {
		!matches!(self, Type::Undefined)
	}

	pub fn is_numeric(self) -> bool {
		matches!(self, Type::Int8 | Type::Float8)
	}
}

impl Display for Type {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Type::Boolean => "boolean",
			Type::Int8 => "int",
			Type::Float8 => "float",
			Type::Utf8 => "string",
			Type::Timestamp => "timestamp",
			Type::Undefined => "undefined",
		};
		write!(f, "{}", name)
	}
}
