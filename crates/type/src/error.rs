// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Error taxonomy for Prism operations.
//!
//! Every fallible call across the workspace returns [`Result`]. Row-level
//! validation failures inside a batch are collected into the batch report
//! instead of aborting the call; everything else fails the call that raised
//! it and leaves prior state unmodified.

use serde::{Deserialize, Serialize};

use crate::Type;

/// Error type shared by every Prism crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
	/// Structural mismatch: duplicate columns, unknown columns, invalid
	/// table configuration. Caller error, non-retryable.
	#[error("schema error: {0}")]
	Schema(String),

	/// A row value could not be coerced to the column type. The row is
	/// rejected; the rest of the batch still applies.
	#[error("type mismatch in column '{column}': expected {expected}, got {value}")]
	TypeMismatch {
		column: String,
		expected: Type,
		value: String,
	},

	/// The requested capability is not available on this table.
	#[error("unsupported operation: {0}")]
	UnsupportedOperation(String),

	/// The requested aggregate cannot be maintained incrementally.
	#[error("unsupported aggregate: {0}")]
	UnsupportedAggregate(String),

	/// A table or view name is already registered with the host.
	#[error("duplicate name: '{0}' is already hosted")]
	DuplicateName(String),

	/// No table or view is registered under the given name.
	#[error("not found: '{0}'")]
	NotFound(String),

	/// A wire buffer could not be decoded.
	#[error("codec error: {0}")]
	Codec(String),

	/// A network endpoint could not be set up.
	#[error("network error: {0}")]
	Network(String),
}

impl Error {
	pub fn schema(msg: impl Into<String>) -> Self {
		Error::Schema(msg.into())
	}

	pub fn codec(msg: impl Into<String>) -> Self {
		Error::Codec(msg.into())
	}
}

/// Result type shared by every Prism crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_carries_column_context() {
		let err = Error::TypeMismatch {
			column: "price".to_string(),
			expected: Type::Float8,
			value: "\"abc\"".to_string(),
		};
		let msg = err.to_string();
		assert!(msg.contains("price"));
		assert!(msg.contains("float"));
	}

	#[test]
	fn test_errors_are_comparable() {
		assert_eq!(Error::NotFound("a".into()), Error::NotFound("a".into()));
		assert_ne!(Error::NotFound("a".into()), Error::DuplicateName("a".into()));
	}
}
