// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use indexmap::IndexMap;
use prism_type::{Error, Result, Type};
use serde::{Deserialize, Serialize};

/// Ordered mapping from column name to primitive type.
///
/// Immutable after table creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
	columns: IndexMap<String, Type>,
}

impl Schema {
	pub fn new<N: Into<String>>(columns: impl IntoIterator<Item = (N, Type)>) -> Result<Self> {
		let mut map = IndexMap::new();
		for (name, ty) in columns {
			let name = name.into();
			if !ty.is_column_type() {
				return Err(Error::Schema(format!("column '{}' has unsupported type {}", name, ty)));
			}
			if map.insert(name.clone(), ty).is_some() {
				return Err(Error::Schema(format!("duplicate column '{}'", name)));
			}
		}
		if map.is_empty() {
			return Err(Error::Schema("schema has no columns".to_string()));
		}
		Ok(Self {
			columns: map,
		})
	}

	pub fn len(&self) -> usize {
		self.columns.len()
	}

	pub fn is_empty(&self) -> bool {
		self.columns.is_empty()
	}

	pub fn get(&self, name: &str) -> Option<Type> {
		self.columns.get(name).copied()
	}

	pub fn position(&self, name: &str) -> Option<usize> {
		self.columns.get_index_of(name)
	}

	pub fn name_at(&self, position: usize) -> &str {
		self.columns.get_index(position).map(|(name, _)| name.as_str()).unwrap_or("")
	}

	pub fn type_at(&self, position: usize) -> Type {
		self.columns.get_index(position).map(|(_, ty)| *ty).unwrap_or(Type::Undefined)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, Type)> {
		self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.columns.keys().map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_preserves_declaration_order() {
		let schema =
			Schema::new([("name", Type::Utf8), ("price", Type::Float8), ("ts", Type::Timestamp)]).unwrap();
		let names: Vec<_> = schema.names().collect();
		assert_eq!(names, vec!["name", "price", "ts"]);
		assert_eq!(schema.position("price"), Some(1));
	}

	#[test]
	fn test_duplicate_column_rejected() {
		let err = Schema::new([("a", Type::Int8), ("a", Type::Utf8)]).unwrap_err();
		assert!(matches!(err, Error::Schema(_)));
	}

	#[test]
	fn test_undefined_column_type_rejected() {
		let err = Schema::new([("a", Type::Undefined)]).unwrap_err();
		assert!(matches!(err, Error::Schema(_)));
	}

	#[test]
	fn test_empty_schema_rejected() {
		let err = Schema::new(Vec::<(String, Type)>::new()).unwrap_err();
		assert!(matches!(err, Error::Schema(_)));
	}
}
