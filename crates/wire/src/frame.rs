// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use prism_type::{Error, Result, Type, Value};

/// Discriminates the four message shapes a subscriber can receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
	/// Full state of a view, every row tagged as insert.
	Snapshot,
	/// Minimal change set produced by one mutation.
	Delta,
	/// The view's output column set changed; a fresh snapshot follows.
	SchemaChanged,
	/// The receiving channel was dropped for exceeding its queue bound.
	SubscriberEvicted,
}

impl MessageKind {
	pub fn to_u32(self) -> u32 {
		match self {
			MessageKind::Snapshot => 0,
			MessageKind::Delta => 1,
			MessageKind::SchemaChanged => 2,
			MessageKind::SubscriberEvicted => 3,
		}
	}

	pub fn from_u32(tag: u32) -> Result<Self> {
		match tag {
			0 => Ok(MessageKind::Snapshot),
			1 => Ok(MessageKind::Delta),
			2 => Ok(MessageKind::SchemaChanged),
			3 => Ok(MessageKind::SubscriberEvicted),
			_ => Err(Error::Codec(format!("unknown message kind {}", tag))),
		}
	}
}

/// Per-row operation tag inside a delta payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
	Insert,
	Update,
	Remove,
}

impl Op {
	pub fn to_u8(self) -> u8 {
		match self {
			Op::Insert => 0,
			Op::Update => 1,
			Op::Remove => 2,
		}
	}

	pub fn from_u8(tag: u8) -> Result<Self> {
		match tag {
			0 => Ok(Op::Insert),
			1 => Ok(Op::Update),
			2 => Ok(Op::Remove),
			_ => Err(Error::Codec(format!("unknown op tag {}", tag))),
		}
	}
}

/// Everything in a message except the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
	pub kind: MessageKind,
	/// Hosted table or view name the message belongs to.
	pub name: String,
	pub schema_version: u32,
}

/// A single named, typed value array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameColumn {
	pub name: String,
	pub ty: Type,
	pub data: Vec<Value>,
}

impl FrameColumn {
	pub fn new(name: impl Into<String>, ty: Type, data: Vec<Value>) -> Self {
		Self {
			name: name.into(),
			ty,
			data,
		}
	}
}

/// A columnar batch of rows plus one operation tag per row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
	pub columns: Vec<FrameColumn>,
	pub ops: Vec<Op>,
}

impl Frame {
	pub fn row_count(&self) -> usize {
		self.columns.first().map(|c| c.data.len()).unwrap_or(0)
	}

	/// Columns must be equal length and match the op array.
	pub fn validate(&self) -> Result<()> {
		let rows = self.row_count();
		for column in &self.columns {
			if column.data.len() != rows {
				return Err(Error::Codec(format!(
					"column '{}' has {} rows, expected {}",
					column.name,
					column.data.len(),
					rows
				)));
			}
		}
		if self.ops.len() != rows {
			return Err(Error::Codec(format!("{} op tags for {} rows", self.ops.len(), rows)));
		}
		Ok(())
	}
}
