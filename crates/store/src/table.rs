// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::{
	collections::HashMap,
	sync::{Arc, Weak},
};

use parking_lot::Mutex;
use prism_type::{Error, Result, Value};

use crate::{
	change::{RowDiff, RowId, TableChange},
	column::ColumnData,
	ingest::{RowBatch, SparseRow, coerce},
	schema::Schema,
};

/// Observes every mutation of a table, synchronously within the mutation's
/// critical section. Implemented by the view engine.
pub trait TableObserver: Send {
	fn on_change(&mut self, data: &TableData, change: &TableChange);
}

/// Handle for unregistering an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Outcome of an `update` batch: which rows were physically written, which
/// were evicted to keep the capacity invariant, and which batch rows were
/// rejected. A rejected row never aborts the rest of the batch.
#[derive(Debug, Default)]
pub struct UpdateReport {
	/// Inserted or overwritten rows, in insertion order.
	pub affected: Vec<RowId>,
	/// Rows evicted by the capacity policy while the batch applied.
	pub evicted: Vec<RowId>,
	pub failures: Vec<RowFailure>,
}

#[derive(Debug)]
pub struct RowFailure {
	/// Position of the rejected row within the batch.
	pub row: usize,
	pub error: Error,
}

/// Outcome of a `remove` call.
#[derive(Debug, Default)]
pub struct RemoveReport {
	pub removed: Vec<RowId>,
	/// Keys that matched no row; skipped, not an error.
	pub missing: Vec<Value>,
}

/// The storage state of a table. Exposed read-only to observers while the
/// table lock is held.
pub struct TableData {
	schema: Schema,
	schema_version: u32,
	limit: Option<usize>,
	index: Option<usize>,
	columns: Vec<ColumnData>,
	/// Physical position → row id. Scrambled by swap-removal.
	rows: Vec<RowId>,
	/// Row id → physical position.
	locations: HashMap<RowId, usize>,
	/// Row ids in insertion order; ascending because ids are monotonic.
	order: Vec<RowId>,
	/// Index-column value → row id. Only populated in index mode.
	keys: HashMap<Value, RowId>,
	next_row: u64,
}

impl TableData {
	pub fn schema(&self) -> &Schema {
		&self.schema
	}

	pub fn schema_version(&self) -> u32 {
		self.schema_version
	}

	pub fn limit(&self) -> Option<usize> {
		self.limit
	}

	/// Schema position of the index column, when one is configured.
	pub fn index_position(&self) -> Option<usize> {
		self.index
	}

	pub fn row_count(&self) -> usize {
		self.rows.len()
	}

	pub fn contains(&self, row: RowId) -> bool {
		self.locations.contains_key(&row)
	}

	/// Row ids in original insertion order.
	pub fn ordered_rows(&self) -> impl Iterator<Item = RowId> + '_ {
		self.order.iter().copied()
	}

	pub fn value(&self, row: RowId, column: usize) -> Option<Value> {
		let position = *self.locations.get(&row)?;
		Some(self.columns[column].get(position))
	}

	pub fn row_values(&self, row: RowId) -> Option<Vec<Value>> {
		let position = *self.locations.get(&row)?;
		Some(self.columns.iter().map(|column| column.get(position)).collect())
	}

	fn insert(&mut self, values: Vec<Value>) -> RowId {
		let row = RowId(self.next_row);
		self.next_row += 1;

		let position = self.rows.len();
		for (column, value) in self.columns.iter_mut().zip(values) {
			column.push(value);
		}
		self.rows.push(row);
		self.locations.insert(row, position);
		self.order.push(row);
		row
	}

	fn overwrite(&mut self, row: RowId, values: Vec<Value>) {
		let position = self.locations[&row];
		for (column, value) in self.columns.iter_mut().zip(values) {
			column.set(position, value);
		}
	}

	fn remove(&mut self, row: RowId) -> Vec<Value> {
		let position = self.locations.remove(&row).expect("removing unknown row");
		let pre: Vec<Value> = self.columns.iter().map(|column| column.get(position)).collect();

		for column in &mut self.columns {
			column.swap_remove(position);
		}
		self.rows.swap_remove(position);
		if position < self.rows.len() {
			self.locations.insert(self.rows[position], position);
		}
		if let Ok(ordinal) = self.order.binary_search(&row) {
			self.order.remove(ordinal);
		}
		if let Some(index) = self.index {
			self.keys.remove(&pre[index]);
		}
		pre
	}

	fn wipe(&mut self) {
		for column in &mut self.columns {
			column.clear();
		}
		self.rows.clear();
		self.locations.clear();
		self.order.clear();
		self.keys.clear();
	}
}

struct TableShared {
	data: TableData,
	observers: Vec<(ObserverId, Box<dyn TableObserver>)>,
	next_observer: u64,
}

struct TableInner {
	shared: Mutex<TableShared>,
}

/// A named columnar dataset with a fixed schema.
///
/// Cloning is cheap; clones share the same storage. All mutations on one
/// table are serialized through its lock, so concurrent callers apply in
/// arrival order and observers never see interleaved change sets.
#[derive(Clone)]
pub struct Table {
	inner: Arc<TableInner>,
}

/// Weak back-reference to a table, held by views so they never keep their
/// table alive.
#[derive(Clone)]
pub struct WeakTable {
	inner: Weak<TableInner>,
}

impl WeakTable {
	pub fn upgrade(&self) -> Option<Table> {
		self.inner.upgrade().map(|inner| Table {
			inner,
		})
	}
}

impl std::fmt::Debug for Table {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Table").finish_non_exhaustive()
	}
}

impl Table {
	/// Create a table.
	///
	/// `capacity` bounds the row count with FIFO eviction; `index_column`
	/// switches the table to overwrite-by-key mode. The two are mutually
	/// exclusive.
	pub fn create(schema: Schema, capacity: Option<usize>, index_column: Option<&str>) -> Result<Table> {
		if capacity == Some(0) {
			return Err(Error::Schema("capacity must be at least one row".to_string()));
		}
		if capacity.is_some() && index_column.is_some() {
			return Err(Error::Schema(
				"capacity eviction and index overwrite are mutually exclusive".to_string(),
			));
		}
		let index = match index_column {
			Some(name) => Some(schema
				.position(name)
				.ok_or_else(|| Error::Schema(format!("index column '{}' is not in the schema", name)))?),
			None => None,
		};

		let columns = schema.iter().map(|(_, ty)| ColumnData::new(ty)).collect();
		let data = TableData {
			schema,
			schema_version: 1,
			limit: capacity,
			index,
			columns,
			rows: Vec::new(),
			locations: HashMap::new(),
			order: Vec::new(),
			keys: HashMap::new(),
			next_row: 0,
		};
		Ok(Table {
			inner: Arc::new(TableInner {
				shared: Mutex::new(TableShared {
					data,
					observers: Vec::new(),
					next_observer: 0,
				}),
			}),
		})
	}

	pub fn downgrade(&self) -> WeakTable {
		WeakTable {
			inner: Arc::downgrade(&self.inner),
		}
	}

	pub fn schema(&self) -> Schema {
		self.inner.shared.lock().data.schema.clone()
	}

	pub fn size(&self) -> usize {
		self.inner.shared.lock().data.row_count()
	}

	pub fn limit(&self) -> Option<usize> {
		self.inner.shared.lock().data.limit
	}

	pub fn index_column(&self) -> Option<String> {
		let shared = self.inner.shared.lock();
		shared.data.index.map(|position| shared.data.schema.name_at(position).to_string())
	}

	/// Run a closure against the storage state under the table lock.
	pub fn with_data<R>(&self, f: impl FnOnce(&TableData) -> R) -> R {
		f(&self.inner.shared.lock().data)
	}

	/// Build and register an observer in one critical section: the closure
	/// sees the current state with no mutation able to slip in before the
	/// observer starts receiving changes. The closure's second return
	/// value is handed back to the caller.
	pub fn observe<O, R, F>(&self, init: F) -> Result<(ObserverId, R)>
	where
		O: TableObserver + 'static,
		F: FnOnce(&TableData) -> Result<(O, R)>,
	{
		let shared = &mut *self.inner.shared.lock();
		let (observer, value) = init(&shared.data)?;
		let id = ObserverId(shared.next_observer);
		shared.next_observer += 1;
		shared.observers.push((id, Box::new(observer)));
		Ok((id, value))
	}

	pub fn unregister_observer(&self, id: ObserverId) {
		self.inner.shared.lock().observers.retain(|(observer_id, _)| *observer_id != id);
	}

	/// Apply a batch of rows.
	///
	/// Row-level validation failures are collected into the report; the
	/// rest of the batch still applies. Registered observers are notified
	/// synchronously before this call returns.
	pub fn update(&self, batch: impl Into<RowBatch>) -> Result<UpdateReport> {
		let shared = &mut *self.inner.shared.lock();
		let rows = batch.into().into_sparse_rows(&shared.data.schema)?;

		let mut report = UpdateReport::default();
		let mut diffs = Vec::new();

		for (batch_position, row) in rows.into_iter().enumerate() {
			match Self::apply_row(&mut shared.data, row, &mut diffs, &mut report.evicted) {
				Ok(row_id) => report.affected.push(row_id),
				Err(error) => report.failures.push(RowFailure {
					row: batch_position,
					error,
				}),
			}
		}

		Self::notify(shared, diffs);
		Ok(report)
	}

	/// Remove rows by index-column value. Only valid in index mode.
	pub fn remove(&self, keys: &[Value]) -> Result<RemoveReport> {
		let shared = &mut *self.inner.shared.lock();
		let index = shared
			.data
			.index
			.ok_or_else(|| Error::UnsupportedOperation("remove requires an index column".to_string()))?;
		let column = shared.data.schema.name_at(index).to_string();
		let ty = shared.data.schema.type_at(index);

		let mut report = RemoveReport::default();
		let mut diffs = Vec::new();
		for key in keys {
			let key = match coerce(&column, ty, key.clone()) {
				Ok(key) => key,
				Err(_) => {
					report.missing.push(key.clone());
					continue;
				}
			};
			match shared.data.keys.get(&key).copied() {
				Some(row) => {
					let pre = shared.data.remove(row);
					diffs.push(RowDiff::Remove {
						row,
						pre,
					});
					report.removed.push(row);
				}
				None => report.missing.push(key),
			}
		}

		Self::notify(shared, diffs);
		Ok(report)
	}

	/// Drop every row. Observers see one remove diff per row.
	pub fn clear(&self) {
		let shared = &mut *self.inner.shared.lock();
		let diffs: Vec<RowDiff> = shared
			.data
			.order
			.clone()
			.into_iter()
			.map(|row| RowDiff::Remove {
				row,
				pre: shared.data.row_values(row).unwrap_or_default(),
			})
			.collect();
		shared.data.wipe();
		tracing::debug!("cleared table ({} rows dropped)", diffs.len());
		Self::notify(shared, diffs);
	}

	fn apply_row(
		data: &mut TableData,
		row: SparseRow,
		diffs: &mut Vec<RowDiff>,
		evicted: &mut Vec<RowId>,
	) -> Result<RowId> {
		// Validate every provided cell before touching storage, so a
		// rejected row leaves no partial write behind.
		let mut coerced: Vec<Option<Value>> = Vec::with_capacity(data.schema.len());
		for (position, value) in row.into_iter().enumerate() {
			let column = data.schema.name_at(position);
			let ty = data.schema.type_at(position);
			coerced.push(match value {
				Some(value) => Some(coerce(column, ty, value)?),
				None => None,
			});
		}

		if let Some(index) = data.index {
			let key = match coerced[index].clone() {
				Some(key) if !key.is_undefined() => key,
				_ => {
					return Err(Error::TypeMismatch {
						column: data.schema.name_at(index).to_string(),
						expected: data.schema.type_at(index),
						value: Value::Undefined.to_string(),
					});
				}
			};
			if let Some(row_id) = data.keys.get(&key).copied() {
				// Overwrite in place; unspecified columns keep
				// their current values.
				let pre = data.row_values(row_id).expect("indexed row present");
				let post: Vec<Value> = coerced
					.into_iter()
					.zip(pre.iter())
					.map(|(value, current)| value.unwrap_or_else(|| current.clone()))
					.collect();
				data.overwrite(row_id, post.clone());
				diffs.push(RowDiff::Update {
					row: row_id,
					pre,
					post,
				});
				return Ok(row_id);
			}
			let post: Vec<Value> =
				coerced.into_iter().map(|value| value.unwrap_or(Value::Undefined)).collect();
			let row_id = data.insert(post.clone());
			data.keys.insert(key, row_id);
			diffs.push(RowDiff::Insert {
				row: row_id,
				post,
			});
			return Ok(row_id);
		}

		let post: Vec<Value> = coerced.into_iter().map(|value| value.unwrap_or(Value::Undefined)).collect();
		let row_id = data.insert(post.clone());
		diffs.push(RowDiff::Insert {
			row: row_id,
			post,
		});

		// Strict FIFO eviction keeps the capacity invariant within the
		// batch, not just at its end.
		if let Some(limit) = data.limit {
			while data.row_count() > limit {
				let oldest = data.order[0];
				let pre = data.remove(oldest);
				diffs.push(RowDiff::Remove {
					row: oldest,
					pre,
				});
				evicted.push(oldest);
				tracing::debug!("evicted {} to hold capacity {}", oldest, limit);
			}
		}
		Ok(row_id)
	}

	fn notify(shared: &mut TableShared, diffs: Vec<RowDiff>) {
		if diffs.is_empty() {
			return;
		}
		let change = TableChange::new(diffs);
		let TableShared {
			data,
			observers,
			..
		} = shared;
		for (_, observer) in observers.iter_mut() {
			observer.on_change(data, &change);
		}
	}
}
