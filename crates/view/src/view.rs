// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet, HashMap},
	sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use prism_store::{ObserverId, RowDiff, RowId, Schema, Table, TableChange, TableData, TableObserver, WeakTable};
use prism_type::{Error, Result, Type, Value};
use prism_wire::FrameColumn;

use crate::{
	aggregate::Aggregate,
	config::{Filter, SortDir, ViewConfig},
	delta::{Delta, DeltaOp, DeltaRecord, OutKey, diff_row},
};

/// One aggregated output column.
struct AggSpec {
	/// Schema position of the aggregated input column.
	column: usize,
	name: String,
	agg: Aggregate,
	input: Type,
}

enum Mode {
	/// No group-by: a filtered, sorted projection of individual rows.
	Raw {
		columns: Vec<usize>,
	},
	/// One output row per distinct group key.
	Grouped {
		group: Vec<usize>,
		split: Vec<usize>,
		aggs: Vec<AggSpec>,
	},
}

struct OutRow {
	values: Vec<Value>,
	/// Insertion-order tie break: smallest member row id.
	tie: u64,
}

/// A delta together with the output shape it applies to.
pub struct DeltaEvent<'a> {
	pub delta: &'a Delta,
	pub columns: &'a [(String, Type)],
	pub schema_version: u32,
}

/// Handle for unregistering a delta listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(DeltaEvent<'_>) + Send>;

struct ViewState {
	schema: Schema,
	mode: Mode,
	/// Filter predicates with resolved schema positions.
	filters: Vec<(usize, Filter)>,
	sort: Vec<(String, SortDir)>,
	/// Sort terms resolved against the current output columns.
	sort_resolved: Vec<(usize, SortDir)>,
	/// Group key → member rows, ascending by row id.
	groups: HashMap<Vec<Value>, Vec<RowId>>,
	/// Included row → its group key (empty in raw mode).
	row_keys: HashMap<RowId, Vec<Value>>,
	/// Split-key combination → number of included rows carrying it.
	split_counts: BTreeMap<Vec<Value>, usize>,
	out_columns: Vec<(String, Type)>,
	output: HashMap<OutKey, OutRow>,
	schema_version: u32,
	listeners: Vec<(ListenerId, Listener)>,
	next_listener: u64,
}

impl ViewState {
	fn build(config: ViewConfig, data: &TableData) -> Result<ViewState> {
		let schema = data.schema().clone();

		let resolve = |name: &str| {
			schema.position(name)
				.ok_or_else(|| Error::Schema(format!("column '{}' is not in the schema", name)))
		};

		if !config.split_by.is_empty() && config.group_by.is_empty() {
			return Err(Error::Schema("split-by requires group-by".to_string()));
		}
		for name in config.aggregates.keys() {
			resolve(name)?;
		}

		let group: Vec<usize> = config.group_by.iter().map(|n| resolve(n)).collect::<Result<_>>()?;
		let split: Vec<usize> = config.split_by.iter().map(|n| resolve(n)).collect::<Result<_>>()?;

		let selected: Vec<String> = if config.columns.is_empty() {
			schema.names().map(str::to_string).collect()
		} else {
			for name in &config.columns {
				resolve(name)?;
			}
			config.columns.clone()
		};

		let mode = if group.is_empty() {
			Mode::Raw {
				columns: selected.iter().map(|n| resolve(n)).collect::<Result<_>>()?,
			}
		} else {
			let mut aggs = Vec::new();
			for name in &selected {
				if config.group_by.contains(name) || config.split_by.contains(name) {
					continue;
				}
				let column = resolve(name)?;
				let input = schema.type_at(column);
				let agg = config.aggregates.get(name).copied().unwrap_or(Aggregate::default_for(input));
				agg.validate(name, input)?;
				aggs.push(AggSpec {
					column,
					name: name.clone(),
					agg,
					input,
				});
			}
			Mode::Grouped {
				group,
				split,
				aggs,
			}
		};

		// Sort terms must name a column the output can actually carry:
		// with split-by the aggregate columns shift, so only group
		// columns are sortable.
		let sortable: Vec<&str> = match &mode {
			Mode::Raw {
				..
			} => selected.iter().map(String::as_str).collect(),
			Mode::Grouped {
				aggs,
				..
			} => {
				let mut names: Vec<&str> = config.group_by.iter().map(String::as_str).collect();
				if config.split_by.is_empty() {
					names.extend(aggs.iter().map(|a| a.name.as_str()));
				}
				names
			}
		};
		for term in &config.sort {
			if !sortable.contains(&term.column.as_str()) {
				return Err(Error::Schema(format!("cannot sort by column '{}'", term.column)));
			}
		}

		let filters = config
			.filter
			.iter()
			.map(|filter| Ok((resolve(&filter.column)?, filter.clone())))
			.collect::<Result<Vec<_>>>()?;

		let mut state = ViewState {
			schema,
			mode,
			filters,
			sort: config.sort.iter().map(|s| (s.column.clone(), s.order)).collect(),
			sort_resolved: Vec::new(),
			groups: HashMap::new(),
			row_keys: HashMap::new(),
			split_counts: BTreeMap::new(),
			out_columns: Vec::new(),
			output: HashMap::new(),
			schema_version: 1,
			listeners: Vec::new(),
			next_listener: 0,
		};

		// Eager initial computation over current table contents.
		for row in data.ordered_rows() {
			let values = data.row_values(row).unwrap_or_default();
			if state.passes(&values) {
				state.include(row, &values);
			}
		}
		state.out_columns = state.compute_out_columns();
		state.resolve_sort();
		let keys: Vec<OutKey> = state.all_keys().collect();
		for key in keys {
			if let Some(out_row) = state.compute_row(data, &key) {
				state.output.insert(key, out_row);
			}
		}
		Ok(state)
	}

	fn passes(&self, values: &[Value]) -> bool {
		self.filters.iter().all(|(position, filter)| filter.op.matches(&values[*position], &filter.value))
	}

	fn key_of(values: &[Value], positions: &[usize]) -> Vec<Value> {
		positions.iter().map(|p| values[*p].clone()).collect()
	}

	/// Bookkeeping for a row entering the view.
	fn include(&mut self, row: RowId, values: &[Value]) -> OutKey {
		let ViewState {
			mode,
			groups,
			row_keys,
			split_counts,
			..
		} = self;
		match mode {
			Mode::Raw {
				..
			} => {
				row_keys.insert(row, Vec::new());
				OutKey::Row(row)
			}
			Mode::Grouped {
				group,
				split,
				..
			} => {
				let key = Self::key_of(values, group);
				let members = groups.entry(key.clone()).or_default();
				if let Err(ordinal) = members.binary_search(&row) {
					members.insert(ordinal, row);
				}
				row_keys.insert(row, key.clone());
				if !split.is_empty() {
					let combo = Self::key_of(values, split);
					*split_counts.entry(combo).or_insert(0) += 1;
				}
				OutKey::Group(key)
			}
		}
	}

	/// Bookkeeping for a row leaving the view. `values` are the row's
	/// last known values. Returns the output key it belonged to.
	fn exclude(&mut self, row: RowId, values: &[Value]) -> Option<OutKey> {
		let ViewState {
			mode,
			groups,
			row_keys,
			split_counts,
			..
		} = self;
		let key = row_keys.remove(&row)?;
		match mode {
			Mode::Raw {
				..
			} => Some(OutKey::Row(row)),
			Mode::Grouped {
				split,
				..
			} => {
				if let Some(members) = groups.get_mut(&key) {
					if let Ok(ordinal) = members.binary_search(&row) {
						members.remove(ordinal);
					}
					if members.is_empty() {
						groups.remove(&key);
					}
				}
				if !split.is_empty() {
					let combo = Self::key_of(values, split);
					if let Some(count) = split_counts.get_mut(&combo) {
						*count -= 1;
						if *count == 0 {
							split_counts.remove(&combo);
						}
					}
				}
				Some(OutKey::Group(key))
			}
		}
	}

	fn all_keys(&self) -> impl Iterator<Item = OutKey> + '_ {
		let grouped = matches!(self.mode, Mode::Grouped { .. });
		let groups = self.groups.keys().map(|key| OutKey::Group(key.clone()));
		let rows = self.row_keys.keys().map(|row| OutKey::Row(*row));
		groups.chain(rows.filter(move |_| !grouped))
	}

	/// React to one table mutation: update membership, re-aggregate only
	/// the touched output rows, and diff old against new output.
	fn apply_change(&mut self, data: &TableData, change: &TableChange) {
		let mut affected: BTreeSet<OutKey> = BTreeSet::new();

		for diff in &change.diffs {
			match diff {
				RowDiff::Insert {
					row,
					post,
				} => {
					if self.passes(post) {
						affected.insert(self.include(*row, post));
					}
				}
				RowDiff::Update {
					row,
					pre,
					post,
				} => {
					if let Some(key) = self.exclude(*row, pre) {
						affected.insert(key);
					}
					if self.passes(post) {
						affected.insert(self.include(*row, post));
					}
				}
				RowDiff::Remove {
					row,
					pre,
				} => {
					if let Some(key) = self.exclude(*row, pre) {
						affected.insert(key);
					}
				}
			}
		}

		// A split-by view's output columns follow the data. When the
		// combination set changes, every output row changes shape.
		let out_columns = self.compute_out_columns();
		let schema_changed = out_columns != self.out_columns;
		if schema_changed {
			self.out_columns = out_columns;
			self.schema_version += 1;
			self.resolve_sort();
			affected.extend(self.output.keys().cloned());
			affected.extend(self.all_keys());
			tracing::debug!("output columns changed, now at version {}", self.schema_version);
		}

		let mut changed: Vec<(DeltaRecord, OutRow)> = Vec::new();
		for key in affected {
			let new_row = self.compute_row(data, &key);
			let old_row = self.output.get(&key);
			let record =
				diff_row(&key, old_row.map(|r| &r.values), new_row.as_ref().map(|r| &r.values));
			if let Some(record) = record {
				// Removes order by their last known values.
				let order_row = match &new_row {
					Some(row) => OutRow {
						values: row.values.clone(),
						tie: row.tie,
					},
					None => {
						let old = old_row.expect("diffed remove has an old row");
						OutRow {
							values: old.values.clone(),
							tie: old.tie,
						}
					}
				};
				changed.push((record, order_row));
			}
			match new_row {
				Some(row) => {
					self.output.insert(key, row);
				}
				None => {
					self.output.remove(&key);
				}
			}
		}

		changed.sort_by(|a, b| self.compare_rows(&a.1, &b.1));
		let delta = Delta {
			records: changed.into_iter().map(|(record, _)| record).collect(),
			schema_changed,
		};
		if !delta.is_empty() {
			self.emit(&delta);
		}
	}

	/// Recompute one output row from its member rows in current storage.
	fn compute_row(&self, data: &TableData, key: &OutKey) -> Option<OutRow> {
		match (&self.mode, key) {
			(
				Mode::Raw {
					columns,
				},
				OutKey::Row(row),
			) => {
				if !self.row_keys.contains_key(row) {
					return None;
				}
				let values =
					columns.iter().map(|c| data.value(*row, *c).unwrap_or(Value::Undefined)).collect();
				Some(OutRow {
					values,
					tie: row.0,
				})
			}
			(
				Mode::Grouped {
					split,
					aggs,
					..
				},
				OutKey::Group(group_key),
			) => {
				let members = self.groups.get(group_key)?;
				let mut values = group_key.clone();

				if split.is_empty() {
					for spec in aggs {
						let cells: Vec<Value> = members
							.iter()
							.map(|row| {
								data.value(*row, spec.column).unwrap_or(Value::Undefined)
							})
							.collect();
						values.push(spec.agg.apply(spec.input, &cells));
					}
				} else {
					let mut by_combo: HashMap<Vec<Value>, Vec<RowId>> = HashMap::new();
					for row in members {
						let combo: Vec<Value> = split
							.iter()
							.map(|c| data.value(*row, *c).unwrap_or(Value::Undefined))
							.collect();
						by_combo.entry(combo).or_default().push(*row);
					}
					for combo in self.split_counts.keys() {
						match by_combo.get(combo) {
							Some(rows) => {
								for spec in aggs {
									let cells: Vec<Value> = rows
										.iter()
										.map(|row| {
											data.value(*row, spec.column)
												.unwrap_or(Value::Undefined)
										})
										.collect();
									values.push(spec.agg.apply(spec.input, &cells));
								}
							}
							// This group has no rows under the
							// combination.
							None => {
								for _ in aggs {
									values.push(Value::Undefined);
								}
							}
						}
					}
				}
				Some(OutRow {
					values,
					tie: members.first().map(|row| row.0).unwrap_or(0),
				})
			}
			_ => None,
		}
	}

	fn compute_out_columns(&self) -> Vec<(String, Type)> {
		match &self.mode {
			Mode::Raw {
				columns,
			} => columns
				.iter()
				.map(|c| (self.schema.name_at(*c).to_string(), self.schema.type_at(*c)))
				.collect(),
			Mode::Grouped {
				group,
				split,
				aggs,
			} => {
				let mut out: Vec<(String, Type)> = group
					.iter()
					.map(|c| (self.schema.name_at(*c).to_string(), self.schema.type_at(*c)))
					.collect();
				if split.is_empty() {
					out.extend(aggs.iter().map(|spec| {
						(spec.name.clone(), spec.agg.output_type(spec.input))
					}));
				} else {
					for combo in self.split_counts.keys() {
						let prefix = combo
							.iter()
							.map(|value| value.to_string())
							.collect::<Vec<_>>()
							.join("|");
						for spec in aggs {
							out.push((
								format!("{}|{}", prefix, spec.name),
								spec.agg.output_type(spec.input),
							));
						}
					}
				}
				out
			}
		}
	}

	fn resolve_sort(&mut self) {
		self.sort_resolved = self
			.sort
			.iter()
			.filter_map(|(name, dir)| {
				self.out_columns.iter().position(|(col, _)| col == name).map(|p| (p, *dir))
			})
			.collect();
	}

	/// Deterministic output order: explicit sort terms, then group key
	/// ascending, then original insertion order.
	fn compare_rows(&self, a: &OutRow, b: &OutRow) -> Ordering {
		for (position, dir) in &self.sort_resolved {
			let ordering = a.values[*position].cmp(&b.values[*position]);
			let ordering = match dir {
				SortDir::Asc => ordering,
				SortDir::Desc => ordering.reverse(),
			};
			if ordering != Ordering::Equal {
				return ordering;
			}
		}
		if let Mode::Grouped {
			group,
			..
		} = &self.mode
		{
			for position in 0..group.len() {
				let ordering = a.values[position].cmp(&b.values[position]);
				if ordering != Ordering::Equal {
					return ordering;
				}
			}
		}
		a.tie.cmp(&b.tie)
	}

	fn sorted_output(&self) -> Vec<(&OutKey, &OutRow)> {
		let mut rows: Vec<(&OutKey, &OutRow)> = self.output.iter().collect();
		rows.sort_by(|a, b| self.compare_rows(a.1, b.1));
		rows
	}

	fn emit(&mut self, delta: &Delta) {
		let ViewState {
			listeners,
			out_columns,
			schema_version,
			..
		} = self;
		for (_, listener) in listeners.iter_mut() {
			listener(DeltaEvent {
				delta,
				columns: out_columns,
				schema_version: *schema_version,
			});
		}
	}
}

struct ViewObserver {
	state: Arc<Mutex<ViewState>>,
}

impl TableObserver for ViewObserver {
	fn on_change(&mut self, data: &TableData, change: &TableChange) {
		self.state.lock().apply_change(data, change);
	}
}

/// A derived, incrementally maintained projection over one table.
///
/// Holds only a weak reference to its table; dropping the table tears the
/// view's data path down with it.
pub struct View {
	state: Arc<Mutex<ViewState>>,
	table: WeakTable,
	observer: ObserverId,
}

impl std::fmt::Debug for View {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("View")
			.field("observer", &self.observer)
			.finish_non_exhaustive()
	}
}

impl View {
	/// Current output as one record per row, in deterministic order.
	pub fn to_rows(&self) -> Vec<IndexMap<String, Value>> {
		let state = self.state.lock();
		state.sorted_output()
			.into_iter()
			.map(|(_, row)| {
				state.out_columns
					.iter()
					.zip(&row.values)
					.map(|((name, _), value)| (name.clone(), value.clone()))
					.collect()
			})
			.collect()
	}

	/// Current output as one value array per column, in the same order as
	/// [`View::to_rows`].
	pub fn to_columnar(&self) -> Vec<FrameColumn> {
		let state = self.state.lock();
		let rows = state.sorted_output();
		state.out_columns
			.iter()
			.enumerate()
			.map(|(position, (name, ty))| {
				let data = rows.iter().map(|(_, row)| row.values[position].clone()).collect();
				FrameColumn::new(name.clone(), *ty, data)
			})
			.collect()
	}

	/// Full current output expressed as an all-insert delta, plus the
	/// output columns and schema version it applies to. This is what a
	/// new subscriber receives.
	pub fn snapshot(&self) -> (Delta, Vec<(String, Type)>, u32) {
		self.snapshot_and(|delta, columns, version| (delta.clone(), columns.to_vec(), version))
	}

	/// Run `f` on the current snapshot while the view lock is held, so no
	/// delta can slip in between taking the snapshot and registering its
	/// consumer. `f` must not call back into this view or its table.
	pub fn snapshot_and<R>(&self, f: impl FnOnce(&Delta, &[(String, Type)], u32) -> R) -> R {
		let state = self.state.lock();
		let records = state
			.sorted_output()
			.into_iter()
			.map(|(key, row)| DeltaRecord {
				key: key.clone(),
				op: DeltaOp::Insert,
				values: row.values.clone(),
			})
			.collect();
		let delta = Delta {
			records,
			schema_changed: false,
		};
		f(&delta, &state.out_columns, state.schema_version)
	}

	pub fn columns(&self) -> Vec<(String, Type)> {
		self.state.lock().out_columns.clone()
	}

	pub fn schema_version(&self) -> u32 {
		self.state.lock().schema_version
	}

	pub fn row_count(&self) -> usize {
		self.state.lock().output.len()
	}

	/// Register a delta listener. Listeners run synchronously inside the
	/// mutation's critical section and must not block.
	pub fn on_delta(&self, listener: impl FnMut(DeltaEvent<'_>) + Send + 'static) -> ListenerId {
		let mut state = self.state.lock();
		let id = ListenerId(state.next_listener);
		state.next_listener += 1;
		state.listeners.push((id, Box::new(listener)));
		id
	}

	pub fn remove_listener(&self, id: ListenerId) {
		self.state.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
	}

	/// Unregister from the table and drop all derived state.
	pub fn delete(self) {
		if let Some(table) = self.table.upgrade() {
			table.unregister_observer(self.observer);
		}
	}
}

/// Extends [`Table`] with view construction.
pub trait TableViewExt {
	/// Create a view over this table. The initial output is computed
	/// eagerly; the view stays consistent through every later mutation.
	fn view(&self, config: ViewConfig) -> Result<View>;
}

impl TableViewExt for Table {
	fn view(&self, config: ViewConfig) -> Result<View> {
		let (observer, state) = self.observe(|data| {
			let state = Arc::new(Mutex::new(ViewState::build(config, data)?));
			Ok((
				ViewObserver {
					state: state.clone(),
				},
				state,
			))
		})?;
		Ok(View {
			state,
			table: self.downgrade(),
			observer,
		})
	}
}
