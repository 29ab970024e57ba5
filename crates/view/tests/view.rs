// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! End-to-end view maintenance tests: incremental recomputation must agree
//! with recomputing from scratch, and deltas must be minimal.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use prism_store::{Record, Schema, Table};
use prism_type::{Error, Type, Value};
use prism_view::{
	Aggregate, Delta, DeltaOp, Filter, FilterOp, Sort, TableViewExt, ViewConfig,
};

fn securities() -> Schema {
	Schema::new([("name", Type::Utf8), ("client", Type::Utf8), ("price", Type::Float8)]).unwrap()
}

fn record(name: &str, client: &str, price: f64) -> Record {
	Record::from([
		("name".to_string(), Value::utf8(name)),
		("client".to_string(), Value::utf8(client)),
		("price".to_string(), Value::float8(price)),
	])
}

fn grouped_by_name() -> ViewConfig {
	ViewConfig {
		group_by: vec!["name".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Sum)]),
		columns: vec!["name".to_string(), "price".to_string()],
		..Default::default()
	}
}

/// Collects every delta a view emits.
fn collect_deltas(view: &prism_view::View) -> Arc<Mutex<Vec<Delta>>> {
	let deltas = Arc::new(Mutex::new(Vec::new()));
	let sink = deltas.clone();
	view.on_delta(move |event| {
		sink.lock().unwrap().push(event.delta.clone());
	});
	deltas
}

#[test]
fn test_grouped_sum() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(grouped_by_name()).unwrap();

	table.update(vec![record("A", "x", 1.0), record("B", "x", 2.0), record("A", "y", 3.0)]).unwrap();

	let rows = view.to_rows();
	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0]["name"], Value::utf8("A"));
	assert_eq!(rows[0]["price"], Value::float8(4.0));
	assert_eq!(rows[1]["name"], Value::utf8("B"));
	assert_eq!(rows[1]["price"], Value::float8(2.0));
}

#[test]
fn test_incremental_matches_recomputation_from_scratch() {
	let table = Table::create(securities(), Some(5), None).unwrap();
	let view = table.view(grouped_by_name()).unwrap();

	// Several batches, including evictions once past capacity.
	table.update(vec![record("A", "x", 1.0), record("B", "x", 2.0)]).unwrap();
	table.update(vec![record("C", "y", 3.0), record("A", "y", 4.0)]).unwrap();
	table.update(vec![record("B", "z", 5.0), record("D", "z", 6.0), record("A", "z", 7.0)]).unwrap();

	// A view created now recomputes from the full table contents.
	let fresh = table.view(grouped_by_name()).unwrap();
	assert_eq!(view.to_rows(), fresh.to_rows());
}

#[test]
fn test_identical_rewrite_produces_empty_delta() {
	let table = Table::create(securities(), None, Some("name")).unwrap();
	let view = table.view(grouped_by_name()).unwrap();

	table.update(vec![record("A", "x", 1.0)]).unwrap();
	let deltas = collect_deltas(&view);

	table.update(vec![record("A", "x", 1.0)]).unwrap();
	assert!(deltas.lock().unwrap().is_empty(), "no observable change must mean no delta");
}

#[test]
fn test_eviction_scenario_drops_oldest_group() {
	// Capacity 3, insert A,B,C then D: A is evicted and the grouped view
	// shows B,C,D with no A.
	let schema = Schema::new([("name", Type::Utf8), ("price", Type::Float8)]).unwrap();
	let table = Table::create(schema, Some(3), None).unwrap();
	let view = table.view(ViewConfig {
		group_by: vec!["name".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Sum)]),
		..Default::default()
	})
	.unwrap();

	let row = |name: &str, price: f64| {
		Record::from([
			("name".to_string(), Value::utf8(name)),
			("price".to_string(), Value::float8(price)),
		])
	};
	table.update(vec![row("A", 1.0), row("B", 2.0), row("C", 3.0)]).unwrap();
	let deltas = collect_deltas(&view);
	table.update(vec![row("D", 4.0)]).unwrap();

	let names: Vec<Value> = view.to_rows().into_iter().map(|mut r| r.swap_remove("name").unwrap()).collect();
	assert_eq!(names, vec![Value::utf8("B"), Value::utf8("C"), Value::utf8("D")]);

	// One mutation, one delta: remove A, insert D.
	let deltas = deltas.lock().unwrap();
	assert_eq!(deltas.len(), 1);
	let ops: Vec<DeltaOp> = deltas[0].records.iter().map(|r| r.op).collect();
	assert!(ops.contains(&DeltaOp::Remove));
	assert!(ops.contains(&DeltaOp::Insert));
	assert_eq!(ops.len(), 2);
}

#[test]
fn test_index_overwrite_emits_single_update() {
	// Index column name: update A from 1.0 to 5.0 keeps one row and the
	// delta is a single update record, not insert plus remove.
	let table = Table::create(securities(), None, Some("name")).unwrap();
	let view = table.view(grouped_by_name()).unwrap();

	table.update(vec![record("A", "x", 1.0)]).unwrap();
	let deltas = collect_deltas(&view);
	table.update(vec![record("A", "x", 5.0)]).unwrap();

	assert_eq!(table.size(), 1);
	let rows = view.to_rows();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0]["price"], Value::float8(5.0));

	let deltas = deltas.lock().unwrap();
	assert_eq!(deltas.len(), 1);
	assert_eq!(deltas[0].records.len(), 1);
	assert_eq!(deltas[0].records[0].op, DeltaOp::Update);
	assert_eq!(deltas[0].records[0].values, vec![Value::utf8("A"), Value::float8(5.0)]);
}

#[test]
fn test_raw_view_filters_and_sorts() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(ViewConfig {
		columns: vec!["name".to_string(), "price".to_string()],
		filter: vec![Filter::new("price", FilterOp::Gt, 1.5)],
		sort: vec![Sort::desc("price")],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("A", "x", 1.0), record("B", "x", 3.0), record("C", "x", 2.0)]).unwrap();

	let rows = view.to_rows();
	assert_eq!(rows.len(), 2);
	assert_eq!(rows[0]["name"], Value::utf8("B"));
	assert_eq!(rows[1]["name"], Value::utf8("C"));
	// Unprojected columns stay out of the output.
	assert!(!rows[0].contains_key("client"));
}

#[test]
fn test_update_that_stops_matching_filter_is_a_remove() {
	let table = Table::create(securities(), None, Some("name")).unwrap();
	let view = table.view(ViewConfig {
		columns: vec!["name".to_string(), "price".to_string()],
		filter: vec![Filter::new("price", FilterOp::Gt, 1.0)],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("A", "x", 2.0)]).unwrap();
	assert_eq!(view.to_rows().len(), 1);

	let deltas = collect_deltas(&view);
	table.update(vec![record("A", "x", 0.5)]).unwrap();

	assert_eq!(view.to_rows().len(), 0);
	let deltas = deltas.lock().unwrap();
	assert_eq!(deltas[0].records.len(), 1);
	assert_eq!(deltas[0].records[0].op, DeltaOp::Remove);
}

#[test]
fn test_sort_ties_break_by_insertion_order() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(ViewConfig {
		columns: vec!["name".to_string(), "price".to_string()],
		sort: vec![Sort::asc("price")],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("first", "x", 1.0), record("second", "x", 1.0), record("third", "x", 0.5)])
		.unwrap();

	let names: Vec<Value> = view.to_rows().into_iter().map(|mut r| r.swap_remove("name").unwrap()).collect();
	assert_eq!(names, vec![Value::utf8("third"), Value::utf8("first"), Value::utf8("second")]);
}

#[test]
fn test_split_by_widens_output_columns() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(ViewConfig {
		group_by: vec!["name".to_string()],
		split_by: vec!["client".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Sum)]),
		columns: vec!["name".to_string(), "price".to_string()],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("A", "x", 1.0), record("A", "y", 2.0), record("B", "x", 3.0)]).unwrap();

	let columns: Vec<String> = view.columns().into_iter().map(|(name, _)| name).collect();
	assert_eq!(columns, vec!["name", "x|price", "y|price"]);

	let rows = view.to_rows();
	assert_eq!(rows[0]["x|price"], Value::float8(1.0));
	assert_eq!(rows[0]["y|price"], Value::float8(2.0));
	// B has no rows under client y.
	assert_eq!(rows[1]["x|price"], Value::float8(3.0));
	assert_eq!(rows[1]["y|price"], Value::Undefined);
}

#[test]
fn test_new_split_value_bumps_schema_version() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(ViewConfig {
		group_by: vec!["name".to_string()],
		split_by: vec!["client".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Sum)]),
		columns: vec!["name".to_string(), "price".to_string()],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("A", "x", 1.0)]).unwrap();
	let before = view.schema_version();

	let deltas = collect_deltas(&view);
	table.update(vec![record("A", "y", 2.0)]).unwrap();

	assert_eq!(view.schema_version(), before + 1);
	assert!(deltas.lock().unwrap()[0].schema_changed);
}

#[test]
fn test_min_max_survive_removal() {
	// Min and max are recomputed from the group's surviving members, so
	// removing the current extreme yields the next one.
	let table = Table::create(securities(), None, Some("name")).unwrap();
	let view = table.view(ViewConfig {
		group_by: vec!["client".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Max)]),
		columns: vec!["client".to_string(), "price".to_string()],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("A", "x", 5.0), record("B", "x", 2.0)]).unwrap();
	assert_eq!(view.to_rows()[0]["price"], Value::float8(5.0));

	table.remove(&[Value::utf8("A")]).unwrap();
	assert_eq!(view.to_rows()[0]["price"], Value::float8(2.0));
}

#[test]
fn test_avg_is_sum_over_count() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(ViewConfig {
		group_by: vec!["name".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Avg)]),
		columns: vec!["name".to_string(), "price".to_string()],
		..Default::default()
	})
	.unwrap();

	table.update(vec![record("A", "x", 1.0), record("A", "y", 2.0), record("A", "z", 6.0)]).unwrap();
	assert_eq!(view.to_rows()[0]["price"], Value::float8(3.0));
}

#[test]
fn test_unknown_columns_rejected() {
	let table = Table::create(securities(), None, None).unwrap();
	for config in [
		ViewConfig {
			group_by: vec!["ghost".to_string()],
			..Default::default()
		},
		ViewConfig {
			sort: vec![Sort::asc("ghost")],
			..Default::default()
		},
		ViewConfig {
			filter: vec![Filter::new("ghost", FilterOp::IsNull, Value::Undefined)],
			..Default::default()
		},
	] {
		assert!(matches!(table.view(config), Err(Error::Schema(_))));
	}
}

#[test]
fn test_distinct_count_rejected() {
	let table = Table::create(securities(), None, None).unwrap();
	let err = table.view(ViewConfig {
		group_by: vec!["name".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::DistinctCount)]),
		..Default::default()
	})
	.unwrap_err();
	assert!(matches!(err, Error::UnsupportedAggregate(_)));
}

#[test]
fn test_deleted_view_stops_receiving() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(grouped_by_name()).unwrap();
	let deltas = collect_deltas(&view);

	view.delete();
	table.update(vec![record("A", "x", 1.0)]).unwrap();
	assert!(deltas.lock().unwrap().is_empty());
}

#[test]
fn test_clear_empties_view() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(grouped_by_name()).unwrap();
	table.update(vec![record("A", "x", 1.0), record("B", "x", 2.0)]).unwrap();

	table.clear();
	assert_eq!(view.to_rows().len(), 0);
}

#[test]
fn test_to_columnar_matches_to_rows() {
	let table = Table::create(securities(), None, None).unwrap();
	let view = table.view(grouped_by_name()).unwrap();
	table.update(vec![record("B", "x", 2.0), record("A", "x", 1.0)]).unwrap();

	let rows = view.to_rows();
	let columns = view.to_columnar();
	assert_eq!(columns.len(), 2);
	for (row_idx, row) in rows.iter().enumerate() {
		for column in &columns {
			assert_eq!(row[column.name.as_str()], column.data[row_idx]);
		}
	}
}
