// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Host registration, snapshot-on-subscribe and backpressure behavior.

use std::collections::HashMap;

use prism_host::{Host, HostConfig, HostEvent};
use prism_store::{Record, Schema, Table};
use prism_type::{Error, Type, Value};
use prism_view::{Aggregate, TableViewExt, ViewConfig};
use prism_wire::{MessageKind, Op, decode_message};
use tokio::sync::mpsc;

fn securities() -> Schema {
	Schema::new([("name", Type::Utf8), ("price", Type::Float8)]).unwrap()
}

fn record(name: &str, price: f64) -> Record {
	Record::from([
		("name".to_string(), Value::utf8(name)),
		("price".to_string(), Value::float8(price)),
	])
}

fn grouped_by_name() -> ViewConfig {
	ViewConfig {
		group_by: vec!["name".to_string()],
		aggregates: HashMap::from([("price".to_string(), Aggregate::Sum)]),
		..Default::default()
	}
}

/// Host a table and a grouped view under well-known names.
fn hosted() -> (Host, Table) {
	let host = Host::new(HostConfig::default());
	let table = Table::create(securities(), None, Some("name")).unwrap();
	let view = table.view(grouped_by_name()).unwrap();
	host.host_table("securities", table.clone()).unwrap();
	host.host_view("securities", "by_name", view).unwrap();
	(host, table)
}

#[test]
fn test_duplicate_names_rejected() {
	let (host, table) = hosted();
	assert!(matches!(
		host.host_table("securities", table.clone()),
		Err(Error::DuplicateName(_))
	));
	let view = table.view(grouped_by_name()).unwrap();
	assert!(matches!(
		host.host_view("securities", "by_name", view),
		Err(Error::DuplicateName(_))
	));
}

#[test]
fn test_unknown_names_rejected() {
	let (host, table) = hosted();
	let (tx, _rx) = mpsc::channel(8);
	assert!(matches!(host.subscribe("ghost", "by_name", tx.clone()), Err(Error::NotFound(_))));
	assert!(matches!(host.subscribe("securities", "ghost", tx), Err(Error::NotFound(_))));

	let view = table.view(grouped_by_name()).unwrap();
	assert!(matches!(host.host_view("ghost", "v", view), Err(Error::NotFound(_))));
}

#[test]
fn test_subscriber_receives_snapshot_then_deltas() {
	let (host, table) = hosted();
	table.update(vec![record("A", 1.0), record("B", 2.0)]).unwrap();

	let (tx, mut rx) = mpsc::channel(8);
	host.subscribe("securities", "by_name", tx).unwrap();

	// Snapshot first: every current row as an insert.
	let (header, frame) = decode_message(&rx.try_recv().unwrap()).unwrap();
	assert_eq!(header.kind, MessageKind::Snapshot);
	assert_eq!(header.name, "securities/by_name");
	assert_eq!(frame.ops, vec![Op::Insert, Op::Insert]);
	assert_eq!(frame.columns[0].name, "__id__");
	assert_eq!(frame.columns[1].data, vec![Value::utf8("A"), Value::utf8("B")]);
	assert_eq!(frame.columns[2].data, vec![Value::float8(1.0), Value::float8(2.0)]);

	// A mutation pushes exactly its delta.
	table.update(vec![record("A", 5.0)]).unwrap();
	let (header, frame) = decode_message(&rx.try_recv().unwrap()).unwrap();
	assert_eq!(header.kind, MessageKind::Delta);
	assert_eq!(frame.ops, vec![Op::Update]);
	assert_eq!(frame.columns[2].data, vec![Value::float8(5.0)]);

	// Idempotent rewrite: no delta, nothing pushed.
	table.update(vec![record("A", 5.0)]).unwrap();
	assert!(rx.try_recv().is_err());
}

#[test]
fn test_snapshot_matches_view_at_subscribe_time() {
	let (host, table) = hosted();
	table.update(vec![record("A", 1.0)]).unwrap();

	let (tx, mut rx) = mpsc::channel(8);
	host.subscribe("securities", "by_name", tx).unwrap();
	table.update(vec![record("B", 2.0)]).unwrap();

	// First message is the one-row snapshot, then the delta for B.
	let (header, frame) = decode_message(&rx.try_recv().unwrap()).unwrap();
	assert_eq!(header.kind, MessageKind::Snapshot);
	assert_eq!(frame.row_count(), 1);
	let (header, frame) = decode_message(&rx.try_recv().unwrap()).unwrap();
	assert_eq!(header.kind, MessageKind::Delta);
	assert_eq!(frame.columns[1].data, vec![Value::utf8("B")]);
}

#[test]
fn test_slow_subscriber_is_evicted_not_waited_for() {
	let (host, table) = hosted();
	let events = host.events();

	// Queue bound of one: the snapshot fills it, the first delta
	// overflows it.
	let (tx, _rx) = mpsc::channel(1);
	let subscriber = host.subscribe("securities", "by_name", tx).unwrap();

	table.update(vec![record("A", 1.0)]).unwrap();

	match events.try_recv().unwrap() {
		HostEvent::SubscriberEvicted {
			table,
			view,
			subscriber: evicted,
		} => {
			assert_eq!(table, "securities");
			assert_eq!(view, "by_name");
			assert_eq!(evicted, subscriber);
		}
	}

	// The mutation path is unaffected afterwards.
	table.update(vec![record("B", 2.0)]).unwrap();
	assert_eq!(table.size(), 2);
	assert!(events.try_recv().is_err(), "evicted subscriber must not be evicted twice");
}

#[test]
fn test_unsubscribe_stops_delivery() {
	let (host, table) = hosted();
	let (tx, mut rx) = mpsc::channel(8);
	let subscriber = host.subscribe("securities", "by_name", tx).unwrap();
	rx.try_recv().unwrap();

	assert!(host.unsubscribe("securities", "by_name", subscriber));
	assert!(!host.unsubscribe("securities", "by_name", subscriber));

	table.update(vec![record("A", 1.0)]).unwrap();
	assert!(rx.try_recv().is_err());
}

#[test]
fn test_teardown_closes_channels() {
	let (host, table) = hosted();
	let (tx, mut rx) = mpsc::channel(8);
	host.subscribe("securities", "by_name", tx).unwrap();
	rx.try_recv().unwrap();

	host.teardown();
	assert!(host.table_names().is_empty());
	assert!(host.view_names().is_empty());
	assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));

	// The table itself outlives the host registration.
	table.update(vec![record("A", 1.0)]).unwrap();
}

#[test]
fn test_remove_table_drops_its_views() {
	let (host, _table) = hosted();
	host.remove_table("securities").unwrap();
	assert!(host.view_names().is_empty());
	assert!(matches!(host.get_table("securities"), Err(Error::NotFound(_))));
}
