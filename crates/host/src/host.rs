// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::{
	fmt::{Display, Formatter},
	sync::Arc,
};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::RwLock;
use prism_store::Table;
use prism_type::{Error, Result, Type, Value};
use prism_view::{DeltaOp, DeltaRecord, ListenerId, View};
use prism_wire::{Frame, FrameColumn, MessageHeader, MessageKind, Op, encode_message};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for one subscription channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
	fn generate() -> Self {
		SubscriberId(Uuid::now_v7())
	}
}

impl Display for SubscriberId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for SubscriberId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Uuid::parse_str(s).map(SubscriberId).map_err(|_| Error::NotFound(s.to_string()))
	}
}

/// Observable host-level events.
#[derive(Clone, Debug)]
pub enum HostEvent {
	/// A subscriber's outbound queue exceeded its bound and the
	/// subscription was dropped.
	SubscriberEvicted {
		table: String,
		view: String,
		subscriber: SubscriberId,
	},
}

#[derive(Clone, Debug)]
pub struct HostConfig {
	/// Bound on each subscriber's outbound queue. A subscriber that
	/// falls further behind than this is evicted.
	pub channel_capacity: usize,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			channel_capacity: 64,
		}
	}
}

struct Subscriber {
	id: SubscriberId,
	tx: mpsc::Sender<Vec<u8>>,
}

/// Subscribers in registration order, shared with the view's delta
/// listener.
type SubscriberList = Arc<RwLock<Vec<Subscriber>>>;

struct HostedView {
	view: View,
	listener: ListenerId,
	subscribers: SubscriberList,
}

struct HostInner {
	config: HostConfig,
	tables: DashMap<String, Table>,
	views: DashMap<(String, String), HostedView>,
	events_tx: crossbeam_channel::Sender<HostEvent>,
	events_rx: crossbeam_channel::Receiver<HostEvent>,
}

/// Named table and view registry with subscriber fan-out.
///
/// Cloning is cheap; clones share the same registrations.
#[derive(Clone)]
pub struct Host {
	inner: Arc<HostInner>,
}

impl Default for Host {
	fn default() -> Self {
		Self::new(HostConfig::default())
	}
}

impl Host {
	pub fn new(config: HostConfig) -> Self {
		let (events_tx, events_rx) = crossbeam_channel::unbounded();
		Self {
			inner: Arc::new(HostInner {
				config,
				tables: DashMap::new(),
				views: DashMap::new(),
				events_tx,
				events_rx,
			}),
		}
	}

	pub fn channel_capacity(&self) -> usize {
		self.inner.config.channel_capacity
	}

	/// Receiver for host events. Events are consumed once across all
	/// receivers.
	pub fn events(&self) -> crossbeam_channel::Receiver<HostEvent> {
		self.inner.events_rx.clone()
	}

	/// Register a table under a name.
	pub fn host_table(&self, name: &str, table: Table) -> Result<()> {
		match self.inner.tables.entry(name.to_string()) {
			Entry::Occupied(_) => Err(Error::DuplicateName(name.to_string())),
			Entry::Vacant(entry) => {
				entry.insert(table);
				tracing::debug!("hosted table '{}'", name);
				Ok(())
			}
		}
	}

	pub fn get_table(&self, name: &str) -> Result<Table> {
		self.inner
			.tables
			.get(name)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| Error::NotFound(name.to_string()))
	}

	/// Register a view under a name, scoped to a hosted table. Deltas the
	/// view produces start flowing to subscribers of this name.
	pub fn host_view(&self, table_name: &str, view_name: &str, view: View) -> Result<()> {
		if !self.inner.tables.contains_key(table_name) {
			return Err(Error::NotFound(table_name.to_string()));
		}
		let key = (table_name.to_string(), view_name.to_string());
		if self.inner.views.contains_key(&key) {
			return Err(Error::DuplicateName(format!("{}/{}", table_name, view_name)));
		}

		let subscribers: SubscriberList = Arc::new(RwLock::new(Vec::new()));
		let wire_name = format!("{}/{}", table_name, view_name);
		let listener = {
			let subscribers = subscribers.clone();
			let events_tx = self.inner.events_tx.clone();
			let table_name = table_name.to_string();
			let view_name = view_name.to_string();
			view.on_delta(move |event| {
				let mut messages = Vec::with_capacity(2);
				if event.delta.schema_changed {
					messages.push(encode(
						MessageKind::SchemaChanged,
						&wire_name,
						event.schema_version,
						&Frame::default(),
					));
				}
				let frame = delta_frame(&event.delta.records, event.columns);
				messages.push(encode(MessageKind::Delta, &wire_name, event.schema_version, &frame));

				push_all(
					&subscribers,
					&messages,
					&wire_name,
					event.schema_version,
					&events_tx,
					&table_name,
					&view_name,
				);
			})
		};

		self.inner.views.insert(
			key,
			HostedView {
				view,
				listener,
				subscribers,
			},
		);
		tracing::debug!("hosted view '{}/{}'", table_name, view_name);
		Ok(())
	}

	/// Subscribe a channel to a hosted view.
	///
	/// The channel immediately receives a full-snapshot message, so a new
	/// subscriber starts from exactly the view's current output.
	pub fn subscribe(&self, table_name: &str, view_name: &str, tx: mpsc::Sender<Vec<u8>>) -> Result<SubscriberId> {
		let key = (table_name.to_string(), view_name.to_string());
		let hosted = self
			.inner
			.views
			.get(&key)
			.ok_or_else(|| Error::NotFound(format!("{}/{}", table_name, view_name)))?;

		let id = SubscriberId::generate();
		let wire_name = format!("{}/{}", table_name, view_name);

		// The view lock is held across snapshot and registration, so the
		// subscriber cannot miss a delta in between or receive one that
		// predates its snapshot.
		hosted.view.snapshot_and(|delta, columns, version| {
			let frame = delta_frame(&delta.records, columns);
			let message = encode(MessageKind::Snapshot, &wire_name, version, &frame);
			let _ = tx.try_send(message);
			hosted.subscribers.write().push(Subscriber {
				id,
				tx: tx.clone(),
			});
		});

		tracing::debug!("subscriber {} joined '{}'", id, wire_name);
		Ok(id)
	}

	/// Drop one subscription. Takes effect at the next delta boundary;
	/// returns false if the subscription was already gone.
	pub fn unsubscribe(&self, table_name: &str, view_name: &str, id: SubscriberId) -> bool {
		let key = (table_name.to_string(), view_name.to_string());
		let Some(hosted) = self.inner.views.get(&key) else {
			return false;
		};
		let mut subscribers = hosted.subscribers.write();
		let before = subscribers.len();
		subscribers.retain(|subscriber| subscriber.id != id);
		before != subscribers.len()
	}

	/// Unregister one view, dropping its subscribers' channels.
	pub fn remove_view(&self, table_name: &str, view_name: &str) -> Result<()> {
		let key = (table_name.to_string(), view_name.to_string());
		let (_, hosted) = self
			.inner
			.views
			.remove(&key)
			.ok_or_else(|| Error::NotFound(format!("{}/{}", table_name, view_name)))?;
		hosted.view.remove_listener(hosted.listener);
		hosted.view.delete();
		Ok(())
	}

	/// Unregister a table and every view hosted under it.
	pub fn remove_table(&self, name: &str) -> Result<()> {
		let (name, _) =
			self.inner.tables.remove(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
		let orphaned: Vec<(String, String)> = self
			.inner
			.views
			.iter()
			.filter(|entry| entry.key().0 == name)
			.map(|entry| entry.key().clone())
			.collect();
		for (table_name, view_name) in orphaned {
			let _ = self.remove_view(&table_name, &view_name);
		}
		Ok(())
	}

	/// Unregister everything and close all subscriber channels.
	pub fn teardown(&self) {
		let views: Vec<(String, String)> =
			self.inner.views.iter().map(|entry| entry.key().clone()).collect();
		for (table_name, view_name) in views {
			let _ = self.remove_view(&table_name, &view_name);
		}
		self.inner.tables.clear();
		tracing::debug!("host torn down");
	}

	pub fn table_names(&self) -> Vec<String> {
		self.inner.tables.iter().map(|entry| entry.key().clone()).collect()
	}

	pub fn view_names(&self) -> Vec<(String, String)> {
		self.inner.views.iter().map(|entry| entry.key().clone()).collect()
	}
}

/// Build the columnar wire frame for a set of delta records: the stable
/// row identity first, then one array per output column, then the op tags.
fn delta_frame(records: &[DeltaRecord], columns: &[(String, Type)]) -> Frame {
	let mut id_data = Vec::with_capacity(records.len());
	let mut ops = Vec::with_capacity(records.len());
	for record in records {
		id_data.push(Value::Int8(record.key.id() as i64));
		ops.push(match record.op {
			DeltaOp::Insert => Op::Insert,
			DeltaOp::Update => Op::Update,
			DeltaOp::Remove => Op::Remove,
		});
	}

	let mut frame_columns = Vec::with_capacity(columns.len() + 1);
	frame_columns.push(FrameColumn::new("__id__", Type::Int8, id_data));
	for (position, (name, ty)) in columns.iter().enumerate() {
		let data = records
			.iter()
			// A remove that predates a schema change may be narrower
			// than the current output.
			.map(|record| record.values.get(position).cloned().unwrap_or(Value::Undefined))
			.collect();
		frame_columns.push(FrameColumn::new(name.clone(), *ty, data));
	}
	Frame {
		columns: frame_columns,
		ops,
	}
}

fn encode(kind: MessageKind, name: &str, schema_version: u32, frame: &Frame) -> Vec<u8> {
	let header = MessageHeader {
		kind,
		name: name.to_string(),
		schema_version,
	};
	// The frame is built column-consistent above; encoding cannot fail.
	encode_message(&header, frame).unwrap_or_default()
}

/// Push serialized messages to every subscriber in registration order.
/// Subscribers whose queue is full or closed are dropped; the caller (the
/// mutation path) never blocks.
fn push_all(
	subscribers: &SubscriberList,
	messages: &[Vec<u8>],
	wire_name: &str,
	schema_version: u32,
	events_tx: &crossbeam_channel::Sender<HostEvent>,
	table_name: &str,
	view_name: &str,
) {
	let mut evicted = Vec::new();
	{
		let subscribers = subscribers.read();
		for subscriber in subscribers.iter() {
			for message in messages {
				if subscriber.tx.try_send(message.clone()).is_err() {
					evicted.push(subscriber.id);
					break;
				}
			}
		}
	}
	if evicted.is_empty() {
		return;
	}

	let goodbye = encode(MessageKind::SubscriberEvicted, wire_name, schema_version, &Frame::default());
	let mut subscribers = subscribers.write();
	for id in evicted {
		if let Some(position) = subscribers.iter().position(|subscriber| subscriber.id == id) {
			let subscriber = subscribers.remove(position);
			// Best effort; the queue that got it evicted is likely
			// still full.
			let _ = subscriber.tx.try_send(goodbye.clone());
			tracing::warn!("evicted slow subscriber {} from '{}'", id, wire_name);
			let _ = events_tx.send(HostEvent::SubscriberEvicted {
				table: table_name.to_string(),
				view: view_name.to_string(),
				subscriber: id,
			});
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_delta_frame_shapes_columns() {
		use prism_view::OutKey;

		let records = vec![
			DeltaRecord {
				key: OutKey::Group(vec![Value::utf8("a")]),
				op: DeltaOp::Insert,
				values: vec![Value::utf8("a"), Value::float8(1.0)],
			},
			DeltaRecord {
				key: OutKey::Group(vec![Value::utf8("b")]),
				op: DeltaOp::Remove,
				values: vec![Value::utf8("b"), Value::float8(2.0)],
			},
		];
		let columns = vec![("name".to_string(), Type::Utf8), ("price".to_string(), Type::Float8)];

		let frame = delta_frame(&records, &columns);
		assert_eq!(frame.columns.len(), 3);
		assert_eq!(frame.columns[0].name, "__id__");
		assert_eq!(frame.columns[1].data, vec![Value::utf8("a"), Value::utf8("b")]);
		assert_eq!(frame.ops, vec![Op::Insert, Op::Remove]);
		frame.validate().unwrap();
	}
}
