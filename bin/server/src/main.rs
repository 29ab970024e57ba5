// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Demo host: a bounded securities table fed with random rows on a timer,
//! served over WebSocket.
//!
//! Clients subscribe with a JSON control message and receive binary
//! columnar frames:
//!
//! ```json
//! {"id":"1","type":"Subscribe","payload":{"table":"table_one","view":"view_one"}}
//! ```

use std::{collections::HashMap, env, time::Duration};

use prism_host::{Host, HostConfig, WsConfig, WsSubsystem};
use prism_store::{Record, Schema, Table};
use prism_type::{Result, Timestamp, Type, Value};
use prism_view::{Aggregate, TableViewExt, ViewConfig};
use rand::Rng;
use tracing_subscriber::EnvFilter;

const SECURITIES: &[&str] = &[
	"AAPL.N", "AMZN.N", "QQQ.N", "NVDA.N", "TSLA.N", "FB.N", "MSFT.N", "TLT.N", "XIV.N", "YY.N", "CSCO.N",
	"GOOGL.N", "PCLN.N",
];

const CLIENTS: &[&str] = &["Homer", "Marge", "Bart", "Lisa", "Maggie", "Moe", "Lenny", "Carl", "Krusty"];

const BATCH_SIZE: usize = 5;
const UPDATE_INTERVAL: Duration = Duration::from_millis(2500);

fn securities_schema() -> Result<Schema> {
	Schema::new([
		("name", Type::Utf8),
		("client", Type::Utf8),
		("lastUpdate", Type::Timestamp),
		("chg", Type::Float8),
		("bid", Type::Float8),
		("ask", Type::Float8),
		("vol", Type::Float8),
	])
}

fn new_rows(clock_millis: i64) -> Vec<Record> {
	let mut rng = rand::rng();
	(0..BATCH_SIZE)
		.map(|_| {
			Record::from([
				("name".to_string(), Value::utf8(SECURITIES[rng.random_range(0..SECURITIES.len())])),
				("client".to_string(), Value::utf8(CLIENTS[rng.random_range(0..CLIENTS.len())])),
				("lastUpdate".to_string(), Value::Timestamp(Timestamp(clock_millis))),
				("chg".to_string(), Value::float8(rng.random_range(-10.0..10.0))),
				("bid".to_string(), Value::float8(rng.random_range(90.0..100.0))),
				("ask".to_string(), Value::float8(rng.random_range(100.0..110.0))),
				("vol".to_string(), Value::float8(rng.random_range(100.0..110.0))),
			])
		})
		.collect()
}

fn now_millis() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let bind_addr = env::var("PRISM_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

	let table = Table::create(securities_schema()?, Some(500), None)?;
	table.update(new_rows(now_millis()))?;

	let view = table.view(ViewConfig {
		group_by: vec!["name".to_string()],
		aggregates: HashMap::from([
			("bid".to_string(), Aggregate::Avg),
			("ask".to_string(), Aggregate::Avg),
			("chg".to_string(), Aggregate::Sum),
			("vol".to_string(), Aggregate::Sum),
		]),
		columns: vec![
			"name".to_string(),
			"bid".to_string(),
			"ask".to_string(),
			"chg".to_string(),
			"vol".to_string(),
		],
		..Default::default()
	})?;

	let host = Host::new(HostConfig::default());
	host.host_table("table_one", table.clone())?;
	host.host_view("table_one", "view_one", view)?;

	let mut server = WsSubsystem::new(
		WsConfig {
			bind_addr,
			..Default::default()
		},
		host.clone(),
	);
	server.start().await?;
	tracing::info!("serving table 'table_one' and view 'view_one'");

	// Feed the table on a timer, like any external producer would.
	let producer = {
		let table = table.clone();
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(UPDATE_INTERVAL);
			loop {
				ticker.tick().await;
				if let Err(e) = table.update(new_rows(now_millis())) {
					tracing::warn!("update failed: {}", e);
				}
			}
		})
	};

	tokio::signal::ctrl_c().await.ok();
	tracing::info!("shutting down");
	producer.abort();
	server.shutdown().await;
	host.teardown();
	Ok(())
}
