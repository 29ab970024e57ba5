// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! WebSocket server subsystem.
//!
//! Manages the accept loop, connection limiting and graceful shutdown
//! around [`crate::handler::handle_connection`].

use std::{
	net::SocketAddr,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use parking_lot::RwLock;
use prism_type::{Error, Result};
use tokio::{
	net::TcpListener,
	spawn,
	sync::{Semaphore, watch},
	time::{Instant, sleep},
};

use crate::{handler::handle_connection, host::Host};

#[derive(Clone, Debug)]
pub struct WsConfig {
	/// Address and port to bind to (e.g. "0.0.0.0:8080").
	pub bind_addr: String,
	pub max_connections: usize,
}

impl Default for WsConfig {
	fn default() -> Self {
		Self {
			bind_addr: "0.0.0.0:8080".to_string(),
			max_connections: 256,
		}
	}
}

/// WebSocket server for a [`Host`].
///
/// Accepts connections up to the configured limit, hands each one to the
/// connection handler, and drains them on shutdown.
pub struct WsSubsystem {
	config: WsConfig,
	host: Host,
	/// Actual bound address (available after start).
	actual_addr: RwLock<Option<SocketAddr>>,
	running: Arc<AtomicBool>,
	active_connections: Arc<AtomicUsize>,
	shutdown_tx: Option<watch::Sender<bool>>,
	connection_semaphore: Arc<Semaphore>,
}

impl WsSubsystem {
	pub fn new(config: WsConfig, host: Host) -> Self {
		let max_connections = config.max_connections;
		Self {
			config,
			host,
			actual_addr: RwLock::new(None),
			running: Arc::new(AtomicBool::new(false)),
			active_connections: Arc::new(AtomicUsize::new(0)),
			shutdown_tx: None,
			connection_semaphore: Arc::new(Semaphore::new(max_connections)),
		}
	}

	/// Get the actual bound address (available after start).
	pub fn local_addr(&self) -> Option<SocketAddr> {
		*self.actual_addr.read()
	}

	pub fn port(&self) -> Option<u16> {
		self.local_addr().map(|addr| addr.port())
	}

	pub fn active_connections(&self) -> usize {
		self.active_connections.load(Ordering::SeqCst)
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	/// Bind and start accepting connections. Idempotent.
	pub async fn start(&mut self) -> Result<()> {
		if self.running.load(Ordering::SeqCst) {
			return Ok(());
		}

		let addr = self.config.bind_addr.clone();
		let listener = TcpListener::bind(&addr)
			.await
			.map_err(|e| Error::Network(format!("failed to bind {}: {}", addr, e)))?;
		let actual_addr = listener
			.local_addr()
			.map_err(|e| Error::Network(format!("bound address unavailable: {}", e)))?;
		*self.actual_addr.write() = Some(actual_addr);
		tracing::info!("WebSocket server bound to {}", actual_addr);

		let (tx, mut rx) = watch::channel(false);
		let host = self.host.clone();
		let running = self.running.clone();
		let active_connections = self.active_connections.clone();
		let semaphore = self.connection_semaphore.clone();

		running.store(true, Ordering::SeqCst);
		spawn(async move {
			loop {
				tokio::select! {
					biased;

					result = rx.changed() => {
						if result.is_err() || *rx.borrow() {
							tracing::info!("WebSocket server shutting down");
							break;
						}
					}

					accept = listener.accept() => {
						match accept {
							Ok((stream, peer)) => {
								let permit = match semaphore.clone().try_acquire_owned() {
									Ok(permit) => permit,
									Err(_) => {
										tracing::warn!("connection limit reached, rejecting {}", peer);
										continue;
									}
								};

								let conn_host = host.clone();
								let shutdown_rx = rx.clone();
								let active = active_connections.clone();

								active.fetch_add(1, Ordering::SeqCst);
								tracing::debug!("accepted connection from {}", peer);

								spawn(async move {
									handle_connection(stream, conn_host, shutdown_rx).await;
									active.fetch_sub(1, Ordering::SeqCst);
									drop(permit);
								});
							}
							Err(e) => {
								tracing::warn!("accept error: {}", e);
							}
						}
					}
				}
			}
			running.store(false, Ordering::SeqCst);
			tracing::info!("WebSocket server stopped");
		});

		self.shutdown_tx = Some(tx);
		Ok(())
	}

	/// Signal shutdown and wait for active connections to drain, up to a
	/// deadline.
	pub async fn shutdown(&mut self) {
		if let Some(tx) = self.shutdown_tx.take() {
			let _ = tx.send(true);
		}

		let deadline = Instant::now() + Duration::from_secs(30);
		while self.active_connections.load(Ordering::SeqCst) > 0 || self.running.load(Ordering::SeqCst) {
			if Instant::now() > deadline {
				tracing::warn!(
					"shutdown timeout with {} connections still active",
					self.active_connections.load(Ordering::SeqCst)
				);
				break;
			}
			sleep(Duration::from_millis(10)).await;
		}
		tracing::debug!("WebSocket server shutdown completed");
	}
}
