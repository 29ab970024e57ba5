// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Per-connection WebSocket handling.

use futures_util::{SinkExt, StreamExt};
use tokio::{
	net::TcpStream,
	sync::{mpsc, watch},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::{
	host::{Host, SubscriberId},
	protocol::{Request, RequestPayload, Response, ResponsePayload},
};

/// Serve one WebSocket connection until the peer closes, the transport
/// errors, or the server shuts down. All subscriptions created on the
/// connection are dropped on the way out.
pub async fn handle_connection(stream: TcpStream, host: Host, mut shutdown: watch::Receiver<bool>) {
	let ws = match accept_async(stream).await {
		Ok(ws) => ws,
		Err(e) => {
			tracing::warn!("WebSocket handshake failed: {}", e);
			return;
		}
	};
	let (mut sink, mut stream) = ws.split();

	// The push channel is the subscriber's backpressure bound: when this
	// connection stops draining it, the host evicts its subscriptions.
	let (tx, mut rx) = mpsc::channel::<Vec<u8>>(host.channel_capacity());
	let mut subscriptions: Vec<(String, String, SubscriberId)> = Vec::new();

	loop {
		tokio::select! {
			biased;

			result = shutdown.changed() => {
				if result.is_err() || *shutdown.borrow() {
					break;
				}
			}

			Some(message) = rx.recv() => {
				if sink.send(Message::Binary(message.into())).await.is_err() {
					break;
				}
			}

			incoming = stream.next() => {
				match incoming {
					Some(Ok(Message::Text(text))) => {
						let response = match serde_json::from_str::<Request>(text.as_str()) {
							Ok(request) => {
								handle_request(&host, request, &tx, &mut subscriptions)
							}
							Err(e) => Response {
								id: String::new(),
								payload: ResponsePayload::Error {
									message: format!("malformed request: {}", e),
								},
							},
						};
						let encoded = serde_json::to_string(&response)
							.unwrap_or_else(|_| "{}".to_string());
						if sink.send(Message::text(encoded)).await.is_err() {
							break;
						}
					}
					Some(Ok(Message::Ping(payload))) => {
						let _ = sink.send(Message::Pong(payload)).await;
					}
					Some(Ok(Message::Close(_))) | None => break,
					Some(Ok(_)) => {}
					Some(Err(e)) => {
						tracing::debug!("connection error: {}", e);
						break;
					}
				}
			}
		}
	}

	for (table, view, subscriber) in subscriptions {
		host.unsubscribe(&table, &view, subscriber);
	}
}

fn handle_request(
	host: &Host,
	request: Request,
	tx: &mpsc::Sender<Vec<u8>>,
	subscriptions: &mut Vec<(String, String, SubscriberId)>,
) -> Response {
	let payload = match request.payload {
		RequestPayload::Subscribe {
			table,
			view,
		} => match host.subscribe(&table, &view, tx.clone()) {
			Ok(subscriber) => {
				subscriptions.push((table, view, subscriber));
				ResponsePayload::Subscribed {
					subscriber: subscriber.to_string(),
				}
			}
			Err(e) => ResponsePayload::Error {
				message: e.to_string(),
			},
		},
		RequestPayload::Unsubscribe {
			subscriber,
		} => match subscriber.parse::<SubscriberId>() {
			Ok(id) => {
				let mut dropped = false;
				subscriptions.retain(|(table, view, subscription)| {
					if *subscription == id {
						dropped |= host.unsubscribe(table, view, id);
						false
					} else {
						true
					}
				});
				if dropped {
					ResponsePayload::Unsubscribed
				} else {
					ResponsePayload::Error {
						message: format!("not found: '{}'", subscriber),
					}
				}
			}
			Err(e) => ResponsePayload::Error {
				message: e.to_string(),
			},
		},
	};
	Response {
		id: request.id,
		payload,
	}
}
