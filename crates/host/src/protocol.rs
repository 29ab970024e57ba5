// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! JSON control messages for the WebSocket layer.
//!
//! Clients send [`Request`]s as text frames and receive [`Response`]s the
//! same way. Data flows the other direction as binary frames in the wire
//! format of `prism-wire`.

use serde::{Deserialize, Serialize};

/// A control request. Each request carries a client-chosen `id` used to
/// correlate the response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
	pub id: String,
	#[serde(flatten)]
	pub payload: RequestPayload,
}

/// The payload of a control request, discriminated by the `type` field.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RequestPayload {
	/// Subscribe to a hosted view. The first pushed frame is a full
	/// snapshot.
	Subscribe {
		table: String,
		view: String,
	},
	/// Drop a subscription previously created on this connection.
	Unsubscribe {
		subscriber: String,
	},
}

/// A control response, correlated by `id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
	pub id: String,
	#[serde(flatten)]
	pub payload: ResponsePayload,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ResponsePayload {
	Subscribed {
		subscriber: String,
	},
	Unsubscribed,
	Error {
		message: String,
	},
}
