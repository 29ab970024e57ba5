// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Update host: bridges view deltas to network subscribers.
//!
//! A [`Host`] owns named table and view registrations. Every delta a hosted
//! view produces is serialized once into the binary wire format and pushed
//! to that view's subscribers in registration order, through bounded
//! channels. A subscriber whose queue overflows is evicted rather than ever
//! stalling the mutation path.
//!
//! [`WsSubsystem`] serves the host over WebSocket: JSON control messages
//! in, binary data frames out.

pub mod handler;
pub mod host;
pub mod protocol;
pub mod server;

pub use host::{Host, HostConfig, HostEvent, SubscriberId};
pub use protocol::{Request, RequestPayload, Response, ResponsePayload};
pub use server::{WsConfig, WsSubsystem};
