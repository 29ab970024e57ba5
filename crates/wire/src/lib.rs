// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Binary columnar wire format for Prism update propagation.
//!
//! Every message is laid out as:
//!
//! ```text
//! [u32 message-kind][u32 name-len][name bytes][u32 schema-version][payload]
//! ```
//!
//! The payload is column-oriented: a schema header, one value array per
//! column, then an operation-tag array with one tag per row. All integers
//! are little-endian. The same column layout (without the operation array)
//! is accepted by `Table::update` as a pre-encoded ingestion buffer.

pub mod codec;
pub mod frame;

pub use codec::{decode_columns, decode_message, encode_columns, encode_message};
pub use frame::{Frame, FrameColumn, MessageHeader, MessageKind, Op};
