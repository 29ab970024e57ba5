// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Typed, capacity-bounded, mutable columnar storage.
//!
//! A [`Table`] owns a [`Schema`] and one [`ColumnData`] per column. Rows are
//! identified by a monotonically increasing [`RowId`]. A table runs in one of
//! two mutually exclusive modes: bounded capacity with FIFO eviction, or
//! index-column mode where rows with a matching index value overwrite in
//! place and can be removed by key.
//!
//! Mutations are serialized per table. Registered [`TableObserver`]s are
//! notified synchronously inside the mutation's critical section, so no two
//! change sets for the same table are ever observed concurrently.

pub mod change;
pub mod column;
pub mod ingest;
pub mod schema;
pub mod table;

pub use change::{RowDiff, RowId, TableChange};
pub use column::ColumnData;
pub use ingest::{Record, RowBatch};
pub use schema::Schema;
pub use table::{
	ObserverId, RemoveReport, RowFailure, Table, TableData, TableObserver, UpdateReport, WeakTable,
};
