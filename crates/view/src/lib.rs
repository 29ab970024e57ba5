// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Derived, incrementally maintained projections over Prism tables.
//!
//! A [`View`] is a declarative description — group-by and split-by
//! columns, per-column aggregates, filter predicates, sort order — plus a
//! cached output snapshot. It owns no data: on every table mutation, only
//! the groups touched by the change are re-aggregated, and the old and new
//! output rows are diffed into a [`Delta`] that is pushed to registered
//! listeners.

pub mod aggregate;
pub mod config;
pub mod delta;
pub mod view;

pub use aggregate::Aggregate;
pub use config::{Filter, FilterOp, Sort, SortDir, ViewConfig};
pub use delta::{Delta, DeltaOp, DeltaRecord, OutKey};
pub use view::{DeltaEvent, ListenerId, TableViewExt, View};
