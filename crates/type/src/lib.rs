// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

//! Core value model shared by every Prism crate.
//!
//! A cell in a Prism table is a [`Value`]; a column carries a single
//! [`Type`]. Floats are wrapped in [`OrderedF64`] so that values are
//! `Eq + Ord + Hash` and can serve as group keys.

pub mod error;
pub mod value;

pub use error::{Error, Result};
pub use value::{OrderedF64, Timestamp, Type, Value};
