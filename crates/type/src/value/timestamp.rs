// Copyright (c) 2025 Prism Contributors
// This file is licensed under the AGPL-3.0-or-later

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A point in time, stored as milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn epoch_millis(self) -> i64 {
		self.0
	}
}

impl Display for Timestamp {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}ms", self.0)
	}
}

impl From<i64> for Timestamp {
	fn from(millis: i64) -> Self {
		Timestamp(millis)
	}
}
