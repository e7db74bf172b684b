// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

//! Error taxonomy for the pool data plane.

use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong opening or operating on a pool.
#[derive(Debug, Error)]
pub enum Error {
	/// `connect` was called for a pool that does not exist.
	#[error("pool '{0}' not found")]
	PoolNotFound(String),

	/// `create` was called for a pool name that already exists.
	#[error("pool '{0}' already exists")]
	PoolAlreadyExists(String),

	/// The supplied `auth_key` did not match the pool's canary record.
	#[error("authentication failed for pool '{0}'")]
	AuthenticationError(String),

	/// A mutating operation was attempted through a read-only client.
	#[error("pool '{0}' is open read-only")]
	ReadOnly(String),

	/// Expansion would need to exceed the hard capacity ceiling.
	#[error("segment for pool '{pool}' cannot grow past {max} bytes (needed {needed})")]
	CapacityExceeded {
		/// Pool name.
		pool: String,
		/// Hard ceiling in bytes.
		max: u64,
		/// Bytes that were actually required.
		needed: u64,
	},

	/// The OS refused to attach, create, or map the segment.
	#[error("shared memory segment unavailable for pool '{pool}': {source}")]
	SegmentUnavailable {
		/// Pool name.
		pool: String,
		/// Underlying OS error.
		#[source]
		source: io::Error,
	},

	/// An atomic helper was invoked against a value of the wrong shape.
	#[error("value for key '{key}' is not a {expected}")]
	TypeMismatch {
		/// Offending key.
		key: String,
		/// What the caller needed the value to be.
		expected: &'static str,
	},

	/// A payload failed to decode. Never surfaced from `get`/`exists`;
	/// callers that explicitly want it can match on this variant from
	/// diagnostic entry points.
	#[error("failed to decode stored payload: {0}")]
	DecodeError(String),
}

impl Error {
	pub(crate) fn capacity_exceeded(pool: impl Into<String>, needed: u64, max: u64) -> Self {
		let pool = pool.into();
		log::warn!(target: "l0p", "pool '{}' cannot grow to {} bytes (max {})", pool, needed, max);
		Error::CapacityExceeded { pool, max, needed }
	}

	pub(crate) fn segment_unavailable(pool: impl Into<String>, source: io::Error) -> Self {
		let pool = pool.into();
		log::warn!(target: "l0p", "segment unavailable for pool '{}': {}", pool, source);
		Error::SegmentUnavailable { pool, source }
	}

	pub(crate) fn type_mismatch(key: impl Into<String>, expected: &'static str) -> Self {
		Error::TypeMismatch { key: key.into(), expected }
	}
}
