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

//! `l0p` is a same-host, multi-process key-value store backed by
//! named POSIX shared memory. A pool is a single named segment; any
//! process on the host that knows the pool's name can `connect` to it
//! and see the same data another process `set` a moment earlier, with
//! no daemon, socket, or serialization over a wire in between.
//!
//! ```no_run
//! use l0p::{Pool, CreateOptions, Value};
//!
//! let pool = Pool::create("sessions", CreateOptions::default())?;
//! pool.set("user:42", &Value::Str("alice".into()), Some(3600))?;
//! assert_eq!(pool.get("user:42")?, Some(Value::Str("alice".into())));
//! # Ok::<(), l0p::Error>(())
//! ```

pub mod crypto;
pub mod error;
pub mod lock;
#[cfg(unix)]
pub mod pool;
pub mod record;
#[cfg(unix)]
pub mod segment;
pub mod serializer;
pub mod value;

pub use error::{Error, Result};
#[cfg(unix)]
pub use pool::{ConnectOptions, CreateOptions, GlobalStats, MemoryUsage, Pool, PoolStats};
pub use serializer::CompressThreshold;
pub use value::Value;
