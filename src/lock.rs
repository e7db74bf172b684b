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

//! Process-local concurrency control: a striped set of mutexes keyed
//! by a hash of the record key, taken in front of the pool-wide
//! reader/writer lock that guards the segment itself (`Pool` wraps its
//! `Segment` directly in a `parking_lot::RwLock`).
//!
//! Acquisition order is fixed: stripe locks are always taken before
//! the pool lock within the same operation, to avoid deadlock.

use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Default number of stripes.
pub const N_STRIPES: usize = 64;

/// `N_STRIPES` mutexes; a key's stripe is `hash(key) % stripes.len()`.
/// The hash is seeded once per pool so stripe assignment is stable for
/// the pool's lifetime without being predictable across pools.
pub struct StripedLocks {
	stripes: Vec<Mutex<()>>,
	seed: u64,
}

impl StripedLocks {
	pub fn new(num_stripes: usize, seed: u64) -> Self {
		let stripes = (0..num_stripes.max(1)).map(|_| Mutex::new(())).collect();
		StripedLocks { stripes, seed }
	}

	fn stripe_index(&self, key: &str) -> usize {
		let mut hasher = DefaultHasher::new();
		self.seed.hash(&mut hasher);
		key.hash(&mut hasher);
		(hasher.finish() as usize) % self.stripes.len()
	}

	/// Lock the stripe guarding `key` for the duration of the guard.
	pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
		self.stripes[self.stripe_index(key)].lock()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_key_always_maps_to_same_stripe() {
		let locks = StripedLocks::new(N_STRIPES, 7);
		let a = locks.stripe_index("hello");
		let b = locks.stripe_index("hello");
		assert_eq!(a, b);
	}

	#[test]
	fn different_seeds_can_move_a_key_to_a_different_stripe() {
		let locks_a = StripedLocks::new(N_STRIPES, 1);
		let locks_b = StripedLocks::new(N_STRIPES, 2);
		// Not a hard guarantee for every key, but the seed must at least
		// participate in the hash -- assert it changes the distribution for
		// a handful of sample keys.
		let differs = (0..32).any(|i| {
			let k = format!("k{i}");
			locks_a.stripe_index(&k) != locks_b.stripe_index(&k)
		});
		assert!(differs);
	}

	#[test]
	fn stripe_lock_excludes_concurrent_holders() {
		use std::sync::Arc;
		use std::thread;

		let locks = Arc::new(StripedLocks::new(4, 0));
		let counter = Arc::new(Mutex::new(0i64));
		let mut handles = Vec::new();
		for _ in 0..8 {
			let locks = Arc::clone(&locks);
			let counter = Arc::clone(&counter);
			handles.push(thread::spawn(move || {
				for _ in 0..1000 {
					let _g = locks.lock("shared-key");
					let mut c = counter.lock();
					*c += 1;
				}
			}));
		}
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(*counter.lock(), 8000);
	}
}
