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

//! Composes the serializer, segment, and lock layers into the pool's
//! operational surface: `get`/`set`/`delete`/`exists`/`keys_with_prefix`/
//! `all_keys`/`size`/`cleanup_expired`/`memory_usage`, the atomic
//! helpers, and pool lifecycle (`create`/`connect`/`exists`/`destroy`/
//! `list_pools`/`stats`).

use crate::crypto;
use crate::error::{Error, Result};
use crate::lock::{StripedLocks, N_STRIPES};
use crate::record::{self, Map, Record};
use crate::segment::{self, Segment, C_MAX, INITIAL_SIZE};
use crate::serializer::{CompressThreshold, Serializer};
use crate::value::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const ENC_PREFIX: &str = "enc:";
const AUTH_CANARY_KEY: &str = "__l0p_auth_canary__";
const AUTH_CANARY_PLAINTEXT: &[u8] = b"l0p-auth-canary-v1";

/// Options for [`Pool::create`].
#[derive(Clone, Debug)]
pub struct CreateOptions {
	/// Require a matching `auth_key` on every subsequent `connect`.
	pub auth: bool,
	/// Key used both for the auth canary (if `auth`) and for encrypting
	/// values written by this creating client (if `encryption`).
	pub auth_key: Option<String>,
	/// Encrypt values this client writes with `auth_key`.
	pub encryption: bool,
	pub initial_capacity: u64,
	pub compress_threshold: CompressThreshold,
	pub num_stripes: usize,
}

impl Default for CreateOptions {
	fn default() -> Self {
		CreateOptions {
			auth: false,
			auth_key: None,
			encryption: false,
			initial_capacity: INITIAL_SIZE,
			compress_threshold: CompressThreshold::default(),
			num_stripes: N_STRIPES,
		}
	}
}

/// Options for [`Pool::connect`].
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
	/// If the pool requires auth, this must match; also used to encrypt
	/// any values this client subsequently writes.
	pub auth_key: Option<String>,
	pub readonly: bool,
}

/// Snapshot of segment occupancy returned by [`Pool::memory_usage`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryUsage {
	pub used: u64,
	pub capacity: u64,
	pub utilization: f64,
	pub max: u64,
}

/// Per-client stats snapshot returned by [`Pool::stats`].
#[derive(Clone, Debug, PartialEq)]
pub struct PoolStats {
	pub name: String,
	pub key_count: usize,
	pub memory: MemoryUsage,
}

/// Host-wide stats snapshot returned by [`Pool::global_stats`].
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GlobalStats {
	pub pool_count: usize,
}

/// A connected handle to a pool: the serialized-segment handle, the
/// lock layer, the serializer, and the encryption/read-only policy for
/// this particular connection.
pub struct Pool {
	name: String,
	/// The pool-wide reader/writer lock, guarding the segment directly:
	/// read holders observe it, write holders
	/// rewrite the payload wholesale or trigger expansion.
	segment: parking_lot::RwLock<Segment>,
	stripes: StripedLocks,
	serializer: Serializer,
	encrypt_writes: bool,
	auth_key: Option<String>,
	readonly: bool,
}

fn os_segment_name(pool_name: &str) -> String {
	format!("/l0p_{pool_name}")
}

fn stripe_seed(pool_name: &str) -> u64 {
	let mut hasher = DefaultHasher::new();
	pool_name.hash(&mut hasher);
	hasher.finish()
}

impl Pool {
	/// Create a new pool named `name`. Fails with [`Error::PoolAlreadyExists`]
	/// if a live segment with that name is already present.
	pub fn create(name: &str, options: CreateOptions) -> Result<Pool> {
		let os_name = os_segment_name(name);
		if segment::exists(&os_name) {
			return Err(Error::PoolAlreadyExists(name.to_string()));
		}
		let (segment, _is_creator) = Segment::open_or_create(&os_name, options.initial_capacity, name)?;

		let pool = Pool {
			name: name.to_string(),
			segment: parking_lot::RwLock::new(segment),
			stripes: StripedLocks::new(options.num_stripes, stripe_seed(name)),
			serializer: Serializer::new(options.compress_threshold),
			encrypt_writes: options.encryption,
			auth_key: options.auth_key.clone(),
			readonly: false,
		};

		// Seed an empty map so a fresh segment's `L == 0` reads back as an
		// honest empty map rather than relying solely on Segment's own
		// "empty on L==0" tolerance.
		pool.writeback(&Map::new())?;

		if options.auth {
			let key = options.auth_key.as_deref().ok_or_else(|| {
				Error::AuthenticationError(format!("pool '{name}' requires auth_key to enable auth"))
			})?;
			pool.write_auth_canary(key)?;
		}

		log::info!(target: "l0p", "created pool '{}'", name);
		Ok(pool)
	}

	/// Connect to an existing pool. Fails with [`Error::PoolNotFound`] if
	/// absent, or [`Error::AuthenticationError`] if the pool has an auth
	/// canary and `options.auth_key` doesn't decrypt it.
	pub fn connect(name: &str, options: ConnectOptions) -> Result<Pool> {
		let os_name = os_segment_name(name);
		if !segment::exists(&os_name) {
			return Err(Error::PoolNotFound(name.to_string()));
		}
		let (segment, _is_creator) = Segment::open_or_create(&os_name, INITIAL_SIZE, name)?;

		let pool = Pool {
			name: name.to_string(),
			segment: parking_lot::RwLock::new(segment),
			stripes: StripedLocks::new(N_STRIPES, stripe_seed(name)),
			serializer: Serializer::default(),
			encrypt_writes: options.auth_key.is_some(),
			auth_key: options.auth_key.clone(),
			readonly: options.readonly,
		};

		if let Some(key) = options.auth_key.as_deref() {
			pool.verify_auth_canary(key)?;
		}

		Ok(pool)
	}

	/// Whether a pool named `name` currently has a live segment.
	pub fn exists(name: &str) -> bool {
		segment::exists(&os_segment_name(name))
	}

	/// Unlink a pool's current segment. Only the segment the caller can
	/// see by name is removed. If another connected process is mid-expansion
	/// and holding an older generation mapped, that older segment's name is
	/// not tracked here and will leak until the OS reclaims it or a caller
	/// unlinks it directly by name.
	pub fn destroy(name: &str) -> Result<()> {
		segment::destroy(&os_segment_name(name))
	}

	/// All pool names with a currently live base segment.
	pub fn list_pools() -> Vec<String> {
		segment::list_live_segment_names().into_iter().filter_map(|n| n.strip_prefix("l0p_").map(str::to_string)).collect()
	}

	/// Host-wide stats across every live pool.
	pub fn global_stats() -> GlobalStats {
		GlobalStats { pool_count: Self::list_pools().len() }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	// --- lock-layer plumbing ---

	fn with_segment_read<T>(&self, f: impl FnOnce(&Segment) -> T) -> T {
		let seg = self.segment.read();
		f(&seg)
	}

	fn with_segment_write<T>(&self, f: impl FnOnce(&mut Segment) -> Result<T>) -> Result<T> {
		let mut seg = self.segment.write();
		f(&mut seg)
	}

	/// Re-read the segment payload and decode it into a map. This is the
	/// pool's "coherence point": every operation calls it fresh rather
	/// than trusting any state held across calls, which is how writes
	/// from another process become visible. Tolerates a torn read
	/// (decode failure) by retrying the read once; a second failure
	/// degrades to an empty map rather than panicking or blocking forever.
	fn refresh(&self) -> Map {
		let bytes = self.with_segment_read(|seg| seg.read_payload());
		self.decode_payload(&bytes).unwrap_or_else(|_| {
			let retry_bytes = self.with_segment_read(|seg| seg.read_payload());
			self.decode_payload(&retry_bytes).unwrap_or_default()
		})
	}

	fn decode_payload(&self, bytes: &[u8]) -> Result<Map> {
		if bytes.is_empty() {
			return Ok(Map::new());
		}
		let value = self.serializer.deserialize(bytes)?;
		Ok(record::value_to_map(value))
	}

	fn writeback(&self, map: &Map) -> Result<()> {
		let value = record::map_to_value(map);
		let bytes = self.serializer.serialize(&value);
		let name = self.name.clone();
		self.with_segment_write(|seg| seg.write_payload(&bytes, &name))
	}

	fn ensure_writable(&self) -> Result<()> {
		if self.readonly {
			return Err(Error::ReadOnly(self.name.clone()));
		}
		Ok(())
	}

	// --- encryption plumbing ---

	fn encode_for_storage(&self, value: &Value) -> Vec<u8> {
		let raw = self.serializer.serialize(value);
		if self.encrypt_writes {
			let key = self.auth_key.as_deref().unwrap_or("");
			let ciphertext = crypto::encrypt(&raw, key);
			let mut out = ENC_PREFIX.as_bytes().to_vec();
			out.extend(hex::encode(ciphertext).into_bytes());
			out
		} else {
			raw
		}
	}

	/// Decode a stored value, transparently decrypting if it carries the
	/// `enc:` sentinel -- independent of this client's own `encryption`
	/// setting, since the sentinel is self-describing.
	fn decode_stored_value(&self, stored: &[u8]) -> Result<Value> {
		if let Some(hex_part) = stored.strip_prefix(ENC_PREFIX.as_bytes()) {
			let hex_str = std::str::from_utf8(hex_part).map_err(|e| Error::DecodeError(format!("bad hex utf8: {e}")))?;
			let raw = hex::decode(hex_str).map_err(|e| Error::DecodeError(format!("bad hex: {e}")))?;
			let key = self.auth_key.as_deref().unwrap_or("");
			let plain = crypto::decrypt(&raw, key).ok_or_else(|| Error::DecodeError("decryption failed".into()))?;
			return self.serializer.deserialize(&plain);
		}
		self.serializer.deserialize(stored)
	}

	fn write_auth_canary(&self, key: &str) -> Result<()> {
		let ciphertext = crypto::encrypt(AUTH_CANARY_PLAINTEXT, key);
		let mut stored = ENC_PREFIX.as_bytes().to_vec();
		stored.extend(hex::encode(ciphertext).into_bytes());
		let mut map = self.refresh();
		map.insert(AUTH_CANARY_KEY.to_string(), Record { value: stored, timestamp: record::now_seconds(), ttl: None });
		self.writeback(&map)
	}

	fn verify_auth_canary(&self, key: &str) -> Result<()> {
		let map = self.refresh();
		let Some(record) = map.get(AUTH_CANARY_KEY) else {
			// Pool was created without `auth`; nothing to check.
			return Ok(());
		};
		let Some(hex_part) = record.value.strip_prefix(ENC_PREFIX.as_bytes()) else {
			return Ok(());
		};
		let hex_str = std::str::from_utf8(hex_part).unwrap_or("");
		let raw = hex::decode(hex_str).map_err(|_| Error::AuthenticationError(self.name.clone()))?;
		match crypto::decrypt(&raw, key) {
			Some(plain) if plain == AUTH_CANARY_PLAINTEXT => Ok(()),
			_ => Err(Error::AuthenticationError(self.name.clone())),
		}
	}

	// --- core operations ---

	pub fn get(&self, key: &str) -> Result<Option<Value>> {
		let _stripe = self.stripes.lock(key);
		let mut map = self.refresh();
		let now = record::now_seconds();
		let Some(rec) = map.get(key).cloned() else { return Ok(None) };
		if rec.is_expired_at(now) {
			// A read-only handle must never touch the segment, not even to
			// lazily evict an expired record -- it just reports absent and
			// leaves the actual cleanup to a writer or `cleanup_expired`.
			if !self.readonly {
				map.remove(key);
				self.writeback(&map)?;
			}
			return Ok(None);
		}
		match self.decode_stored_value(&rec.value) {
			Ok(v) => Ok(Some(v)),
			Err(Error::DecodeError(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub fn set(&self, key: &str, value: &Value, ttl: Option<u64>) -> Result<()> {
		self.ensure_writable()?;
		let _stripe = self.stripes.lock(key);
		let mut map = self.refresh();
		let stored = self.encode_for_storage(value);
		map.insert(key.to_string(), Record { value: stored, timestamp: record::now_seconds(), ttl });
		self.writeback(&map)
	}

	pub fn delete(&self, key: &str) -> Result<bool> {
		self.ensure_writable()?;
		let _stripe = self.stripes.lock(key);
		let mut map = self.refresh();
		if map.remove(key).is_some() {
			self.writeback(&map)?;
			Ok(true)
		} else {
			Ok(false)
		}
	}

	pub fn exists_key(&self, key: &str) -> Result<bool> {
		Ok(self.get(key)?.is_some())
	}

	pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
		let map = self.refresh();
		map.keys().filter(|k| k.starts_with(prefix) && k.as_str() != AUTH_CANARY_KEY).cloned().collect()
	}

	pub fn all_keys(&self) -> Vec<String> {
		self.keys_with_prefix("")
	}

	/// Remove every record whose TTL has elapsed, atomically under the
	/// pool write lock. Returns the number removed.
	pub fn cleanup_expired(&self) -> Result<usize> {
		self.ensure_writable()?;
		let name = self.name.clone();
		self.with_segment_write(|seg| {
			let bytes = seg.read_payload();
			let mut map = self.decode_payload(&bytes).unwrap_or_default();
			let now = record::now_seconds();
			let before = map.len();
			map.retain(|_, r| !r.is_expired_at(now));
			let removed = before - map.len();
			if removed > 0 {
				let value = record::map_to_value(&map);
				let payload = self.serializer.serialize(&value);
				seg.write_payload(&payload, &name)?;
			}
			Ok(removed)
		})
	}

	pub fn size(&self) -> usize {
		let map = self.refresh();
		map.len() - if map.contains_key(AUTH_CANARY_KEY) { 1 } else { 0 }
	}

	pub fn memory_usage(&self) -> MemoryUsage {
		self.with_segment_read(|seg| {
			let used = seg.used();
			let capacity = seg.capacity();
			MemoryUsage { used, capacity, utilization: used as f64 / capacity as f64, max: C_MAX }
		})
	}

	pub fn stats(&self) -> PoolStats {
		PoolStats { name: self.name.clone(), key_count: self.size(), memory: self.memory_usage() }
	}

	// --- atomic helpers ---

	pub fn increment(&self, key: &str, delta: i64) -> Result<i64> {
		self.ensure_writable()?;
		let _stripe = self.stripes.lock(key);
		let mut map = self.refresh();
		let now = record::now_seconds();
		let (current, ttl) = match map.get(key) {
			Some(r) if !r.is_expired_at(now) => {
				let v = self.decode_stored_value(&r.value)?;
				(v.as_int().ok_or_else(|| Error::type_mismatch(key, "integer"))?, r.ttl)
			}
			_ => (0, None),
		};
		let new_value = current + delta;
		let stored = self.encode_for_storage(&Value::Int(new_value));
		map.insert(key.to_string(), Record { value: stored, timestamp: now, ttl });
		self.writeback(&map)?;
		Ok(new_value)
	}

	pub fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
		self.increment(key, -delta)
	}

	pub fn append(&self, key: &str, item: Value) -> Result<usize> {
		self.ensure_writable()?;
		let _stripe = self.stripes.lock(key);
		let mut map = self.refresh();
		let now = record::now_seconds();
		let (mut value, ttl) = match map.get(key) {
			Some(r) if !r.is_expired_at(now) => (self.decode_stored_value(&r.value)?, r.ttl),
			_ => (Value::Seq(Vec::new()), None),
		};
		let new_len = value.seq_push(item).ok_or_else(|| Error::type_mismatch(key, "sequence"))?;
		let stored = self.encode_for_storage(&value);
		map.insert(key.to_string(), Record { value: stored, timestamp: now, ttl });
		self.writeback(&map)?;
		Ok(new_len)
	}

	pub fn update(&self, key: &str, patch: Value) -> Result<()> {
		self.ensure_writable()?;
		if !patch.is_mapping() {
			return Err(Error::type_mismatch(key, "mapping"));
		}
		let _stripe = self.stripes.lock(key);
		let mut map = self.refresh();
		let now = record::now_seconds();
		let (mut value, ttl) = match map.get(key) {
			Some(r) if !r.is_expired_at(now) => (self.decode_stored_value(&r.value)?, r.ttl),
			_ => (Value::Map(Vec::new()), None),
		};
		if !value.is_mapping() {
			return Err(Error::type_mismatch(key, "mapping"));
		}
		value.map_merge(patch);
		let stored = self.encode_for_storage(&value);
		map.insert(key.to_string(), Record { value: stored, timestamp: now, ttl });
		self.writeback(&map)
	}

	/// Batched `set`: acquires the pool write lock once and does a
	/// single writeback for the whole batch.
	pub fn mset(&self, entries: Vec<(String, Value)>) -> Result<()> {
		self.ensure_writable()?;
		let name = self.name.clone();
		self.with_segment_write(|seg| {
			let bytes = seg.read_payload();
			let mut map = self.decode_payload(&bytes).unwrap_or_default();
			let now = record::now_seconds();
			for (k, v) in entries {
				let stored = self.encode_for_storage(&v);
				map.insert(k, Record { value: stored, timestamp: now, ttl: None });
			}
			let value = record::map_to_value(&map);
			let payload = self.serializer.serialize(&value);
			seg.write_payload(&payload, &name)
		})
	}

	pub fn mget(&self, keys: &[String]) -> Result<Vec<(String, Option<Value>)>> {
		keys.iter().map(|k| Ok((k.clone(), self.get(k)?))).collect()
	}

	pub fn delete_many(&self, keys: &[String]) -> Result<usize> {
		let mut removed = 0;
		for k in keys {
			if self.delete(k)? {
				removed += 1;
			}
		}
		Ok(removed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU64, Ordering};

	static COUNTER: AtomicU64 = AtomicU64::new(0);

	fn unique_pool_name(tag: &str) -> String {
		let n = COUNTER.fetch_add(1, Ordering::Relaxed);
		format!("test_{tag}_{}_{n}", std::process::id())
	}

	#[test]
	fn basic_round_trip_across_two_handles() {
		let name = unique_pool_name("roundtrip");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("a", &Value::Map(vec![("n".into(), Value::Int(1))]), None).unwrap();
		drop(pool);

		let pool2 = Pool::connect(&name, ConnectOptions::default()).unwrap();
		let got = pool2.get("a").unwrap();
		assert_eq!(got, Some(Value::Map(vec![("n".into(), Value::Int(1))])));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn set_then_overwrite_then_get() {
		let name = unique_pool_name("overwrite");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("k", &Value::Str("v".into()), None).unwrap();
		pool.set("k", &Value::Str("w".into()), None).unwrap();
		assert_eq!(pool.get("k").unwrap(), Some(Value::Str("w".into())));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn delete_is_idempotent_and_reports_existence() {
		let name = unique_pool_name("delete");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("k", &Value::Int(1), None).unwrap();
		assert!(pool.delete("k").unwrap());
		assert!(!pool.delete("k").unwrap());
		assert_eq!(pool.get("k").unwrap(), None);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn ttl_expiry_removes_on_access() {
		let name = unique_pool_name("ttl");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("k", &Value::Str("v".into()), Some(0)).unwrap();
		std::thread::sleep(std::time::Duration::from_millis(1100));
		assert_eq!(pool.get("k").unwrap(), None);
		assert_eq!(pool.size(), 0);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn encryption_hides_plaintext_in_raw_segment() {
		let name = unique_pool_name("enc");
		let opts = CreateOptions { auth: true, auth_key: Some("s".into()), encryption: true, ..Default::default() };
		let pool = Pool::create(&name, opts).unwrap();
		pool.set("x", &Value::Map(vec![("p".into(), Value::Str("hunter2".into()))]), None).unwrap();

		let raw = pool.with_segment_read(|seg| seg.read_payload());
		let raw_text = String::from_utf8_lossy(&raw);
		assert!(!raw_text.contains("hunter2"));

		let got = pool.get("x").unwrap();
		assert_eq!(got, Some(Value::Map(vec![("p".into(), Value::Str("hunter2".into()))])));

		let wrong =
			Pool::connect(&name, ConnectOptions { auth_key: Some("wrong".into()), readonly: false });
		assert!(matches!(wrong, Err(Error::AuthenticationError(_))));

		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn readonly_client_rejects_mutation_but_allows_reads() {
		let name = unique_pool_name("readonly");
		let writer = Pool::create(&name, CreateOptions::default()).unwrap();
		writer.set("k", &Value::Str("v".into()), None).unwrap();

		let reader = Pool::connect(&name, ConnectOptions { auth_key: None, readonly: true }).unwrap();
		assert!(matches!(reader.set("k", &Value::Str("x".into()), None), Err(Error::ReadOnly(_))));
		assert_eq!(reader.get("k").unwrap(), Some(Value::Str("v".into())));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn readonly_get_on_expired_key_reports_absent_without_touching_the_segment() {
		let name = unique_pool_name("readonly_ttl");
		let writer = Pool::create(&name, CreateOptions::default()).unwrap();
		writer.set("k", &Value::Str("v".into()), Some(0)).unwrap();
		std::thread::sleep(std::time::Duration::from_millis(1100));

		let before = writer.with_segment_read(|seg| seg.read_payload());
		let reader = Pool::connect(&name, ConnectOptions { auth_key: None, readonly: true }).unwrap();
		assert_eq!(reader.get("k").unwrap(), None);
		let after = writer.with_segment_read(|seg| seg.read_payload());
		assert_eq!(before, after, "a read-only get must never rewrite the segment");

		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn increment_and_decrement_roundtrip() {
		let name = unique_pool_name("incr");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("c", &Value::Int(10), None).unwrap();
		assert_eq!(pool.increment("c", 1).unwrap(), 11);
		assert_eq!(pool.increment("c", 5).unwrap(), 16);
		assert_eq!(pool.decrement("c", 6).unwrap(), 10);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn increment_on_absent_key_treats_it_as_zero() {
		let name = unique_pool_name("incr_absent");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		assert_eq!(pool.increment("new", 3).unwrap(), 3);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn increment_on_non_integer_is_type_mismatch() {
		let name = unique_pool_name("incr_bad");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("s", &Value::Str("nope".into()), None).unwrap();
		assert!(matches!(pool.increment("s", 1), Err(Error::TypeMismatch { .. })));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn append_grows_sequence_and_rejects_non_sequence() {
		let name = unique_pool_name("append");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("list", &Value::Seq(vec![Value::Int(1)]), None).unwrap();
		assert_eq!(pool.append("list", Value::Int(2)).unwrap(), 2);
		pool.set("not_list", &Value::Int(1), None).unwrap();
		assert!(matches!(pool.append("not_list", Value::Int(1)), Err(Error::TypeMismatch { .. })));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn update_merges_last_write_wins() {
		let name = unique_pool_name("update");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("d", &Value::Map(vec![("a".into(), Value::Int(1))]), None).unwrap();
		pool.update("d", Value::Map(vec![("a".into(), Value::Int(2)), ("b".into(), Value::Int(3))])).unwrap();
		let v = pool.get("d").unwrap().unwrap();
		assert_eq!(v.map_get("a"), Some(&Value::Int(2)));
		assert_eq!(v.map_get("b"), Some(&Value::Int(3)));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn keys_with_prefix_and_namespace_sugar() {
		let name = unique_pool_name("ns");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("users:1", &Value::Int(1), None).unwrap();
		pool.set("users:2", &Value::Int(2), None).unwrap();
		pool.set("orders:1", &Value::Int(1), None).unwrap();
		let mut keys = pool.keys_with_prefix("users:");
		keys.sort();
		assert_eq!(keys, vec!["users:1".to_string(), "users:2".to_string()]);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn cleanup_expired_counts_and_removes() {
		let name = unique_pool_name("cleanup");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.set("a", &Value::Int(1), Some(0)).unwrap();
		pool.set("b", &Value::Int(2), None).unwrap();
		std::thread::sleep(std::time::Duration::from_millis(1100));
		assert_eq!(pool.cleanup_expired().unwrap(), 1);
		assert_eq!(pool.cleanup_expired().unwrap(), 0);
		assert_eq!(pool.size(), 1);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn mset_mget_delete_many_batch_correctly() {
		let name = unique_pool_name("batch");
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		pool.mset(vec![("a".into(), Value::Int(1)), ("b".into(), Value::Int(2)), ("c".into(), Value::Int(3))])
			.unwrap();
		let got = pool.mget(&["a".into(), "b".into(), "missing".into()]).unwrap();
		assert_eq!(
			got,
			vec![
				("a".to_string(), Some(Value::Int(1))),
				("b".to_string(), Some(Value::Int(2))),
				("missing".to_string(), None),
			]
		);
		assert_eq!(pool.delete_many(&["a".into(), "b".into(), "missing".into()]).unwrap(), 2);
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn lifecycle_create_exists_list_destroy() {
		let name = unique_pool_name("lifecycle");
		assert!(!Pool::exists(&name));
		let pool = Pool::create(&name, CreateOptions::default()).unwrap();
		assert!(Pool::exists(&name));
		assert!(Pool::list_pools().contains(&name));
		drop(pool);
		Pool::destroy(&name).unwrap();
		assert!(!Pool::exists(&name));
	}

	#[test]
	fn create_twice_without_destroy_fails() {
		let name = unique_pool_name("twice");
		let _pool = Pool::create(&name, CreateOptions::default()).unwrap();
		assert!(matches!(Pool::create(&name, CreateOptions::default()), Err(Error::PoolAlreadyExists(_))));
		Pool::destroy(&name).unwrap();
	}

	#[test]
	fn connect_to_missing_pool_fails() {
		let name = unique_pool_name("missing");
		assert!(matches!(Pool::connect(&name, ConnectOptions::default()), Err(Error::PoolNotFound(_))));
	}

	#[test]
	fn concurrent_increment_sums_all_deltas() {
		use std::sync::Arc;
		use std::thread;

		let name = unique_pool_name("concurrent_incr");
		let pool = Arc::new(Pool::create(&name, CreateOptions::default()).unwrap());
		pool.set("counter", &Value::Int(0), None).unwrap();

		let mut handles = Vec::new();
		for _ in 0..8 {
			let pool = Arc::clone(&pool);
			handles.push(thread::spawn(move || {
				for _ in 0..1000 {
					pool.increment("counter", 1).unwrap();
				}
			}));
		}
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(pool.get("counter").unwrap(), Some(Value::Int(8000)));
		Pool::destroy(&name).unwrap();
	}
}
