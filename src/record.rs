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

//! A single key's stored triple `(value, timestamp, ttl?)`, and the
//! map of those that forms the segment's payload.

use crate::value::Value;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// One record: the stored bytes (plain serialized value, or
/// `"enc:" || hex(...)` ciphertext when the pool has encryption on),
/// its creation timestamp, and an optional whole-second TTL.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
	pub value: Vec<u8>,
	/// Seconds since the epoch, sub-second precision. Whole-second `ttl`
	/// comparisons need this precision: truncating to whole seconds makes
	/// a one-second TTL expire anywhere between 0 and ~2 seconds after
	/// `set`, depending on where in the wall-clock second `set` landed.
	pub timestamp: f64,
	pub ttl: Option<u64>,
}

impl Record {
	pub fn is_expired_at(&self, now: f64) -> bool {
		match self.ttl {
			Some(ttl) => (now - self.timestamp) > ttl as f64,
			None => false,
		}
	}
}

/// Seconds since the epoch, sub-second precision, used for record
/// timestamps and TTL checks.
pub fn now_seconds() -> f64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// The decoded in-memory form of the segment's payload.
pub type Map = HashMap<String, Record>;

const FIELD_VALUE: &str = "v";
const FIELD_TIMESTAMP: &str = "ts";
const FIELD_TTL: &str = "ttl";

/// Encode the whole map as a [`Value`] tree, ready for the serializer.
pub fn map_to_value(map: &Map) -> Value {
	Value::Map(map.iter().map(|(k, r)| (k.clone(), record_to_value(r))).collect())
}

fn record_to_value(r: &Record) -> Value {
	Value::Map(vec![
		(FIELD_VALUE.to_string(), Value::Bytes(r.value.clone())),
		(FIELD_TIMESTAMP.to_string(), Value::Float(r.timestamp)),
		(FIELD_TTL.to_string(), r.ttl.map(|t| Value::Int(t as i64)).unwrap_or(Value::Null)),
	])
}

/// Decode a [`Value`] tree back into a map. Any entry that doesn't
/// look like a well-formed record is dropped rather than failing the
/// whole decode -- consistent with the torn-read tolerance elsewhere
/// in the data plane.
pub fn value_to_map(value: Value) -> Map {
	match value {
		Value::Map(entries) => entries.into_iter().filter_map(|(k, v)| record_from_value(v).map(|r| (k, r))).collect(),
		_ => Map::new(),
	}
}

fn record_from_value(value: Value) -> Option<Record> {
	let Value::Map(fields) = value else { return None };
	let mut value_bytes = None;
	let mut timestamp = None;
	let mut ttl = None;
	for (k, v) in fields {
		match (k.as_str(), v) {
			(FIELD_VALUE, Value::Bytes(b)) => value_bytes = Some(b),
			(FIELD_TIMESTAMP, v) => timestamp = v.as_f64(),
			(FIELD_TTL, Value::Null) => {}
			(FIELD_TTL, v) => ttl = v.as_int(),
			_ => {}
		}
	}
	Some(Record { value: value_bytes?, timestamp: timestamp?, ttl: ttl.map(|t| t as u64) })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record_round_trips_through_value() {
		let mut map = Map::new();
		map.insert("a".into(), Record { value: b"hi".to_vec(), timestamp: 100.0, ttl: Some(30) });
		map.insert("b".into(), Record { value: b"bye".to_vec(), timestamp: 200.5, ttl: None });

		let value = map_to_value(&map);
		let back = value_to_map(value);
		assert_eq!(map, back);
	}

	#[test]
	fn expiry_is_strictly_greater_than_ttl() {
		let r = Record { value: vec![], timestamp: 100.0, ttl: Some(10) };
		assert!(!r.is_expired_at(110.0));
		assert!(r.is_expired_at(111.0));
	}

	#[test]
	fn sub_second_timestamp_is_not_truncated_away() {
		// A record created at x.9s with a 1s ttl must not read as expired
		// the instant the wall clock crosses into x+1, only once a full
		// second has actually elapsed since the sub-second timestamp.
		let r = Record { value: vec![], timestamp: 10.9, ttl: Some(1) };
		assert!(!r.is_expired_at(11.4));
		assert!(r.is_expired_at(11.95));
	}
}
