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

//! The dynamically-typed value tree stored for each record.

use serde_json::Number;

/// Any value a client can store under a key.
///
/// This is a closed tagged sum type, the systems-language stand-in for
/// the dynamic typing the host runtime this store was modeled on
/// provides natively. The serializer picks a compact binary encoding
/// for shallow trees and falls back to JSON for anything deeper.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	Bytes(Vec<u8>),
	Seq(Vec<Value>),
	/// Insertion order is not preserved across a round trip; keys are
	/// unique.
	Map(Vec<(String, Value)>),
}

impl Value {
	pub fn is_integer(&self) -> bool {
		matches!(self, Value::Int(_))
	}

	pub fn is_sequence(&self) -> bool {
		matches!(self, Value::Seq(_))
	}

	pub fn is_mapping(&self) -> bool {
		matches!(self, Value::Map(_))
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			_ => None,
		}
	}

	/// Read a numeric value as `f64` regardless of whether it was stored
	/// as `Int` or `Float`. Used for record timestamps, which are always
	/// `Float` but are tolerant of an `Int` arriving via the JSON fallback
	/// path (JSON itself has no integer/float distinction on the wire).
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(i) => Some(*i as f64),
			Value::Float(f) => Some(*f),
			_ => None,
		}
	}

	pub fn map_get(&self, key: &str) -> Option<&Value> {
		match self {
			Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
			_ => None,
		}
	}

	/// Merge `patch`'s entries into `self` in place, last-write-wins per key.
	/// `self` and `patch` must both be [`Value::Map`].
	pub fn map_merge(&mut self, patch: Value) {
		let (Value::Map(dst), Value::Map(src)) = (self, patch) else {
			return;
		};
		for (k, v) in src {
			if let Some(slot) = dst.iter_mut().find(|(ek, _)| *ek == k) {
				slot.1 = v;
			} else {
				dst.push((k, v));
			}
		}
	}

	/// Append `item` to a [`Value::Seq`] in place, returning the new length.
	pub fn seq_push(&mut self, item: Value) -> Option<usize> {
		match self {
			Value::Seq(items) => {
				items.push(item);
				Some(items.len())
			}
			_ => None,
		}
	}
}

/// JSON has no byte-string type, so `Bytes` is round-tripped through the
/// fallback format as a single-key tagged object rather than an array of
/// byte-sized numbers -- an array would come back as `Value::Seq(Int)`
/// on the way in, losing the distinction spec.md requires ("equality
/// after round-trip is required" for fallback-path values).
const BYTES_TAG_KEY: &str = "$l0p_bytes";

impl From<Value> for serde_json::Value {
	fn from(v: Value) -> serde_json::Value {
		match v {
			Value::Null => serde_json::Value::Null,
			Value::Bool(b) => serde_json::Value::Bool(b),
			Value::Int(i) => serde_json::Value::Number(Number::from(i)),
			Value::Float(f) => Number::from_f64(f)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			Value::Str(s) => serde_json::Value::String(s),
			Value::Bytes(b) => {
				let mut tagged = serde_json::Map::with_capacity(1);
				tagged.insert(BYTES_TAG_KEY.to_string(), serde_json::Value::String(hex::encode(b)));
				serde_json::Value::Object(tagged)
			}
			Value::Seq(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
			Value::Map(entries) => {
				let map: serde_json::Map<String, serde_json::Value> =
					entries.into_iter().map(|(k, v)| (k, v.into())).collect();
				serde_json::Value::Object(map)
			}
		}
	}
}

impl From<serde_json::Value> for Value {
	fn from(v: serde_json::Value) -> Value {
		match v {
			serde_json::Value::Null => Value::Null,
			serde_json::Value::Bool(b) => Value::Bool(b),
			serde_json::Value::Number(n) => {
				if let Some(i) = n.as_i64() {
					Value::Int(i)
				} else {
					Value::Float(n.as_f64().unwrap_or(0.0))
				}
			}
			serde_json::Value::String(s) => Value::Str(s),
			serde_json::Value::Array(items) => Value::Seq(items.into_iter().map(Into::into).collect()),
			serde_json::Value::Object(mut map) => {
				if map.len() == 1 {
					if let Some(serde_json::Value::String(hex_str)) = map.get(BYTES_TAG_KEY) {
						if let Ok(bytes) = hex::decode(hex_str) {
							return Value::Bytes(bytes);
						}
					}
				}
				Value::Map(map.drain().map(|(k, v)| (k, v.into())).collect())
			}
		}
	}
}
