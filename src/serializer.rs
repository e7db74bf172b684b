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

//! Converts values to and from a self-describing byte string.
//!
//! Framing byte (offset 0 of every serialized blob):
//!   low nibble: `0x01` compact binary, `0x02` JSON fallback
//!   bit `0x80`: DEFLATE-compressed
//!
//! A hand-rolled compact format handles shallow trees cheaply;
//! anything deeper than [`MAX_COMPACT_DEPTH`] falls back to
//! `serde_json` rather than recursing without bound. `flate2` supplies
//! the optional DEFLATE pass above the size threshold.

use crate::error::{Error, Result};
use crate::value::Value;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const FORMAT_COMPACT: u8 = 0x01;
const FORMAT_JSON: u8 = 0x02;
const COMPRESSED_FLAG: u8 = 0x80;
const FORMAT_MASK: u8 = 0x0f;

/// Depth limit for the compact encoder; nesting beyond this falls back
/// to the JSON format rather than blowing a stack on encode/decode.
const MAX_COMPACT_DEPTH: usize = 64;

/// Compresses any payload larger than this many bytes; `-1` disables
/// compression entirely.
#[derive(Clone, Copy, Debug)]
pub struct CompressThreshold(i64);

impl CompressThreshold {
	pub const DISABLED: CompressThreshold = CompressThreshold(-1);

	pub fn bytes(n: u64) -> Self {
		CompressThreshold(n as i64)
	}

	fn should_attempt(&self, len: usize) -> bool {
		self.0 >= 0 && (len as i64) > self.0
	}
}

impl Default for CompressThreshold {
	fn default() -> Self {
		CompressThreshold(1024)
	}
}

/// Stateless (beyond its configured threshold), cheaply cloned codec.
///
/// Constructed once per [`crate::Pool`] at open time and never mutated
/// afterwards. A process-global reconfigurable serializer would let one
/// client silently change how another's already-open pool decodes its
/// payload; binding the choice to the handle at construction time avoids
/// that.
#[derive(Clone, Debug)]
pub struct Serializer {
	compress_threshold: CompressThreshold,
}

impl Default for Serializer {
	fn default() -> Self {
		Serializer { compress_threshold: CompressThreshold::default() }
	}
}

impl Serializer {
	pub fn new(compress_threshold: CompressThreshold) -> Self {
		Serializer { compress_threshold }
	}

	/// Serialize a value to its self-describing byte string. Never fails:
	/// representability failures in the compact format transparently
	/// fall back to JSON.
	pub fn serialize(&self, value: &Value) -> Vec<u8> {
		let (mut format, mut data) = match encode_compact(value) {
			Ok(bytes) => (FORMAT_COMPACT, bytes),
			Err(_) => (FORMAT_JSON, encode_json(value)),
		};

		if self.compress_threshold.should_attempt(data.len()) {
			if let Some(compressed) = deflate(&data) {
				if compressed.len() < data.len() {
					data = compressed;
					format |= COMPRESSED_FLAG;
				}
			}
		}

		let mut out = Vec::with_capacity(data.len() + 1);
		out.push(format);
		out.extend_from_slice(&data);
		out
	}

	/// Decode a previously-serialized byte string. An empty input
	/// decodes to [`Value::Null`]. Malformed input (bad framing byte,
	/// truncated/garbled compressed stream, undecodable compact or
	/// JSON body) is reported as [`Error::DecodeError`] -- callers on
	/// the read path are expected to treat that as "absent" and degrade
	/// to an empty map rather than propagate it to the end user directly.
	pub fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
		if bytes.is_empty() {
			return Ok(Value::Null);
		}
		let header = bytes[0];
		let mut body = &bytes[1..];
		let inflated;
		if header & COMPRESSED_FLAG != 0 {
			inflated = inflate(body).ok_or_else(|| Error::DecodeError("bad deflate stream".into()))?;
			body = &inflated;
		}
		match header & FORMAT_MASK {
			FORMAT_COMPACT => decode_compact(body),
			FORMAT_JSON => decode_json(body),
			other => Err(Error::DecodeError(format!("unknown format tag {other:#x}"))),
		}
	}
}

fn deflate(data: &[u8]) -> Option<Vec<u8>> {
	let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
	encoder.write_all(data).ok()?;
	encoder.finish().ok()
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
	let mut decoder = DeflateDecoder::new(data);
	let mut out = Vec::new();
	decoder.read_to_end(&mut out).ok()?;
	Some(out)
}

fn encode_json(value: &Value) -> Vec<u8> {
	let json: serde_json::Value = value.clone().into();
	serde_json::to_vec(&json).unwrap_or_default()
}

fn decode_json(bytes: &[u8]) -> Result<Value> {
	let json: serde_json::Value =
		serde_json::from_slice(bytes).map_err(|e| Error::DecodeError(format!("bad json body: {e}")))?;
	Ok(json.into())
}

// --- compact binary format ---
//
// tag byte, then payload:
//   0x00 null
//   0x01 bool            [1 byte: 0/1]
//   0x02 int             [8 bytes i64 LE]
//   0x03 float           [8 bytes f64 bits LE]
//   0x04 str             [4 bytes u32 LE len][utf8 bytes]
//   0x05 bytes           [4 bytes u32 LE len][raw bytes]
//   0x06 seq             [4 bytes u32 LE count][items...]
//   0x07 map             [4 bytes u32 LE count][(keylen u32, key utf8, value)...]

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_SEQ: u8 = 0x06;
const TAG_MAP: u8 = 0x07;

struct TooComplex;

fn encode_compact(value: &Value) -> std::result::Result<Vec<u8>, TooComplex> {
	let mut out = Vec::new();
	encode_value(value, 0, &mut out)?;
	Ok(out)
}

fn encode_value(value: &Value, depth: usize, out: &mut Vec<u8>) -> std::result::Result<(), TooComplex> {
	if depth > MAX_COMPACT_DEPTH {
		return Err(TooComplex);
	}
	match value {
		Value::Null => out.push(TAG_NULL),
		Value::Bool(b) => {
			out.push(TAG_BOOL);
			out.push(*b as u8);
		}
		Value::Int(i) => {
			out.push(TAG_INT);
			out.extend_from_slice(&i.to_le_bytes());
		}
		Value::Float(f) => {
			out.push(TAG_FLOAT);
			out.extend_from_slice(&f.to_le_bytes());
		}
		Value::Str(s) => {
			out.push(TAG_STR);
			encode_len_prefixed(s.as_bytes(), out)?;
		}
		Value::Bytes(b) => {
			out.push(TAG_BYTES);
			encode_len_prefixed(b, out)?;
		}
		Value::Seq(items) => {
			out.push(TAG_SEQ);
			let len: u32 = items.len().try_into().map_err(|_| TooComplex)?;
			out.extend_from_slice(&len.to_le_bytes());
			for item in items {
				encode_value(item, depth + 1, out)?;
			}
		}
		Value::Map(entries) => {
			out.push(TAG_MAP);
			let len: u32 = entries.len().try_into().map_err(|_| TooComplex)?;
			out.extend_from_slice(&len.to_le_bytes());
			for (k, v) in entries {
				encode_len_prefixed(k.as_bytes(), out)?;
				encode_value(v, depth + 1, out)?;
			}
		}
	}
	Ok(())
}

fn encode_len_prefixed(bytes: &[u8], out: &mut Vec<u8>) -> std::result::Result<(), TooComplex> {
	let len: u32 = bytes.len().try_into().map_err(|_| TooComplex)?;
	out.extend_from_slice(&len.to_le_bytes());
	out.extend_from_slice(bytes);
	Ok(())
}

fn decode_compact(bytes: &[u8]) -> Result<Value> {
	let mut cursor = Cursor { bytes, pos: 0 };
	let value = decode_value(&mut cursor, 0)?;
	Ok(value)
}

struct Cursor<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn take(&mut self, n: usize) -> Result<&'a [u8]> {
		let end = self.pos.checked_add(n).ok_or_else(|| Error::DecodeError("length overflow".into()))?;
		let slice = self.bytes.get(self.pos..end).ok_or_else(|| Error::DecodeError("truncated payload".into()))?;
		self.pos = end;
		Ok(slice)
	}

	fn take_u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}

	fn take_u32(&mut self) -> Result<u32> {
		let bytes = self.take(4)?;
		Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
	}
}

fn decode_value(cursor: &mut Cursor, depth: usize) -> Result<Value> {
	if depth > MAX_COMPACT_DEPTH {
		return Err(Error::DecodeError("nesting too deep".into()));
	}
	let tag = cursor.take_u8()?;
	match tag {
		TAG_NULL => Ok(Value::Null),
		TAG_BOOL => Ok(Value::Bool(cursor.take_u8()? != 0)),
		TAG_INT => {
			let bytes = cursor.take(8)?;
			Ok(Value::Int(i64::from_le_bytes(bytes.try_into().unwrap())))
		}
		TAG_FLOAT => {
			let bytes = cursor.take(8)?;
			Ok(Value::Float(f64::from_le_bytes(bytes.try_into().unwrap())))
		}
		TAG_STR => {
			let len = cursor.take_u32()? as usize;
			let bytes = cursor.take(len)?;
			let s = std::str::from_utf8(bytes).map_err(|e| Error::DecodeError(format!("bad utf8: {e}")))?;
			Ok(Value::Str(s.to_string()))
		}
		TAG_BYTES => {
			let len = cursor.take_u32()? as usize;
			Ok(Value::Bytes(cursor.take(len)?.to_vec()))
		}
		TAG_SEQ => {
			let len = cursor.take_u32()? as usize;
			let mut items = Vec::with_capacity(len.min(1024));
			for _ in 0..len {
				items.push(decode_value(cursor, depth + 1)?);
			}
			Ok(Value::Seq(items))
		}
		TAG_MAP => {
			let len = cursor.take_u32()? as usize;
			let mut entries = Vec::with_capacity(len.min(1024));
			for _ in 0..len {
				let klen = cursor.take_u32()? as usize;
				let kbytes = cursor.take(klen)?;
				let key = std::str::from_utf8(kbytes).map_err(|e| Error::DecodeError(format!("bad utf8 key: {e}")))?;
				let value = decode_value(cursor, depth + 1)?;
				entries.push((key.to_string(), value));
			}
			Ok(Value::Map(entries))
		}
		other => Err(Error::DecodeError(format!("unknown tag {other:#x}"))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn values_for_round_trip() -> Vec<Value> {
		vec![
			Value::Null,
			Value::Bool(true),
			Value::Int(-42),
			Value::Float(3.14),
			Value::Str("hello".into()),
			Value::Bytes(vec![0, 1, 2, 255]),
			Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
			Value::Map(vec![("a".into(), Value::Int(1)), ("b".into(), Value::Str("x".into()))]),
		]
	}

	#[test]
	fn compact_round_trip_is_identity() {
		let s = Serializer::default();
		for v in values_for_round_trip() {
			let bytes = s.serialize(&v);
			assert_eq!(bytes[0] & FORMAT_MASK, FORMAT_COMPACT);
			let back = s.deserialize(&bytes).unwrap();
			assert_eq!(v, back);
		}
	}

	#[test]
	fn empty_input_decodes_to_null() {
		let s = Serializer::default();
		assert_eq!(s.deserialize(&[]).unwrap(), Value::Null);
	}

	#[test]
	fn deep_nesting_falls_back_to_json_and_still_round_trips() {
		let s = Serializer::default();
		let mut v = Value::Int(0);
		for _ in 0..(MAX_COMPACT_DEPTH + 10) {
			v = Value::Seq(vec![v]);
		}
		let bytes = s.serialize(&v);
		assert_eq!(bytes[0] & FORMAT_MASK, FORMAT_JSON);
		let back = s.deserialize(&bytes).unwrap();
		assert_eq!(v, back);
	}

	#[test]
	fn deeply_nested_bytes_survive_the_json_fallback_as_bytes() {
		let s = Serializer::default();
		let mut v = Value::Bytes(vec![1, 2, 3]);
		for _ in 0..(MAX_COMPACT_DEPTH + 10) {
			v = Value::Seq(vec![v]);
		}
		let bytes = s.serialize(&v);
		assert_eq!(bytes[0] & FORMAT_MASK, FORMAT_JSON);
		let back = s.deserialize(&bytes).unwrap();
		assert_eq!(v, back);
	}

	#[test]
	fn payload_at_threshold_is_not_compressed() {
		let s = Serializer::new(CompressThreshold::bytes(1024));
		let v = Value::Bytes(vec![7u8; 1024]);
		let bytes = s.serialize(&v);
		assert_eq!(bytes[0] & COMPRESSED_FLAG, 0);
	}

	#[test]
	fn payload_over_threshold_attempts_compression() {
		let s = Serializer::new(CompressThreshold::bytes(16));
		// Highly compressible payload: all zero bytes, comfortably over threshold.
		let v = Value::Bytes(vec![0u8; 4096]);
		let bytes = s.serialize(&v);
		assert_ne!(bytes[0] & COMPRESSED_FLAG, 0);
		let back = s.deserialize(&bytes).unwrap();
		assert_eq!(v, back);
	}

	#[test]
	fn disabled_threshold_never_compresses() {
		let s = Serializer::new(CompressThreshold::DISABLED);
		let v = Value::Bytes(vec![0u8; 1 << 20]);
		let bytes = s.serialize(&v);
		assert_eq!(bytes[0] & COMPRESSED_FLAG, 0);
	}

	#[test]
	fn malformed_input_is_a_decode_error() {
		let s = Serializer::default();
		let err = s.deserialize(&[0xff, 0x00]).unwrap_err();
		assert!(matches!(err, Error::DecodeError(_)));
	}
}
