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

//! A named, OS-backed shared memory region holding a 16-byte header
//! followed by a single serialized payload.
//!
//! Named POSIX shared memory (`shm_open`/`shm_unlink`/`ftruncate` via
//! `libc`) mapped with `memmap2::MmapMut`. POSIX shared memory is a
//! unix-only primitive; this module is unix-only.

use crate::error::{Error, Result};
use memmap2::MmapMut;
use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;

/// Size of the fixed header: 8 bytes payload length `L`, 8 bytes
/// declared capacity `C`.
pub const HEADER_SIZE: usize = 16;

/// Initial segment capacity: 1 MiB.
pub const INITIAL_SIZE: u64 = 1024 * 1024;

/// Hard ceiling on segment capacity: 100 MiB.
pub const C_MAX: u64 = 100 * 1024 * 1024;

/// A single named shared-memory region plus its current mapping.
pub struct Segment {
	mmap: MmapMut,
	/// Name this expansion lineage started from (no `__eN` suffix).
	base_name: String,
	/// Name of the segment currently mapped (`base_name` or
	/// `base_name__eN` after one or more expansions).
	name: String,
	capacity: u64,
	generation: u32,
	is_creator: bool,
}

impl Segment {
	/// Attach to an existing segment named `name`, or create it with
	/// `initial_capacity` if absent. Returns the segment and whether
	/// this call was the one that created it.
	pub fn open_or_create(name: &str, initial_capacity: u64, pool_name: &str) -> Result<(Segment, bool)> {
		validate_name(name)?;
		match attach(name) {
			Ok((mmap, capacity)) => Ok((
				Segment { mmap, base_name: name.to_string(), name: name.to_string(), capacity, generation: 0, is_creator: false },
				false,
			)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				match create(name, initial_capacity) {
					Ok(mmap) => Ok((
						Segment {
							mmap,
							base_name: name.to_string(),
							name: name.to_string(),
							capacity: initial_capacity,
							generation: 0,
							is_creator: true,
						},
						true,
					)),
					Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
						// Lost the create race; someone else created it first.
						let (mmap, capacity) = attach(name).map_err(|e| Error::segment_unavailable(pool_name, e))?;
						Ok((
							Segment {
								mmap,
								base_name: name.to_string(),
								name: name.to_string(),
								capacity,
								generation: 0,
								is_creator: false,
							},
							false,
						))
					}
					Err(e) => Err(Error::segment_unavailable(pool_name, e)),
				}
			}
			Err(e) => Err(Error::segment_unavailable(pool_name, e)),
		}
	}

	/// Read the declared payload out of the header. Returns empty on
	/// `L == 0` or any structurally invalid header (tolerates a torn
	/// read of a segment mid-write by another process).
	pub fn read_payload(&self) -> Vec<u8> {
		if self.mmap.len() < HEADER_SIZE {
			return Vec::new();
		}
		let l = u64::from_le_bytes(self.mmap[0..8].try_into().unwrap());
		if l == 0 {
			return Vec::new();
		}
		let end = match (HEADER_SIZE as u64).checked_add(l) {
			Some(end) if end <= self.mmap.len() as u64 => end as usize,
			_ => return Vec::new(),
		};
		self.mmap[HEADER_SIZE..end].to_vec()
	}

	/// Write `bytes` as the new payload, expanding the segment first
	/// if it doesn't fit.
	pub fn write_payload(&mut self, bytes: &[u8], pool_name: &str) -> Result<()> {
		let needed = HEADER_SIZE as u64 + bytes.len() as u64;
		if needed > self.capacity {
			self.expand(needed, pool_name)?;
		}
		let l = bytes.len() as u64;
		self.mmap[0..8].copy_from_slice(&l.to_le_bytes());
		self.mmap[8..16].copy_from_slice(&self.capacity.to_le_bytes());
		self.mmap[HEADER_SIZE..HEADER_SIZE + bytes.len()].copy_from_slice(bytes);
		Ok(())
	}

	/// Migrate live data to a freshly allocated, larger segment.
	pub fn expand(&mut self, needed: u64, pool_name: &str) -> Result<()> {
		if needed > C_MAX {
			return Err(Error::capacity_exceeded(pool_name, needed, C_MAX));
		}
		let mut new_capacity = self.capacity.max(INITIAL_SIZE);
		while new_capacity < needed {
			new_capacity = new_capacity.saturating_mul(2).min(C_MAX);
			if new_capacity == C_MAX && new_capacity < needed {
				return Err(Error::capacity_exceeded(pool_name, needed, C_MAX));
			}
		}

		self.generation += 1;
		let new_name = format!("{}__e{}", self.base_name, self.generation);
		let mut new_mmap =
			create(&new_name, new_capacity).map_err(|e| Error::segment_unavailable(pool_name, e))?;

		let l = u64::from_le_bytes(self.mmap[0..8].try_into().unwrap_or([0; 8]));
		let prefix_len = (HEADER_SIZE as u64 + l).min(self.mmap.len() as u64) as usize;
		new_mmap[0..prefix_len].copy_from_slice(&self.mmap[0..prefix_len]);
		new_mmap[8..16].copy_from_slice(&new_capacity.to_le_bytes());

		let old_name = std::mem::replace(&mut self.name, new_name);
		let was_creator = self.is_creator;
		self.mmap = new_mmap;
		self.capacity = new_capacity;
		self.is_creator = true;

		if was_creator {
			let _ = unlink(&old_name);
		}
		log::debug!(target: "l0p", "pool '{}' expanded segment to {} bytes", pool_name, new_capacity);
		Ok(())
	}

	/// Current declared capacity `C`.
	pub fn capacity(&self) -> u64 {
		self.capacity
	}

	/// Current payload length `L`, read straight from the header.
	pub fn used(&self) -> u64 {
		if self.mmap.len() < HEADER_SIZE {
			return 0;
		}
		u64::from_le_bytes(self.mmap[0..8].try_into().unwrap())
	}

	/// OS-level name of the segment currently mapped. Implementation
	/// internal after the first expansion; callers must not rely on it.
	pub fn os_name(&self) -> &str {
		&self.name
	}
}

impl Drop for Segment {
	fn drop(&mut self) {
		if self.is_creator {
			let _ = unlink(&self.name);
		}
	}
}

fn validate_name(name: &str) -> Result<()> {
	if !name.starts_with('/') || (name.len() > 1 && name[1..].contains('/')) || name.len() > 255 {
		return Err(Error::segment_unavailable(
			name,
			io::Error::new(io::ErrorKind::InvalidInput, "invalid shared memory segment name"),
		));
	}
	Ok(())
}

fn attach(name: &str) -> io::Result<(MmapMut, u64)> {
	let cname = CString::new(name).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "nul in name"))?;
	// SAFETY: `cname` is a valid NUL-terminated C string for the lifetime of this call.
	let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0) };
	if fd < 0 {
		return Err(io::Error::last_os_error());
	}
	// SAFETY: `fd` is a just-opened, valid, owned file descriptor; wrapping it in a
	// `File` hands ownership to Rust so it is closed exactly once.
	let file = unsafe { File::from_raw_fd(fd) };
	let size = file.metadata()?.len();
	// SAFETY: `file` wraps a valid shared-memory fd sized by a prior creator;
	// mapping its whole length is within bounds.
	let mmap = unsafe { MmapMut::map_mut(&file) }?;
	Ok((mmap, size))
}

fn create(name: &str, size: u64) -> io::Result<MmapMut> {
	let cname = CString::new(name).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "nul in name"))?;
	// SAFETY: `cname` is a valid NUL-terminated C string; `O_CREAT|O_RDWR|O_EXCL`
	// atomically creates a new segment or fails with EEXIST, never silently
	// reusing one.
	let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR | libc::O_EXCL, 0o600) };
	if fd < 0 {
		return Err(io::Error::last_os_error());
	}
	// SAFETY: `fd` is a just-opened, valid, owned file descriptor.
	let file = unsafe { File::from_raw_fd(fd) };
	file.set_len(size)?;
	// SAFETY: `file` was just sized to `size` bytes via `set_len` above.
	let mmap = unsafe { MmapMut::map_mut(&file) }?;
	Ok(mmap)
}

fn unlink(name: &str) -> io::Result<()> {
	let cname = CString::new(name).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "nul in name"))?;
	// SAFETY: `cname` is a valid NUL-terminated C string; unlinking a
	// nonexistent name is a harmless no-op reported as ENOENT.
	let ret = unsafe { libc::shm_unlink(cname.as_ptr()) };
	if ret < 0 {
		let err = io::Error::last_os_error();
		if err.kind() != io::ErrorKind::NotFound {
			return Err(err);
		}
	}
	Ok(())
}

/// List the names of all live `l0p_`-prefixed segments in `/dev/shm`,
/// without the leading slash. Used by [`crate::Pool::list_pools`] and
/// friends; skips expansion-derived names (`__eN` suffix).
pub fn list_live_segment_names() -> Vec<String> {
	let mut names = Vec::new();
	let Ok(entries) = std::fs::read_dir("/dev/shm") else {
		return names;
	};
	for entry in entries.flatten() {
		let Some(name) = entry.file_name().to_str().map(str::to_string) else {
			continue;
		};
		if name.starts_with("l0p_") && !name.contains("__e") {
			names.push(name);
		}
	}
	names
}

/// Check whether a segment with OS name `name` (leading slash included)
/// currently exists.
pub fn exists(name: &str) -> bool {
	let Ok(cname) = CString::new(name) else {
		return false;
	};
	// SAFETY: `cname` is a valid NUL-terminated C string; O_RDONLY with no
	// O_CREAT performs a pure existence check and never mutates state.
	let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
	if fd >= 0 {
		// SAFETY: `fd` is a valid, just-opened descriptor not used anywhere else.
		unsafe {
			libc::close(fd);
		}
		true
	} else {
		false
	}
}

/// Unlink a segment by OS name, ignoring "not found".
pub fn destroy(name: &str) -> Result<()> {
	unlink(name).map_err(|e| Error::segment_unavailable(name, e))
}
