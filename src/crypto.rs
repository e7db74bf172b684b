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

//! At-rest encryption for pool payloads: AES-256-GCM with the key
//! derived from the caller's `auth_key` string via SHA-256.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

fn derive_key(auth_key: &str) -> Key<Aes256Gcm> {
	let digest = Sha256::digest(auth_key.as_bytes());
	*Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encrypt `plaintext` under `auth_key`. The returned bytes are
/// `nonce || ciphertext`; the nonce is randomly generated per call.
pub fn encrypt(plaintext: &[u8], auth_key: &str) -> Vec<u8> {
	let cipher = Aes256Gcm::new(&derive_key(auth_key));
	let mut nonce_bytes = [0u8; NONCE_LEN];
	rand::thread_rng().fill_bytes(&mut nonce_bytes);
	let nonce = Nonce::from_slice(&nonce_bytes);
	// AES-256-GCM only fails to encrypt on buffer/size misuse, never on
	// plaintext content; a failure here would be a programming error.
	let ciphertext = cipher.encrypt(nonce, plaintext).expect("AES-GCM encryption cannot fail for well-formed input");
	let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
	out.extend_from_slice(&nonce_bytes);
	out.extend_from_slice(&ciphertext);
	out
}

/// Inverse of [`encrypt`]. Returns `None` if `data` is too short to
/// contain a nonce, or if authentication fails (wrong key or
/// corrupted/tampered ciphertext).
pub fn decrypt(data: &[u8], auth_key: &str) -> Option<Vec<u8>> {
	if data.len() < NONCE_LEN {
		return None;
	}
	let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
	let cipher = Aes256Gcm::new(&derive_key(auth_key));
	cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext).ok()
}
