// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The Noise `CipherState`: a key, the chaining key it rotates with and a nonce counter.

use crate::crypto::hkdf::hkdf_extract_expand;
use crate::crypto::secure_key::SecureKey;
use crate::crypto::{CryptoError, CryptoProvider, RustCryptoProvider, TAG_SIZE};

/// The nonce at which the key is rotated, per BOLT 8.
pub const MAX_NONCE: u64 = 1000;

struct CipherKeys {
	key: SecureKey,
	chaining_key: SecureKey,
}

/// Authenticated encryption under one key with an implicit, strictly increasing nonce.
///
/// Each [`Self::encrypt`] or [`Self::decrypt`] consumes one nonce. When the nonce reaches
/// [`MAX_NONCE`] the key is rotated before the next operation, so callers never see the nonce
/// run out. Until a key is set both operations copy their input unchanged, as the Noise
/// framework specifies for the first handshake message.
///
/// A cipher state must only be driven from one place: both ends of a connection have to process
/// messages in exactly the same order for their nonces to agree.
pub struct CipherState<C: CryptoProvider = RustCryptoProvider> {
	keys: Option<CipherKeys>,
	nonce: u64,
	provider: C,
}

impl CipherState<RustCryptoProvider> {
	/// A cipher state without a key, using the default crypto backend.
	pub fn new() -> Self {
		Self::with_provider(RustCryptoProvider)
	}
}

impl Default for CipherState<RustCryptoProvider> {
	fn default() -> Self {
		Self::new()
	}
}

impl<C: CryptoProvider> CipherState<C> {
	/// A cipher state without a key, using `provider` for its primitives.
	pub fn with_provider(provider: C) -> Self {
		CipherState { keys: None, nonce: 0, provider }
	}

	/// Sets the key and the chaining key used to rotate it, and resets the nonce to 0. Both
	/// inputs are zeroed.
	///
	/// Calling this again replaces the key, which the handshake does between acts.
	pub fn initialize_key(&mut self, key: &mut [u8; 32], chaining_key: &mut [u8; 32]) {
		match self.keys {
			Some(ref mut keys) => {
				keys.key.replace(key);
				keys.chaining_key.replace(chaining_key);
			},
			None => {
				self.keys = Some(CipherKeys {
					key: SecureKey::new(key),
					chaining_key: SecureKey::new(chaining_key),
				});
			},
		}
		self.nonce = 0;
	}

	/// Whether a key has been set.
	pub fn has_key(&self) -> bool {
		self.keys.is_some()
	}

	/// The nonce the next operation will use, unless it rotates the key first.
	pub fn nonce(&self) -> u64 {
		self.nonce
	}

	/// Encrypts `plaintext` into `out`, appending the 16 byte tag, and returns the number of bytes
	/// written. Rotates the key first if the nonce is exhausted.
	///
	/// Without a key, `plaintext` is copied to `out` as is.
	pub fn encrypt(
		&mut self, associated_data: &[u8], plaintext: &[u8], out: &mut [u8],
	) -> Result<usize, CryptoError> {
		if !self.has_key() {
			return passthrough(plaintext, out);
		}
		if self.nonce == MAX_NONCE {
			self.rekey()?;
		}
		let written = self.encrypt_with_nonce(self.nonce, associated_data, plaintext, out)?;
		self.nonce += 1;
		Ok(written)
	}

	/// Authenticates and decrypts `ciphertext` (tag included) into `out`, returning the number of
	/// plaintext bytes. Rotates the key first if the nonce is exhausted.
	///
	/// The nonce is consumed even if authentication fails: a cipher state which failed to decrypt
	/// is out of step with its peer and must be discarded.
	pub fn decrypt(
		&mut self, associated_data: &[u8], ciphertext: &[u8], out: &mut [u8],
	) -> Result<usize, CryptoError> {
		if !self.has_key() {
			return passthrough(ciphertext, out);
		}
		if self.nonce == MAX_NONCE {
			self.rekey()?;
		}
		let nonce = self.nonce;
		self.nonce += 1;
		self.decrypt_with_nonce(nonce, associated_data, ciphertext, out)
	}

	/// Encrypts under an explicit nonce without touching the counter or rotating the key.
	///
	/// Fails with [`CryptoError::NonceExhausted`] for nonces at or past [`MAX_NONCE`], which this
	/// key must never be used with.
	pub fn encrypt_with_nonce(
		&self, nonce: u64, associated_data: &[u8], plaintext: &[u8], out: &mut [u8],
	) -> Result<usize, CryptoError> {
		let keys = self.keys.as_ref().ok_or(CryptoError::MissingKey)?;
		if nonce >= MAX_NONCE {
			return Err(CryptoError::NonceExhausted);
		}
		self.provider.aead_encrypt(keys.key.as_bytes(), nonce, associated_data, plaintext, out)
	}

	/// Decrypts under an explicit nonce without touching the counter or rotating the key.
	pub fn decrypt_with_nonce(
		&self, nonce: u64, associated_data: &[u8], ciphertext: &[u8], out: &mut [u8],
	) -> Result<usize, CryptoError> {
		let keys = self.keys.as_ref().ok_or(CryptoError::MissingKey)?;
		if nonce >= MAX_NONCE {
			return Err(CryptoError::NonceExhausted);
		}
		self.provider.aead_decrypt(keys.key.as_bytes(), nonce, associated_data, ciphertext, out)
	}

	/// Rotates the key: `ck', k' = HKDF(ck, k)`, and resets the nonce to 0.
	pub fn rekey(&mut self) -> Result<(), CryptoError> {
		let keys = self.keys.as_mut().ok_or(CryptoError::MissingKey)?;
		let (mut chaining_key, mut key) = hkdf_extract_expand(
			&self.provider,
			keys.chaining_key.as_bytes(),
			keys.key.as_bytes(),
		);
		keys.chaining_key.replace(&mut chaining_key);
		keys.key.replace(&mut key);
		self.nonce = 0;
		Ok(())
	}

	#[cfg(test)]
	pub(crate) fn key_bytes(&self) -> Option<[u8; 32]> {
		self.keys.as_ref().map(|keys| *keys.key.as_bytes())
	}
}

fn passthrough(input: &[u8], out: &mut [u8]) -> Result<usize, CryptoError> {
	if out.len() < input.len() {
		return Err(CryptoError::BufferTooSmall { needed: input.len(), available: out.len() });
	}
	out[..input.len()].copy_from_slice(input);
	Ok(input.len())
}

/// The ciphertext length for a plaintext of `len` bytes.
pub(crate) const fn encrypted_len(len: usize) -> usize {
	len + TAG_SIZE
}
