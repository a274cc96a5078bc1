// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Owned handles for secret key material.
//!
//! A [`SecureKey`] keeps its 32 bytes on the heap at a stable address, asks the OS not to swap
//! that page out, and wipes the bytes when dropped. Transport keys, chaining keys and the node's
//! static key all live in one.

use core::fmt;
use std::sync::OnceLock;

use bitcoin::secp256k1::{self, PublicKey, Secp256k1, SecretKey, Signing};
use zeroize::Zeroize;

use crate::prelude::*;
use crate::util::errors::CriticalError;

#[cfg(unix)]
mod mem {
	use core::ffi::{c_int, c_void};

	extern "C" {
		fn mlock(addr: *const c_void, len: usize) -> c_int;
		fn munlock(addr: *const c_void, len: usize) -> c_int;
	}

	pub(super) fn lock(bytes: &[u8; 32]) -> bool {
		// SAFETY: the pointer and length describe a live allocation owned by the caller.
		unsafe { mlock(bytes.as_ptr() as *const c_void, bytes.len()) == 0 }
	}

	pub(super) fn unlock(bytes: &[u8; 32]) {
		// SAFETY: as above; unlocking a page we never locked is harmless.
		unsafe {
			munlock(bytes.as_ptr() as *const c_void, bytes.len());
		}
	}
}

#[cfg(not(unix))]
mod mem {
	pub(super) fn lock(_bytes: &[u8; 32]) -> bool {
		false
	}

	pub(super) fn unlock(_bytes: &[u8; 32]) {}
}

/// 32 bytes of secret material which are zeroed when dropped.
///
/// Locking the backing page in memory is best effort: `mlock` can fail under a low
/// `RLIMIT_MEMLOCK`, in which case the key still works and is still wiped on drop.
pub struct SecureKey {
	bytes: Box<[u8; 32]>,
	locked: bool,
}

impl SecureKey {
	/// Moves `bytes` into a new secure allocation, zeroing the caller's copy.
	pub fn new(bytes: &mut [u8; 32]) -> Self {
		let mut boxed = Box::new([0u8; 32]);
		let locked = mem::lock(&boxed);
		boxed.copy_from_slice(&bytes[..]);
		bytes.zeroize();
		Self { bytes: boxed, locked }
	}

	/// Builds a key from a secp256k1 secret key.
	pub fn from_secret_key(key: &SecretKey) -> Self {
		Self::new(&mut key.secret_bytes())
	}

	/// The raw key bytes. Copies made from this are not wiped for you.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.bytes
	}

	/// Interprets the bytes as a secp256k1 secret key.
	pub fn secret_key(&self) -> Result<SecretKey, secp256k1::Error> {
		SecretKey::from_slice(&self.bytes[..])
	}

	/// The public key for this secret, if it is a valid secp256k1 scalar.
	pub fn public_key<C: Signing>(
		&self, secp_ctx: &Secp256k1<C>,
	) -> Result<PublicKey, secp256k1::Error> {
		Ok(PublicKey::from_secret_key(secp_ctx, &self.secret_key()?))
	}

	/// Replaces the contents in place, zeroing `bytes`. The allocation (and its lock) is kept.
	pub fn replace(&mut self, bytes: &mut [u8; 32]) {
		self.bytes.copy_from_slice(&bytes[..]);
		bytes.zeroize();
	}

	/// Whether the backing memory was successfully locked against swapping.
	pub fn is_locked(&self) -> bool {
		self.locked
	}
}

impl Clone for SecureKey {
	fn clone(&self) -> Self {
		Self::new(&mut *self.bytes.clone())
	}
}

impl PartialEq for SecureKey {
	fn eq(&self, other: &Self) -> bool {
		crate::crypto::fixed_time_eq(&self.bytes[..], &other.bytes[..])
	}
}
impl Eq for SecureKey {}

impl fmt::Debug for SecureKey {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("SecureKey(..)")
	}
}

impl Drop for SecureKey {
	fn drop(&mut self) {
		self.bytes.zeroize();
		if self.locked {
			mem::unlock(&self.bytes);
		}
	}
}

/// Holds the node's long-term static key.
///
/// The key is set exactly once, typically at startup, and is read-only afterwards. The store is
/// an ordinary value: construct one, share it by reference (or in an `Arc`) with whatever needs
/// the node identity.
pub struct StaticKeyStore {
	key: OnceLock<SecureKey>,
}

impl StaticKeyStore {
	/// Creates an empty store.
	pub const fn new() -> Self {
		Self { key: OnceLock::new() }
	}

	/// Loads the node's static secret key.
	///
	/// Loading a second time is an invariant violation and is reported as a [`CriticalError`];
	/// the key which was loaded first stays in place.
	pub fn initialize(&self, secret: &SecretKey) -> Result<(), CriticalError> {
		let mut loaded = false;
		self.key.get_or_init(|| {
			loaded = true;
			SecureKey::from_secret_key(secret)
		});
		if loaded {
			Ok(())
		} else {
			Err(CriticalError::KeyAlreadyInitialized)
		}
	}

	/// Whether a key has been loaded.
	pub fn is_initialized(&self) -> bool {
		self.key.get().is_some()
	}

	/// The loaded key, or [`CriticalError::KeyNotInitialized`].
	pub fn get(&self) -> Result<&SecureKey, CriticalError> {
		self.key.get().ok_or(CriticalError::KeyNotInitialized)
	}

	/// The loaded key as a secp256k1 secret key.
	pub fn secret_key(&self) -> Result<SecretKey, CriticalError> {
		self.get()?.secret_key().map_err(|_| CriticalError::KeyNotInitialized)
	}

	/// The node id, i.e. the public key of the static key.
	pub fn node_id<C: Signing>(&self, secp_ctx: &Secp256k1<C>) -> Result<PublicKey, CriticalError> {
		Ok(PublicKey::from_secret_key(secp_ctx, &self.secret_key()?))
	}
}

impl Default for StaticKeyStore {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_wipes_source() {
		let mut source = [0x42u8; 32];
		let key = SecureKey::new(&mut source);
		assert_eq!(source, [0u8; 32]);
		assert_eq!(key.as_bytes(), &[0x42u8; 32]);

		let mut next = [0x43u8; 32];
		let mut key = key;
		key.replace(&mut next);
		assert_eq!(next, [0u8; 32]);
		assert_eq!(key.as_bytes(), &[0x43u8; 32]);
	}

	#[test]
	fn debug_is_redacted() {
		let key = SecureKey::new(&mut [0xab; 32]);
		assert_eq!(format!("{:?}", key), "SecureKey(..)");
	}

	#[test]
	fn key_store_double_initialization() {
		let secp_ctx = Secp256k1::signing_only();
		let store = StaticKeyStore::new();
		assert_eq!(store.get().err(), Some(CriticalError::KeyNotInitialized));

		let first = SecretKey::from_slice(&[0x11; 32]).unwrap();
		let second = SecretKey::from_slice(&[0x21; 32]).unwrap();
		store.initialize(&first).unwrap();
		assert_eq!(store.initialize(&second), Err(CriticalError::KeyAlreadyInitialized));
		assert_eq!(store.secret_key().unwrap(), first);
		assert_eq!(
			store.node_id(&secp_ctx).unwrap(),
			PublicKey::from_secret_key(&secp_ctx, &first)
		);
	}
}
