// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Cryptographic primitives the protocol layers are built on.
//!
//! Everything above this module reaches the primitives through the [`CryptoProvider`] trait, so a
//! backend (e.g. a hardware-accelerated or FIPS-validated AEAD) can be swapped at build time by
//! picking a different type parameter. [`RustCryptoProvider`] is the default backend.

use core::fmt;

use bitcoin::hashes::hmac::{Hmac, HmacEngine};
use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::secp256k1::ecdh::SharedSecret;
use bitcoin::secp256k1::{PublicKey, SecretKey};

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag, XChaCha20Poly1305, XNonce};

pub(crate) use bitcoin::hashes::cmp::fixed_time_eq;

pub mod hkdf;
pub mod secure_key;
pub(crate) mod utils;

/// The size of the Poly1305 authentication tag appended to every ciphertext.
pub const TAG_SIZE: usize = 16;

/// Errors returned by [`CryptoProvider`] and the cipher states built on top of it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
	/// The authentication tag did not match, the data was corrupted or forged.
	InvalidTag,
	/// The output buffer cannot hold the result.
	BufferTooSmall {
		/// The number of bytes the operation needed.
		needed: usize,
		/// The number of bytes available.
		available: usize,
	},
	/// The nonce reached the point where the key must be rotated before use.
	NonceExhausted,
	/// No key has been set on a cipher state which requires one.
	MissingKey,
}

impl fmt::Debug for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			CryptoError::InvalidTag => f.write_str("invalid authentication tag"),
			CryptoError::BufferTooSmall { needed, available } => {
				write!(f, "buffer too small: needed {} bytes, have {}", needed, available)
			},
			CryptoError::NonceExhausted => f.write_str("nonce exhausted, key must be rotated"),
			CryptoError::MissingKey => f.write_str("no key set"),
		}
	}
}

impl fmt::Display for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for CryptoError {}

/// A backend supplying the primitives used by the Lightning transport and key derivation.
///
/// All methods are pure functions of their inputs. Implementations must be cheap to clone, since
/// every cipher state holds its own handle.
pub trait CryptoProvider: Clone {
	/// Computes SHA256 over the concatenation of `data`.
	fn sha256(&self, data: &[&[u8]]) -> [u8; 32];

	/// Computes HMAC-SHA256 keyed with `key` over the concatenation of `data`.
	fn hmac_sha256(&self, key: &[u8], data: &[&[u8]]) -> [u8; 32];

	/// Encrypts `plaintext` with ChaCha20-Poly1305 (IETF), writing the ciphertext followed by the
	/// 16 byte tag into `out`. Returns the number of bytes written.
	///
	/// The 96-bit nonce is four zero bytes followed by `nonce` in little-endian, as BOLT 8
	/// requires.
	fn aead_encrypt(
		&self, key: &[u8; 32], nonce: u64, associated_data: &[u8], plaintext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError>;

	/// Decrypts and authenticates `ciphertext` (which includes the trailing tag) into `out`.
	/// Returns the number of plaintext bytes written.
	fn aead_decrypt(
		&self, key: &[u8; 32], nonce: u64, associated_data: &[u8], ciphertext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError>;

	/// Encrypts with XChaCha20-Poly1305, whose 192-bit nonce is safe to pick at random.
	fn xaead_encrypt(
		&self, key: &[u8; 32], nonce: &[u8; 24], associated_data: &[u8], plaintext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError>;

	/// Decrypts and authenticates an XChaCha20-Poly1305 ciphertext.
	fn xaead_decrypt(
		&self, key: &[u8; 32], nonce: &[u8; 24], associated_data: &[u8], ciphertext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError>;

	/// Performs ECDH as defined in BOLT 8: the SHA256 of the compressed shared point.
	fn ecdh(&self, secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32];
}

/// The default [`CryptoProvider`]: RustCrypto's `chacha20poly1305` for the AEADs and
/// `bitcoin::hashes`/`secp256k1` for everything else.
#[derive(Clone, Copy, Debug, Default)]
pub struct RustCryptoProvider;

#[inline]
fn check_encrypt_capacity(plaintext: &[u8], out: &[u8]) -> Result<usize, CryptoError> {
	let needed = plaintext.len() + TAG_SIZE;
	if out.len() < needed {
		return Err(CryptoError::BufferTooSmall { needed, available: out.len() });
	}
	Ok(needed)
}

#[inline]
fn check_decrypt_capacity(ciphertext: &[u8], out: &[u8]) -> Result<usize, CryptoError> {
	if ciphertext.len() < TAG_SIZE {
		return Err(CryptoError::InvalidTag);
	}
	let needed = ciphertext.len() - TAG_SIZE;
	if out.len() < needed {
		return Err(CryptoError::BufferTooSmall { needed, available: out.len() });
	}
	Ok(needed)
}

#[inline]
fn bolt8_nonce(nonce: u64) -> [u8; 12] {
	let mut nonce_bytes = [0; 12];
	nonce_bytes[4..].copy_from_slice(&nonce.to_le_bytes());
	nonce_bytes
}

macro_rules! aead_encrypt_detached {
	($cipher: expr, $nonce: expr, $associated_data: expr, $plaintext: expr, $out: expr) => {{
		let total_len = check_encrypt_capacity($plaintext, $out)?;
		let (body, tag_out) = $out[..total_len].split_at_mut($plaintext.len());
		body.copy_from_slice($plaintext);
		let tag = $cipher
			.encrypt_in_place_detached($nonce, $associated_data, body)
			.map_err(|_| CryptoError::BufferTooSmall { needed: total_len, available: total_len })?;
		tag_out.copy_from_slice(&tag);
		Ok(total_len)
	}};
}

macro_rules! aead_decrypt_detached {
	($cipher: expr, $nonce: expr, $associated_data: expr, $ciphertext: expr, $out: expr) => {{
		let plaintext_len = check_decrypt_capacity($ciphertext, $out)?;
		let (body, tag) = $ciphertext.split_at(plaintext_len);
		let plaintext = &mut $out[..plaintext_len];
		plaintext.copy_from_slice(body);
		match $cipher.decrypt_in_place_detached($nonce, $associated_data, plaintext, Tag::from_slice(tag)) {
			Ok(()) => Ok(plaintext_len),
			Err(_) => {
				// Don't hand back unauthenticated plaintext.
				plaintext.fill(0);
				Err(CryptoError::InvalidTag)
			},
		}
	}};
}

impl CryptoProvider for RustCryptoProvider {
	fn sha256(&self, data: &[&[u8]]) -> [u8; 32] {
		let mut sha = Sha256::engine();
		for chunk in data {
			sha.input(chunk);
		}
		Sha256::from_engine(sha).to_byte_array()
	}

	fn hmac_sha256(&self, key: &[u8], data: &[&[u8]]) -> [u8; 32] {
		let mut hmac = HmacEngine::<Sha256>::new(key);
		for chunk in data {
			hmac.input(chunk);
		}
		Hmac::from_engine(hmac).to_byte_array()
	}

	fn aead_encrypt(
		&self, key: &[u8; 32], nonce: u64, associated_data: &[u8], plaintext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError> {
		let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
		let nonce_bytes = bolt8_nonce(nonce);
		aead_encrypt_detached!(cipher, Nonce::from_slice(&nonce_bytes), associated_data, plaintext, out)
	}

	fn aead_decrypt(
		&self, key: &[u8; 32], nonce: u64, associated_data: &[u8], ciphertext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError> {
		let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
		let nonce_bytes = bolt8_nonce(nonce);
		aead_decrypt_detached!(cipher, Nonce::from_slice(&nonce_bytes), associated_data, ciphertext, out)
	}

	fn xaead_encrypt(
		&self, key: &[u8; 32], nonce: &[u8; 24], associated_data: &[u8], plaintext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError> {
		let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
		aead_encrypt_detached!(cipher, XNonce::from_slice(nonce), associated_data, plaintext, out)
	}

	fn xaead_decrypt(
		&self, key: &[u8; 32], nonce: &[u8; 24], associated_data: &[u8], ciphertext: &[u8],
		out: &mut [u8],
	) -> Result<usize, CryptoError> {
		let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
		aead_decrypt_detached!(cipher, XNonce::from_slice(nonce), associated_data, ciphertext, out)
	}

	fn ecdh(&self, secret_key: &SecretKey, public_key: &PublicKey) -> [u8; 32] {
		SharedSecret::new(public_key, secret_key).secret_bytes()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bitcoin::hex::FromHex;
	use bitcoin::secp256k1::Secp256k1;

	#[test]
	fn aead_authenticates() {
		let provider = RustCryptoProvider;
		let key = [0x42u8; 32];
		let plaintext = b"Ladies and Gentlemen of the class of '99";
		let mut ciphertext = [0u8; 40 + TAG_SIZE];
		let written = provider.aead_encrypt(&key, 7, b"header", plaintext, &mut ciphertext).unwrap();
		assert_eq!(written, plaintext.len() + TAG_SIZE);

		let mut decrypted = [0u8; 40];
		let read = provider.aead_decrypt(&key, 7, b"header", &ciphertext, &mut decrypted).unwrap();
		assert_eq!(&decrypted[..read], &plaintext[..]);

		// Wrong nonce, wrong associated data and a flipped bit all fail authentication.
		assert_eq!(provider.aead_decrypt(&key, 8, b"header", &ciphertext, &mut decrypted), Err(CryptoError::InvalidTag));
		assert_eq!(provider.aead_decrypt(&key, 7, b"footer", &ciphertext, &mut decrypted), Err(CryptoError::InvalidTag));
		ciphertext[0] ^= 1;
		assert_eq!(provider.aead_decrypt(&key, 7, b"header", &ciphertext, &mut decrypted), Err(CryptoError::InvalidTag));
		assert_eq!(decrypted, [0u8; 40]);
	}

	#[test]
	fn aead_capacity_errors() {
		let provider = RustCryptoProvider;
		let key = [1u8; 32];
		let mut small = [0u8; 20];
		assert_eq!(
			provider.aead_encrypt(&key, 0, &[], &[0u8; 5], &mut small),
			Err(CryptoError::BufferTooSmall { needed: 21, available: 20 })
		);
		assert_eq!(provider.aead_decrypt(&key, 0, &[], &[0u8; 15], &mut small), Err(CryptoError::InvalidTag));
	}

	#[test]
	fn xaead_round_trip() {
		let provider = RustCryptoProvider;
		let key = [7u8; 32];
		let nonce = [9u8; 24];
		let mut ciphertext = [0u8; 3 + TAG_SIZE];
		provider.xaead_encrypt(&key, &nonce, &[], b"abc", &mut ciphertext).unwrap();
		let mut plaintext = [0u8; 3];
		provider.xaead_decrypt(&key, &nonce, &[], &ciphertext, &mut plaintext).unwrap();
		assert_eq!(&plaintext, b"abc");
		assert!(provider.xaead_decrypt(&key, &[8u8; 24], &[], &ciphertext, &mut plaintext).is_err());
	}

	#[test]
	fn ecdh_is_symmetric() {
		let provider = RustCryptoProvider;
		let secp_ctx = Secp256k1::new();
		let a = SecretKey::from_slice(&[0x11; 32]).unwrap();
		let b = SecretKey::from_slice(&[0x21; 32]).unwrap();
		let a_pub = PublicKey::from_secret_key(&secp_ctx, &a);
		let b_pub = PublicKey::from_secret_key(&secp_ctx, &b);
		assert_eq!(provider.ecdh(&a, &b_pub), provider.ecdh(&b, &a_pub));
	}

	#[test]
	fn sha256_and_hmac_chunks() {
		let provider = RustCryptoProvider;
		assert_eq!(
			provider.sha256(&[b"Noise_XK_secp256k1_", b"ChaChaPoly_SHA256"]).to_vec(),
			Vec::<u8>::from_hex("2640f52eebcd9e882958951c794250eedb28002c05d7dc2ea0f195406042caf1").unwrap()
		);
		assert_eq!(provider.hmac_sha256(b"key", &[b"a", b"b"]), provider.hmac_sha256(b"key", &[b"ab"]));
	}
}
