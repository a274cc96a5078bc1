// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! HKDF as used by [BOLT #8](https://github.com/lightning/bolts/blob/master/08-transport.md#handshake-state).

use crate::crypto::{CryptoProvider, RustCryptoProvider};

/// Implements HKDF ([RFC 5869](https://tools.ietf.org/html/rfc5869)) with SHA256, a zero-length
/// info field, and 64 bytes of output returned as two 32 byte halves.
pub fn hkdf_extract_expand<C: CryptoProvider>(
	provider: &C, salt: &[u8], ikm: &[u8],
) -> ([u8; 32], [u8; 32]) {
	// PRK = HMAC-Hash(salt, IKM)
	let prk = provider.hmac_sha256(salt, &[ikm]);
	// T(1) = HMAC-Hash(PRK, T(0) | info | 0x01), T(0) and info being empty
	let t1 = provider.hmac_sha256(&prk, &[&[1]]);
	// T(2) = HMAC-Hash(PRK, T(1) | info | 0x02)
	let t2 = provider.hmac_sha256(&prk, &[&t1, &[2]]);
	(t1, t2)
}

/// [`hkdf_extract_expand`] with the default provider.
pub fn hkdf_extract_expand_twice(salt: &[u8], ikm: &[u8]) -> ([u8; 32], [u8; 32]) {
	hkdf_extract_expand(&RustCryptoProvider, salt, ikm)
}

#[cfg(test)]
mod tests {
	use super::*;
	use bitcoin::hex::FromHex;

	// RFC 5869 Appendix A.3: SHA-256 with zero-length salt and info. The vector is 42 bytes long
	// so we compare its prefix.
	#[test]
	fn rfc_5869_test_vector_3() {
		let ikm = Vec::<u8>::from_hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b").unwrap();
		let (t1, t2) = hkdf_extract_expand_twice(&[], &ikm);

		let mut okm = t1.to_vec();
		okm.extend_from_slice(&t2);
		okm.truncate(42);
		assert_eq!(okm, Vec::<u8>::from_hex("8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8").unwrap());
	}

	#[test]
	fn output_depends_on_salt() {
		let ikm = [0x0bu8; 22];
		let salt = Vec::<u8>::from_hex("000102030405060708090a0b0c").unwrap();
		let (a1, a2) = hkdf_extract_expand_twice(&salt, &ikm);
		let (b1, b2) = hkdf_extract_expand_twice(&salt, &ikm);
		assert_eq!((a1, a2), (b1, b2));
		assert_ne!(hkdf_extract_expand_twice(&[], &ikm), (a1, a2));
		assert_ne!(a1, a2);
	}
}
