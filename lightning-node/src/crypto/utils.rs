// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use bitcoin::secp256k1::{ecdsa::Signature, Message, Secp256k1, SecretKey, Signing};

use crate::sign::EntropySource;

use core::ops::Deref;

#[inline]
pub fn sign<C: Signing>(ctx: &Secp256k1<C>, msg: &Message, sk: &SecretKey) -> Signature {
	#[cfg(feature = "grind_signatures")]
	let sig = ctx.sign_ecdsa_low_r(msg, sk);
	#[cfg(not(feature = "grind_signatures"))]
	let sig = ctx.sign_ecdsa(msg, sk);
	sig
}

/// Signs with extra entropy mixed into the nonce. Used where signatures need not be
/// reproducible.
#[inline]
pub fn sign_with_aux_rand<C: Signing, ES: Deref>(
	ctx: &Secp256k1<C>, msg: &Message, sk: &SecretKey, entropy_source: &ES,
) -> Signature
where
	ES::Target: EntropySource,
{
	#[cfg(feature = "grind_signatures")]
	let sig = loop {
		let sig = ctx.sign_ecdsa_with_noncedata(msg, sk, &entropy_source.get_secure_random_bytes());
		if sig.serialize_compact()[0] < 0x80 {
			break sig;
		}
	};
	#[cfg(not(feature = "grind_signatures"))]
	let sig = ctx.sign_ecdsa_with_noncedata(msg, sk, &entropy_source.get_secure_random_bytes());
	sig
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sign::RandomBytes;
	use crate::util::test_utils::privkey;
	use bitcoin::secp256k1::PublicKey;

	#[test]
	fn signatures_verify() {
		let secp_ctx = Secp256k1::new();
		let msg = Message::from_digest([0x42; 32]);
		let pubkey = PublicKey::from_secret_key(&secp_ctx, &privkey(1));

		let sig = sign(&secp_ctx, &msg, &privkey(1));
		assert!(secp_ctx.verify_ecdsa(&msg, &sig, &pubkey).is_ok());
		assert_eq!(sig, sign(&secp_ctx, &msg, &privkey(1)));

		let entropy = RandomBytes::new([7; 32]);
		let sig = sign_with_aux_rand(&secp_ctx, &msg, &privkey(1), &&entropy);
		assert!(secp_ctx.verify_ecdsa(&msg, &sig, &pubkey).is_ok());
		#[cfg(feature = "grind_signatures")]
		assert!(sig.serialize_compact()[0] < 0x80);
	}
}
