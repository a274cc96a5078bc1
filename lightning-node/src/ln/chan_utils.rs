// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various utilities for building scripts and deriving keys related to channels. These are
//! largely of interest for those implementing the [`commitment`] module or a signer.
//!
//! [`commitment`]: crate::ln::commitment

use bitcoin::hashes::ripemd160::Hash as Ripemd160;
use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::opcodes;
use bitcoin::script::{Builder, ScriptBuf};
use bitcoin::secp256k1::{self, PublicKey, Scalar, Secp256k1, SecretKey};
use bitcoin::{PubkeyHash, WPubkeyHash};

use crate::ln::types::PaymentHash;

/// The default number of blocks we require our counterparty to wait before claiming their
/// balance from a commitment transaction they broadcast.
pub const BREAKDOWN_TIMEOUT: u16 = 6 * 24;

/// Maximum number of one-way in-flight HTLC (protocol-level value).
pub const MAX_HTLCS: u16 = 483;

/// The value of each anchor output on an `option_anchors` commitment transaction.
pub const ANCHOR_OUTPUT_VALUE_SATOSHI: u64 = 330;

/// The weight of a commitment transaction with no HTLC outputs, non-anchor variant.
pub const COMMITMENT_TX_BASE_WEIGHT: u64 = 724;
/// The weight of a commitment transaction with no HTLC outputs, anchor variant.
pub const COMMITMENT_TX_BASE_ANCHOR_WEIGHT: u64 = 1124;
/// The weight each untrimmed HTLC output adds to a commitment transaction.
pub const COMMITMENT_TX_WEIGHT_PER_HTLC: u64 = 172;

/// The weight of a BIP141 witnessScript for a BOLT3's "offered HTLC output" on a commitment transaction, non-anchor variant.
pub const OFFERED_HTLC_SCRIPT_WEIGHT: usize = 133;
/// The weight of a BIP141 witnessScript for a BOLT3's "offered HTLC output" on a commitment transaction, anchor variant.
pub const OFFERED_HTLC_SCRIPT_WEIGHT_ANCHORS: usize = 136;
/// The weight of a BIP141 witnessScript for a BOLT3's "received HTLC output" can vary in function
/// of its CLTV argument value. This is the maximum post-anchor value.
pub const MAX_ACCEPTED_HTLC_SCRIPT_WEIGHT: usize = 143;

/// Gets the weight for an HTLC-Success transaction.
#[inline]
pub fn htlc_success_tx_weight(opt_anchors: bool) -> u64 {
	const HTLC_SUCCESS_TX_WEIGHT: u64 = 703;
	const HTLC_SUCCESS_ANCHOR_TX_WEIGHT: u64 = 706;
	if opt_anchors { HTLC_SUCCESS_ANCHOR_TX_WEIGHT } else { HTLC_SUCCESS_TX_WEIGHT }
}

/// Gets the weight for an HTLC-Timeout transaction.
#[inline]
pub fn htlc_timeout_tx_weight(opt_anchors: bool) -> u64 {
	const HTLC_TIMEOUT_TX_WEIGHT: u64 = 663;
	const HTLC_TIMEOUT_ANCHOR_TX_WEIGHT: u64 = 666;
	if opt_anchors { HTLC_TIMEOUT_ANCHOR_TX_WEIGHT } else { HTLC_TIMEOUT_TX_WEIGHT }
}

/// Gets the weight of a commitment transaction before any HTLC outputs are added.
#[inline]
pub fn commitment_tx_base_weight(opt_anchors: bool) -> u64 {
	if opt_anchors { COMMITMENT_TX_BASE_ANCHOR_WEIGHT } else { COMMITMENT_TX_BASE_WEIGHT }
}

/// The fee, in satoshis, the funder pays for a commitment transaction with `num_htlcs` untrimmed
/// HTLC outputs. Rounds down, as BOLT 3 does.
#[inline]
pub fn commit_tx_fee_sat(feerate_per_kw: u32, num_htlcs: usize, opt_anchors: bool) -> u64 {
	let weight = commitment_tx_base_weight(opt_anchors)
		+ num_htlcs as u64 * COMMITMENT_TX_WEIGHT_PER_HTLC;
	feerate_per_kw as u64 * weight / 1000
}

/// Build the commitment secret from the seed and the commitment number
pub fn build_commitment_secret(commitment_seed: &[u8; 32], idx: u64) -> [u8; 32] {
	let mut res: [u8; 32] = *commitment_seed;
	for i in 0..48 {
		let bitpos = 47 - i;
		if idx & (1 << bitpos) == (1 << bitpos) {
			res[bitpos / 8] ^= 1 << (bitpos & 7);
			res = Sha256::hash(&res).to_byte_array();
		}
	}
	res
}

/// Derives a per-commitment-transaction private key (eg an htlc key or delayed_payment key)
/// from the base secret and the per_commitment_point.
pub fn derive_private_key<T: secp256k1::Signing>(
	secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey, base_secret: &SecretKey,
) -> SecretKey {
	let mut sha = Sha256::engine();
	sha.input(&per_commitment_point.serialize());
	sha.input(&PublicKey::from_secret_key(secp_ctx, base_secret).serialize());
	let res = Sha256::from_engine(sha).to_byte_array();

	base_secret.add_tweak(&Scalar::from_be_bytes(res).expect("SHA-256 outputs are below the curve order with overwhelming probability"))
		.expect("Addition only fails if the tweak is the inverse of the key. This is not possible when the tweak contains the hash of the key.")
}

/// Derives a per-commitment-transaction public key (eg an htlc key or a delayed_payment key)
/// from the base point and the per_commitment_key. This is the public equivalent of
/// derive_private_key - using only public keys to derive a public key instead of private keys.
pub fn derive_public_key<T: secp256k1::Signing>(
	secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey, base_point: &PublicKey,
) -> PublicKey {
	let mut sha = Sha256::engine();
	sha.input(&per_commitment_point.serialize());
	sha.input(&base_point.serialize());
	let res = Sha256::from_engine(sha).to_byte_array();

	let hashkey = PublicKey::from_secret_key(
		secp_ctx,
		&SecretKey::from_slice(&res).expect("Hashes should always be valid keys unless SHA-256 is broken"),
	);
	base_point.combine(&hashkey)
		.expect("Addition only fails if the tweak is the inverse of the key. This is not possible when the tweak contains the hash of the key.")
}

fn revocation_tweaks(
	countersignatory_revocation_base_point: &PublicKey, per_commitment_point: &PublicKey,
) -> (Scalar, Scalar) {
	let rev_append_commit_hash_key = {
		let mut sha = Sha256::engine();
		sha.input(&countersignatory_revocation_base_point.serialize());
		sha.input(&per_commitment_point.serialize());
		Sha256::from_engine(sha).to_byte_array()
	};
	let commit_append_rev_hash_key = {
		let mut sha = Sha256::engine();
		sha.input(&per_commitment_point.serialize());
		sha.input(&countersignatory_revocation_base_point.serialize());
		Sha256::from_engine(sha).to_byte_array()
	};
	(
		Scalar::from_be_bytes(rev_append_commit_hash_key).expect("SHA-256 outputs are below the curve order with overwhelming probability"),
		Scalar::from_be_bytes(commit_append_rev_hash_key).expect("SHA-256 outputs are below the curve order with overwhelming probability"),
	)
}

/// Derives a per-commitment-transaction revocation key from its constituent parts.
///
/// Only the cheating participant owns a valid witness to propagate a revoked
/// commitment transaction, thus per_commitment_secret always come from cheater
/// and revocation_base_secret always come from punisher, which is the broadcaster
/// of the transaction spending with this key knowledge.
pub fn derive_private_revocation_key<T: secp256k1::Signing>(
	secp_ctx: &Secp256k1<T>, per_commitment_secret: &SecretKey,
	countersignatory_revocation_base_secret: &SecretKey,
) -> SecretKey {
	let countersignatory_revocation_base_point =
		PublicKey::from_secret_key(secp_ctx, countersignatory_revocation_base_secret);
	let per_commitment_point = PublicKey::from_secret_key(secp_ctx, per_commitment_secret);
	let (rev_tweak, commit_tweak) =
		revocation_tweaks(&countersignatory_revocation_base_point, &per_commitment_point);

	let countersignatory_contrib = countersignatory_revocation_base_secret.mul_tweak(&rev_tweak)
		.expect("Multiplying a secret key by a hash is expected to never fail per secp256k1 docs");
	let broadcaster_contrib = per_commitment_secret.mul_tweak(&commit_tweak)
		.expect("Multiplying a secret key by a hash is expected to never fail per secp256k1 docs");
	countersignatory_contrib.add_tweak(&Scalar::from(broadcaster_contrib))
		.expect("Addition only fails if the tweak is the inverse of the key. This is not possible when the tweak commits to the key.")
}

/// Derives a per-commitment-transaction revocation public key from its constituent parts. This is
/// the public equivalent of derive_private_revocation_key - using only public keys to derive a
/// public key instead of private keys.
///
/// Only the cheating participant owns a valid witness to propagate a revoked
/// commitment transaction, thus per_commitment_point always come from cheater
/// and revocation_base_point always come from punisher, which is the broadcaster
/// of the transaction spending with this key knowledge.
pub fn derive_public_revocation_key<T: secp256k1::Verification>(
	secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey,
	countersignatory_revocation_base_point: &PublicKey,
) -> PublicKey {
	let (rev_tweak, commit_tweak) =
		revocation_tweaks(countersignatory_revocation_base_point, per_commitment_point);

	let countersignatory_contrib = countersignatory_revocation_base_point.mul_tweak(secp_ctx, &rev_tweak)
		.expect("Multiplying a valid public key by a hash is expected to never fail per secp256k1 docs");
	let broadcaster_contrib = per_commitment_point.mul_tweak(secp_ctx, &commit_tweak)
		.expect("Multiplying a valid public key by a hash is expected to never fail per secp256k1 docs");
	countersignatory_contrib.combine(&broadcaster_contrib)
		.expect("Addition only fails if the tweak is the inverse of the key. This is not possible when the tweak commits to the key.")
}

/// One counterparty's public keys which do not change over the life of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPublicKeys {
	/// The public key which is used to sign all commitment transactions, as it appears in the
	/// on-chain channel lock-in 2-of-2 multisig output.
	pub funding_pubkey: PublicKey,
	/// The base point which is used (with derive_public_revocation_key) to derive per-commitment
	/// revocation keys.
	pub revocation_basepoint: PublicKey,
	/// The public key on which the non-broadcaster receives an immediately spendable primary
	/// channel balance on the broadcaster's commitment transaction. This key is static across
	/// every commitment transaction.
	pub payment_point: PublicKey,
	/// The base point which is used (with derive_public_key) to derive a per-commitment payment
	/// public key which receives funds only spendable after some delay.
	pub delayed_payment_basepoint: PublicKey,
	/// The base point which is used (with derive_public_key) to derive a per-commitment public key
	/// which is used to encumber HTLC-in-flight outputs.
	pub htlc_basepoint: PublicKey,
}

/// The set of public keys which are used in the creation of one commitment transaction.
/// These are derived from the channel base keys and per-commitment data.
///
/// A broadcaster key is provided from potential broadcaster of the computed transaction.
/// A countersignatory key is coming from a protocol participant unable to broadcast the
/// transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxCreationKeys {
	/// The broadcaster's per-commitment public key which was used to derive the other keys.
	pub per_commitment_point: PublicKey,
	/// The revocation key which is used to allow the broadcaster of the commitment
	/// transaction to provide their counterparty the ability to punish them if they broadcast
	/// an old state.
	pub revocation_key: PublicKey,
	/// Broadcaster's HTLC Key
	pub broadcaster_htlc_key: PublicKey,
	/// Countersignatory's HTLC Key
	pub countersignatory_htlc_key: PublicKey,
	/// Broadcaster's Payment Key (which isn't allowed to be spent from for some delay)
	pub broadcaster_delayed_payment_key: PublicKey,
}

impl TxCreationKeys {
	/// Create per-state keys from channel base points and the per-commitment point.
	/// Key set is asymmetric and can't be used as part of counter-signatory set of transactions.
	pub fn derive_new<T: secp256k1::Signing + secp256k1::Verification>(
		secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey,
		broadcaster_delayed_payment_base: &PublicKey, broadcaster_htlc_base: &PublicKey,
		countersignatory_revocation_base: &PublicKey, countersignatory_htlc_base: &PublicKey,
	) -> TxCreationKeys {
		TxCreationKeys {
			per_commitment_point: *per_commitment_point,
			revocation_key: derive_public_revocation_key(secp_ctx, per_commitment_point, countersignatory_revocation_base),
			broadcaster_htlc_key: derive_public_key(secp_ctx, per_commitment_point, broadcaster_htlc_base),
			countersignatory_htlc_key: derive_public_key(secp_ctx, per_commitment_point, countersignatory_htlc_base),
			broadcaster_delayed_payment_key: derive_public_key(secp_ctx, per_commitment_point, broadcaster_delayed_payment_base),
		}
	}

	/// Generate per-state keys from channel static keys.
	/// Key set is asymmetric and can't be used as part of counter-signatory set of transactions.
	pub fn from_channel_static_keys<T: secp256k1::Signing + secp256k1::Verification>(
		per_commitment_point: &PublicKey, broadcaster_keys: &ChannelPublicKeys,
		countersignatory_keys: &ChannelPublicKeys, secp_ctx: &Secp256k1<T>,
	) -> TxCreationKeys {
		TxCreationKeys::derive_new(
			secp_ctx,
			per_commitment_point,
			&broadcaster_keys.delayed_payment_basepoint,
			&broadcaster_keys.htlc_basepoint,
			&countersignatory_keys.revocation_basepoint,
			&countersignatory_keys.htlc_basepoint,
		)
	}
}

/// The maximum length of a script returned by get_revokeable_redeemscript.
// Calculated as 6 bytes of opcodes, 1 byte push plus 2 bytes for contest_delay, and two public
// keys of 33 bytes (+ 1 push).
pub const REVOKEABLE_REDEEMSCRIPT_MAX_LENGTH: usize = 6 + 3 + 34 * 2;

/// A script either spendable by the revocation
/// key or the broadcaster_delayed_payment_key and satisfying the relative-locktime OP_CSV constrain.
/// Encumbering a `to_local` output on a commitment transaction.
pub fn get_revokeable_redeemscript(
	revocation_key: &PublicKey, contest_delay: u16, broadcaster_delayed_payment_key: &PublicKey,
) -> ScriptBuf {
	let res = Builder::new()
		.push_opcode(opcodes::all::OP_IF)
		.push_slice(&revocation_key.serialize())
		.push_opcode(opcodes::all::OP_ELSE)
		.push_int(contest_delay as i64)
		.push_opcode(opcodes::all::OP_CSV)
		.push_opcode(opcodes::all::OP_DROP)
		.push_slice(&broadcaster_delayed_payment_key.serialize())
		.push_opcode(opcodes::all::OP_ENDIF)
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.into_script();
	debug_assert!(res.len() <= REVOKEABLE_REDEEMSCRIPT_MAX_LENGTH);
	res
}

/// Gets the witness script for an HTLC output on a commitment transaction. `offered` is whether
/// the broadcaster of the commitment transaction offered the HTLC; `cltv_expiry` only appears in
/// the script of received HTLCs.
pub fn get_htlc_redeemscript_with_explicit_keys(
	offered: bool, payment_hash: &PaymentHash, cltv_expiry: u32, opt_anchors: bool,
	broadcaster_htlc_key: &PublicKey, countersignatory_htlc_key: &PublicKey,
	revocation_key: &PublicKey,
) -> ScriptBuf {
	let payment_hash160 = Ripemd160::hash(&payment_hash.0[..]).to_byte_array();
	let revocation_key_hash = PubkeyHash::hash(&revocation_key.serialize()).to_byte_array();
	let bldr = Builder::new()
		.push_opcode(opcodes::all::OP_DUP)
		.push_opcode(opcodes::all::OP_HASH160)
		.push_slice(&revocation_key_hash)
		.push_opcode(opcodes::all::OP_EQUAL)
		.push_opcode(opcodes::all::OP_IF)
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.push_opcode(opcodes::all::OP_ELSE)
		.push_slice(&countersignatory_htlc_key.serialize())
		.push_opcode(opcodes::all::OP_SWAP)
		.push_opcode(opcodes::all::OP_SIZE)
		.push_int(32)
		.push_opcode(opcodes::all::OP_EQUAL);
	let mut bldr = if offered {
		bldr.push_opcode(opcodes::all::OP_NOTIF)
			.push_opcode(opcodes::all::OP_DROP)
			.push_int(2)
			.push_opcode(opcodes::all::OP_SWAP)
			.push_slice(&broadcaster_htlc_key.serialize())
			.push_int(2)
			.push_opcode(opcodes::all::OP_CHECKMULTISIG)
			.push_opcode(opcodes::all::OP_ELSE)
			.push_opcode(opcodes::all::OP_HASH160)
			.push_slice(&payment_hash160)
			.push_opcode(opcodes::all::OP_EQUALVERIFY)
			.push_opcode(opcodes::all::OP_CHECKSIG)
			.push_opcode(opcodes::all::OP_ENDIF)
	} else {
		bldr.push_opcode(opcodes::all::OP_IF)
			.push_opcode(opcodes::all::OP_HASH160)
			.push_slice(&payment_hash160)
			.push_opcode(opcodes::all::OP_EQUALVERIFY)
			.push_int(2)
			.push_opcode(opcodes::all::OP_SWAP)
			.push_slice(&broadcaster_htlc_key.serialize())
			.push_int(2)
			.push_opcode(opcodes::all::OP_CHECKMULTISIG)
			.push_opcode(opcodes::all::OP_ELSE)
			.push_opcode(opcodes::all::OP_DROP)
			.push_int(cltv_expiry as i64)
			.push_opcode(opcodes::all::OP_CLTV)
			.push_opcode(opcodes::all::OP_DROP)
			.push_opcode(opcodes::all::OP_CHECKSIG)
			.push_opcode(opcodes::all::OP_ENDIF)
	};
	if opt_anchors {
		bldr = bldr
			.push_opcode(opcodes::all::OP_PUSHNUM_1)
			.push_opcode(opcodes::all::OP_CSV)
			.push_opcode(opcodes::all::OP_DROP);
	}
	bldr.push_opcode(opcodes::all::OP_ENDIF).into_script()
}

/// Gets the redeemscript for a funding output from the two funding public keys.
/// Note that the order of funding public keys does not matter.
pub fn make_funding_redeemscript(broadcaster: &PublicKey, countersignatory: &PublicKey) -> ScriptBuf {
	let broadcaster_funding_key = broadcaster.serialize();
	let countersignatory_funding_key = countersignatory.serialize();
	let (first, second) = if broadcaster_funding_key[..] < countersignatory_funding_key[..] {
		(broadcaster_funding_key, countersignatory_funding_key)
	} else {
		(countersignatory_funding_key, broadcaster_funding_key)
	};
	Builder::new()
		.push_opcode(opcodes::all::OP_PUSHNUM_2)
		.push_slice(&first)
		.push_slice(&second)
		.push_opcode(opcodes::all::OP_PUSHNUM_2)
		.push_opcode(opcodes::all::OP_CHECKMULTISIG)
		.into_script()
}

/// Gets the `scriptPubKey` of the `to_remote` output when anchors are not in use: a P2WPKH to the
/// countersignatory's payment point.
pub fn get_to_countersignatory_p2wpkh(payment_point: &PublicKey) -> ScriptBuf {
	ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&payment_point.serialize()))
}

/// Gets the witnessScript for the to_remote output when anchors are enabled.
#[inline]
pub fn get_to_countersignatory_with_anchors_redeemscript(payment_point: &PublicKey) -> ScriptBuf {
	Builder::new()
		.push_slice(&payment_point.serialize())
		.push_opcode(opcodes::all::OP_CHECKSIGVERIFY)
		.push_int(1)
		.push_opcode(opcodes::all::OP_CSV)
		.into_script()
}

/// Gets the witnessScript for an anchor output from the funding public key.
/// The witness in the spending input must be:
/// <BIP 143 funding_signature>
/// After 16 blocks of confirmation, an alternative satisfying witness could be:
/// <>
/// (empty vector required to satisfy compliance with MINIMALIF-standard rule)
#[inline]
pub fn get_anchor_redeemscript(funding_pubkey: &PublicKey) -> ScriptBuf {
	Builder::new()
		.push_slice(&funding_pubkey.serialize())
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.push_opcode(opcodes::all::OP_IFDUP)
		.push_opcode(opcodes::all::OP_NOTIF)
		.push_int(16)
		.push_opcode(opcodes::all::OP_CSV)
		.push_opcode(opcodes::all::OP_ENDIF)
		.into_script()
}

/// Commitment transaction numbers which appear in the transactions themselves are XOR'd with a
/// shared secret first. This prevents on-chain observers from discovering how many commitment
/// transactions occurred in a channel before it was closed.
///
/// The secret is the low 48 bits of `SHA256(opener_payment_basepoint || accepter_payment_basepoint)`,
/// so it is the same on both sides' commitment transactions.
pub fn get_commitment_transaction_number_obscure_factor(
	opener_payment_basepoint: &PublicKey, accepter_payment_basepoint: &PublicKey,
) -> u64 {
	let mut sha = Sha256::engine();
	sha.input(&opener_payment_basepoint.serialize());
	sha.input(&accepter_payment_basepoint.serialize());
	let res = Sha256::from_engine(sha).to_byte_array();

	((res[26] as u64) << 5 * 8)
		| ((res[27] as u64) << 4 * 8)
		| ((res[28] as u64) << 3 * 8)
		| ((res[29] as u64) << 2 * 8)
		| ((res[30] as u64) << 1 * 8)
		| ((res[31] as u64) << 0 * 8)
}

#[cfg(test)]
mod tests {
	use super::*;
	use bitcoin::hex::{DisplayHex, FromHex};

	fn pubkey_from_hex(hex: &str) -> PublicKey {
		PublicKey::from_slice(&<Vec<u8>>::from_hex(hex).unwrap()).unwrap()
	}

	fn secret_from_hex(hex: &str) -> SecretKey {
		SecretKey::from_slice(&<Vec<u8>>::from_hex(hex).unwrap()).unwrap()
	}

	#[test]
	fn test_per_commitment_secret_gen() {
		// Test vectors from BOLT 3 Appendix D:
		let seed = [0; 32];
		assert_eq!(build_commitment_secret(&seed, 281474976710655)[..].as_hex().to_string(),
			"02a40c85b6f28da08dfdbe0926c53fab2de6d28c10301f8f7c4073d5e42e3148");

		let seed = [0xff; 32];
		assert_eq!(build_commitment_secret(&seed, 281474976710655)[..].as_hex().to_string(),
			"7cc854b54e3e0dcdb010d7a3fee464a9687be6e8db3be6854c475621e007a5dc");
		assert_eq!(build_commitment_secret(&seed, 0xaaaaaaaaaaa)[..].as_hex().to_string(),
			"56f4008fb007ca9acf0e15b054d5c9fd12ee06cea347914ddbaed70d1c13a528");
		assert_eq!(build_commitment_secret(&seed, 0x555555555555)[..].as_hex().to_string(),
			"9015daaeb06dba4ccc05b91b2f73bd54405f2be9f217fbacd3c5ac2e62327d31");

		let seed = [0x01; 32];
		assert_eq!(build_commitment_secret(&seed, 1)[..].as_hex().to_string(),
			"915c75942a26bb3a433a8ce2cb0427c29ec6c1775cfc78328b57f6ba7bfeaa9c");
	}

	#[test]
	fn test_key_derivation() {
		// Test vectors from BOLT 3 Appendix E:
		let secp_ctx = Secp256k1::new();

		let base_secret = secret_from_hex("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f");
		let per_commitment_secret = secret_from_hex("1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100");

		let base_point = PublicKey::from_secret_key(&secp_ctx, &base_secret);
		assert_eq!(base_point, pubkey_from_hex("036d6caac248af96f6afa7f904f550253a0f3ef3f5aa2fe6838a95b216691468e2"));

		let per_commitment_point = PublicKey::from_secret_key(&secp_ctx, &per_commitment_secret);
		assert_eq!(per_commitment_point, pubkey_from_hex("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486"));

		let localprivkey = derive_private_key(&secp_ctx, &per_commitment_point, &base_secret);
		assert_eq!(localprivkey, secret_from_hex("cbced912d3b21bf196a766651e436aff192362621ce317704ea2f75d87e7be0f"));
		assert_eq!(derive_public_key(&secp_ctx, &per_commitment_point, &base_point),
			pubkey_from_hex("0235f2dbfaa89b57ec7b055afe29849ef7ddfeb1cefdb9ebdc43f5494984db29e5"));
		assert_eq!(PublicKey::from_secret_key(&secp_ctx, &localprivkey),
			derive_public_key(&secp_ctx, &per_commitment_point, &base_point));

		assert_eq!(derive_public_revocation_key(&secp_ctx, &per_commitment_point, &base_point),
			pubkey_from_hex("02916e326636d19c33f13e8c0c3a03dd157f332f3e99c317c141dd865eb01f8ff0"));
		assert_eq!(derive_private_revocation_key(&secp_ctx, &per_commitment_secret, &base_secret),
			secret_from_hex("d09ffff62ddb2297ab000cc85bcb4283fdeb6aa052affbc9dddcf33b61078110"));
	}

	#[test]
	fn tx_creation_keys_from_basepoints() {
		let secp_ctx = Secp256k1::new();
		let point = |i: u8| PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[i; 32]).unwrap());
		let keys = TxCreationKeys::derive_new(&secp_ctx, &point(1), &point(2), &point(3), &point(4), &point(5));
		assert_eq!(keys.per_commitment_point, point(1));
		assert_eq!(keys.broadcaster_delayed_payment_key, derive_public_key(&secp_ctx, &point(1), &point(2)));
		assert_eq!(keys.broadcaster_htlc_key, derive_public_key(&secp_ctx, &point(1), &point(3)));
		assert_eq!(keys.revocation_key, derive_public_revocation_key(&secp_ctx, &point(1), &point(4)));
		assert_eq!(keys.countersignatory_htlc_key, derive_public_key(&secp_ctx, &point(1), &point(5)));
	}

	#[test]
	fn bolt3_scripts() {
		// Appendix C keys.
		let revocation_key = pubkey_from_hex("0212a140cd0c6539d07cd08dfe09984dec3251ea808b892efeac3ede9402bf2b19");
		let local_delayed_key = pubkey_from_hex("03fd5960528dc152014952efdb702a88f71e3c1653b2314431701ec77e57fde83c");
		let local_htlc_key = pubkey_from_hex("030d417a46946384f88d5f3337267c5e579765875dc4daca813e21734b140639e7");
		let remote_htlc_key = pubkey_from_hex("0394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b");

		let to_local = get_revokeable_redeemscript(&revocation_key, 144, &local_delayed_key);
		assert_eq!(to_local.as_bytes().as_hex().to_string(),
			"63210212a140cd0c6539d07cd08dfe09984dec3251ea808b892efeac3ede9402bf2b1967029000b2752103fd5960528dc152014952efdb702a88f71e3c1653b2314431701ec77e57fde83c68ac");

		let received = get_htlc_redeemscript_with_explicit_keys(false,
			&PaymentHash(Sha256::hash(&[0; 32]).to_byte_array()), 500, false,
			&local_htlc_key, &remote_htlc_key, &revocation_key);
		assert_eq!(received.as_bytes().as_hex().to_string(),
			"76a91414011f7254d96b819c76986c277d115efce6f7b58763ac67210394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b7c8201208763a914b8bcb07f6344b42ab04250c86a6e8b75d3fdbbc688527c21030d417a46946384f88d5f3337267c5e579765875dc4daca813e21734b140639e752ae677502f401b175ac6868");

		let offered = get_htlc_redeemscript_with_explicit_keys(true,
			&PaymentHash(Sha256::hash(&[2; 32]).to_byte_array()), 502, false,
			&local_htlc_key, &remote_htlc_key, &revocation_key);
		assert_eq!(offered.as_bytes().as_hex().to_string(),
			"76a91414011f7254d96b819c76986c277d115efce6f7b58763ac67210394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b7c820120876475527c21030d417a46946384f88d5f3337267c5e579765875dc4daca813e21734b140639e752ae67a914b43e1b38138a41b37f7cd9a1d274bc63e3a9b5d188ac6868");

		// Anchors only append `1 OP_CSV OP_DROP` before the final OP_ENDIF.
		let offered_anchors = get_htlc_redeemscript_with_explicit_keys(true,
			&PaymentHash(Sha256::hash(&[2; 32]).to_byte_array()), 502, true,
			&local_htlc_key, &remote_htlc_key, &revocation_key);
		assert_eq!(offered_anchors.len(), offered.len() + 3);
		assert_eq!(&offered_anchors.as_bytes()[offered.len() - 1..offered.len() + 2], &[0x51, 0xb2, 0x75]);
	}

	#[test]
	fn funding_redeemscript_is_key_order_independent() {
		let local_funding = pubkey_from_hex("023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb");
		let remote_funding = pubkey_from_hex("030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c1");
		let expected = "5221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c152ae";
		assert_eq!(make_funding_redeemscript(&local_funding, &remote_funding).as_bytes().as_hex().to_string(), expected);
		assert_eq!(make_funding_redeemscript(&remote_funding, &local_funding).as_bytes().as_hex().to_string(), expected);
	}

	#[test]
	fn to_remote_scripts() {
		let remote_payment_key = pubkey_from_hex("0394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b");
		assert_eq!(get_to_countersignatory_p2wpkh(&remote_payment_key).as_bytes().as_hex().to_string(),
			"0014cc1b07838e387deacd0e5232e1e8b49f4c29e484");

		let anchored = get_to_countersignatory_with_anchors_redeemscript(&remote_payment_key);
		assert_eq!(anchored.len(), 34 + 3);
		assert_eq!(&anchored.as_bytes()[34..], &[0xad, 0x51, 0xb2]);
	}

	#[test]
	fn obscure_factor() {
		let local_payment_basepoint = pubkey_from_hex("034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa");
		let remote_payment_basepoint = pubkey_from_hex("032c0b7cf95324a07d05398b240174dc0c2be444d96b159aa6c7f7b1e668680991");
		assert_eq!(get_commitment_transaction_number_obscure_factor(&local_payment_basepoint, &remote_payment_basepoint),
			0x2bb038521914);
	}

	#[test]
	fn commitment_fees() {
		assert_eq!(commit_tx_fee_sat(15000, 0, false), 10860);
		assert_eq!(commit_tx_fee_sat(0, 5, false), 0);
		assert_eq!(commit_tx_fee_sat(647, 5, false), 647 * (724 + 5 * 172) / 1000);
		assert_eq!(commit_tx_fee_sat(253, 1, true), 253 * (1124 + 172) / 1000);
		assert_eq!(htlc_success_tx_weight(false), 703);
		assert_eq!(htlc_timeout_tx_weight(true), 666);
	}
}
