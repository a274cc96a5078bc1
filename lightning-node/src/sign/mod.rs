// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Key management and signing for channel transactions.
//!
//! Commitment transactions are built unsigned by [`CommitmentTransactionModel::build`] and signed
//! here. The [`LightningSigner`] trait is the only thing the channel logic sees, so the keys can
//! live in this process ([`InMemorySigner`]) or behind a remote, validating signer.
//!
//! [`CommitmentTransactionModel::build`]: crate::ln::commitment::CommitmentTransactionModel::build

use core::sync::atomic::{AtomicU64, Ordering};

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{self, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, Transaction, Witness};

use crate::crypto::utils::sign;
use crate::ln::chan_utils::{build_commitment_secret, ChannelPublicKeys};
use crate::ln::commitment::{BuiltCommitmentTransaction, FundingOutputInfo};
use crate::prelude::*;

pub mod errors;

pub use errors::SigningError;

/// A trait that describes a source of entropy.
pub trait EntropySource {
	/// Gets a unique, cryptographically-secure, random 32-byte value. This method must return a
	/// different value each time it is called.
	fn get_secure_random_bytes(&self) -> [u8; 32];
}

/// An implementation of [`EntropySource`] that expands a seed into a stream of random bytes.
pub struct RandomBytes {
	/// Seed from which all randomness produced is derived from.
	seed: [u8; 32],
	/// Tracks the number of times we've produced randomness to ensure we don't return the same
	/// bytes twice.
	index: AtomicU64,
}

impl RandomBytes {
	/// Creates a new instance using the given seed.
	pub fn new(seed: [u8; 32]) -> Self {
		Self { seed, index: AtomicU64::new(0) }
	}
}

impl EntropySource for RandomBytes {
	fn get_secure_random_bytes(&self) -> [u8; 32] {
		let index = self.index.fetch_add(1, Ordering::AcqRel);
		let mut sha = Sha256::engine();
		sha.input(&self.seed);
		sha.input(&index.to_be_bytes());
		Sha256::from_engine(sha).to_byte_array()
	}
}

/// Signs for one channel.
///
/// The per-commitment secret index counts down from `2^48 - 1`, as BOLT 3 derives secrets from
/// the commitment seed. Implementations holding keys elsewhere may return
/// [`SigningError::NotAvailable`] and have the caller retry later.
pub trait LightningSigner {
	/// Our static channel public keys.
	fn pubkeys(&self) -> &ChannelPublicKeys;

	/// Gets the per-commitment point for a specific commitment number.
	fn get_per_commitment_point(
		&self, idx: u64, secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<PublicKey, SigningError>;

	/// Gets the commitment secret for a specific commitment number, to be sent to the
	/// counterparty once the matching commitment transaction is revoked.
	fn release_commitment_secret(&self, idx: u64) -> Result<[u8; 32], SigningError>;

	/// Signs the funding input of a commitment transaction with our funding key, whichever side
	/// broadcasts it.
	fn sign_commitment_funding_input(
		&self, commitment_tx: &BuiltCommitmentTransaction, funding_output: &FundingOutputInfo,
		secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<Signature, SigningError>;

	/// Checks the counterparty's signature on the funding input of a commitment transaction
	/// against their funding key.
	fn verify_counterparty_signature(
		&self, commitment_tx: &BuiltCommitmentTransaction, funding_output: &FundingOutputInfo,
		signature: &Signature, secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(), SigningError>;
}

/// The BIP 143 sighash of the input of `tx` spending `funding_output`.
fn funding_input_sighash(tx: &Transaction, funding_output: &FundingOutputInfo) -> Result<Message, SigningError> {
	let input_index = tx
		.input
		.iter()
		.position(|input| input.previous_output == funding_output.outpoint)
		.ok_or(SigningError::InvalidInput)?;
	let sighash = SighashCache::new(tx)
		.p2wsh_signature_hash(
			input_index,
			&funding_output.redeem_script(),
			Amount::from_sat(funding_output.amount_sat),
			EcdsaSighashType::All,
		)
		.map_err(|_| SigningError::InvalidInput)?;
	Ok(Message::from_digest(sighash.to_byte_array()))
}

/// A simple implementation of [`LightningSigner`] that just keeps the private keys in memory.
pub struct InMemorySigner {
	/// Holder secret key in the 2-of-2 multisig script of a channel. This key also backs the
	/// holder's anchor output in a commitment transaction, if one is present.
	funding_key: SecretKey,
	/// Holder secret key for blinded revocation pubkey.
	revocation_base_key: SecretKey,
	/// Holder secret key used for our balance in counterparty-broadcasted commitment transactions.
	payment_key: SecretKey,
	/// Holder secret key used in an HTLC transaction.
	delayed_payment_base_key: SecretKey,
	/// Holder HTLC secret key used in commitment transaction HTLC outputs.
	htlc_base_key: SecretKey,
	/// Commitment seed.
	commitment_seed: [u8; 32],
	/// Holder public keys.
	pubkeys: ChannelPublicKeys,
}

impl InMemorySigner {
	/// Creates a new [`InMemorySigner`].
	pub fn new<C: secp256k1::Signing>(
		secp_ctx: &Secp256k1<C>, funding_key: SecretKey, revocation_base_key: SecretKey,
		payment_key: SecretKey, delayed_payment_base_key: SecretKey, htlc_base_key: SecretKey,
		commitment_seed: [u8; 32],
	) -> InMemorySigner {
		let from_secret = |s: &SecretKey| PublicKey::from_secret_key(secp_ctx, s);
		let pubkeys = ChannelPublicKeys {
			funding_pubkey: from_secret(&funding_key),
			revocation_basepoint: from_secret(&revocation_base_key),
			payment_point: from_secret(&payment_key),
			delayed_payment_basepoint: from_secret(&delayed_payment_base_key),
			htlc_basepoint: from_secret(&htlc_base_key),
		};
		InMemorySigner {
			funding_key,
			revocation_base_key,
			payment_key,
			delayed_payment_base_key,
			htlc_base_key,
			commitment_seed,
			pubkeys,
		}
	}

	/// The secret key behind our revocation basepoint.
	pub fn revocation_base_key(&self) -> &SecretKey {
		&self.revocation_base_key
	}

	/// The secret key behind our payment point.
	pub fn payment_key(&self) -> &SecretKey {
		&self.payment_key
	}

	/// The secret key behind our delayed payment basepoint.
	pub fn delayed_payment_base_key(&self) -> &SecretKey {
		&self.delayed_payment_base_key
	}

	/// The secret key behind our HTLC basepoint.
	pub fn htlc_base_key(&self) -> &SecretKey {
		&self.htlc_base_key
	}

	fn counterparty_funding_pubkey<'a>(&self, funding_output: &'a FundingOutputInfo) -> &'a PublicKey {
		if funding_output.local_funding_pubkey == self.pubkeys.funding_pubkey {
			&funding_output.remote_funding_pubkey
		} else {
			&funding_output.local_funding_pubkey
		}
	}
}

impl LightningSigner for InMemorySigner {
	fn pubkeys(&self) -> &ChannelPublicKeys {
		&self.pubkeys
	}

	fn get_per_commitment_point(
		&self, idx: u64, secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<PublicKey, SigningError> {
		let commitment_secret =
			SecretKey::from_slice(&build_commitment_secret(&self.commitment_seed, idx))
				.expect("You broke elliptic curve cryptography");
		Ok(PublicKey::from_secret_key(secp_ctx, &commitment_secret))
	}

	fn release_commitment_secret(&self, idx: u64) -> Result<[u8; 32], SigningError> {
		Ok(build_commitment_secret(&self.commitment_seed, idx))
	}

	fn sign_commitment_funding_input(
		&self, commitment_tx: &BuiltCommitmentTransaction, funding_output: &FundingOutputInfo,
		secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<Signature, SigningError> {
		let msg = funding_input_sighash(&commitment_tx.transaction, funding_output)?;
		Ok(sign(secp_ctx, &msg, &self.funding_key))
	}

	fn verify_counterparty_signature(
		&self, commitment_tx: &BuiltCommitmentTransaction, funding_output: &FundingOutputInfo,
		signature: &Signature, secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(), SigningError> {
		let msg = funding_input_sighash(&commitment_tx.transaction, funding_output)?;
		let counterparty_funding_pubkey = self.counterparty_funding_pubkey(funding_output);
		secp_ctx
			.verify_ecdsa(&msg, signature, counterparty_funding_pubkey)
			.map_err(|_| SigningError::InvalidSignature)
	}
}

/// Attaches the 2-of-2 witness to the input of `tx` spending `funding_output`, ordering the
/// signatures as the funding script orders the keys.
///
/// `local_sig` is the signature of [`FundingOutputInfo::local_funding_pubkey`].
pub fn attach_funding_witness(
	tx: &mut Transaction, funding_output: &FundingOutputInfo, local_sig: &Signature,
	remote_sig: &Signature,
) -> Result<(), SigningError> {
	let input = tx
		.input
		.iter_mut()
		.find(|input| input.previous_output == funding_output.outpoint)
		.ok_or(SigningError::InvalidInput)?;

	let mut local_sig_ser = local_sig.serialize_der().to_vec();
	local_sig_ser.push(EcdsaSighashType::All as u8);
	let mut remote_sig_ser = remote_sig.serialize_der().to_vec();
	remote_sig_ser.push(EcdsaSighashType::All as u8);

	let local_first = funding_output.local_funding_pubkey.serialize()[..]
		< funding_output.remote_funding_pubkey.serialize()[..];
	let (first, second) =
		if local_first { (local_sig_ser, remote_sig_ser) } else { (remote_sig_ser, local_sig_ser) };

	let mut witness = Witness::new();
	witness.push(Vec::new());
	witness.push(first);
	witness.push(second);
	witness.push(funding_output.redeem_script().as_bytes());
	input.witness = witness;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ln::commitment::tests::{bolt3_state, with_bolt3_witness};
	use crate::ln::commitment::CommitmentTransactionModel;
	use crate::util::config::CommitmentConfig;
	use crate::util::test_utils::{privkey, TestLogger};

	use bitcoin::consensus::encode::serialize_hex;
	use bitcoin::hex::FromHex;

	const LOCAL_SIG: &str = "30440220616210b2cc4d3afb601013c373bbd8aac54febd9f15400379a8cb65ce7deca60022034236c010991beb7ff770510561ae8dc885b8d38d1947248c38f2ae055647142";
	const REMOTE_SIG: &str = "3045022100c3127b33dcc741dd6b05b1e63cbd1a9a7d816f37af9b6756fa2376b056f032370220408b96279808fe57eb7e463710804cdf4f108388bc5cf722d8c848d2c7f9f3b0";

	fn bolt3_signer(secp_ctx: &Secp256k1<secp256k1::All>) -> InMemorySigner {
		let funding_key = SecretKey::from_slice(
			&<Vec<u8>>::from_hex("30ff4956bbdd3222d44cc5e8a1261dab1e07957bdac5ae88fe3261ef321f3749").unwrap()).unwrap();
		InMemorySigner::new(secp_ctx, funding_key, privkey(2), privkey(3), privkey(4), privkey(5), [0; 32])
	}

	fn sig_from_hex(hex: &str) -> Signature {
		Signature::from_der(&<Vec<u8>>::from_hex(hex).unwrap()).unwrap()
	}

	#[test]
	fn signs_bolt3_commitment_tx() {
		let secp_ctx = Secp256k1::new();
		let logger = TestLogger::new();
		let state = bolt3_state();
		let signer = bolt3_signer(&secp_ctx);
		assert_eq!(signer.pubkeys().funding_pubkey, state.funding_output.local_funding_pubkey);

		let built = CommitmentTransactionModel::from_channel_state(&state, &CommitmentConfig::default(), &&logger)
			.unwrap().build().unwrap();
		let local_sig = signer.sign_commitment_funding_input(&built, &state.funding_output, &secp_ctx).unwrap();
		assert_eq!(local_sig, sig_from_hex(LOCAL_SIG));

		let remote_sig = sig_from_hex(REMOTE_SIG);
		signer.verify_counterparty_signature(&built, &state.funding_output, &remote_sig, &secp_ctx).unwrap();
		assert_eq!(signer.verify_counterparty_signature(&built, &state.funding_output, &local_sig, &secp_ctx),
			Err(SigningError::InvalidSignature));

		let mut signed_tx = built.transaction.clone();
		attach_funding_witness(&mut signed_tx, &state.funding_output, &local_sig, &remote_sig).unwrap();
		assert_eq!(serialize_hex(&signed_tx),
			serialize_hex(&with_bolt3_witness(built.transaction, LOCAL_SIG, REMOTE_SIG)));
	}

	#[test]
	fn witness_follows_funding_key_order() {
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		let built = CommitmentTransactionModel::from_channel_state(&state, &CommitmentConfig::default(), &&logger)
			.unwrap().build().unwrap();

		// Seen from the other side, the countersignatory's key is the one sorting first.
		core::mem::swap(&mut state.funding_output.local_funding_pubkey, &mut state.funding_output.remote_funding_pubkey);
		let mut tx = built.transaction;
		let (local_sig, remote_sig) = (sig_from_hex(REMOTE_SIG), sig_from_hex(LOCAL_SIG));
		attach_funding_witness(&mut tx, &state.funding_output, &local_sig, &remote_sig).unwrap();
		let witness: Vec<&[u8]> = tx.input[0].witness.iter().collect();
		assert_eq!(witness.len(), 4);
		assert!(witness[0].is_empty());
		assert_eq!(&witness[1][..witness[1].len() - 1], &remote_sig.serialize_der()[..]);
		assert_eq!(witness[2].last(), Some(&1));
		assert_eq!(witness[3], state.funding_output.redeem_script().as_bytes());
	}

	#[test]
	fn wrong_funding_outpoint() {
		let secp_ctx = Secp256k1::new();
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		let built = CommitmentTransactionModel::from_channel_state(&state, &CommitmentConfig::default(), &&logger)
			.unwrap().build().unwrap();
		state.funding_output.outpoint.vout = 1;
		let signer = bolt3_signer(&secp_ctx);
		assert_eq!(signer.sign_commitment_funding_input(&built, &state.funding_output, &secp_ctx),
			Err(SigningError::InvalidInput));
		let mut tx = built.transaction;
		let sig = sig_from_hex(LOCAL_SIG);
		assert_eq!(attach_funding_witness(&mut tx, &state.funding_output, &sig, &sig), Err(SigningError::InvalidInput));
	}

	#[test]
	fn per_commitment_points() {
		let secp_ctx = Secp256k1::new();
		let signer = bolt3_signer(&secp_ctx);
		let idx = 281474976710655;
		let secret = signer.release_commitment_secret(idx).unwrap();
		assert_eq!(secret.to_vec(),
			<Vec<u8>>::from_hex("02a40c85b6f28da08dfdbe0926c53fab2de6d28c10301f8f7c4073d5e42e3148").unwrap());
		let point = signer.get_per_commitment_point(idx, &secp_ctx).unwrap();
		assert_eq!(point, PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&secret).unwrap()));
		assert_ne!(point, signer.get_per_commitment_point(idx - 1, &secp_ctx).unwrap());
	}

	#[test]
	fn random_bytes_never_repeat() {
		let entropy = RandomBytes::new([0; 32]);
		let first = entropy.get_secure_random_bytes();
		assert_ne!(first, entropy.get_secure_random_bytes());
		assert_eq!(first, RandomBytes::new([0; 32]).get_secure_random_bytes());
	}
}
