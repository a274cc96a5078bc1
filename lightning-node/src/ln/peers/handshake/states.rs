// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The states a handshake moves through and the Noise operations which move it.

use bitcoin::secp256k1::{self, PublicKey, Secp256k1, SecretKey};

use crate::crypto::hkdf::hkdf_extract_expand;
use crate::crypto::secure_key::SecureKey;
use crate::crypto::{CryptoError, CryptoProvider};
use crate::ln::peers::cipher_state::CipherState;
use crate::ln::peers::handshake::acts::{
	Act, ACT_ONE_TWO_LENGTH, ACT_THREE_LENGTH, HANDSHAKE_VERSION,
};
use crate::ln::peers::transport::Transport;
use crate::ln::peers::PeerError;

const NOISE_PROTOCOL_NAME: &[u8] = b"Noise_XK_secp256k1_ChaChaPoly_SHA256";
const PROLOGUE: &[u8] = b"lightning";

/// The chaining key, running hash and current handshake cipher shared by both roles.
pub(super) struct SymmetricState<C: CryptoProvider> {
	chaining_key: SecureKey,
	hash: [u8; 32],
	cipher: CipherState<C>,
	provider: C,
}

impl<C: CryptoProvider> SymmetricState<C> {
	/// `h = SHA256(protocol_name)`, `ck = h`, then the prologue and the responder's static key are
	/// mixed into `h`.
	fn new(provider: C, responder_static_key: &PublicKey) -> Self {
		let mut protocol_hash = provider.sha256(&[NOISE_PROTOCOL_NAME]);
		let hash = provider.sha256(&[&protocol_hash, PROLOGUE]);
		let mut state = SymmetricState {
			chaining_key: SecureKey::new(&mut protocol_hash),
			hash,
			cipher: CipherState::with_provider(provider.clone()),
			provider,
		};
		state.mix_hash(&responder_static_key.serialize());
		state
	}

	fn mix_hash(&mut self, data: &[u8]) {
		self.hash = self.provider.sha256(&[&self.hash, data]);
	}

	/// `ck, temp_k = HKDF(ck, ikm)`, and `temp_k` becomes the cipher key with a fresh nonce.
	fn mix_key(&mut self, input_key_material: &[u8; 32]) {
		let (mut chaining_key, mut temporary_key) =
			hkdf_extract_expand(&self.provider, self.chaining_key.as_bytes(), input_key_material);
		let mut cipher_chaining_key = chaining_key;
		self.cipher.initialize_key(&mut temporary_key, &mut cipher_chaining_key);
		self.chaining_key.replace(&mut chaining_key);
	}

	fn encrypt_and_hash(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<(), PeerError> {
		let written = self.cipher.encrypt(&self.hash, plaintext, out)?;
		self.mix_hash(&out[..written]);
		Ok(())
	}

	fn decrypt_and_hash(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<(), PeerError> {
		self.cipher.decrypt(&self.hash, ciphertext, out).map_err(|e| match e {
			CryptoError::InvalidTag => PeerError::HandshakeAuthentication,
			e => PeerError::Crypto(e),
		})?;
		self.mix_hash(ciphertext);
		Ok(())
	}

	/// `k1, k2 = HKDF(ck, zero)`. Each returned cipher rotates with its own copy of the final
	/// chaining key.
	fn split(self) -> (CipherState<C>, CipherState<C>) {
		let (mut first_key, mut second_key) =
			hkdf_extract_expand(&self.provider, self.chaining_key.as_bytes(), &[]);
		let mut first_chaining_key = *self.chaining_key.as_bytes();
		let mut second_chaining_key = first_chaining_key;
		let mut first = CipherState::with_provider(self.provider.clone());
		first.initialize_key(&mut first_key, &mut first_chaining_key);
		let mut second = CipherState::with_provider(self.provider);
		second.initialize_key(&mut second_key, &mut second_chaining_key);
		(first, second)
	}

	#[cfg(test)]
	pub(super) fn chaining_key(&self) -> [u8; 32] {
		*self.chaining_key.as_bytes()
	}
}

fn secret(key: &SecureKey) -> Result<SecretKey, PeerError> {
	key.secret_key().map_err(|_| PeerError::InvalidLocalKey)
}

fn check_act(act: &[u8], expected: usize) -> Result<(), PeerError> {
	if act.len() != expected {
		return Err(PeerError::ActLength { expected, actual: act.len() });
	}
	if act[0] != HANDSHAKE_VERSION {
		return Err(PeerError::UnknownHandshakeVersion(act[0]));
	}
	Ok(())
}

/// Mixes our ephemeral key into the state and writes it plus the tag as act one or two.
fn write_ephemeral_act<C: CryptoProvider>(
	symmetric: &mut SymmetricState<C>, provider: &C, secp_ctx: &Secp256k1<secp256k1::All>,
	local_ephemeral: &SecureKey, remote_key: &PublicKey, mut act: Act,
) -> Result<Act, PeerError> {
	let ephemeral = secret(local_ephemeral)?;
	let ephemeral_pubkey = PublicKey::from_secret_key(secp_ctx, &ephemeral);
	symmetric.mix_hash(&ephemeral_pubkey.serialize());
	symmetric.mix_key(&provider.ecdh(&ephemeral, remote_key));

	act[0] = HANDSHAKE_VERSION;
	act[1..34].copy_from_slice(&ephemeral_pubkey.serialize());
	symmetric.encrypt_and_hash(&[], &mut act[34..ACT_ONE_TWO_LENGTH])?;
	Ok(act)
}

/// Reads the peer's ephemeral key from act one or two and mixes it into the state, using
/// `local_key` for the Diffie-Hellman.
fn read_ephemeral_act<C: CryptoProvider>(
	symmetric: &mut SymmetricState<C>, provider: &C, local_key: &SecureKey, act: &[u8],
) -> Result<PublicKey, PeerError> {
	check_act(act, ACT_ONE_TWO_LENGTH)?;
	let remote_ephemeral =
		PublicKey::from_slice(&act[1..34]).map_err(|_| PeerError::InvalidEphemeralKey)?;
	symmetric.mix_hash(&remote_ephemeral.serialize());
	symmetric.mix_key(&provider.ecdh(&secret(local_key)?, &remote_ephemeral));
	symmetric.decrypt_and_hash(&act[34..], &mut [])?;
	Ok(remote_ephemeral)
}

/// An outbound handshake which has not sent act one.
pub(super) struct Uninitiated<C: CryptoProvider> {
	pub(super) provider: C,
	pub(super) local_static: SecureKey,
	pub(super) local_ephemeral: SecureKey,
	pub(super) remote_static: PublicKey,
}

/// An inbound handshake waiting for act one.
pub(super) struct ActOneExpectation<C: CryptoProvider> {
	pub(super) provider: C,
	pub(super) local_static: SecureKey,
	pub(super) local_ephemeral: SecureKey,
}

/// An outbound handshake which sent act one and waits for act two.
pub(super) struct ActTwoExpectation<C: CryptoProvider> {
	symmetric: SymmetricState<C>,
	provider: C,
	local_static: SecureKey,
	local_ephemeral: SecureKey,
	remote_static: PublicKey,
}

/// An inbound handshake which sent act two and waits for act three.
pub(super) struct ActThreeExpectation<C: CryptoProvider> {
	symmetric: SymmetricState<C>,
	provider: C,
	local_ephemeral: SecureKey,
}

/// Where a handshake stands. Every step consumes the state, so a failed step leaves nothing to
/// retry with.
pub(super) enum HandshakeState<C: CryptoProvider> {
	Uninitiated(Uninitiated<C>),
	AwaitingActOne(ActOneExpectation<C>),
	AwaitingActTwo(ActTwoExpectation<C>),
	AwaitingActThree(ActThreeExpectation<C>),
	Complete(Option<Transport<C>>),
}

impl<C: CryptoProvider> HandshakeState<C> {
	/// The number of input bytes the next step requires.
	pub(super) fn expected_input_len(&self) -> Option<usize> {
		match self {
			HandshakeState::Uninitiated(_) => Some(0),
			HandshakeState::AwaitingActOne(_) | HandshakeState::AwaitingActTwo(_) => {
				Some(ACT_ONE_TWO_LENGTH)
			},
			HandshakeState::AwaitingActThree(_) => Some(ACT_THREE_LENGTH),
			HandshakeState::Complete(_) => None,
		}
	}

	/// An empty act of the kind the next step reads.
	pub(super) fn empty_input_act(&self) -> Option<Act> {
		match self {
			HandshakeState::AwaitingActOne(_) => Some(Act::empty_one()),
			HandshakeState::AwaitingActTwo(_) => Some(Act::empty_two()),
			HandshakeState::AwaitingActThree(_) => Some(Act::empty_three()),
			HandshakeState::Uninitiated(_) | HandshakeState::Complete(_) => None,
		}
	}

	/// The length of the act the next step writes.
	pub(super) fn output_len(&self) -> usize {
		match self {
			HandshakeState::Uninitiated(_) | HandshakeState::AwaitingActOne(_) => ACT_ONE_TWO_LENGTH,
			HandshakeState::AwaitingActTwo(_) => ACT_THREE_LENGTH,
			HandshakeState::AwaitingActThree(_) | HandshakeState::Complete(_) => 0,
		}
	}

	/// Processes `input` and returns the act to send, if any, together with the next state.
	pub(super) fn next(
		self, input: &[u8], secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(Option<Act>, HandshakeState<C>), PeerError> {
		match self {
			HandshakeState::Uninitiated(state) => state.send_act_one(input, secp_ctx),
			HandshakeState::AwaitingActOne(state) => state.receive_act_one(input, secp_ctx),
			HandshakeState::AwaitingActTwo(state) => state.receive_act_two(input, secp_ctx),
			HandshakeState::AwaitingActThree(state) => state.receive_act_three(input),
			HandshakeState::Complete(_) => Err(PeerError::HandshakeFinished),
		}
	}
}

impl<C: CryptoProvider> Uninitiated<C> {
	// act one: e, es
	fn send_act_one(
		self, input: &[u8], secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(Option<Act>, HandshakeState<C>), PeerError> {
		if !input.is_empty() {
			return Err(PeerError::ActLength { expected: 0, actual: input.len() });
		}
		let Uninitiated { provider, local_static, local_ephemeral, remote_static } = self;
		let mut symmetric = SymmetricState::new(provider.clone(), &remote_static);
		let act_one = write_ephemeral_act(
			&mut symmetric,
			&provider,
			secp_ctx,
			&local_ephemeral,
			&remote_static,
			Act::empty_one(),
		)?;
		let next = ActTwoExpectation {
			symmetric,
			provider,
			local_static,
			local_ephemeral,
			remote_static,
		};
		Ok((Some(act_one), HandshakeState::AwaitingActTwo(next)))
	}
}

impl<C: CryptoProvider> ActOneExpectation<C> {
	// act one: e, es; then act two: e, ee
	fn receive_act_one(
		self, input: &[u8], secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(Option<Act>, HandshakeState<C>), PeerError> {
		let ActOneExpectation { provider, local_static, local_ephemeral } = self;
		let local_static_pubkey =
			local_static.public_key(secp_ctx).map_err(|_| PeerError::InvalidLocalKey)?;
		let mut symmetric = SymmetricState::new(provider.clone(), &local_static_pubkey);
		let remote_ephemeral = read_ephemeral_act(&mut symmetric, &provider, &local_static, input)?;

		let act_two = write_ephemeral_act(
			&mut symmetric,
			&provider,
			secp_ctx,
			&local_ephemeral,
			&remote_ephemeral,
			Act::empty_two(),
		)?;
		let next = ActThreeExpectation { symmetric, provider, local_ephemeral };
		Ok((Some(act_two), HandshakeState::AwaitingActThree(next)))
	}
}

impl<C: CryptoProvider> ActTwoExpectation<C> {
	// act two: e, ee; then act three: s, se
	fn receive_act_two(
		self, input: &[u8], secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(Option<Act>, HandshakeState<C>), PeerError> {
		let ActTwoExpectation { mut symmetric, provider, local_static, local_ephemeral, remote_static } =
			self;
		let remote_ephemeral = read_ephemeral_act(&mut symmetric, &provider, &local_ephemeral, input)?;

		let local_static_key = secret(&local_static)?;
		let local_static_pubkey = PublicKey::from_secret_key(secp_ctx, &local_static_key);
		let mut act_three = Act::empty_three();
		act_three[0] = HANDSHAKE_VERSION;
		symmetric.encrypt_and_hash(&local_static_pubkey.serialize(), &mut act_three[1..50])?;
		symmetric.mix_key(&provider.ecdh(&local_static_key, &remote_ephemeral));
		symmetric.encrypt_and_hash(&[], &mut act_three[50..ACT_THREE_LENGTH])?;

		let (sending, receiving) = symmetric.split();
		let transport = Transport::new(sending, receiving, remote_static);
		Ok((Some(act_three), HandshakeState::Complete(Some(transport))))
	}
}

impl<C: CryptoProvider> ActThreeExpectation<C> {
	// act three: s, se
	fn receive_act_three(self, input: &[u8]) -> Result<(Option<Act>, HandshakeState<C>), PeerError> {
		let ActThreeExpectation { mut symmetric, provider, local_ephemeral } = self;
		check_act(input, ACT_THREE_LENGTH)?;

		let mut remote_static_bytes = [0u8; 33];
		symmetric.decrypt_and_hash(&input[1..50], &mut remote_static_bytes)?;
		let remote_static =
			PublicKey::from_slice(&remote_static_bytes).map_err(|_| PeerError::InvalidStaticKey)?;
		symmetric.mix_key(&provider.ecdh(&secret(&local_ephemeral)?, &remote_static));
		symmetric.decrypt_and_hash(&input[50..], &mut [])?;

		let (receiving, sending) = symmetric.split();
		let transport = Transport::new(sending, receiving, remote_static);
		Ok((None, HandshakeState::Complete(Some(transport))))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::RustCryptoProvider;
	use crate::util::test_utils::pubkey;
	use bitcoin::hex::DisplayHex;

	#[test]
	fn initial_state_mixes_prologue_and_responder_key() {
		let state = SymmetricState::new(RustCryptoProvider, &pubkey(0x21));
		// BOLT 8 initiator test vector, `h` before act one and the protocol name hash as `ck`.
		assert_eq!(
			state.hash[..].as_hex().to_string(),
			"8401b3fdcaaa710b5405400536a3d5fd7792fe8e7fe29cd8b687216fe323ecbd"
		);
		assert_eq!(
			state.chaining_key()[..].as_hex().to_string(),
			"2640f52eebcd9e882958951c794250eedb28002c05d7dc2ea0f195406042caf1"
		);
	}

	#[test]
	fn act_length_checked_before_version() {
		assert_eq!(check_act(&[1; 49], 50), Err(PeerError::ActLength { expected: 50, actual: 49 }));
		assert_eq!(check_act(&[1; 50], 50), Err(PeerError::UnknownHandshakeVersion(1)));
		assert_eq!(check_act(&[0; 50], 50), Ok(()));
	}
}
