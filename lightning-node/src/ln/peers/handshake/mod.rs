// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Execute handshakes for peer-to-peer connection establishment.
//!
//! A [`PeerHandshake`] is advanced one act at a time with [`PeerHandshake::process_act`]. Once the
//! third act has been written (outbound) or read (inbound) it hands out the [`Transport`] for the
//! connection, exactly once.

use bitcoin::secp256k1::{self, PublicKey, Secp256k1, SecretKey};

use crate::crypto::secure_key::SecureKey;
use crate::crypto::{CryptoError, CryptoProvider, RustCryptoProvider};
use crate::ln::peers::transport::Transport;
use crate::ln::peers::PeerError;

pub mod acts;
mod states;

use self::acts::{Act, ActBuilder};
use self::states::{ActOneExpectation, HandshakeState, Uninitiated};

/// Object for managing handshakes.
///
/// Requires the ephemeral private key to be provided, so that callers control where its
/// randomness comes from.
pub struct PeerHandshake<C: CryptoProvider = RustCryptoProvider> {
	state: Option<HandshakeState<C>>,
	their_node_id: Option<PublicKey>,
	secp_ctx: Secp256k1<secp256k1::All>,
}

impl PeerHandshake<RustCryptoProvider> {
	/// Instantiates a handshake with the node at `their_node_id`, using our static key and a
	/// freshly generated ephemeral key.
	pub fn new_outbound(
		our_node_secret: &SecureKey, their_node_id: &PublicKey, ephemeral_key: &SecretKey,
	) -> Self {
		Self::new_outbound_with_provider(our_node_secret, their_node_id, ephemeral_key, RustCryptoProvider)
	}

	/// Instantiates a handshake in anticipation of a peer's first act.
	pub fn new_inbound(our_node_secret: &SecureKey, ephemeral_key: &SecretKey) -> Self {
		Self::new_inbound_with_provider(our_node_secret, ephemeral_key, RustCryptoProvider)
	}
}

impl<C: CryptoProvider> PeerHandshake<C> {
	/// [`PeerHandshake::new_outbound`] with a specific crypto backend.
	pub fn new_outbound_with_provider(
		our_node_secret: &SecureKey, their_node_id: &PublicKey, ephemeral_key: &SecretKey,
		provider: C,
	) -> Self {
		let state = Uninitiated {
			provider,
			local_static: our_node_secret.clone(),
			local_ephemeral: SecureKey::from_secret_key(ephemeral_key),
			remote_static: *their_node_id,
		};
		Self {
			state: Some(HandshakeState::Uninitiated(state)),
			their_node_id: Some(*their_node_id),
			secp_ctx: Secp256k1::new(),
		}
	}

	/// [`PeerHandshake::new_inbound`] with a specific crypto backend.
	pub fn new_inbound_with_provider(
		our_node_secret: &SecureKey, ephemeral_key: &SecretKey, provider: C,
	) -> Self {
		let state = ActOneExpectation {
			provider,
			local_static: our_node_secret.clone(),
			local_ephemeral: SecureKey::from_secret_key(ephemeral_key),
		};
		Self {
			state: Some(HandshakeState::AwaitingActOne(state)),
			their_node_id: None,
			secp_ctx: Secp256k1::new(),
		}
	}

	/// The peer's static public key. Known from the start for outbound handshakes and once act
	/// three has been read for inbound ones.
	pub fn their_node_id(&self) -> Option<PublicKey> {
		self.their_node_id
	}

	/// Whether the handshake produced its [`Transport`].
	pub fn is_complete(&self) -> bool {
		matches!(self.state, Some(HandshakeState::Complete(_)))
	}

	/// The exact number of bytes the next call to [`Self::process_act`] needs, or `None` once the
	/// handshake is over, successfully or not.
	pub fn expected_input_len(&self) -> Option<usize> {
		self.state.as_ref().and_then(|state| state.expected_input_len())
	}

	/// A builder to collect the next act from a byte stream, if the handshake expects one.
	pub fn act_builder(&self) -> Option<ActBuilder> {
		self.state.as_ref().and_then(|state| state.empty_input_act()).map(ActBuilder::new)
	}

	/// Processes one act from the peer, or starts an outbound handshake when given no input.
	///
	/// Returns the act to send back, if any, and the [`Transport`] if this step completed the
	/// handshake. `input` must be exactly one act: malformed or short input fails the handshake
	/// for good and every later call returns [`PeerError::HandshakeFinished`].
	pub fn process_act(
		&mut self, input: &[u8],
	) -> Result<(Option<Act>, Option<Transport<C>>), PeerError> {
		let state = self.state.take().ok_or(PeerError::HandshakeFinished)?;
		let (act, next_state) = state.next(input, &self.secp_ctx)?;
		match next_state {
			HandshakeState::Complete(Some(transport)) => {
				self.their_node_id = Some(transport.their_node_id());
				self.state = Some(HandshakeState::Complete(None));
				Ok((act, Some(transport)))
			},
			next_state => {
				self.state = Some(next_state);
				Ok((act, None))
			},
		}
	}

	/// [`Self::process_act`] writing the act to send into `output`. Returns the number of bytes
	/// written and, on the step which completes the handshake, the [`Transport`].
	pub fn perform_step(
		&mut self, input: &[u8], output: &mut [u8],
	) -> Result<(usize, Option<Transport<C>>), PeerError> {
		let needed = self.state.as_ref().map_or(0, |state| state.output_len());
		if output.len() < needed {
			return Err(PeerError::Crypto(CryptoError::BufferTooSmall {
				needed,
				available: output.len(),
			}));
		}
		let (act, transport) = self.process_act(input)?;
		let written = match act {
			Some(act) => {
				output[..act.len()].copy_from_slice(&act);
				act.len()
			},
			None => 0,
		};
		Ok((written, transport))
	}
}
