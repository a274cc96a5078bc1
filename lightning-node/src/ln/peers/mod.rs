// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Everything that has to do with over-the-wire peer communication.
//!
//! The [`handshake`] module runs the BOLT 8 `Noise_XK` handshake. Once it completes it hands out a
//! [`Transport`], which encrypts and frames messages and handles key rotation. [`PeerConnection`]
//! puts both together with the BOLT 1 connection rules (`init` first, ping/pong, unknown
//! messages) without doing any I/O itself.
//!
//! [`Transport`]: transport::Transport
//! [`PeerConnection`]: connection::PeerConnection

use core::fmt;

use crate::crypto::CryptoError;
use crate::ln::msgs::{DecodeError, ErrorMessage};
use crate::ln::types::ChannelId;
use crate::prelude::*;
use crate::util::errors::{ErrorAction, LightningError};

pub mod cipher_state;
pub mod connection;
pub mod handshake;
pub mod transport;

/// An error which makes a peer connection unusable. The connection must be closed and never
/// resumed: a new connection starts a new handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum PeerError {
	/// A handshake act did not have the length its position in the handshake requires.
	ActLength {
		/// The length of the act at this step.
		expected: usize,
		/// The number of bytes we were given.
		actual: usize,
	},
	/// A handshake act carried a version byte other than 0.
	UnknownHandshakeVersion(u8),
	/// The peer's ephemeral key in act one or two did not parse.
	InvalidEphemeralKey,
	/// The peer's static key in act three did not parse.
	InvalidStaticKey,
	/// A handshake act did not authenticate.
	HandshakeAuthentication,
	/// The handshake was asked to process input after it completed or failed.
	HandshakeFinished,
	/// One of our own keys is not a valid secp256k1 secret key.
	InvalidLocalKey,
	/// A frame did not authenticate, or we could not encrypt one. The two sides' nonces have
	/// diverged and the transport can not recover.
	Crypto(CryptoError),
	/// A frame header was not exactly the 18 bytes of an encrypted length and its tag, or a
	/// payload did not match the length its header announced.
	BadFrameLength {
		/// The number of bytes required.
		expected: usize,
		/// The number of bytes we were given.
		actual: usize,
	},
	/// A message to send was longer than the 65535 bytes a frame can carry.
	MessageTooLong(usize),
	/// The handshake completed without learning the peer's static key.
	MissingRemoteStaticKey,
	/// A message from the peer could not be decoded.
	Decode(DecodeError),
	/// A message other than `init` was sent or received before both sides exchanged `init`.
	/// Carries the message type.
	NotInitialized(u16),
	/// The peer requires a feature we don't know about.
	UnknownRequiredFeature(usize),
	/// The peer announced in `init` that it is not on any of our chains.
	IncompatibleNetworks,
	/// The peer sent a message with an unknown even type.
	UnknownRequiredMessage(u16),
	/// The peer did not answer our last ping before the next one was due.
	PingTimeout,
	/// Too many messages are waiting to be written to the peer.
	OutboundQueueFull,
	/// A message we were asked to send could not be encoded. Carries the message type.
	Encode(u16),
	/// The connection already failed or was closed.
	Disconnected,
}

impl fmt::Debug for PeerError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			PeerError::ActLength { expected, actual } => {
				write!(f, "need exactly {} bytes, got {}", expected, actual)
			},
			PeerError::UnknownHandshakeVersion(v) => write!(f, "unexpected version {}", v),
			PeerError::InvalidEphemeralKey => f.write_str("invalid remote ephemeral public key"),
			PeerError::InvalidStaticKey => f.write_str("invalid remote public key"),
			PeerError::HandshakeAuthentication => f.write_str("invalid hmac"),
			PeerError::HandshakeFinished => f.write_str("handshake is no longer in progress"),
			PeerError::InvalidLocalKey => f.write_str("local key is not a valid secret key"),
			PeerError::Crypto(ref e) => write!(f, "transport failure: {}", e),
			PeerError::BadFrameLength { expected, actual } => {
				write!(f, "bad frame length: expected {} bytes, got {}", expected, actual)
			},
			PeerError::MessageTooLong(len) => write!(f, "message of {} bytes is too long", len),
			PeerError::MissingRemoteStaticKey => f.write_str("remote static key unknown after handshake"),
			PeerError::Decode(ref e) => write!(f, "undecodable message: {}", e),
			PeerError::NotInitialized(t) => write!(f, "message type {} before init exchange", t),
			PeerError::UnknownRequiredFeature(bit) => write!(f, "unknown required feature bit {}", bit),
			PeerError::IncompatibleNetworks => f.write_str("no network in common"),
			PeerError::UnknownRequiredMessage(t) => write!(f, "unknown required message type {}", t),
			PeerError::PingTimeout => f.write_str("no pong received before the next ping was due"),
			PeerError::OutboundQueueFull => f.write_str("outbound queue full"),
			PeerError::Encode(t) => write!(f, "message type {} could not be encoded", t),
			PeerError::Disconnected => f.write_str("connection closed"),
		}
	}
}

impl fmt::Display for PeerError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for PeerError {}

impl From<CryptoError> for PeerError {
	fn from(e: CryptoError) -> Self {
		PeerError::Crypto(e)
	}
}

impl From<DecodeError> for PeerError {
	fn from(e: DecodeError) -> Self {
		PeerError::Decode(e)
	}
}

impl PeerError {
	/// Whether the transport still works, so that an `error` message can reach the peer before we
	/// disconnect.
	pub fn transport_intact(&self) -> bool {
		match self {
			PeerError::Decode(_)
			| PeerError::NotInitialized(_)
			| PeerError::UnknownRequiredFeature(_)
			| PeerError::IncompatibleNetworks
			| PeerError::UnknownRequiredMessage(_) => true,
			_ => false,
		}
	}

	/// Every [`PeerError`] closes the connection. Where the transport survived, the peer is told
	/// why with a connection-level `error` message.
	pub fn to_error_action(&self) -> ErrorAction {
		let msg = if self.transport_intact() {
			Some(ErrorMessage { channel_id: ChannelId::new_zero(), data: self.to_string() })
		} else {
			None
		};
		ErrorAction::DisconnectPeer { msg }
	}
}

impl From<PeerError> for LightningError {
	fn from(e: PeerError) -> Self {
		LightningError { err: e.to_string(), action: e.to_error_action() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn handshake_errors_disconnect_silently() {
		for err in [
			PeerError::UnknownHandshakeVersion(1),
			PeerError::HandshakeAuthentication,
			PeerError::Crypto(CryptoError::InvalidTag),
			PeerError::MissingRemoteStaticKey,
		] {
			assert_eq!(err.to_error_action(), ErrorAction::DisconnectPeer { msg: None });
		}
		assert_eq!(PeerError::HandshakeAuthentication.to_string(), "invalid hmac");
	}

	#[test]
	fn protocol_errors_explain_themselves() {
		let err = LightningError::from(PeerError::UnknownRequiredMessage(100));
		assert_eq!(err.err, "unknown required message type 100");
		match err.action {
			ErrorAction::DisconnectPeer { msg: Some(msg) } => {
				assert!(msg.channel_id.is_zero());
				assert_eq!(msg.data, "unknown required message type 100");
			},
			_ => panic!("Unexpected action"),
		}
	}
}
