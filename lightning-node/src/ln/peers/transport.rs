// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Handles all over the wire message encryption and decryption upon handshake completion.

use bitcoin::secp256k1::PublicKey;

use crate::crypto::{CryptoError, CryptoProvider, RustCryptoProvider, TAG_SIZE};
use crate::ln::peers::cipher_state::{encrypted_len, CipherState};
use crate::ln::peers::PeerError;
use crate::prelude::*;

/// The largest plaintext a single frame carries.
pub const LN_MAX_MSG_LEN: usize = u16::MAX as usize;

/// The encrypted length prefix of every frame: a big-endian `u16` and its tag.
pub const MSG_LEN_HEADER_LEN: usize = 2 + TAG_SIZE;

/// Returned after a successful handshake to encrypt and decrypt communication with the peer.
///
/// Each message is framed as an encrypted two byte length followed by the encrypted payload, each
/// with its own tag, so every message consumes two nonces in each direction. Key rotation is
/// handled by the underlying [`CipherState`]s.
///
/// After a frame fails to authenticate, every further read fails as well: the nonces of the two
/// sides have diverged and there is no way to resynchronize.
pub struct Transport<C: CryptoProvider = RustCryptoProvider> {
	sending: CipherState<C>,
	receiving: CipherState<C>,
	their_node_id: PublicKey,

	read_buffer: Vec<u8>,
	pending_message_length: Option<usize>,
	failed: bool,
}

impl<C: CryptoProvider> Transport<C> {
	pub(super) fn new(
		sending: CipherState<C>, receiving: CipherState<C>, their_node_id: PublicKey,
	) -> Self {
		Transport {
			sending,
			receiving,
			their_node_id,
			read_buffer: Vec::new(),
			pending_message_length: None,
			failed: false,
		}
	}

	/// The static public key the peer proved ownership of during the handshake.
	pub fn their_node_id(&self) -> PublicKey {
		self.their_node_id
	}

	/// Encrypts `payload` into a complete frame ready to be written to the peer.
	pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, PeerError> {
		if payload.len() > LN_MAX_MSG_LEN {
			return Err(PeerError::MessageTooLong(payload.len()));
		}
		let mut frame = vec![0u8; MSG_LEN_HEADER_LEN + encrypted_len(payload.len())];
		let length_bytes = (payload.len() as u16).to_be_bytes();
		self.sending.encrypt(&[], &length_bytes, &mut frame[..MSG_LEN_HEADER_LEN])?;
		self.sending.encrypt(&[], payload, &mut frame[MSG_LEN_HEADER_LEN..])?;
		Ok(frame)
	}

	/// Decrypts a frame header, which must be exactly [`MSG_LEN_HEADER_LEN`] bytes, and returns
	/// the length of the payload which follows it. The encrypted payload is 16 bytes longer.
	pub fn read_message_length(&mut self, header: &[u8]) -> Result<usize, PeerError> {
		self.check_usable()?;
		if header.len() != MSG_LEN_HEADER_LEN {
			return Err(PeerError::BadFrameLength {
				expected: MSG_LEN_HEADER_LEN,
				actual: header.len(),
			});
		}
		let mut length_bytes = [0u8; 2];
		let res = self.receiving.decrypt(&[], header, &mut length_bytes);
		self.note_failure(res)?;
		Ok(u16::from_be_bytes(length_bytes) as usize)
	}

	/// Decrypts the payload which followed a header read with [`Self::read_message_length`] into
	/// `out` and returns the plaintext length.
	pub fn read_message_payload(
		&mut self, encrypted_payload: &[u8], out: &mut [u8],
	) -> Result<usize, PeerError> {
		self.check_usable()?;
		if encrypted_payload.len() < TAG_SIZE || encrypted_payload.len() > encrypted_len(LN_MAX_MSG_LEN)
		{
			return Err(PeerError::BadFrameLength {
				expected: encrypted_len(LN_MAX_MSG_LEN),
				actual: encrypted_payload.len(),
			});
		}
		let res = self.receiving.decrypt(&[], encrypted_payload, out);
		self.note_failure(res)
	}

	/// Adds newly received bytes to the read buffer and decrypts every message now complete.
	///
	/// Partial frames stay buffered until the rest arrives. A header is only decrypted once, so
	/// frames may arrive split at any byte.
	pub fn decrypt_message_stream(&mut self, new_data: &[u8]) -> Result<Vec<Vec<u8>>, PeerError> {
		self.check_usable()?;
		self.read_buffer.extend_from_slice(new_data);

		let mut messages = Vec::new();
		let mut offset = 0;
		loop {
			let message_length = match self.pending_message_length {
				Some(len) => len,
				None => {
					if self.read_buffer.len() - offset < MSG_LEN_HEADER_LEN {
						break;
					}
					let mut header = [0u8; MSG_LEN_HEADER_LEN];
					header.copy_from_slice(&self.read_buffer[offset..offset + MSG_LEN_HEADER_LEN]);
					let len = self.read_message_length(&header)?;
					offset += MSG_LEN_HEADER_LEN;
					self.pending_message_length = Some(len);
					len
				},
			};

			let frame_len = encrypted_len(message_length);
			if self.read_buffer.len() - offset < frame_len {
				break;
			}
			let mut message = vec![0u8; message_length];
			let encrypted = self.read_buffer[offset..offset + frame_len].to_vec();
			self.read_message_payload(&encrypted, &mut message)?;
			offset += frame_len;
			self.pending_message_length = None;
			messages.push(message);
		}
		self.read_buffer.drain(..offset);
		Ok(messages)
	}

	fn check_usable(&self) -> Result<(), PeerError> {
		if self.failed {
			return Err(PeerError::Crypto(CryptoError::InvalidTag));
		}
		Ok(())
	}

	fn note_failure<T>(&mut self, res: Result<T, CryptoError>) -> Result<T, PeerError> {
		if res.is_err() {
			self.failed = true;
			self.read_buffer.clear();
		}
		res.map_err(PeerError::Crypto)
	}

	#[cfg(test)]
	pub(crate) fn sending_key(&self) -> [u8; 32] {
		self.sending.key_bytes().unwrap()
	}

	#[cfg(test)]
	pub(crate) fn receiving_key(&self) -> [u8; 32] {
		self.receiving.key_bytes().unwrap()
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::util::test_utils::pubkey;
	use bitcoin::hex::{DisplayHex, FromHex};

	const CHAINING_KEY: &str = "919219dbb2920afa8db80f9a51787a840bcf111ed8d588caf9ab4be716e42b01";
	const INITIATOR_SENDING_KEY: &str =
		"969ab31b4d288cedf6218839b27a3e2140827047f2c0f01bf5c04435d43511a9";
	const INITIATOR_RECEIVING_KEY: &str =
		"bb9020b8965f4df047e07f955f3c4b88418984aadc5cdb35096b9ea8fa5c3442";

	fn cipher(key: &str) -> CipherState {
		let mut cipher = CipherState::new();
		cipher.initialize_key(
			&mut <[u8; 32]>::from_hex(key).unwrap(),
			&mut <[u8; 32]>::from_hex(CHAINING_KEY).unwrap(),
		);
		cipher
	}

	/// The transports both ends of the BOLT 8 test vector handshake end up with.
	pub(crate) fn transport_pair() -> (Transport, Transport) {
		let initiator = Transport::new(
			cipher(INITIATOR_SENDING_KEY),
			cipher(INITIATOR_RECEIVING_KEY),
			pubkey(0x21),
		);
		let responder = Transport::new(
			cipher(INITIATOR_RECEIVING_KEY),
			cipher(INITIATOR_SENDING_KEY),
			pubkey(0x11),
		);
		(initiator, responder)
	}

	#[test]
	fn bolt8_message_vectors() {
		let (mut initiator, mut responder) = transport_pair();
		let hello = Vec::<u8>::from_hex("68656c6c6f").unwrap();

		for i in 0..1002 {
			let frame = initiator.write_message(&hello).unwrap();
			let expected = match i {
				0 => "cf2b30ddf0cf3f80e7c35a6e6730b59fe802473180f396d88a8fb0db8cbcf25d2f214cf9ea1d95",
				1 => "72887022101f0b6753e0c7de21657d35a4cb2a1f5cde2650528bbc8f837d0f0d7ad833b1a256a1",
				500 => "178cb9d7387190fa34db9c2d50027d21793c9bc2d40b1e14dcf30ebeeeb220f48364f7a4c68bf8",
				501 => "1b186c57d44eb6de4c057c49940d79bb838a145cb528d6e8fd26dbe50a60ca2c104b56b60e45bd",
				1000 => "4a2f3cc3b5e78ddb83dcb426d9863d9d9a723b0337c89dd0b005d89f8d3c05c52b76b29b740f09",
				1001 => "2ecd8c8a5629d0d02ab457a0fdd0f7b90a192cd46be5ecb6ca570bfc5e268338b1a16cf4ef2d36",
				_ => "",
			};
			if !expected.is_empty() {
				assert_eq!(frame.as_hex().to_string(), expected, "message {}", i);
			}

			assert_eq!(responder.decrypt_message_stream(&frame).unwrap(), vec![hello.clone()]);
		}
	}

	#[test]
	fn length_then_payload() {
		let (mut initiator, mut responder) = transport_pair();
		let frame = initiator.write_message(b"ping").unwrap();
		assert_eq!(frame.len(), MSG_LEN_HEADER_LEN + 4 + TAG_SIZE);

		let len = responder.read_message_length(&frame[..MSG_LEN_HEADER_LEN]).unwrap();
		assert_eq!(len, 4);
		let mut out = [0u8; 4];
		assert_eq!(responder.read_message_payload(&frame[MSG_LEN_HEADER_LEN..], &mut out), Ok(4));
		assert_eq!(&out, b"ping");
	}

	#[test]
	fn max_length_message() {
		let (mut initiator, mut responder) = transport_pair();
		let payload = vec![0x42; LN_MAX_MSG_LEN];
		let frame = initiator.write_message(&payload).unwrap();
		assert_eq!(responder.decrypt_message_stream(&frame).unwrap(), vec![payload]);

		assert_eq!(
			initiator.write_message(&vec![0; LN_MAX_MSG_LEN + 1]).err(),
			Some(PeerError::MessageTooLong(LN_MAX_MSG_LEN + 1))
		);
	}

	#[test]
	fn stream_split_at_every_byte() {
		let (mut initiator, mut responder) = transport_pair();
		let mut wire = initiator.write_message(b"first").unwrap();
		wire.extend(initiator.write_message(&[]).unwrap());
		wire.extend(initiator.write_message(b"third").unwrap());

		let mut received = Vec::new();
		for byte in wire.iter() {
			received.extend(responder.decrypt_message_stream(&[*byte]).unwrap());
		}
		assert_eq!(received, vec![b"first".to_vec(), Vec::new(), b"third".to_vec()]);
		assert!(responder.read_buffer.is_empty());
		assert!(responder.pending_message_length.is_none());
	}

	#[test]
	fn stream_many_messages_at_once() {
		let (mut initiator, mut responder) = transport_pair();
		let mut wire = Vec::new();
		for i in 0..10u8 {
			wire.extend(initiator.write_message(&[i; 3]).unwrap());
		}
		// Leave half a header behind.
		let partial = initiator.write_message(b"rest").unwrap();
		wire.extend_from_slice(&partial[..9]);

		let messages = responder.decrypt_message_stream(&wire).unwrap();
		assert_eq!(messages.len(), 10);
		assert_eq!(messages[9], vec![9; 3]);
		assert_eq!(responder.decrypt_message_stream(&partial[9..]).unwrap(), vec![b"rest".to_vec()]);
	}

	#[test]
	fn failed_decryption_is_permanent() {
		let (mut initiator, mut responder) = transport_pair();
		let mut frame = initiator.write_message(b"hello").unwrap();
		let last = frame.len() - 1;
		frame[last] ^= 1;
		assert_eq!(
			responder.decrypt_message_stream(&frame).err(),
			Some(PeerError::Crypto(CryptoError::InvalidTag))
		);

		let good = initiator.write_message(b"hello").unwrap();
		assert!(responder.decrypt_message_stream(&good).is_err());
		assert!(responder.read_message_length(&good[..MSG_LEN_HEADER_LEN]).is_err());
	}

	#[test]
	fn header_must_be_exact() {
		let (_, mut responder) = transport_pair();
		assert_eq!(
			responder.read_message_length(&[0; 17]).err(),
			Some(PeerError::BadFrameLength { expected: MSG_LEN_HEADER_LEN, actual: 17 })
		);
		assert_eq!(
			responder.read_message_payload(&[0; 15], &mut []).err(),
			Some(PeerError::BadFrameLength { expected: encrypted_len(LN_MAX_MSG_LEN), actual: 15 })
		);
	}
}
