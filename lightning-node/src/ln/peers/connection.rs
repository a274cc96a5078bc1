// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A single peer connection, from the first handshake act to the application messages, without
//! any I/O.
//!
//! Feed bytes read from the socket to [`PeerConnection::read_bytes`], write whatever
//! [`PeerConnection::take_pending_bytes`] returns, and call
//! [`PeerConnection::timer_tick_occurred`] periodically. The connection handles the handshake, the
//! `init` exchange, ping/pong and unknown messages itself and hands every other message back.

use core::ops::Deref;
use std::collections::VecDeque;
use std::io;

use bitcoin::constants::ChainHash;
use bitcoin::secp256k1::{PublicKey, SecretKey};

use crate::crypto::secure_key::SecureKey;
use crate::crypto::{CryptoProvider, RustCryptoProvider};
use crate::ln::msgs::{Init, Ping, Pong, MAX_PONG_BYTES};
use crate::ln::peers::handshake::acts::ActBuilder;
use crate::ln::peers::handshake::PeerHandshake;
use crate::ln::peers::transport::Transport;
use crate::ln::peers::PeerError;
use crate::ln::wire::{self, Message};
use crate::prelude::*;
use crate::util::config::PeerConfig;
use crate::util::errors::ErrorAction;
use crate::util::logger::{Logger, WithContext};
use crate::util::ser::Writeable;

/// The size of the pings we send. Their only purpose is to detect dead connections.
const PING_BYTES: u16 = 64;

enum ConnectionState<C: CryptoProvider> {
	Handshaking { handshake: PeerHandshake<C>, act_builder: Option<ActBuilder> },
	AwaitingInit(Transport<C>),
	Connected(Transport<C>),
	Disconnected,
}

/// The state of one connection to a peer.
///
/// Messages other than `init` can only be sent once both sides have exchanged `init`, see
/// [`Self::is_connected`].
pub struct PeerConnection<L: Deref, C: CryptoProvider = RustCryptoProvider>
where
	L::Target: Logger,
{
	state: ConnectionState<C>,
	their_node_id: Option<PublicKey>,
	our_init: Init,
	their_init: Option<Init>,
	/// The even bit of every feature we set in our `init`.
	known_feature_bits: Vec<usize>,
	pending_outbound: VecDeque<Vec<u8>>,
	awaiting_pong: bool,
	max_outbound_queue: usize,
	logger: L,
}

impl<L: Deref> PeerConnection<L, RustCryptoProvider>
where
	L::Target: Logger,
{
	/// Starts a connection to `their_node_id`. Act one is queued right away.
	pub fn new_outbound(
		our_node_secret: &SecureKey, their_node_id: &PublicKey, ephemeral_key: &SecretKey,
		our_init: Init, config: &PeerConfig, logger: L,
	) -> Result<Self, PeerError> {
		let handshake = PeerHandshake::new_outbound(our_node_secret, their_node_id, ephemeral_key);
		Self::new(handshake, our_init, config, logger)
	}

	/// Accepts a connection from a peer we learn the identity of during the handshake.
	pub fn new_inbound(
		our_node_secret: &SecureKey, ephemeral_key: &SecretKey, our_init: Init,
		config: &PeerConfig, logger: L,
	) -> Result<Self, PeerError> {
		let handshake = PeerHandshake::new_inbound(our_node_secret, ephemeral_key);
		Self::new(handshake, our_init, config, logger)
	}
}

impl<L: Deref, C: CryptoProvider> PeerConnection<L, C>
where
	L::Target: Logger,
{
	/// Wraps a fresh handshake. If it is outbound, act one is generated and queued.
	pub fn new(
		handshake: PeerHandshake<C>, our_init: Init, config: &PeerConfig, logger: L,
	) -> Result<Self, PeerError> {
		let mut known_feature_bits = Vec::new();
		let features = our_init.combined_features();
		for bit in (0..features.len() * 8).step_by(2) {
			if our_init.supports_feature(bit) {
				known_feature_bits.push(bit);
			}
		}

		let mut pending_outbound = VecDeque::new();
		let their_node_id = handshake.their_node_id();
		let mut handshake = handshake;
		if handshake.expected_input_len() == Some(0) {
			if let (Some(act_one), _) = handshake.process_act(&[])? {
				pending_outbound.push_back(act_one.to_vec());
			}
		}

		Ok(PeerConnection {
			state: ConnectionState::Handshaking { handshake, act_builder: None },
			their_node_id,
			our_init,
			their_init: None,
			known_feature_bits,
			pending_outbound,
			awaiting_pong: false,
			max_outbound_queue: config.max_outbound_queue,
			logger,
		})
	}

	/// The peer's node id, once known.
	pub fn their_node_id(&self) -> Option<PublicKey> {
		self.their_node_id
	}

	/// The `init` the peer sent us, once received.
	pub fn their_init(&self) -> Option<&Init> {
		self.their_init.as_ref()
	}

	/// Whether the handshake completed and both sides sent `init`.
	pub fn is_connected(&self) -> bool {
		matches!(self.state, ConnectionState::Connected(_))
	}

	/// Whether the connection failed. A failed connection only has its last words, if any, left
	/// in [`Self::take_pending_bytes`].
	pub fn is_disconnected(&self) -> bool {
		matches!(self.state, ConnectionState::Disconnected)
	}

	/// Drains everything waiting to be written to the socket.
	pub fn take_pending_bytes(&mut self) -> Vec<u8> {
		let mut bytes = Vec::new();
		for frame in self.pending_outbound.drain(..) {
			bytes.extend_from_slice(&frame);
		}
		bytes
	}

	/// Processes bytes read from the socket and returns the application messages they completed.
	///
	/// Any error closes the connection for good. When the transport still works, an `error`
	/// message explaining why is left in [`Self::take_pending_bytes`]. Messages which came before
	/// the failing one in `data` are dropped along with the connection, see
	/// [`Self::read_bytes_into`] to keep them.
	pub fn read_bytes(&mut self, data: &[u8]) -> Result<Vec<Message>, PeerError> {
		let mut messages = Vec::new();
		self.read_bytes_into(data, &mut messages)?;
		Ok(messages)
	}

	/// Like [`Self::read_bytes`], but appends completed messages to `messages` as they are
	/// decoded. On failure `messages` still holds every message which preceded the failing one.
	pub fn read_bytes_into(&mut self, data: &[u8], messages: &mut Vec<Message>) -> Result<(), PeerError> {
		match self.process_bytes(data, messages) {
			Ok(()) => Ok(()),
			Err(e) => Err(self.fail(e)),
		}
	}

	/// Queues `message` for the peer.
	///
	/// Fails without closing the connection if the `init` exchange is not done, the message can't
	/// be encoded or the queue is full.
	pub fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
		if !self.is_connected() {
			return Err(PeerError::NotInitialized(message.type_id().as_u16()));
		}
		if self.pending_outbound.len() >= self.max_outbound_queue {
			return Err(PeerError::OutboundQueueFull);
		}
		self.enqueue_message(message)
	}

	/// Sends a ping, or fails the connection if the previous one was never answered. Call this
	/// every [`PeerConfig::ping_interval_secs`].
	pub fn timer_tick_occurred(&mut self) -> Result<(), PeerError> {
		if !self.is_connected() {
			return Ok(());
		}
		if self.awaiting_pong {
			return Err(self.fail(PeerError::PingTimeout));
		}
		self.awaiting_pong = true;
		let ping = Message::Ping(Ping { ponglen: 0, byteslen: PING_BYTES });
		match self.enqueue_message(&ping) {
			Ok(()) => Ok(()),
			Err(e) => Err(self.fail(e)),
		}
	}

	fn process_bytes(&mut self, data: &[u8], messages: &mut Vec<Message>) -> Result<(), PeerError> {
		let data = match self.state {
			ConnectionState::Handshaking { .. } => {
				let (transport, remaining) = self.read_handshake(data)?;
				match transport {
					Some(transport) => {
						self.handshake_complete(transport)?;
						remaining
					},
					None => return Ok(()),
				}
			},
			ConnectionState::Disconnected => return Err(PeerError::Disconnected),
			_ => data,
		};

		let payloads = match self.state {
			ConnectionState::AwaitingInit(ref mut transport)
			| ConnectionState::Connected(ref mut transport) => transport.decrypt_message_stream(data)?,
			_ => return Err(PeerError::Disconnected),
		};

		for payload in payloads {
			let mut reader = io::Cursor::new(&payload[..]);
			let message = wire::read(&mut reader)?;
			if let Some(message) = self.handle_message(message)? {
				messages.push(message);
			}
		}
		Ok(())
	}

	/// Collects and processes handshake acts. Returns the transport once the handshake completes
	/// along with the bytes which followed the last act.
	fn read_handshake<'a>(
		&mut self, mut data: &'a [u8],
	) -> Result<(Option<Transport<C>>, &'a [u8]), PeerError> {
		let (handshake, act_builder) = match self.state {
			ConnectionState::Handshaking { ref mut handshake, ref mut act_builder } => {
				(handshake, act_builder)
			},
			_ => return Ok((None, data)),
		};
		loop {
			let mut builder = match act_builder.take() {
				Some(builder) => builder,
				None => handshake.act_builder().ok_or(PeerError::HandshakeFinished)?,
			};
			data = builder.fill(data);
			let act = match builder.finish() {
				Ok(act) => act,
				Err(builder) => {
					*act_builder = Some(builder);
					return Ok((None, data));
				},
			};
			let (reply, transport) = handshake.process_act(&act)?;
			if let Some(reply) = reply {
				self.pending_outbound.push_back(reply.to_vec());
			}
			if transport.is_some() {
				return Ok((transport, data));
			}
			if data.is_empty() {
				return Ok((None, data));
			}
		}
	}

	fn handshake_complete(&mut self, transport: Transport<C>) -> Result<(), PeerError> {
		let their_node_id = transport.their_node_id();
		self.their_node_id = Some(their_node_id);
		{
			let logger = WithContext::from(&self.logger, Some(their_node_id), None);
			log_debug!(logger, "Finished noise handshake for connection with {}", log_pubkey!(their_node_id));
		}
		self.state = ConnectionState::AwaitingInit(transport);
		let init = Message::Init(self.our_init.clone());
		self.enqueue_message(&init)
	}

	/// Handles the connection level messages, returning the rest.
	fn handle_message(&mut self, message: Message) -> Result<Option<Message>, PeerError> {
		let logger = WithContext::from(&self.logger, self.their_node_id, None);
		log_trace!(logger, "Received message of type {} from peer", message.type_id());

		if let ConnectionState::AwaitingInit(_) = self.state {
			let init = match message {
				Message::Init(init) => init,
				message => return Err(PeerError::NotInitialized(message.type_id().as_u16())),
			};
			if let Some(bit) = init.first_unknown_required_feature(&self.known_feature_bits) {
				return Err(PeerError::UnknownRequiredFeature(bit));
			}
			let our_chains: Vec<ChainHash> =
				self.our_init.networks.as_ref().map(|n| n.0.clone()).unwrap_or_default();
			if !our_chains.is_empty() && !init.shares_network(&our_chains) {
				return Err(PeerError::IncompatibleNetworks);
			}
			log_info!(logger, "Received peer Init message from {}", DebugNodeId(self.their_node_id));
			self.their_init = Some(init);
			self.state = match core::mem::replace(&mut self.state, ConnectionState::Disconnected) {
				ConnectionState::AwaitingInit(transport) => ConnectionState::Connected(transport),
				state => state,
			};
			return Ok(None);
		}

		match message {
			Message::Init(_) => {
				log_debug!(logger, "Ignoring duplicate Init message");
				Ok(None)
			},
			Message::Ping(ping) => {
				if ping.ponglen > MAX_PONG_BYTES {
					log_gossip!(logger, "Ignoring ping asking for a {} byte pong", ping.ponglen);
					return Ok(None);
				}
				let pong = Message::Pong(Pong { byteslen: ping.ponglen });
				self.enqueue_message(&pong)?;
				Ok(None)
			},
			Message::Pong(_) => {
				self.awaiting_pong = false;
				Ok(None)
			},
			Message::Unknown(type_id) if type_id.is_even() => {
				Err(PeerError::UnknownRequiredMessage(type_id.as_u16()))
			},
			Message::Unknown(type_id) => {
				log_debug!(logger, "Ignoring unknown odd message of type {}", type_id);
				Ok(None)
			},
			message => Ok(Some(message)),
		}
	}

	fn enqueue_message(&mut self, message: &Message) -> Result<(), PeerError> {
		let mut buffer = Vec::new();
		message.write(&mut buffer).map_err(|_| PeerError::Encode(message.type_id().as_u16()))?;
		let frame = match self.state {
			ConnectionState::AwaitingInit(ref mut transport)
			| ConnectionState::Connected(ref mut transport) => transport.write_message(&buffer)?,
			_ => return Err(PeerError::Disconnected),
		};
		let logger = WithContext::from(&self.logger, self.their_node_id, None);
		log_trace!(logger, "Enqueueing message of type {} to peer", message.type_id());
		self.pending_outbound.push_back(frame);
		Ok(())
	}

	/// Closes the connection, leaving an `error` message to flush if the transport still works.
	fn fail(&mut self, err: PeerError) -> PeerError {
		{
			let logger = WithContext::from(&self.logger, self.their_node_id, None);
			log_debug!(logger, "Disconnecting peer {}: {}", DebugNodeId(self.their_node_id), err);
		}
		if let ErrorAction::DisconnectPeer { msg: Some(msg) } = err.to_error_action() {
			if let Err(e) = self.enqueue_message(&Message::Error(msg)) {
				let logger = WithContext::from(&self.logger, self.their_node_id, None);
				log_trace!(logger, "Failed to queue error message: {}", e);
			}
		} else {
			self.pending_outbound.clear();
		}
		self.state = ConnectionState::Disconnected;
		err
	}
}

struct DebugNodeId(Option<PublicKey>);
impl core::fmt::Display for DebugNodeId {
	fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
		match self.0 {
			Some(ref node_id) => write!(f, "{}", log_pubkey!(node_id)),
			None => f.write_str("<unknown>"),
		}
	}
}
