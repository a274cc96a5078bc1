// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wire messages and the error type for decoding them live here.
//!
//! Every message is a plain struct holding its fixed fields followed by the known records of its
//! TLV extension. The message type numbers and the [`Message`] enum wrapping all of them live in
//! [`crate::ln::wire`].
//!
//! [`Message`]: crate::ln::wire::Message

use core::fmt;
use std::io::{self, Read};

use bitcoin::constants::ChainHash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{ScriptBuf, Txid, Witness};

use crate::ln::tlv::{
	feature_bit_set, BlindedPath, ChannelType, FeeRange, FundingOutputContribution, Networks,
	NextFunding, RequireConfirmedInputs, ShortChannelId, UpfrontShutdownScript,
};
use crate::ln::types::{ChannelId, PaymentHash, PaymentPreimage};
use crate::prelude::*;
use crate::util::ser::{Readable, TransactionU16LenLimited, Writeable, Writer};

/// An error in decoding a message or struct.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum DecodeError {
	/// A version byte specified something we don't know how to handle.
	UnknownVersion,
	/// Unknown feature mandating we fail to parse message (e.g., TLV with an even, unknown type)
	UnknownRequiredFeature,
	/// Value was invalid.
	///
	/// For example, a byte which was supposed to be a bool was something other than a 0
	/// or 1, a public key/private key/signature was invalid, text wasn't UTF-8, TLV was
	/// syntactically incorrect, etc.
	InvalidValue,
	/// The buffer to be read was too short.
	ShortRead,
	/// A length descriptor in the packet didn't describe the later data correctly.
	BadLengthDescriptor,
	/// Error from [`std::io`].
	Io(io::ErrorKind),
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			DecodeError::UnknownVersion => f.write_str("Unknown realm byte in Onion packet"),
			DecodeError::UnknownRequiredFeature => {
				f.write_str("Unknown required feature preventing decode")
			},
			DecodeError::InvalidValue => {
				f.write_str("Nonsense bytes didn't map to the type they were interpreted as")
			},
			DecodeError::ShortRead => f.write_str("Packet extended beyond the provided bytes"),
			DecodeError::BadLengthDescriptor => f.write_str(
				"A length descriptor in the packet didn't describe the later data correctly",
			),
			DecodeError::Io(ref e) => write!(f, "I/O error: {:?}", e),
		}
	}
}

impl std::error::Error for DecodeError {}

impl From<io::Error> for DecodeError {
	fn from(e: io::Error) -> Self {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			DecodeError::ShortRead
		} else {
			DecodeError::Io(e.kind())
		}
	}
}

/// A [`warning`] message to be sent to or received from a peer.
///
/// [`warning`]: https://github.com/lightning/bolts/blob/master/01-messaging.md#the-error-and-warning-messages
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WarningMessage {
	/// The channel ID involved in the warning.
	///
	/// All-0s indicates a warning unrelated to a specific channel.
	pub channel_id: ChannelId,
	/// A possibly human-readable warning description.
	///
	/// The string should be sanitized before it is used (e.g. emitted to logs or printed to
	/// stdout). Otherwise, a well crafted error message may trigger a security vulnerability in
	/// the terminal emulator or the logging subsystem.
	pub data: String,
}

/// An [`stfu`] (quiescence) message to be sent to or received from a peer.
///
/// [`stfu`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#quiescence
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Stfu {
	/// The channel ID where quiescence is intended
	pub channel_id: ChannelId,
	/// Initiator flag, 1 if initiating, 0 if replying to an stfu.
	pub initiator: u8,
}

/// An [`init`] message to be sent to or received from a peer.
///
/// [`init`]: https://github.com/lightning/bolts/blob/master/01-messaging.md#the-init-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Init {
	/// Legacy feature bits, to be merged with [`Self::features`].
	pub global_features: Vec<u8>,
	/// The relevant features which the sender supports, big-endian with bit 0 last.
	pub features: Vec<u8>,
	/// Indicates chains the sender is interested in.
	pub networks: Option<Networks>,
}

impl Init {
	/// An `init` sending `features`, with an empty legacy field.
	pub fn new(features: Vec<u8>, networks: Option<Networks>) -> Self {
		Self { global_features: Vec::new(), features, networks }
	}

	/// The union of both feature fields, as BOLT 1 asks receivers to treat them.
	pub fn combined_features(&self) -> Vec<u8> {
		let len = core::cmp::max(self.global_features.len(), self.features.len());
		let mut res = vec![0u8; len];
		for (i, byte) in self.global_features.iter().rev().enumerate() {
			res[len - 1 - i] |= byte;
		}
		for (i, byte) in self.features.iter().rev().enumerate() {
			res[len - 1 - i] |= byte;
		}
		res
	}

	/// Whether the sender supports the feature whose required bit is `even_bit`, in either its
	/// required or its optional form.
	pub fn supports_feature(&self, even_bit: usize) -> bool {
		let features = self.combined_features();
		feature_bit_set(&features, even_bit) || feature_bit_set(&features, even_bit | 1)
	}

	/// The first required (even) feature bit we do not know, if any. `known_bits` lists the
	/// even bit of each feature we support.
	pub fn first_unknown_required_feature(&self, known_bits: &[usize]) -> Option<usize> {
		let features = self.combined_features();
		(0..features.len() * 8)
			.step_by(2)
			.find(|bit| feature_bit_set(&features, *bit) && !known_bits.contains(bit))
	}

	/// Whether the sender shares at least one chain with `chains`. A sender which lists no
	/// chains is assumed to be interested in all of them.
	pub fn shares_network(&self, chains: &[ChainHash]) -> bool {
		match self.networks {
			Some(ref networks) => networks.0.iter().any(|chain| chains.contains(chain)),
			None => true,
		}
	}
}

/// An [`error`] message to be sent to or received from a peer.
///
/// [`error`]: https://github.com/lightning/bolts/blob/master/01-messaging.md#the-error-and-warning-messages
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ErrorMessage {
	/// The channel ID involved in the error.
	///
	/// All-0s indicates a general error unrelated to a specific channel, after which all channels
	/// with the sending peer should be closed.
	pub channel_id: ChannelId,
	/// A possibly human-readable error description.
	///
	/// The string should be sanitized before it is used (e.g., emitted to logs or printed to
	/// `stdout`). Otherwise, a well crafted error message may trigger a security vulnerability in
	/// the terminal emulator or the logging subsystem.
	pub data: String,
}

/// A [`ping`] message to be sent to or received from a peer.
///
/// [`ping`]: https://github.com/lightning/bolts/blob/master/01-messaging.md#the-ping-and-pong-messages
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Ping {
	/// The desired response length.
	pub ponglen: u16,
	/// The ping packet size.
	///
	/// This field is not sent on the wire. byteslen zeros are sent.
	pub byteslen: u16,
}

/// A [`pong`] message to be sent to or received from a peer.
///
/// [`pong`]: https://github.com/lightning/bolts/blob/master/01-messaging.md#the-ping-and-pong-messages
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Pong {
	/// The pong packet size.
	///
	/// This field is not sent on the wire. byteslen zeros are sent.
	pub byteslen: u16,
}

/// The largest `ponglen` a ping may request and still get an answer. A pong any larger would not
/// fit in a message with its type and length fields.
pub const MAX_PONG_BYTES: u16 = 65531;

/// A [`channel_ready`] message to be sent to or received from a peer.
///
/// [`channel_ready`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-channel_ready-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ChannelReady {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The per-commitment point of the second commitment transaction
	pub next_per_commitment_point: PublicKey,
	/// If set, provides a `short_channel_id` alias for this channel.
	///
	/// The sender will accept payments to be forwarded over this SCID and forward them to this
	/// messages' recipient.
	pub short_channel_id_alias: Option<ShortChannelId>,
}

/// A [`shutdown`] message to be sent to or received from a peer.
///
/// [`shutdown`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#closing-initiation-shutdown
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Shutdown {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The destination of this peer's funds on closing.
	///
	/// Must be in one of these forms: P2PKH, P2SH, P2WPKH, P2WSH, P2TR.
	pub scriptpubkey: ScriptBuf,
}

/// A [`closing_signed`] message to be sent to or received from a peer.
///
/// [`closing_signed`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#closing-negotiation-closing_signed
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClosingSigned {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The proposed total fee for the closing transaction
	pub fee_satoshis: u64,
	/// A signature on the closing transaction
	pub signature: Signature,
	/// The minimum and maximum fees which the sender is willing to accept, provided only by new
	/// nodes.
	pub fee_range: Option<FeeRange>,
}

/// An [`open_channel2`] message to be sent by or received from the channel initiator.
///
/// [`open_channel2`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-open_channel2-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OpenChannelV2 {
	/// The genesis hash of the blockchain where the channel is to be opened
	pub chain_hash: ChainHash,
	/// A temporary channel ID derived using a zeroed out value for the channel acceptor's
	/// revocation basepoint
	pub temporary_channel_id: ChannelId,
	/// The feerate for the funding transaction set by the channel initiator
	pub funding_feerate_sat_per_1000_weight: u32,
	/// The feerate for the commitment transaction set by the channel initiator
	pub commitment_feerate_sat_per_1000_weight: u32,
	/// Part of the channel value contributed by the channel initiator
	pub funding_satoshis: u64,
	/// The threshold below which outputs on transactions broadcast by the channel initiator will
	/// be omitted
	pub dust_limit_satoshis: u64,
	/// The maximum inbound HTLC value in flight towards channel initiator, in milli-satoshi
	pub max_htlc_value_in_flight_msat: u64,
	/// The minimum HTLC size incoming to channel initiator, in milli-satoshi
	pub htlc_minimum_msat: u64,
	/// The number of blocks which the counterparty will have to wait to claim on-chain funds if
	/// they broadcast a commitment transaction
	pub to_self_delay: u16,
	/// The maximum number of inbound HTLCs towards channel initiator
	pub max_accepted_htlcs: u16,
	/// The locktime for the funding transaction
	pub locktime: u32,
	/// The channel initiator's key controlling the funding transaction
	pub funding_pubkey: PublicKey,
	/// Used to derive a revocation key for transactions broadcast by counterparty
	pub revocation_basepoint: PublicKey,
	/// A payment key to channel initiator for transactions broadcast by counterparty
	pub payment_basepoint: PublicKey,
	/// Used to derive a payment key to channel initiator for transactions broadcast by channel
	/// initiator
	pub delayed_payment_basepoint: PublicKey,
	/// Used to derive an HTLC payment key to channel initiator
	pub htlc_basepoint: PublicKey,
	/// The first to-be-broadcast-by-channel-initiator transaction's per commitment point
	pub first_per_commitment_point: PublicKey,
	/// The second to-be-broadcast-by-channel-initiator transaction's per commitment point
	pub second_per_commitment_point: PublicKey,
	/// Channel flags
	pub channel_flags: u8,
	/// Optionally, a request to pre-set the to-channel-initiator output's scriptPubkey for when we
	/// collaboratively close
	pub shutdown_scriptpubkey: Option<UpfrontShutdownScript>,
	/// The channel type that this channel will represent. If none is set, we derive the channel
	/// type from the intersection of our feature bits with our counterparty's feature bits from
	/// the Init message.
	pub channel_type: Option<ChannelType>,
	/// Optionally, a requirement that only confirmed inputs can be added
	pub require_confirmed_inputs: Option<RequireConfirmedInputs>,
}

/// An [`accept_channel2`] message to be sent by or received from the channel accepter.
///
/// [`accept_channel2`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-accept_channel2-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AcceptChannelV2 {
	/// The same `temporary_channel_id` received from the initiator's `open_channel2` message.
	pub temporary_channel_id: ChannelId,
	/// Part of the channel value contributed by the channel acceptor
	pub funding_satoshis: u64,
	/// The threshold below which outputs on transactions broadcast by the channel acceptor will be
	/// omitted
	pub dust_limit_satoshis: u64,
	/// The maximum inbound HTLC value in flight towards channel acceptor, in milli-satoshi
	pub max_htlc_value_in_flight_msat: u64,
	/// The minimum HTLC size incoming to channel acceptor, in milli-satoshi
	pub htlc_minimum_msat: u64,
	/// Minimum depth of the funding transaction before the channel is considered open
	pub minimum_depth: u32,
	/// The number of blocks which the counterparty will have to wait to claim on-chain funds if
	/// they broadcast a commitment transaction
	pub to_self_delay: u16,
	/// The maximum number of inbound HTLCs towards channel acceptor
	pub max_accepted_htlcs: u16,
	/// The channel acceptor's key controlling the funding transaction
	pub funding_pubkey: PublicKey,
	/// Used to derive a revocation key for transactions broadcast by counterparty
	pub revocation_basepoint: PublicKey,
	/// A payment key to channel acceptor for transactions broadcast by counterparty
	pub payment_basepoint: PublicKey,
	/// Used to derive a payment key to channel acceptor for transactions broadcast by channel
	/// acceptor
	pub delayed_payment_basepoint: PublicKey,
	/// Used to derive an HTLC payment key to channel acceptor for transactions broadcast by
	/// counterparty
	pub htlc_basepoint: PublicKey,
	/// The first to-be-broadcast-by-channel-acceptor transaction's per commitment point
	pub first_per_commitment_point: PublicKey,
	/// The second to-be-broadcast-by-channel-acceptor transaction's per commitment point
	pub second_per_commitment_point: PublicKey,
	/// Optionally, a request to pre-set the to-channel-acceptor output's scriptPubkey for when we
	/// collaboratively close
	pub shutdown_scriptpubkey: Option<UpfrontShutdownScript>,
	/// The channel type that this channel will represent. If none is set, we derive the channel
	/// type from the intersection of our feature bits with our counterparty's feature bits from
	/// the Init message.
	///
	/// This is required to match the equivalent field in [`OpenChannelV2::channel_type`].
	pub channel_type: Option<ChannelType>,
	/// Optionally, a requirement that only confirmed inputs can be added
	pub require_confirmed_inputs: Option<RequireConfirmedInputs>,
}

/// A [`tx_add_input`] message for adding an input during interactive transaction construction
///
/// [`tx_add_input`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_add_input-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxAddInput {
	/// The channel ID
	pub channel_id: ChannelId,
	/// A randomly chosen unique identifier for this input, which is even for initiators and odd
	/// for non-initiators.
	pub serial_id: u64,
	/// Serialized transaction that contains the output this input spends to verify that it is
	/// non-malleable.
	pub prevtx: TransactionU16LenLimited,
	/// The index of the output being spent
	pub prevtx_out: u32,
	/// The sequence number of this input
	pub sequence: u32,
}

/// A [`tx_add_output`] message for adding an output during interactive transaction construction.
///
/// [`tx_add_output`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_add_output-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxAddOutput {
	/// The channel ID
	pub channel_id: ChannelId,
	/// A randomly chosen unique identifier for this output, which is even for initiators and odd
	/// for non-initiators.
	pub serial_id: u64,
	/// The satoshi value of the output
	pub sats: u64,
	/// The scriptPubKey for the output
	pub script: ScriptBuf,
}

/// A [`tx_remove_input`] message for removing an input during interactive transaction
/// construction.
///
/// [`tx_remove_input`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_remove_input-and-tx_remove_output-messages
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxRemoveInput {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The serial ID of the input to be removed
	pub serial_id: u64,
}

/// A [`tx_remove_output`] message for removing an output during interactive transaction
/// construction.
///
/// [`tx_remove_output`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_remove_input-and-tx_remove_output-messages
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxRemoveOutput {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The serial ID of the output to be removed
	pub serial_id: u64,
}

/// [`A tx_complete`] message signalling the conclusion of a peer's transaction contributions
/// during interactive transaction construction.
///
/// [`A tx_complete`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_complete-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxComplete {
	/// The channel ID
	pub channel_id: ChannelId,
}

/// A [`tx_signatures`] message containing the sender's signatures for a transaction constructed
/// with interactive transaction construction.
///
/// [`tx_signatures`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_signatures-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxSignatures {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The TXID
	pub tx_hash: Txid,
	/// The list of witnesses, one per input the sender contributed, ordered by serial id
	pub witnesses: Vec<Witness>,
}

/// A [`tx_init_rbf`] message which initiates a replacement of the transaction after it's been
/// completed.
///
/// [`tx_init_rbf`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_init_rbf-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxInitRbf {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The locktime of the transaction
	pub locktime: u32,
	/// The feerate of the transaction
	pub feerate_sat_per_1000_weight: u32,
	/// The number of satoshis the sender will contribute to or, if negative, remove from
	/// (e.g. splice-out) the funding output of the transaction
	pub funding_output_contribution: Option<FundingOutputContribution>,
	/// Optionally, a requirement that only confirmed inputs can be added
	pub require_confirmed_inputs: Option<RequireConfirmedInputs>,
}

/// A [`tx_ack_rbf`] message which acknowledges replacement of the transaction after it's been
/// completed.
///
/// [`tx_ack_rbf`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_ack_rbf-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxAckRbf {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The number of satoshis the sender will contribute to or, if negative, remove from
	/// (e.g. splice-out) the funding output of the transaction
	pub funding_output_contribution: Option<FundingOutputContribution>,
	/// Optionally, a requirement that only confirmed inputs can be added
	pub require_confirmed_inputs: Option<RequireConfirmedInputs>,
}

/// A [`tx_abort`] message which signals the cancellation of an in-progress transaction
/// negotiation.
///
/// [`tx_abort`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#the-tx_abort-message
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TxAbort {
	/// The channel ID
	pub channel_id: ChannelId,
	/// Message data
	pub data: Vec<u8>,
}

/// The length of the onion packet carried by `update_add_htlc`.
pub const ONION_PACKET_LEN: usize = 1366;

/// A BOLT 4 onion packet, carried opaquely.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct OnionPacket(pub Vec<u8>);

impl OnionPacket {
	/// The version byte.
	pub fn version(&self) -> Option<u8> {
		self.0.first().copied()
	}
}

impl fmt::Debug for OnionPacket {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "OnionPacket({} bytes)", self.0.len())
	}
}

impl Writeable for OnionPacket {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		if self.0.len() != ONION_PACKET_LEN {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "onion packet must be 1366 bytes"));
		}
		w.write_all(&self.0)
	}
}

impl Readable for OnionPacket {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let mut packet = vec![0u8; ONION_PACKET_LEN];
		r.read_exact(&mut packet)?;
		Ok(OnionPacket(packet))
	}
}

/// An [`update_add_htlc`] message to be sent to or received from a peer.
///
/// [`update_add_htlc`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#adding-an-htlc-update_add_htlc
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UpdateAddHTLC {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The HTLC ID
	pub htlc_id: u64,
	/// The HTLC value in milli-satoshi
	pub amount_msat: u64,
	/// The payment hash, the pre-image of which controls HTLC redemption
	pub payment_hash: PaymentHash,
	/// The expiry height of the HTLC
	pub cltv_expiry: u32,
	/// The onion routing packet with encrypted data for the next hop.
	pub onion_routing_packet: OnionPacket,
	/// Provided if we are relaying or receiving a payment within a blinded path, to decrypt the
	/// onion.
	pub blinding_point: Option<BlindedPath>,
}

/// An [`update_fulfill_htlc`] message to be sent to or received from a peer.
///
/// [`update_fulfill_htlc`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#removing-an-htlc-update_fulfill_htlc-update_fail_htlc-and-update_fail_malformed_htlc
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UpdateFulfillHTLC {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The HTLC ID
	pub htlc_id: u64,
	/// The pre-image of the payment hash, allowing HTLC redemption
	pub payment_preimage: PaymentPreimage,
}

/// An [`update_fail_htlc`] message to be sent to or received from a peer.
///
/// [`update_fail_htlc`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#removing-an-htlc-update_fulfill_htlc-update_fail_htlc-and-update_fail_malformed_htlc
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UpdateFailHTLC {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The HTLC ID
	pub htlc_id: u64,
	/// The encrypted failure reason, opaque to every node but the origin
	pub reason: Vec<u8>,
}

/// An [`update_fail_malformed_htlc`] message to be sent to or received from a peer.
///
/// [`update_fail_malformed_htlc`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#removing-an-htlc-update_fulfill_htlc-update_fail_htlc-and-update_fail_malformed_htlc
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UpdateFailMalformedHTLC {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The HTLC ID
	pub htlc_id: u64,
	/// The SHA256 of the onion we could not parse
	pub sha256_of_onion: [u8; 32],
	/// The failure code
	pub failure_code: u16,
}

/// A [`commitment_signed`] message to be sent to or received from a peer.
///
/// [`commitment_signed`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#committing-updates-so-far-commitment_signed
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CommitmentSigned {
	/// The channel ID
	pub channel_id: ChannelId,
	/// A signature on the commitment transaction
	pub signature: Signature,
	/// Signatures on the HTLC transactions
	pub htlc_signatures: Vec<Signature>,
}

/// A [`revoke_and_ack`] message to be sent to or received from a peer.
///
/// [`revoke_and_ack`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#completing-the-transition-to-the-updated-state-revoke_and_ack
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RevokeAndACK {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The secret corresponding to the per-commitment point
	pub per_commitment_secret: [u8; 32],
	/// The next sender-broadcast commitment transaction's per-commitment point
	pub next_per_commitment_point: PublicKey,
}

/// An [`update_fee`] message to be sent to or received from a peer
///
/// [`update_fee`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#updating-fees-update_fee
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct UpdateFee {
	/// The channel ID
	pub channel_id: ChannelId,
	/// Fee rate per 1000-weight of the transaction
	pub feerate_per_kw: u32,
}

/// A [`channel_reestablish`] message to be sent to or received from a peer.
///
/// [`channel_reestablish`]: https://github.com/lightning/bolts/blob/master/02-peer-protocol.md#message-retransmission
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ChannelReestablish {
	/// The channel ID
	pub channel_id: ChannelId,
	/// The next commitment number for the sender
	pub next_local_commitment_number: u64,
	/// The next commitment number for the recipient
	pub next_remote_commitment_number: u64,
	/// Proof that the sender knows the per-commitment secret of a specific commitment transaction
	/// belonging to the recipient
	pub your_last_per_commitment_secret: [u8; 32],
	/// The sender's per-commitment point for their current commitment transaction
	pub my_current_per_commitment_point: PublicKey,
	/// The next funding transaction ID
	pub next_funding_txid: Option<NextFunding>,
}

impl_writeable_msg!(WarningMessage, { channel_id, data }, {});
impl_writeable_msg!(Stfu, { channel_id, initiator }, {});
impl_writeable_msg!(Init, { global_features, features }, { (networks, Networks) });
impl_writeable_msg!(ErrorMessage, { channel_id, data }, {});
impl_writeable_msg!(ChannelReady, { channel_id, next_per_commitment_point }, {
	(short_channel_id_alias, ShortChannelId),
});
impl_writeable_msg!(Shutdown, { channel_id, scriptpubkey }, {});
impl_writeable_msg!(ClosingSigned, { channel_id, fee_satoshis, signature }, {
	(fee_range, FeeRange),
});
impl_writeable_msg!(OpenChannelV2, {
	chain_hash,
	temporary_channel_id,
	funding_feerate_sat_per_1000_weight,
	commitment_feerate_sat_per_1000_weight,
	funding_satoshis,
	dust_limit_satoshis,
	max_htlc_value_in_flight_msat,
	htlc_minimum_msat,
	to_self_delay,
	max_accepted_htlcs,
	locktime,
	funding_pubkey,
	revocation_basepoint,
	payment_basepoint,
	delayed_payment_basepoint,
	htlc_basepoint,
	first_per_commitment_point,
	second_per_commitment_point,
	channel_flags,
}, {
	(shutdown_scriptpubkey, UpfrontShutdownScript),
	(channel_type, ChannelType),
	(require_confirmed_inputs, RequireConfirmedInputs),
});
impl_writeable_msg!(AcceptChannelV2, {
	temporary_channel_id,
	funding_satoshis,
	dust_limit_satoshis,
	max_htlc_value_in_flight_msat,
	htlc_minimum_msat,
	minimum_depth,
	to_self_delay,
	max_accepted_htlcs,
	funding_pubkey,
	revocation_basepoint,
	payment_basepoint,
	delayed_payment_basepoint,
	htlc_basepoint,
	first_per_commitment_point,
	second_per_commitment_point,
}, {
	(shutdown_scriptpubkey, UpfrontShutdownScript),
	(channel_type, ChannelType),
	(require_confirmed_inputs, RequireConfirmedInputs),
});
impl_writeable_msg!(TxAddInput, { channel_id, serial_id, prevtx, prevtx_out, sequence }, {});
impl_writeable_msg!(TxAddOutput, { channel_id, serial_id, sats, script }, {});
impl_writeable_msg!(TxRemoveInput, { channel_id, serial_id }, {});
impl_writeable_msg!(TxRemoveOutput, { channel_id, serial_id }, {});
impl_writeable_msg!(TxComplete, { channel_id }, {});
impl_writeable_msg!(TxSignatures, { channel_id, tx_hash, witnesses }, {});
impl_writeable_msg!(TxInitRbf, { channel_id, locktime, feerate_sat_per_1000_weight }, {
	(funding_output_contribution, FundingOutputContribution),
	(require_confirmed_inputs, RequireConfirmedInputs),
});
impl_writeable_msg!(TxAckRbf, { channel_id }, {
	(funding_output_contribution, FundingOutputContribution),
	(require_confirmed_inputs, RequireConfirmedInputs),
});
impl_writeable_msg!(TxAbort, { channel_id, data }, {});
impl_writeable_msg!(UpdateAddHTLC, {
	channel_id,
	htlc_id,
	amount_msat,
	payment_hash,
	cltv_expiry,
	onion_routing_packet,
}, {
	(blinding_point, BlindedPath),
});
impl_writeable_msg!(UpdateFulfillHTLC, { channel_id, htlc_id, payment_preimage }, {});
impl_writeable_msg!(UpdateFailHTLC, { channel_id, htlc_id, reason }, {});
impl_writeable_msg!(UpdateFailMalformedHTLC, { channel_id, htlc_id, sha256_of_onion, failure_code }, {});
impl_writeable_msg!(CommitmentSigned, { channel_id, signature, htlc_signatures }, {});
impl_writeable_msg!(RevokeAndACK, { channel_id, per_commitment_secret, next_per_commitment_point }, {});
impl_writeable_msg!(UpdateFee, { channel_id, feerate_per_kw }, {});
impl_writeable_msg!(ChannelReestablish, {
	channel_id,
	next_local_commitment_number,
	next_remote_commitment_number,
	your_last_per_commitment_secret,
	my_current_per_commitment_point,
}, {
	(next_funding_txid, NextFunding),
});

impl Writeable for Ping {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.ponglen.write(w)?;
		vec![0u8; self.byteslen as usize].write(w)?; // size-unchecked write
		Ok(())
	}
}

impl Readable for Ping {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Ping {
			ponglen: Readable::read(r)?,
			byteslen: {
				let byteslen = Readable::read(r)?;
				r.read_exact(&mut vec![0u8; byteslen as usize][..])?;
				byteslen
			},
		})
	}
}

impl Writeable for Pong {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		vec![0u8; self.byteslen as usize].write(w)?; // size-unchecked write
		Ok(())
	}
}

impl Readable for Pong {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Pong {
			byteslen: {
				let byteslen = Readable::read(r)?;
				r.read_exact(&mut vec![0u8; byteslen as usize][..])?;
				byteslen
			},
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ln::tlv::TlvStreamBuilder;
	use bitcoin::hashes::Hash;
	use bitcoin::hex::{DisplayHex, FromHex};
	use bitcoin::secp256k1::{Secp256k1, SecretKey};
	use bitcoin::{absolute::LockTime, transaction::Version, Amount, Transaction, TxIn, TxOut};
	use std::io::Cursor;

	fn pubkey(byte: u8) -> PublicKey {
		let secp_ctx = Secp256k1::signing_only();
		PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[byte; 32]).unwrap())
	}

	fn decode<T: Readable>(bytes: &[u8]) -> Result<T, DecodeError> {
		T::read(&mut Cursor::new(bytes))
	}

	#[test]
	fn encoding_ping_and_pong() {
		let ping = Ping { ponglen: 64, byteslen: 3 };
		assert_eq!(ping.encode().to_lower_hex_string(), "00400003000000");
		assert_eq!(decode::<Ping>(&ping.encode()).unwrap(), ping);

		let pong = Pong { byteslen: 2 };
		assert_eq!(pong.encode(), vec![0, 2, 0, 0]);
		assert_eq!(decode::<Pong>(&[0, 2, 0]), Err(DecodeError::ShortRead));
	}

	#[test]
	fn encoding_init() {
		let init = Init {
			global_features: vec![0x02],
			features: vec![0x10, 0x00],
			networks: Some(Networks(vec![ChainHash::using_genesis_block(bitcoin::Network::Bitcoin)])),
		};
		let encoded = init.encode();
		assert_eq!(
			encoded.to_lower_hex_string(),
			"00010200021000\
			0120\
			6fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000"
		);
		assert_eq!(decode::<Init>(&encoded).unwrap(), init);
		assert_eq!(init.combined_features(), vec![0x10, 0x02]);
		assert!(init.supports_feature(0));
		assert!(init.supports_feature(12));
		assert!(!init.supports_feature(2));
		assert_eq!(init.first_unknown_required_feature(&[12]), None);
		assert_eq!(init.first_unknown_required_feature(&[]), Some(12));
	}

	#[test]
	fn init_networks() {
		let mainnet = ChainHash::using_genesis_block(bitcoin::Network::Bitcoin);
		let testnet = ChainHash::using_genesis_block(bitcoin::Network::Testnet);
		assert!(Init::new(Vec::new(), None).shares_network(&[mainnet]));
		assert!(!Init::new(Vec::new(), Some(Networks(vec![testnet]))).shares_network(&[mainnet]));
	}

	#[test]
	fn encoding_error_and_warning() {
		let error = ErrorMessage { channel_id: ChannelId([2; 32]), data: "rust-lightning".to_owned() };
		let encoded = error.encode();
		assert_eq!(
			encoded.to_lower_hex_string(),
			"0202020202020202020202020202020202020202020202020202020202020202000e727573742d6c696768746e696e67"
		);
		assert_eq!(decode::<ErrorMessage>(&encoded).unwrap(), error);

		// Non UTF-8 data is rejected.
		let mut bad = ChannelId([2; 32]).encode();
		bad.extend_from_slice(&[0, 1, 0xff]);
		assert_eq!(decode::<WarningMessage>(&bad), Err(DecodeError::InvalidValue));
	}

	#[test]
	fn encoding_tx_add_output() {
		let tx_add_output = TxAddOutput {
			channel_id: ChannelId([2; 32]),
			serial_id: 4886718345,
			sats: 4886718345,
			script: ScriptBuf::from_bytes(
				Vec::<u8>::from_hex("00143b2c55c3d4cd3e2ac7b4d5ad3ebc26c1e7e57d0d").unwrap(),
			),
		};
		let encoded = tx_add_output.encode();
		assert_eq!(
			encoded.to_lower_hex_string(),
			"0202020202020202020202020202020202020202020202020202020202020202000000012345678900000001234567890016\
			00143b2c55c3d4cd3e2ac7b4d5ad3ebc26c1e7e57d0d"
		);
		assert_eq!(decode::<TxAddOutput>(&encoded).unwrap(), tx_add_output);
	}

	#[test]
	fn encoding_tx_add_input() {
		let prevtx = Transaction {
			version: Version::TWO,
			lock_time: LockTime::ZERO,
			input: vec![TxIn::default()],
			output: vec![TxOut {
				value: Amount::from_sat(12704566),
				script_pubkey: ScriptBuf::from_bytes(
					Vec::<u8>::from_hex("0014f8f5cc6e0c1b7c0c8b4d5dbc7e4e0c5db1b9f5a7").unwrap(),
				),
			}],
		};
		let tx_add_input = TxAddInput {
			channel_id: ChannelId([2; 32]),
			serial_id: 4886718345,
			prevtx: TransactionU16LenLimited::new(prevtx).unwrap(),
			prevtx_out: 0,
			sequence: 0xfffffffd,
		};
		let encoded = tx_add_input.encode();
		assert_eq!(decode::<TxAddInput>(&encoded).unwrap(), tx_add_input);
		// channel id, serial id, then the length prefixed transaction.
		assert_eq!(&encoded[40..42], &(tx_add_input.prevtx.as_transaction().total_size() as u16).to_be_bytes());
	}

	#[test]
	fn encoding_tx_signatures() {
		let mut witness = Witness::new();
		witness.push(Vec::<u8>::from_hex("3044022014").unwrap());
		witness.push(pubkey(1).serialize());
		let tx_signatures = TxSignatures {
			channel_id: ChannelId([2; 32]),
			tx_hash: Txid::from_byte_array([3; 32]),
			witnesses: vec![witness.clone(), Witness::new()],
		};
		let encoded = tx_signatures.encode();
		// Two witnesses, the first being 1 + (1 + 5) + (1 + 33) = 41 bytes long.
		assert_eq!(encoded[64..70].to_lower_hex_string(), "000200290205");
		assert_eq!(decode::<TxSignatures>(&encoded).unwrap(), tx_signatures);
	}

	#[test]
	fn encoding_commitment_signed() {
		let secp_ctx = Secp256k1::signing_only();
		let key = SecretKey::from_slice(&[5; 32]).unwrap();
		let msg = bitcoin::secp256k1::Message::from_digest([7; 32]);
		let sig = secp_ctx.sign_ecdsa(&msg, &key);
		let commitment_signed = CommitmentSigned {
			channel_id: ChannelId([2; 32]),
			signature: sig,
			htlc_signatures: vec![sig, sig],
		};
		let encoded = commitment_signed.encode();
		assert_eq!(encoded.len(), 32 + 64 + 2 + 2 * 64);
		assert_eq!(&encoded[96..98], &[0, 2]);
		assert_eq!(decode::<CommitmentSigned>(&encoded).unwrap(), commitment_signed);
	}

	#[test]
	fn open_channel2_tlvs() {
		let open_channel = OpenChannelV2 {
			chain_hash: ChainHash::using_genesis_block(bitcoin::Network::Testnet),
			temporary_channel_id: ChannelId([2; 32]),
			funding_feerate_sat_per_1000_weight: 253,
			commitment_feerate_sat_per_1000_weight: 253,
			funding_satoshis: 100_000,
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 10_000_000,
			htlc_minimum_msat: 1,
			to_self_delay: 144,
			max_accepted_htlcs: 483,
			locktime: 800_000,
			funding_pubkey: pubkey(1),
			revocation_basepoint: pubkey(2),
			payment_basepoint: pubkey(3),
			delayed_payment_basepoint: pubkey(4),
			htlc_basepoint: pubkey(5),
			first_per_commitment_point: pubkey(6),
			second_per_commitment_point: pubkey(7),
			channel_flags: 1,
			shutdown_scriptpubkey: Some(UpfrontShutdownScript(ScriptBuf::new())),
			channel_type: Some(ChannelType::from_bits(&[12, 22])),
			require_confirmed_inputs: Some(RequireConfirmedInputs),
		};
		let encoded = open_channel.encode();
		// The fixed fields take 32 + 32 + 4 + 4 + 8 * 4 + 2 + 2 + 4 + 33 * 7 + 1 bytes, then
		// the TLVs follow in ascending order.
		let fixed_len = 32 + 32 + 4 + 4 + 8 * 4 + 2 + 2 + 4 + 33 * 7 + 1;
		assert_eq!(encoded[fixed_len..].to_lower_hex_string(), "000001034010000200");
		assert_eq!(decode::<OpenChannelV2>(&encoded).unwrap(), open_channel);

		let mut without_tlvs = open_channel.clone();
		without_tlvs.shutdown_scriptpubkey = None;
		without_tlvs.channel_type = None;
		without_tlvs.require_confirmed_inputs = None;
		assert_eq!(decode::<OpenChannelV2>(&encoded[..fixed_len]).unwrap(), without_tlvs);
	}

	#[test]
	fn unknown_tlvs() {
		let mut encoded = ChannelId([2; 32]).encode();
		// An odd record we don't know is skipped.
		encoded.extend_from_slice(&TlvStreamBuilder::new().add(7, vec![1, 2]).unwrap().build().encode());
		assert_eq!(decode::<TxComplete>(&encoded).unwrap(), TxComplete { channel_id: ChannelId([2; 32]) });

		// An even one is fatal.
		let mut encoded = ChannelId([2; 32]).encode();
		encoded.extend_from_slice(&TlvStreamBuilder::new().add(8, vec![]).unwrap().build().encode());
		assert_eq!(decode::<TxComplete>(&encoded), Err(DecodeError::UnknownRequiredFeature));
	}

	#[test]
	fn tx_init_rbf_negative_contribution() {
		let tx_init_rbf = TxInitRbf {
			channel_id: ChannelId([2; 32]),
			locktime: 0,
			feerate_sat_per_1000_weight: 1000,
			funding_output_contribution: Some(FundingOutputContribution(-5000)),
			require_confirmed_inputs: None,
		};
		let encoded = tx_init_rbf.encode();
		assert_eq!(encoded[40..].to_lower_hex_string(), "0008ffffffffffffec78");
		assert_eq!(decode::<TxInitRbf>(&encoded).unwrap(), tx_init_rbf);
	}

	#[test]
	fn onion_packet_length() {
		let update_add_htlc = UpdateAddHTLC {
			channel_id: ChannelId([2; 32]),
			htlc_id: 2316138423780173,
			amount_msat: 3608586615801332854,
			payment_hash: PaymentHash([1; 32]),
			cltv_expiry: 821716,
			onion_routing_packet: OnionPacket(vec![1; ONION_PACKET_LEN]),
			blinding_point: Some(BlindedPath { path_key: pubkey(9) }),
		};
		let encoded = update_add_htlc.encode();
		assert_eq!(encoded.len(), 32 + 8 + 8 + 32 + 4 + ONION_PACKET_LEN + 1 + 1 + 33);
		assert_eq!(decode::<UpdateAddHTLC>(&encoded).unwrap(), update_add_htlc);

		let short = UpdateAddHTLC { onion_routing_packet: OnionPacket(vec![0; 10]), ..update_add_htlc };
		assert!(short.write(&mut Vec::new()).is_err());
	}
}
