// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wire encoding/decoding for Lightning messages according to [BOLT #1].
//!
//! Messages known by this module can be read from the wire using [`read`].
//! The [`Message`] enum returned by [`read`] wraps the decoded message or the message type (if
//! unknown) to use with pattern matching.
//!
//! Messages implementing the [`Encode`] trait define a message type and can be sent over the wire
//! using [`write`].
//!
//! [BOLT #1]: https://github.com/lightning/bolts/blob/master/01-messaging.md

use core::fmt;
use std::io::{self, Read};

use crate::ln::msgs;
use crate::util::ser::{Readable, Writeable, Writer};

/// A number identifying a message to determine how it is encoded on the wire.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct MessageType(u16);

impl MessageType {
	/// Returns whether the message type is even, indicating both endpoints must support it.
	pub fn is_even(&self) -> bool {
		(self.0 & 1) == 0
	}

	/// The raw type number.
	pub fn as_u16(&self) -> u16 {
		self.0
	}
}

impl fmt::Display for MessageType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Defines a type-identified encoding for sending messages over the wire.
///
/// Messages implementing this trait specify a type and must be [`Writeable`] to use with [`write`].
pub trait Encode {
	/// The type identifying the message payload.
	const TYPE: u16;

	/// Returns the type identifying the message payload.
	fn type_id(&self) -> MessageType {
		MessageType(Self::TYPE)
	}
}

macro_rules! wire_messages {
	($($variant: ident($msg: ident) = $type: expr),* $(,)*) => {
		/// A Lightning message returned by [`read`] when decoding bytes received over the wire. Each
		/// variant contains a message from [`msgs`] or otherwise the message type if unknown.
		#[allow(missing_docs)]
		#[derive(Clone, Debug, PartialEq, Eq)]
		pub enum Message {
			$( $variant(msgs::$msg), )*
			/// A message that could not be decoded because its type is unknown.
			Unknown(MessageType),
		}

		impl Message {
			/// Returns the type that was used to decode the message payload.
			pub fn type_id(&self) -> MessageType {
				match self {
					$( Message::$variant(msg) => msg.type_id(), )*
					Message::Unknown(type_id) => *type_id,
				}
			}
		}

		$(
			impl Encode for msgs::$msg {
				const TYPE: u16 = $type;
			}

			impl From<msgs::$msg> for Message {
				fn from(msg: msgs::$msg) -> Self {
					Message::$variant(msg)
				}
			}
		)*

		/// Reads a message from the data buffer consisting of a 2-byte big-endian type and a
		/// variable-length payload conforming to the type.
		///
		/// # Errors
		///
		/// Returns an error if the message payload could not be decoded as the specified type.
		pub fn read<R: Read>(buffer: &mut R) -> Result<Message, msgs::DecodeError> {
			let message_type = <u16 as Readable>::read(buffer)?;
			match message_type {
				$( <msgs::$msg as Encode>::TYPE => Ok(Message::$variant(Readable::read(buffer)?)), )*
				_ => Ok(Message::Unknown(MessageType(message_type))),
			}
		}

		impl Writeable for Message {
			fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
				match self {
					$( Message::$variant(msg) => write(msg, w), )*
					Message::Unknown(type_id) => Err(io::Error::new(
						io::ErrorKind::InvalidInput,
						format!("cannot encode a message of unknown type {}", type_id),
					)),
				}
			}
		}
	};
}

wire_messages! {
	Warning(WarningMessage) = 1,
	Stfu(Stfu) = 2,
	Init(Init) = 16,
	Error(ErrorMessage) = 17,
	Ping(Ping) = 18,
	Pong(Pong) = 19,
	ChannelReady(ChannelReady) = 36,
	Shutdown(Shutdown) = 38,
	ClosingSigned(ClosingSigned) = 39,
	OpenChannelV2(OpenChannelV2) = 64,
	AcceptChannelV2(AcceptChannelV2) = 65,
	TxAddInput(TxAddInput) = 66,
	TxAddOutput(TxAddOutput) = 67,
	TxRemoveInput(TxRemoveInput) = 68,
	TxRemoveOutput(TxRemoveOutput) = 69,
	TxComplete(TxComplete) = 70,
	TxSignatures(TxSignatures) = 71,
	TxInitRbf(TxInitRbf) = 72,
	TxAckRbf(TxAckRbf) = 73,
	TxAbort(TxAbort) = 74,
	UpdateAddHTLC(UpdateAddHTLC) = 128,
	UpdateFulfillHTLC(UpdateFulfillHTLC) = 130,
	UpdateFailHTLC(UpdateFailHTLC) = 131,
	CommitmentSigned(CommitmentSigned) = 132,
	RevokeAndACK(RevokeAndACK) = 133,
	UpdateFee(UpdateFee) = 134,
	UpdateFailMalformedHTLC(UpdateFailMalformedHTLC) = 135,
	ChannelReestablish(ChannelReestablish) = 136,
}

/// Writes a message to the data buffer encoded as a 2-byte big-endian type and a variable-length
/// payload.
///
/// # Errors
///
/// Returns an I/O error if the write could not be completed.
pub fn write<M: Encode + Writeable, W: Writer>(message: &M, buffer: &mut W) -> Result<(), io::Error> {
	M::TYPE.write(buffer)?;
	message.write(buffer)
}
