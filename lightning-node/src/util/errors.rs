// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Error types live here.
//!
//! Errors specific to one layer live next to it ([`DecodeError`], [`CryptoError`], [`PeerError`],
//! [`AbortReason`], [`CommitmentError`]). This module holds the ones shared across layers and
//! [`ErrorAction`], which tells the connection owner what to do about any of them.
//!
//! [`DecodeError`]: crate::ln::msgs::DecodeError
//! [`CryptoError`]: crate::crypto::CryptoError
//! [`PeerError`]: crate::ln::peers::PeerError
//! [`AbortReason`]: crate::ln::interactivetxs::AbortReason
//! [`CommitmentError`]: crate::ln::commitment::CommitmentError

use core::fmt;

use crate::ln::msgs::{ErrorMessage, TxAbort, WarningMessage};
use crate::ln::types::ChannelId;
use crate::prelude::*;
use crate::util::logger::Level;

/// An invariant of the process was violated. These are bugs in the caller and should not be
/// handled beyond shutting down.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CriticalError {
	/// The node's static key was loaded twice.
	KeyAlreadyInitialized,
	/// The node's static key was used before it was loaded.
	KeyNotInitialized,
}

impl fmt::Debug for CriticalError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			CriticalError::KeyAlreadyInitialized => f.write_str("Static key initialized twice"),
			CriticalError::KeyNotInitialized => f.write_str("Static key used before initialization"),
		}
	}
}

impl fmt::Display for CriticalError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for CriticalError {}

/// A recoverable protocol deviation on a channel, reported to the peer with a `warning` message
/// without closing the connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelWarning {
	/// The channel the warning is about, or all zeros for the connection as a whole.
	pub channel_id: ChannelId,
	/// A human-readable description, sent to the peer.
	pub err: String,
}

impl ChannelWarning {
	/// Builds a warning about `channel_id`.
	pub fn new(channel_id: ChannelId, err: String) -> Self {
		Self { channel_id, err }
	}

	/// The `warning` message to send to the peer.
	pub fn to_warning_msg(&self) -> WarningMessage {
		WarningMessage { channel_id: self.channel_id, data: self.err.clone() }
	}
}

impl fmt::Debug for ChannelWarning {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Warning on channel {}: {}", self.channel_id, self.err)
	}
}

impl fmt::Display for ChannelWarning {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for ChannelWarning {}

/// Used to put an error message in a [`LightningError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorAction {
	/// The connection is unusable and must be closed. If a message is given, it should be sent to
	/// the peer before closing.
	DisconnectPeer {
		/// An error message which we should make an effort to send before we disconnect.
		msg: Option<ErrorMessage>,
	},
	/// The interactive transaction negotiation must be abandoned. The peer connection survives.
	AbortNegotiation {
		/// The `tx_abort` to send to the peer.
		msg: TxAbort,
	},
	/// Send a warning message to the peer and keep the connection open.
	SendWarningMessage {
		/// The message to send.
		msg: WarningMessage,
		/// The peer may have done something harmless that we weren't able to meaningfully process,
		/// though we should still tell them about it.
		/// If this event is logged, log it at the given level.
		log_level: Level,
	},
	/// A process invariant was violated. Nothing should be sent, the node should shut down.
	Critical {
		/// What went wrong.
		err: CriticalError,
	},
}

/// An error along with the action to take about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightningError {
	/// A human-readable message describing the error
	pub err: String,
	/// The action which should be taken against the offending peer.
	pub action: ErrorAction,
}

impl fmt::Display for LightningError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.err)
	}
}

impl std::error::Error for LightningError {}

impl From<CriticalError> for LightningError {
	fn from(err: CriticalError) -> Self {
		LightningError { err: err.to_string(), action: ErrorAction::Critical { err } }
	}
}

impl From<ChannelWarning> for LightningError {
	fn from(warning: ChannelWarning) -> Self {
		LightningError {
			err: warning.err.clone(),
			action: ErrorAction::SendWarningMessage {
				msg: warning.to_warning_msg(),
				log_level: Level::Warn,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn warning_becomes_warning_message() {
		let warning = ChannelWarning::new(ChannelId([1; 32]), "fee too low".to_owned());
		let err = LightningError::from(warning.clone());
		assert_eq!(err.err, "fee too low");
		match err.action {
			ErrorAction::SendWarningMessage { msg, log_level } => {
				assert_eq!(msg.channel_id, ChannelId([1; 32]));
				assert_eq!(msg.data, "fee too low");
				assert_eq!(log_level, Level::Warn);
			},
			_ => panic!("Unexpected action"),
		}
	}

	#[test]
	fn critical_is_not_sent() {
		let err = LightningError::from(CriticalError::KeyAlreadyInitialized);
		assert_eq!(err.action, ErrorAction::Critical { err: CriticalError::KeyAlreadyInitialized });
		assert_eq!(err.err, "Static key initialized twice");
	}
}
