// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various user-configurable limits and settings applied to peer connections, interactive
//! transaction negotiation and commitment construction.

use crate::ln::chan_utils::BREAKDOWN_TIMEOUT;
use crate::ln::interactivetxs::DEFAULT_DUST_LIMIT_SATOSHIS;

/// Options which apply to every peer connection.
///
/// `Default::default()` provides sane defaults.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PeerConfig {
	/// How long the BOLT 8 handshake may take, in seconds, before the connection is dropped.
	///
	/// Default value: 10.
	pub handshake_timeout_secs: u64,
	/// How often we ping an idle peer, in seconds. A peer which has not answered our previous
	/// ping by the time the next one is due is disconnected.
	///
	/// Default value: 30.
	pub ping_interval_secs: u64,
	/// How many messages may wait to be written to a peer before further sends fail.
	///
	/// Default value: 64.
	pub max_outbound_queue: usize,
}

impl Default for PeerConfig {
	fn default() -> Self {
		PeerConfig { handshake_timeout_secs: 10, ping_interval_secs: 30, max_outbound_queue: 64 }
	}
}

/// Options for collaborative transaction construction.
///
/// `Default::default()` provides sane defaults.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InteractiveTxConfig {
	/// Outputs the counterparty adds below this value are rejected.
	///
	/// Default value: 546.
	pub dust_limit_satoshis: u64,
	/// Whether we require the counterparty to only add inputs which are already confirmed.
	///
	/// Default value: false.
	pub require_confirmed_inputs: bool,
}

impl Default for InteractiveTxConfig {
	fn default() -> Self {
		InteractiveTxConfig {
			dust_limit_satoshis: DEFAULT_DUST_LIMIT_SATOSHIS,
			require_confirmed_inputs: false,
		}
	}
}

/// Options which shape our commitment transactions.
///
/// `Default::default()` provides sane defaults.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommitmentConfig {
	/// Outputs of our commitment transactions below this value are trimmed to fees.
	///
	/// Default value: 546.
	pub dust_limit_satoshis: u64,
	/// Whether to build `option_anchors` commitment transactions.
	///
	/// Default value: false.
	pub use_anchors: bool,
	/// The number of blocks we require our counterparty to wait to claim their money.
	///
	/// Default value: [`BREAKDOWN_TIMEOUT`] (144).
	pub to_self_delay: u16,
}

impl Default for CommitmentConfig {
	fn default() -> Self {
		CommitmentConfig {
			dust_limit_satoshis: DEFAULT_DUST_LIMIT_SATOSHIS,
			use_anchors: false,
			to_self_delay: BREAKDOWN_TIMEOUT,
		}
	}
}

/// Top-level config which holds the per-layer configs.
///
/// `Default::default()` provides sane defaults for most configurations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeConfig {
	/// Peer connection settings.
	pub peer: PeerConfig,
	/// Interactive transaction construction settings.
	pub interactive_tx: InteractiveTxConfig,
	/// Commitment transaction settings.
	pub commitment: CommitmentConfig,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults() {
		let config = NodeConfig::default();
		assert_eq!(config.peer.handshake_timeout_secs, 10);
		assert_eq!(config.peer.ping_interval_secs, 30);
		assert_eq!(config.peer.max_outbound_queue, 64);
		assert_eq!(config.interactive_tx.dust_limit_satoshis, 546);
		assert!(!config.interactive_tx.require_confirmed_inputs);
		assert_eq!(config.commitment.dust_limit_satoshis, 546);
		assert!(!config.commitment.use_anchors);
		assert_eq!(config.commitment.to_self_delay, 144);
	}
}
