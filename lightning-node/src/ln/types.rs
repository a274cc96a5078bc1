// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various wrapper types (most around 32-byte arrays) for use in lightning.

use std::io::{self, Read};

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::secp256k1::PublicKey;
use bitcoin::OutPoint;

use crate::ln::msgs::DecodeError;
use crate::sign::EntropySource;
use crate::util::ser::{Readable, Writeable, Writer};

use core::fmt;
use core::ops::Deref;

/// A unique 32-byte identifier for a channel.
///
/// A _v1_ id is derived from the funding outpoint, a _v2_ id (dual-funded channels) from both
/// revocation basepoints and a _temporary_ id is random.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(pub [u8; 32]);

impl ChannelId {
	/// Create _v1_ channel ID based on a funding TX ID and output index
	pub fn v1_from_funding_txid(txid: &[u8; 32], output_index: u16) -> Self {
		let mut res = [0; 32];
		res[..].copy_from_slice(&txid[..]);
		res[30] ^= ((output_index >> 8) & 0xff) as u8;
		res[31] ^= (output_index & 0xff) as u8;
		Self(res)
	}

	/// Create _v1_ channel ID from a funding tx outpoint
	pub fn v1_from_funding_outpoint(outpoint: OutPoint) -> Self {
		Self::v1_from_funding_txid(outpoint.txid.as_byte_array(), outpoint.vout as u16)
	}

	/// Create _v2_ channel ID by hashing both revocation basepoints, lesser first.
	pub fn v2_from_revocation_basepoints(ours: &PublicKey, theirs: &PublicKey) -> Self {
		let ours = ours.serialize();
		let theirs = theirs.serialize();
		let (lesser, greater) = if ours < theirs { (ours, theirs) } else { (theirs, ours) };
		let mut engine = Sha256::engine();
		engine.input(&lesser);
		engine.input(&greater);
		Self(Sha256::from_engine(engine).to_byte_array())
	}

	/// Create a _temporary_ channel ID randomly, based on an entropy source.
	pub fn temporary_from_entropy_source<ES: Deref>(entropy_source: &ES) -> Self
	where
		ES::Target: EntropySource,
	{
		Self(entropy_source.get_secure_random_bytes())
	}

	/// Create a channel ID consisting of all-zeros data, which in `error` and `warning` messages
	/// refers to every channel with the peer.
	pub fn new_zero() -> Self {
		Self([0; 32])
	}

	/// Check whether ID is consisting of all zeros
	pub fn is_zero(&self) -> bool {
		self.0[..] == [0; 32]
	}
}

impl Writeable for ChannelId {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.0.write(w)
	}
}

impl Readable for ChannelId {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 32] = Readable::read(r)?;
		Ok(ChannelId(buf))
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		crate::util::logger::DebugBytes(&self.0).fmt(f)
	}
}

/// The payment hash is the hash of the [`PaymentPreimage`] which is the value used to lock funds
/// in HTLCs while they transit the lightning network.
#[derive(Hash, Copy, Clone, PartialEq, Eq, Debug, Ord, PartialOrd)]
pub struct PaymentHash(pub [u8; 32]);

impl fmt::Display for PaymentHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		crate::util::logger::DebugBytes(&self.0).fmt(f)
	}
}

/// The payment preimage is the "secret key" which is used to claim the funds of an HTLC on-chain
/// or in a lightning channel.
#[derive(Hash, Copy, Clone, PartialEq, Eq, Debug, Ord, PartialOrd)]
pub struct PaymentPreimage(pub [u8; 32]);

impl From<PaymentPreimage> for PaymentHash {
	fn from(value: PaymentPreimage) -> Self {
		PaymentHash(Sha256::hash(&value.0).to_byte_array())
	}
}

impl fmt::Display for PaymentPreimage {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		crate::util::logger::DebugBytes(&self.0).fmt(f)
	}
}

macro_rules! impl_writeable_hash_wrapper {
	($st: ident) => {
		impl Writeable for $st {
			fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
				self.0.write(w)
			}
		}

		impl Readable for $st {
			fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
				let buf: [u8; 32] = Readable::read(r)?;
				Ok($st(buf))
			}
		}
	};
}
impl_writeable_hash_wrapper!(PaymentHash);
impl_writeable_hash_wrapper!(PaymentPreimage);
