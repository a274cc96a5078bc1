// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! TLV (type-length-value) extension streams, as defined in
//! [BOLT #1](https://github.com/lightning/bolts/blob/master/01-messaging.md#type-length-value-format).
//!
//! A [`TlvStream`] is the raw, validated form: records keyed by type, unique and kept in ascending
//! order. Individual records with a known meaning implement [`TlvRecordType`], which lets them be
//! added to a [`TlvStreamBuilder`] and fetched back out with [`TlvStream::get`].

use alloc::collections::BTreeMap;
use core::fmt;
use std::io::{self, Cursor, Read};

use bitcoin::constants::ChainHash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{ScriptBuf, Txid};

use crate::ln::msgs::DecodeError;
use crate::prelude::*;
use crate::util::ser::{BigSize, Readable, WithoutLength, Writeable, Writer};

/// A single record of a [`TlvStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlvRecord {
	/// The record type. Even types must be understood by the reader, odd types may be skipped.
	pub r#type: u64,
	/// The raw value bytes.
	pub value: Vec<u8>,
}

/// Returned when the same type is added to a stream twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuplicateType(pub u64);

impl fmt::Display for DuplicateType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "duplicate TLV type {}", self.0)
	}
}

/// A record with a fixed type number and a typed value.
///
/// The value's [`Writeable`] encoding is the record value, without any length prefix; the
/// [`Readable`] side is handed exactly the value bytes and must consume all of them.
pub trait TlvRecordType: Writeable + Readable {
	/// The type number this record is sent under.
	const TYPE: u64;
}

/// An ordered set of TLV records with unique types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlvStream {
	records: BTreeMap<u64, Vec<u8>>,
}

impl TlvStream {
	/// An empty stream.
	pub fn new() -> Self {
		Self { records: BTreeMap::new() }
	}

	/// Builds a stream from records in any order, failing on the first repeated type.
	pub fn from_records<I: IntoIterator<Item = TlvRecord>>(records: I) -> Result<Self, DuplicateType> {
		let mut builder = TlvStreamBuilder::new();
		for record in records {
			builder = builder.add(record.r#type, record.value)?;
		}
		Ok(builder.build())
	}

	/// Number of records.
	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Whether the stream has no records.
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// Iterates the records in ascending type order.
	pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
		self.records.iter().map(|(t, v)| (*t, &v[..]))
	}

	/// The raw value of the record with the given type.
	pub fn get_raw(&self, r#type: u64) -> Option<&[u8]> {
		self.records.get(&r#type).map(|v| &v[..])
	}

	/// Decodes the record of type `T::TYPE`, if present.
	pub fn get<T: TlvRecordType>(&self) -> Result<Option<T>, DecodeError> {
		let value = match self.records.get(&T::TYPE) {
			Some(value) => value,
			None => return Ok(None),
		};
		let mut reader = Cursor::new(&value[..]);
		let record = T::read(&mut reader)?;
		if (reader.position() as usize) != value.len() {
			return Err(DecodeError::InvalidValue);
		}
		Ok(Some(record))
	}

	/// Fails with [`DecodeError::UnknownRequiredFeature`] if the stream carries an even type not
	/// listed in `known_types`. Unknown odd types are fine and are simply not looked at.
	pub fn check_unknown_even(&self, known_types: &[u64]) -> Result<(), DecodeError> {
		for r#type in self.records.keys() {
			if r#type % 2 == 0 && !known_types.contains(r#type) {
				return Err(DecodeError::UnknownRequiredFeature);
			}
		}
		Ok(())
	}

	/// Parses a complete stream from `bytes`.
	///
	/// Types must be strictly increasing and every BigSize must be minimally encoded. A record
	/// whose length runs past the end of `bytes` is a [`DecodeError::ShortRead`].
	pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
		let mut reader = Cursor::new(bytes);
		let mut records = BTreeMap::new();
		let mut last_seen_type: Option<u64> = None;
		while (reader.position() as usize) < bytes.len() {
			let r#type = BigSize::read(&mut reader)?.0;
			if let Some(last_type) = last_seen_type {
				if r#type <= last_type {
					return Err(DecodeError::InvalidValue);
				}
			}
			last_seen_type = Some(r#type);

			let length = BigSize::read(&mut reader)?.0;
			let start = reader.position() as usize;
			let remaining = (bytes.len() - start) as u64;
			if length > remaining {
				return Err(DecodeError::ShortRead);
			}
			let end = start + length as usize;
			records.insert(r#type, bytes[start..end].to_vec());
			reader.set_position(end as u64);
		}
		Ok(Self { records })
	}
}

impl Writeable for TlvStream {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		for (r#type, value) in self.records.iter() {
			BigSize(*r#type).write(w)?;
			BigSize(value.len() as u64).write(w)?;
			w.write_all(value)?;
		}
		Ok(())
	}
}

/// Reads a stream running to the end of the reader, as the extension at the tail of a message.
impl Readable for TlvStream {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes: WithoutLength<Vec<u8>> = Readable::read(r)?;
		Self::decode(&bytes.0)
	}
}

/// Assembles a [`TlvStream`], rejecting repeated types.
#[derive(Default)]
pub struct TlvStreamBuilder {
	records: BTreeMap<u64, Vec<u8>>,
}

impl TlvStreamBuilder {
	/// Starts an empty stream.
	pub fn new() -> Self {
		Self { records: BTreeMap::new() }
	}

	/// Adds a raw record.
	pub fn add(mut self, r#type: u64, value: Vec<u8>) -> Result<Self, DuplicateType> {
		if self.records.contains_key(&r#type) {
			return Err(DuplicateType(r#type));
		}
		self.records.insert(r#type, value);
		Ok(self)
	}

	/// Adds a typed record.
	pub fn add_record<T: TlvRecordType>(self, record: &T) -> Result<Self, DuplicateType> {
		self.add(T::TYPE, record.encode())
	}

	/// Adds a typed record if one is given.
	pub fn add_optional<T: TlvRecordType>(self, record: Option<&T>) -> Result<Self, DuplicateType> {
		match record {
			Some(record) => self.add_record(record),
			None => Ok(self),
		}
	}

	/// Finishes the stream.
	pub fn build(self) -> TlvStream {
		TlvStream { records: self.records }
	}
}

macro_rules! impl_tlv_record {
	($st: ident, $type: expr) => {
		impl TlvRecordType for $st {
			const TYPE: u64 = $type;
		}
	};
}

/// The blinding point of an HTLC relayed inside a blinded path (`update_add_htlc` type 0).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct BlindedPath {
	/// The ephemeral key the receiver uses to unblind the onion.
	pub path_key: PublicKey,
}

impl Writeable for BlindedPath {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.path_key.write(w)
	}
}

impl Readable for BlindedPath {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self { path_key: Readable::read(r)? })
	}
}
impl_tlv_record!(BlindedPath, 0);

/// The negotiated channel type as a feature bit field (`open_channel2`/`accept_channel2` type 1).
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct ChannelType(pub Vec<u8>);

impl ChannelType {
	/// Whether `option_anchors` (feature bit 22) is set.
	pub fn supports_anchors(&self) -> bool {
		feature_bit_set(&self.0, 22)
	}

	/// A channel type with just the given feature bits set.
	pub fn from_bits(bits: &[usize]) -> Self {
		let len = bits.iter().map(|bit| bit / 8 + 1).max().unwrap_or(0);
		let mut flags = vec![0u8; len];
		for bit in bits {
			flags[len - 1 - bit / 8] |= 1 << (bit % 8);
		}
		Self(flags)
	}
}

/// Checks a big-endian feature bit field, where bit 0 is the least significant bit of the last
/// byte.
pub(crate) fn feature_bit_set(flags: &[u8], bit: usize) -> bool {
	let byte = bit / 8;
	if byte >= flags.len() {
		return false;
	}
	flags[flags.len() - 1 - byte] & (1 << (bit % 8)) != 0
}

impl Writeable for ChannelType {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		w.write_all(&self.0)
	}
}

impl Readable for ChannelType {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes: WithoutLength<Vec<u8>> = Readable::read(r)?;
		Ok(Self(bytes.0))
	}
}
impl_tlv_record!(ChannelType, 1);

/// The fee range a `closing_signed` sender will accept (type 1).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct FeeRange {
	/// The lowest fee the sender accepts, in satoshis.
	pub min_fee_satoshis: u64,
	/// The highest fee the sender accepts, in satoshis.
	pub max_fee_satoshis: u64,
}

impl Writeable for FeeRange {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.min_fee_satoshis.write(w)?;
		self.max_fee_satoshis.write(w)
	}
}

impl Readable for FeeRange {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let min_fee_satoshis: u64 = Readable::read(r)?;
		let max_fee_satoshis: u64 = Readable::read(r)?;
		if min_fee_satoshis > max_fee_satoshis {
			return Err(DecodeError::InvalidValue);
		}
		Ok(Self { min_fee_satoshis, max_fee_satoshis })
	}
}
impl_tlv_record!(FeeRange, 1);

/// The change in the sender's funding contribution proposed by `tx_init_rbf`/`tx_ack_rbf` (type
/// 0). Signed, as a peer may lower its contribution.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct FundingOutputContribution(pub i64);

impl Writeable for FundingOutputContribution {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		w.write_all(&self.0.to_be_bytes())
	}
}

impl Readable for FundingOutputContribution {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 8] = Readable::read(r)?;
		Ok(Self(i64::from_be_bytes(buf)))
	}
}
impl_tlv_record!(FundingOutputContribution, 0);

/// The chains a node is interested in, sent in `init` (type 1).
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Networks(pub Vec<ChainHash>);

impl Writeable for Networks {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		for chain in self.0.iter() {
			chain.write(w)?;
		}
		Ok(())
	}
}

impl Readable for Networks {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes: WithoutLength<Vec<u8>> = Readable::read(r)?;
		if bytes.0.len() % 32 != 0 {
			return Err(DecodeError::InvalidValue);
		}
		let mut reader = Cursor::new(&bytes.0[..]);
		let mut chains = Vec::with_capacity(bytes.0.len() / 32);
		for _ in 0..bytes.0.len() / 32 {
			chains.push(Readable::read(&mut reader)?);
		}
		Ok(Self(chains))
	}
}
impl_tlv_record!(Networks, 1);

/// The txid of an interactively built funding transaction whose signatures are still being
/// exchanged, sent in `channel_reestablish` (type 0).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct NextFunding(pub Txid);

impl Writeable for NextFunding {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.0.write(w)
	}
}

impl Readable for NextFunding {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self(Readable::read(r)?))
	}
}
impl_tlv_record!(NextFunding, 0);

/// Asks the counterparty to only contribute confirmed inputs (type 2). Carries no value.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct RequireConfirmedInputs;

impl Writeable for RequireConfirmedInputs {
	fn write<W: Writer>(&self, _w: &mut W) -> Result<(), io::Error> {
		Ok(())
	}
}

impl Readable for RequireConfirmedInputs {
	fn read<R: Read>(_r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self)
	}
}
impl_tlv_record!(RequireConfirmedInputs, 2);

/// An alias short channel id offered in `channel_ready` (type 1).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ShortChannelId(pub u64);

impl ShortChannelId {
	/// The block height the funding transaction confirmed at.
	pub fn block_height(&self) -> u32 {
		(self.0 >> 40) as u32
	}

	/// The index of the funding transaction within its block.
	pub fn tx_index(&self) -> u32 {
		((self.0 >> 16) & 0xff_ffff) as u32
	}

	/// The funding output index.
	pub fn vout_index(&self) -> u16 {
		(self.0 & 0xffff) as u16
	}
}

impl Writeable for ShortChannelId {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.0.write(w)
	}
}

impl Readable for ShortChannelId {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self(Readable::read(r)?))
	}
}
impl_tlv_record!(ShortChannelId, 1);

/// The script a closing transaction must pay the sender to (`open_channel2`/`accept_channel2`
/// type 0). An empty script opts out.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct UpfrontShutdownScript(pub ScriptBuf);

impl Writeable for UpfrontShutdownScript {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		w.write_all(self.0.as_bytes())
	}
}

impl Readable for UpfrontShutdownScript {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes: WithoutLength<Vec<u8>> = Readable::read(r)?;
		Ok(Self(ScriptBuf::from_bytes(bytes.0)))
	}
}
impl_tlv_record!(UpfrontShutdownScript, 0);
