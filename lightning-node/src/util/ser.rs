// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A very simple serialization framework which is used to serialize/deserialize wire messages and
//! their TLV extensions.

use std::cmp;
use std::io::{self, Read, Write};

use bitcoin::consensus;
use bitcoin::constants::ChainHash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{ScriptBuf, Transaction, Txid, Witness};

use crate::ln::msgs::DecodeError;
use crate::prelude::*;

/// The maximum size of a single Lightning message, and thus of any buffer we read from a peer.
pub const MAX_BUF_SIZE: usize = 64 * 1024;

/// A trait that is similar to [`std::io::Write`] but only exposes `write_all`, so it can be
/// implemented by length calculators that never fail.
pub trait Writer {
	/// Writes the given buf out. See [`std::io::Write::write_all`] for more.
	fn write_all(&mut self, buf: &[u8]) -> Result<(), io::Error>;
}

impl<W: Write> Writer for W {
	#[inline]
	fn write_all(&mut self, buf: &[u8]) -> Result<(), io::Error> {
		<Self as Write>::write_all(self, buf)
	}
}

pub(crate) struct VecWriter(pub Vec<u8>);
impl Writer for VecWriter {
	#[inline]
	fn write_all(&mut self, buf: &[u8]) -> Result<(), io::Error> {
		self.0.extend_from_slice(buf);
		Ok(())
	}
}

/// Writer that only tracks the amount of data written - useful if you need to calculate the length
/// of some data when serialized but don't yet need the full data.
pub struct LengthCalculatingWriter(pub usize);
impl Writer for LengthCalculatingWriter {
	#[inline]
	fn write_all(&mut self, buf: &[u8]) -> Result<(), io::Error> {
		self.0 += buf.len();
		Ok(())
	}
}

/// Essentially [`std::io::Take`] but a bit simpler and with a method to walk the underlying stream
/// forward to ensure we always consume exactly the fixed length specified.
pub struct FixedLengthReader<R: Read> {
	read: R,
	bytes_read: u64,
	total_bytes: u64,
}
impl<R: Read> FixedLengthReader<R> {
	/// Returns a new [`FixedLengthReader`].
	pub fn new(read: R, total_bytes: u64) -> Self {
		Self { read, bytes_read: 0, total_bytes }
	}

	/// Returns whether some bytes are remaining or not.
	#[inline]
	pub fn bytes_remain(&mut self) -> bool {
		self.bytes_read != self.total_bytes
	}

	/// Consumes the remaining bytes.
	#[inline]
	pub fn eat_remaining(&mut self) -> Result<(), DecodeError> {
		io::copy(self, &mut io::sink())?;
		if self.bytes_read != self.total_bytes {
			Err(DecodeError::ShortRead)
		} else {
			Ok(())
		}
	}
}
impl<R: Read> Read for FixedLengthReader<R> {
	#[inline]
	fn read(&mut self, dest: &mut [u8]) -> Result<usize, io::Error> {
		if self.total_bytes == self.bytes_read {
			Ok(0)
		} else {
			let read_len = cmp::min(dest.len() as u64, self.total_bytes - self.bytes_read);
			match self.read.read(&mut dest[0..(read_len as usize)]) {
				Ok(v) => {
					self.bytes_read += v as u64;
					Ok(v)
				},
				Err(e) => Err(e),
			}
		}
	}
}

/// A trait that various types implement allowing them to be written out to a [`Writer`].
pub trait Writeable {
	/// Writes `self` out to the given [`Writer`].
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error>;

	/// Writes `self` out to a `Vec<u8>`.
	fn encode(&self) -> Vec<u8> {
		let len = self.serialized_length();
		let mut msg = VecWriter(Vec::with_capacity(len));
		// Writing to a VecWriter never fails.
		let _ = self.write(&mut msg);
		debug_assert_eq!(len, msg.0.len());
		msg.0
	}

	/// Gets the length of this object after it has been serialized.
	fn serialized_length(&self) -> usize {
		let mut len_calc = LengthCalculatingWriter(0);
		let _ = self.write(&mut len_calc);
		len_calc.0
	}
}

impl<'a, T: Writeable> Writeable for &'a T {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error> {
		(*self).write(writer)
	}
}

/// A trait that various types implement allowing them to be read in from a [`Read`].
pub trait Readable
where
	Self: Sized,
{
	/// Reads a `Self` in from the given [`Read`].
	fn read<R: Read>(reader: &mut R) -> Result<Self, DecodeError>;
}

/// Lightning TLV uses a custom variable-length integer called `BigSize`. It is similar to Bitcoin's
/// variable-length integers except that it is serialized in big-endian instead of little-endian.
///
/// Like Bitcoin's variable-length integer, it exhibits ambiguity in that certain values can be
/// encoded in several different ways, which we must check for at deserialization-time. Thus, if
/// you're looking for an example of a variable-length integer to use for your own project, move
/// along, this is a rather poor design.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigSize(pub u64);

impl BigSize {
	/// The number of bytes `value` occupies once encoded.
	pub fn encoded_len(value: u64) -> usize {
		match value {
			0..=0xFC => 1,
			0xFD..=0xFFFF => 3,
			0x10000..=0xFFFFFFFF => 5,
			_ => 9,
		}
	}
}

impl Writeable for BigSize {
	#[inline]
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error> {
		match self.0 {
			0..=0xFC => (self.0 as u8).write(writer),
			0xFD..=0xFFFF => {
				0xFDu8.write(writer)?;
				(self.0 as u16).write(writer)
			},
			0x10000..=0xFFFFFFFF => {
				0xFEu8.write(writer)?;
				(self.0 as u32).write(writer)
			},
			_ => {
				0xFFu8.write(writer)?;
				self.0.write(writer)
			},
		}
	}
}

impl Readable for BigSize {
	#[inline]
	fn read<R: Read>(reader: &mut R) -> Result<BigSize, DecodeError> {
		let n: u8 = Readable::read(reader)?;
		match n {
			0xFF => {
				let x: u64 = Readable::read(reader)?;
				if x < 0x100000000 {
					Err(DecodeError::InvalidValue)
				} else {
					Ok(BigSize(x))
				}
			},
			0xFE => {
				let x: u32 = Readable::read(reader)?;
				if x < 0x10000 {
					Err(DecodeError::InvalidValue)
				} else {
					Ok(BigSize(x as u64))
				}
			},
			0xFD => {
				let x: u16 = Readable::read(reader)?;
				if x < 0xFD {
					Err(DecodeError::InvalidValue)
				} else {
					Ok(BigSize(x as u64))
				}
			},
			n => Ok(BigSize(n as u64)),
		}
	}
}

/// In TLV we occasionally send fields which only consist of, or potentially end with, a
/// variable-length integer which is simply truncated by skipping high zero bytes. This type
/// encapsulates such integers implementing [`Readable`]/[`Writeable`] for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HighZeroBytesDroppedBigSize<T>(pub T);

macro_rules! impl_writeable_primitive {
	($val_type:ty, $len: expr) => {
		impl Writeable for $val_type {
			#[inline]
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error> {
				writer.write_all(&self.to_be_bytes())
			}
		}
		impl Writeable for HighZeroBytesDroppedBigSize<$val_type> {
			#[inline]
			fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error> {
				// Skip any full leading 0 bytes when writing (in BE):
				writer.write_all(&self.0.to_be_bytes()[(self.0.leading_zeros() / 8) as usize..$len])
			}
		}
		impl Readable for $val_type {
			#[inline]
			fn read<R: Read>(reader: &mut R) -> Result<$val_type, DecodeError> {
				let mut buf = [0; $len];
				reader.read_exact(&mut buf)?;
				Ok(<$val_type>::from_be_bytes(buf))
			}
		}
		impl Readable for HighZeroBytesDroppedBigSize<$val_type> {
			#[inline]
			fn read<R: Read>(reader: &mut R) -> Result<HighZeroBytesDroppedBigSize<$val_type>, DecodeError> {
				// We need to accept short reads (read_len == 0) as "EOF" and handle them as simply
				// the high bytes being dropped. To do so, we start reading into the middle of buf
				// and then convert the appropriate number of bytes with extra high bytes out of
				// buf.
				let mut buf = [0; $len * 2];
				let mut read_len = reader.read(&mut buf[$len..])?;
				let mut total_read_len = read_len;
				while read_len != 0 && total_read_len != $len {
					read_len = reader.read(&mut buf[($len + total_read_len)..])?;
					total_read_len += read_len;
				}
				if total_read_len == 0 || buf[$len] != 0 {
					let first_byte = $len - ($len - total_read_len);
					let mut bytes = [0; $len];
					bytes.copy_from_slice(&buf[first_byte..first_byte + $len]);
					Ok(HighZeroBytesDroppedBigSize(<$val_type>::from_be_bytes(bytes)))
				} else {
					// If the encoding had extra zero bytes, return a failure even though we know
					// what they meant (as the TLV test vectors require this)
					Err(DecodeError::InvalidValue)
				}
			}
		}
	};
}

impl_writeable_primitive!(u64, 8);
impl_writeable_primitive!(u32, 4);
impl_writeable_primitive!(u16, 2);

impl Writeable for u8 {
	#[inline]
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error> {
		writer.write_all(&[*self])
	}
}
impl Readable for u8 {
	#[inline]
	fn read<R: Read>(reader: &mut R) -> Result<u8, DecodeError> {
		let mut buf = [0; 1];
		reader.read_exact(&mut buf)?;
		Ok(buf[0])
	}
}

impl Writeable for bool {
	#[inline]
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), io::Error> {
		writer.write_all(&[if *self { 1 } else { 0 }])
	}
}
impl Readable for bool {
	#[inline]
	fn read<R: Read>(reader: &mut R) -> Result<bool, DecodeError> {
		let mut buf = [0; 1];
		reader.read_exact(&mut buf)?;
		if buf[0] != 0 && buf[0] != 1 {
			return Err(DecodeError::InvalidValue);
		}
		Ok(buf[0] == 1)
	}
}

macro_rules! impl_array {
	($size:expr) => {
		impl Writeable for [u8; $size] {
			#[inline]
			fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
				w.write_all(self)
			}
		}

		impl Readable for [u8; $size] {
			#[inline]
			fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
				let mut buf = [0u8; $size];
				r.read_exact(&mut buf)?;
				Ok(buf)
			}
		}
	};
}

impl_array!(4); // for IPv4
impl_array!(8); // for short channel ids
impl_array!(32); // for channel id & hmac
impl_array!(33); // for PublicKey
impl_array!(64); // for ecdsa::Signature

/// A byte vector prefixed by its length as a `u16`, the common encoding of variable-length fields
/// in the fixed part of a wire message.
impl Writeable for Vec<u8> {
	#[inline]
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		if self.len() > u16::MAX as usize {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "vector too long"));
		}
		(self.len() as u16).write(w)?;
		w.write_all(self)
	}
}

impl Readable for Vec<u8> {
	#[inline]
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let len: u16 = Readable::read(r)?;
		let mut ret = vec![0; len as usize];
		r.read_exact(&mut ret)?;
		Ok(ret)
	}
}

/// Wraps a byte slice or vector which, unlike `Vec<u8>`, is written without a length prefix. Used
/// for the trailing field of a TLV record, whose length is given by the record itself.
pub struct WithoutLength<T>(pub T);

impl<'a> Writeable for WithoutLength<&'a [u8]> {
	#[inline]
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		w.write_all(self.0)
	}
}

impl Readable for WithoutLength<Vec<u8>> {
	#[inline]
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let mut ret = Vec::new();
		r.read_to_end(&mut ret)?;
		Ok(WithoutLength(ret))
	}
}

impl Writeable for ScriptBuf {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.as_bytes().to_vec().write(w)
	}
}

impl Readable for ScriptBuf {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes: Vec<u8> = Readable::read(r)?;
		Ok(ScriptBuf::from_bytes(bytes))
	}
}

impl Writeable for PublicKey {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.serialize().write(w)
	}
}

impl Readable for PublicKey {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 33] = Readable::read(r)?;
		match PublicKey::from_slice(&buf) {
			Ok(key) => Ok(key),
			Err(_) => return Err(DecodeError::InvalidValue),
		}
	}
}

impl Writeable for Signature {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.serialize_compact().write(w)
	}
}

impl Readable for Signature {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 64] = Readable::read(r)?;
		match Signature::from_compact(&buf) {
			Ok(sig) => Ok(sig),
			Err(_) => return Err(DecodeError::InvalidValue),
		}
	}
}

impl Writeable for Txid {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		w.write_all(self.as_byte_array())
	}
}

impl Readable for Txid {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 32] = Readable::read(r)?;
		Ok(Txid::from_byte_array(buf))
	}
}

/// Strings are written as UTF-8 with a `u16` length prefix, as in `error` and `warning`.
impl Writeable for String {
	#[inline]
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		self.as_bytes().to_vec().write(w)
	}
}

impl Readable for String {
	#[inline]
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let bytes: Vec<u8> = Readable::read(r)?;
		String::from_utf8(bytes).map_err(|_| DecodeError::InvalidValue)
	}
}

impl Writeable for Vec<Signature> {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		if self.len() > u16::MAX as usize {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "too many signatures"));
		}
		(self.len() as u16).write(w)?;
		for sig in self.iter() {
			sig.write(w)?;
		}
		Ok(())
	}
}

impl Readable for Vec<Signature> {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let len: u16 = Readable::read(r)?;
		let byte_size = (len as usize).checked_mul(64).ok_or(DecodeError::BadLengthDescriptor)?;
		if byte_size > MAX_BUF_SIZE {
			return Err(DecodeError::BadLengthDescriptor);
		}
		let mut ret = Vec::with_capacity(len as usize);
		for _ in 0..len {
			ret.push(Readable::read(r)?);
		}
		Ok(ret)
	}
}

/// Witness stacks as sent in `tx_signatures`: a `u16` count, then each stack consensus-encoded
/// behind its own `u16` length.
impl Writeable for Vec<Witness> {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		if self.len() > u16::MAX as usize {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "too many witnesses"));
		}
		(self.len() as u16).write(w)?;
		for witness in self.iter() {
			let witness_bytes = consensus::serialize(witness);
			if witness_bytes.len() > u16::MAX as usize {
				return Err(io::Error::new(io::ErrorKind::InvalidInput, "witness too long"));
			}
			(witness_bytes.len() as u16).write(w)?;
			w.write_all(&witness_bytes)?;
		}
		Ok(())
	}
}

impl Readable for Vec<Witness> {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let num_witnesses: u16 = Readable::read(r)?;
		let mut witnesses = Vec::with_capacity(cmp::min(num_witnesses as usize, 252));
		for _ in 0..num_witnesses {
			let witness_bytes: Vec<u8> = Readable::read(r)?;
			match consensus::deserialize::<Witness>(&witness_bytes) {
				Ok(witness) => witnesses.push(witness),
				Err(_) => return Err(DecodeError::InvalidValue),
			}
		}
		Ok(witnesses)
	}
}

impl Writeable for ChainHash {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		w.write_all(self.as_bytes())
	}
}

impl Readable for ChainHash {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let buf: [u8; 32] = Readable::read(r)?;
		Ok(ChainHash::from(buf))
	}
}

/// A wrapper for a [`Transaction`] which can only be constructed with
/// [`TransactionU16LenLimited::new`] if the [`Transaction`]'s consensus-serialized length is
/// <= [`u16::MAX`], as it is written with a `u16` length prefix (as in `tx_add_input`).
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TransactionU16LenLimited(Transaction);

impl TransactionU16LenLimited {
	/// Constructs a new [`TransactionU16LenLimited`] from a [`Transaction`] only if it's
	/// consensus-serialized length is <= [`u16::MAX`].
	pub fn new(transaction: Transaction) -> Result<Self, ()> {
		if transaction.total_size() > (u16::MAX as usize) {
			Err(())
		} else {
			Ok(Self(transaction))
		}
	}

	/// Consumes this [`TransactionU16LenLimited`] and returns its contained [`Transaction`].
	pub fn into_transaction(self) -> Transaction {
		self.0
	}

	/// Returns a reference to the contained [`Transaction`].
	pub fn as_transaction(&self) -> &Transaction {
		&self.0
	}
}

impl Writeable for TransactionU16LenLimited {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), io::Error> {
		let tx_bytes = consensus::serialize(&self.0);
		(tx_bytes.len() as u16).write(w)?;
		w.write_all(&tx_bytes)
	}
}

impl Readable for TransactionU16LenLimited {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		let len = <u16 as Readable>::read(r)?;
		let mut tx_bytes = vec![0; len as usize];
		r.read_exact(&mut tx_bytes)?;
		// Trailing bytes inside the declared length are rejected by `deserialize`.
		match consensus::deserialize::<Transaction>(&tx_bytes) {
			Ok(tx) => Ok(Self(tx)),
			Err(_) => Err(DecodeError::InvalidValue),
		}
	}
}
