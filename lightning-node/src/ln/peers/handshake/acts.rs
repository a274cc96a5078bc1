// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Handshake act messages and a helper to assemble them from a byte stream.
//!
//! Acts are thin wrappers around fixed-size arrays so they can be built on the stack and passed
//! around as slices.

use core::{cmp, ops};

/// The length of act one and act two: version, ephemeral public key and tag.
pub const ACT_ONE_TWO_LENGTH: usize = 50;
/// The length of act three: version, encrypted static public key with its tag, and a second tag.
pub const ACT_THREE_LENGTH: usize = 66;

/// The only handshake version defined by BOLT 8.
pub(super) const HANDSHAKE_VERSION: u8 = 0;

type ActOne = [u8; ACT_ONE_TWO_LENGTH];
type ActTwo = [u8; ACT_ONE_TWO_LENGTH];
type ActThree = [u8; ACT_THREE_LENGTH];

/// One of the three handshake messages.
#[derive(Clone, PartialEq, Eq)]
pub enum Act {
	/// Sent by the initiator: `e, es`.
	One(ActOne),
	/// Sent by the responder: `e, ee`.
	Two(ActTwo),
	/// Sent by the initiator: `s, se`.
	Three(ActThree),
}

impl Act {
	/// An all-zero act one, to be filled in.
	pub fn empty_one() -> Self {
		Act::One([0; ACT_ONE_TWO_LENGTH])
	}

	/// An all-zero act two, to be filled in.
	pub fn empty_two() -> Self {
		Act::Two([0; ACT_ONE_TWO_LENGTH])
	}

	/// An all-zero act three, to be filled in.
	pub fn empty_three() -> Self {
		Act::Three([0; ACT_THREE_LENGTH])
	}

	fn as_mut_slice(&mut self) -> &mut [u8] {
		match self {
			Act::One(act) | Act::Two(act) => act,
			Act::Three(act) => act,
		}
	}
}

impl ops::Deref for Act {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		match self {
			Act::One(act) | Act::Two(act) => act,
			Act::Three(act) => act,
		}
	}
}

impl ops::DerefMut for Act {
	fn deref_mut(&mut self) -> &mut [u8] {
		self.as_mut_slice()
	}
}

impl AsRef<[u8]> for Act {
	fn as_ref(&self) -> &[u8] {
		self
	}
}

impl core::fmt::Debug for Act {
	fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
		let name = match self {
			Act::One(_) => "Act::One",
			Act::Two(_) => "Act::Two",
			Act::Three(_) => "Act::Three",
		};
		write!(f, "{}({})", name, crate::util::logger::DebugBytes(&self[..]))
	}
}

/// Collects an act from a stream which may deliver it in pieces.
///
/// [`Self::fill`] takes as many bytes as the act still needs and hands back the rest, which belong
/// to whatever follows the act on the wire.
#[derive(Debug)]
pub struct ActBuilder {
	partial_act: Act,
	write_pos: usize,
}

impl ActBuilder {
	/// Starts collecting into `empty_act`, which determines the length to collect.
	pub fn new(empty_act: Act) -> Self {
		Self { partial_act: empty_act, write_pos: 0 }
	}

	/// Copies bytes from `input` into the act and returns the bytes it did not need.
	pub fn fill<'a>(&mut self, input: &'a [u8]) -> &'a [u8] {
		let act = self.partial_act.as_mut_slice();
		let fill_amount = cmp::min(act.len() - self.write_pos, input.len());
		act[self.write_pos..self.write_pos + fill_amount].copy_from_slice(&input[..fill_amount]);
		self.write_pos += fill_amount;
		&input[fill_amount..]
	}

	/// Whether the act has all of its bytes.
	pub fn is_finished(&self) -> bool {
		self.write_pos == self.partial_act.len()
	}

	/// The complete act, or the builder back if more bytes are needed.
	pub fn finish(self) -> Result<Act, ActBuilder> {
		if self.is_finished() {
			Ok(self.partial_act)
		} else {
			Err(self)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_fill() {
		let mut builder = ActBuilder::new(Act::empty_one());

		let remaining = builder.fill(&[1, 2, 3]);
		assert_eq!(builder.write_pos, 3);
		assert!(!builder.is_finished());
		assert!(remaining.is_empty());
		assert!(builder.finish().is_err());
	}

	#[test]
	fn fill_across_calls() {
		let mut builder = ActBuilder::new(Act::empty_three());
		let input = [7u8; ACT_THREE_LENGTH];

		assert!(builder.fill(&input[..40]).is_empty());
		assert!(!builder.is_finished());
		assert!(builder.fill(&input[40..]).is_empty());
		let act = builder.finish().unwrap();
		assert_eq!(act, Act::Three(input));
		assert_eq!(act.len(), ACT_THREE_LENGTH);
	}

	#[test]
	fn over_fill_returns_remainder() {
		let mut builder = ActBuilder::new(Act::empty_two());

		let mut input = [0u8; 52];
		input[50] = 1;
		input[51] = 2;
		let remaining = builder.fill(&input);
		assert_eq!(remaining, &[1, 2]);
		assert_eq!(builder.finish().unwrap().as_ref(), &input[..50]);
	}
}
