// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

#![crate_name = "lightning_node"]

//! The protocol core of a Lightning node, with no networking runtime attached.
//!
//! This crate covers the parts of the Lightning protocol where a single wrong byte either breaks
//! interoperability or leaks funds:
//!
//! * [`ln::peers`] runs the BOLT 8 `Noise_XK` handshake and, once complete, frames and encrypts
//!   every message exchanged with a peer.
//! * [`ln::wire`], [`ln::msgs`] and [`ln::tlv`] define the typed wire messages and their TLV
//!   extension streams.
//! * [`ln::commitment`] deterministically derives BOLT 3 commitment transactions from channel
//!   state, with the script templates in [`ln::chan_utils`]; signing lives behind [`sign`].
//! * [`ln::interactivetxs`] enforces the BOLT 2 rules for collaboratively built transactions.
//!
//! The crate performs no I/O itself. Feed it bytes and it hands you bytes back, see the
//! `lightning-node-net-tokio` crate for a ready-made driver.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![cfg_attr(not(any(test, feature = "_test_utils")), deny(missing_docs))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate bitcoin;

#[macro_use]
pub mod util;
pub mod crypto;
pub mod ln;
pub mod sign;

pub(crate) mod prelude {
	pub use alloc::{boxed::Box, string::String, string::ToString, vec, vec::Vec};

	pub use crate::util::hash_tables::*;
}

extern crate alloc;
