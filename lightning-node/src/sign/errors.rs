// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Signing error types live here.

use core::fmt;

/// Why a [`LightningSigner`] did not produce or accept a signature.
///
/// [`LightningSigner`]: crate::sign::LightningSigner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigningError {
	/// The signature is not immediately available from the signer but will be
	/// provided later when the signer is online.
	NotAvailable,
	/// The transaction has no input spending the funding output at the expected index.
	InvalidInput,
	/// The counterparty's signature does not verify against their funding key.
	InvalidSignature,
	/// The signer failed permanently and we should attempt to close the
	/// channel.
	PermanentFailure,
}

impl fmt::Display for SigningError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			SigningError::NotAvailable => f.write_str("Signer is not available"),
			SigningError::InvalidInput => f.write_str("Transaction does not spend the funding output"),
			SigningError::InvalidSignature => f.write_str("Counterparty signature is invalid"),
			SigningError::PermanentFailure => f.write_str("Signer failed permanently"),
		}
	}
}

impl std::error::Error for SigningError {}
