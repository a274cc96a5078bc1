// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Macros which implement [`Writeable`]/[`Readable`] for wire messages.
//!
//! [`Writeable`]: crate::util::ser::Writeable
//! [`Readable`]: crate::util::ser::Readable

/// Implements [`Writeable`] and [`Readable`] for a message made of fixed fields followed by a TLV
/// extension stream.
///
/// Fixed fields are written in the order given. Each TLV field must be an `Option` of a
/// [`TlvRecordType`], and is sent under that record's type. On read, even TLV types other than
/// the listed ones fail with [`DecodeError::UnknownRequiredFeature`] while unknown odd types are
/// skipped.
///
/// [`Writeable`]: crate::util::ser::Writeable
/// [`Readable`]: crate::util::ser::Readable
/// [`TlvRecordType`]: crate::ln::tlv::TlvRecordType
/// [`DecodeError::UnknownRequiredFeature`]: crate::ln::msgs::DecodeError::UnknownRequiredFeature
macro_rules! impl_writeable_msg {
	($st: ident, {$($field: ident),* $(,)*}, {$(($tlvfield: ident, $tlvtype: ty)),* $(,)*}) => {
		impl $crate::util::ser::Writeable for $st {
			fn write<W: $crate::util::ser::Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
				$( $crate::util::ser::Writeable::write(&self.$field, w)?; )*
				#[allow(unused_mut)]
				let mut builder = $crate::ln::tlv::TlvStreamBuilder::new();
				$(
					builder = builder.add_optional::<$tlvtype>(self.$tlvfield.as_ref()).map_err(|e| {
						::std::io::Error::new(::std::io::ErrorKind::InvalidInput, format!("{}", e))
					})?;
				)*
				$crate::util::ser::Writeable::write(&builder.build(), w)
			}
		}

		impl $crate::util::ser::Readable for $st {
			fn read<R: ::std::io::Read>(r: &mut R) -> Result<Self, $crate::ln::msgs::DecodeError> {
				$( let $field = $crate::util::ser::Readable::read(r)?; )*
				let tlv_stream: $crate::ln::tlv::TlvStream = $crate::util::ser::Readable::read(r)?;
				tlv_stream.check_unknown_even(&[
					$( <$tlvtype as $crate::ln::tlv::TlvRecordType>::TYPE ),*
				])?;
				Ok(Self {
					$( $field, )*
					$( $tlvfield: tlv_stream.get::<$tlvtype>()?, )*
				})
			}
		}
	};
}
