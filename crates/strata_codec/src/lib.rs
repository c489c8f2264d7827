//! # Strata Codec
//!
//! Canonical CBOR for stored documents and sync messages.
//!
//! A document fetched from the store must be byte-identical to the one that
//! was written, and its content hash must not depend on who encoded it. The
//! encoding is therefore a strict subset of CBOR with one form per value:
//!
//! - integer and length arguments take their shortest form
//! - floats are always binary64 and never NaN
//! - map entries are ordered by the bytes of their encoded keys
//! - no tags, no indefinite lengths, no simple values beyond
//!   `false`/`true`/`null`
//!
//! The decoder rejects anything else, including well-formed CBOR another
//! encoder might produce.
//!
//! ```
//! use strata_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::map(vec![
//!     (Value::from("EntityID"), Value::Integer(42)),
//!     (Value::from("Scale"), Value::Float(0.5)),
//! ]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod header;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder, MAX_DEPTH};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;
