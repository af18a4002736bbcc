//! # tarmk codec
//!
//! Canonical CBOR for the records stored inside tarmk segments.
//!
//! The segment writer deduplicates records by hashing their encoded bytes,
//! so the encoding must be deterministic:
//!
//! - map entries are ordered by their encoded key (shorter first, then bytewise)
//! - integers and lengths use the shortest form
//! - no floats, no indefinite lengths, no tags
//!
//! ```
//! use tarmk_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let record = Value::map(vec![
//!     (Value::text("p"), Value::map(vec![])),
//!     (Value::text("c"), Value::map(vec![])),
//! ]);
//! let bytes = to_canonical_cbor(&record);
//! assert_eq!(from_cbor(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;
