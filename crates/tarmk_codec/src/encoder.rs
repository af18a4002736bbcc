//! Canonical CBOR encoder.

use crate::value::{canonical_key_order, Value};

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;

/// Encodes a value to canonical CBOR.
///
/// Every [`Value`] is encodable, so this cannot fail.
#[must_use]
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// Streaming canonical encoder.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Creates an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder with a preallocated buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Appends one value.
    pub fn encode(&mut self, value: &Value) {
        match value {
            Value::Bool(b) => self.buffer.push(if *b { TRUE } else { FALSE }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Bytes(bytes) => {
                self.encode_head(MAJOR_BYTES, bytes.len() as u64);
                self.buffer.extend_from_slice(bytes);
            }
            Value::Text(text) => {
                self.encode_head(MAJOR_TEXT, text.len() as u64);
                self.buffer.extend_from_slice(text.as_bytes());
            }
            Value::Array(items) => {
                self.encode_head(MAJOR_ARRAY, items.len() as u64);
                for item in items {
                    self.encode(item);
                }
            }
            Value::Map(pairs) => self.encode_map(pairs),
        }
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Borrows the bytes encoded so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(MAJOR_UNSIGNED, n as u64);
        } else {
            // -1 encodes as argument 0, -2 as 1, and so on.
            self.encode_head(MAJOR_NEGATIVE, !(n as u64));
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major: u8, argument: u64) {
        let major = major << 5;
        if argument < 24 {
            self.buffer.push(major | argument as u8);
        } else if argument <= u64::from(u8::MAX) {
            self.buffer.extend_from_slice(&[major | 24, argument as u8]);
        } else if argument <= u64::from(u16::MAX) {
            self.buffer.push(major | 25);
            self.buffer
                .extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= u64::from(u32::MAX) {
            self.buffer.push(major | 26);
            self.buffer
                .extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buffer.push(major | 27);
            self.buffer.extend_from_slice(&argument.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) {
        let mut entries: Vec<(Vec<u8>, &Value)> = pairs
            .iter()
            .map(|(key, value)| (to_canonical_cbor(key), value))
            .collect();
        entries.sort_by(|a, b| canonical_key_order(&a.0, &b.0));

        self.encode_head(MAJOR_MAP, entries.len() as u64);
        for (key, value) in entries {
            self.buffer.extend_from_slice(&key);
            self.encode(value);
        }
    }
}
