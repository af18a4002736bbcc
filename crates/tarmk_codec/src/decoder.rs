//! Canonical CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{canonical_key_order, Value};
use std::cmp::Ordering;

/// Nesting limit. Node records are two levels deep; anything far past that
/// is corrupt input.
const MAX_DEPTH: usize = 64;

/// Decodes exactly one value from `bytes`.
///
/// # Errors
///
/// Returns an error if the input is truncated, has trailing bytes, is not in
/// canonical form, or uses a construct outside [`Value`] (floats, tags,
/// null, indefinite lengths).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// Streaming decoder over a byte slice.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Creates a decoder positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decodes the next value.
    ///
    /// # Errors
    ///
    /// See [`from_cbor`].
    pub fn decode(&mut self) -> CodecResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        let initial = self.next_byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        self.depth += 1;
        let value = match major {
            0 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.argument(info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.length(info)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            3 => {
                let len = self.length(info)?;
                let raw = self.take(len)?;
                std::str::from_utf8(raw)
                    .map(|s| Value::Text(s.to_string()))
                    .map_err(|_| CodecError::InvalidUtf8)
            }
            4 => self.array(info),
            5 => self.map(info),
            6 => Err(CodecError::invalid_structure("tags are not allowed")),
            _ => match info {
                20 => Ok(Value::Bool(false)),
                21 => Ok(Value::Bool(true)),
                25..=27 => Err(CodecError::invalid_structure("floats are not allowed")),
                31 => Err(CodecError::invalid_structure("unexpected break")),
                other => Err(CodecError::invalid_structure(format!(
                    "unsupported simple value {other}"
                ))),
            },
        };
        self.depth -= 1;
        value
    }

    /// Returns true once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Returns the unread bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn next_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads the head argument and checks it uses the shortest form.
    fn argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, floor) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.next_byte()?), 24),
            25 => (
                u64::from(u16::from_be_bytes(self.take_array()?)),
                u64::from(u8::MAX) + 1,
            ),
            26 => (
                u64::from(u32::from_be_bytes(self.take_array()?)),
                u64::from(u16::MAX) + 1,
            ),
            27 => (
                u64::from_be_bytes(self.take_array()?),
                u64::from(u32::MAX) + 1,
            ),
            31 => return Err(CodecError::invalid_structure("indefinite length")),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < floor {
            return Err(CodecError::invalid_structure("non-shortest integer form"));
        }
        Ok(value)
    }

    /// Reads a length and bounds it by the unread input.
    fn length(&mut self, info: u8) -> CodecResult<usize> {
        let len = self.argument(info)?;
        let len = usize::try_from(len).map_err(|_| CodecError::UnexpectedEof)?;
        if len > self.data.len() - self.pos {
            return Err(CodecError::UnexpectedEof);
        }
        Ok(len)
    }

    fn array(&mut self, info: u8) -> CodecResult<Value> {
        let len = self.length(info)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn map(&mut self, info: u8) -> CodecResult<Value> {
        // Each entry is at least two bytes; `length` bounds by one byte.
        let len = self.length(info)?;
        let mut pairs = Vec::with_capacity(len / 2);
        let mut previous: Option<&'a [u8]> = None;
        for _ in 0..len {
            let start = self.pos;
            let key = self.decode()?;
            let encoded = &self.data[start..self.pos];
            if let Some(prev) = previous {
                if canonical_key_order(prev, encoded) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "map keys out of order or duplicated",
                    ));
                }
            }
            previous = Some(encoded);
            let value = self.decode()?;
            pairs.push((key, value));
        }
        Ok(Value::Map(pairs))
    }
}
