//! Node records: the payload of one node inside a segment.
//!
//! A record is the canonical CBOR of
//!
//! ```text
//! { "p": { name: [type, value] }, "c": { name: bytes(20) } }
//! ```
//!
//! where each child is an absolute [`RecordId`]. Because child references
//! are absolute and the encoding is canonical, two structurally equal nodes
//! whose children were written to the same places encode to the same bytes.

use crate::blob::BlobId;
use crate::error::{CoreError, CoreResult};
use crate::node::{Blob, PropertyValue};
use crate::types::{RecordId, SegmentId};
use std::collections::BTreeMap;
use tarmk_codec::{from_cbor, to_canonical_cbor, Value};

const TYPE_STRING: i64 = 1;
const TYPE_LONG: i64 = 2;
const TYPE_BOOLEAN: i64 = 3;
const TYPE_INLINE_BINARY: i64 = 4;
const TYPE_EXTERNAL_BINARY: i64 = 5;
const TYPE_MULTI: i64 = 6;

/// Decoded content of one node record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub(crate) properties: BTreeMap<String, PropertyValue>,
    pub(crate) children: BTreeMap<String, RecordId>,
}

impl NodeRecord {
    /// Returns the segments the record points into.
    pub(crate) fn references(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.children.values().map(RecordId::segment)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let properties = self
            .properties
            .iter()
            .map(|(name, value)| (Value::text(name.as_str()), encode_property(value)))
            .collect();
        let children = self
            .children
            .iter()
            .map(|(name, id)| (Value::text(name.as_str()), Value::Bytes(id.to_bytes().to_vec())))
            .collect();
        to_canonical_cbor(&Value::map(vec![
            (Value::text("p"), Value::map(properties)),
            (Value::text("c"), Value::map(children)),
        ]))
    }

    pub(crate) fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let value = from_cbor(bytes)?;
        let mut record = Self::default();

        let properties = value
            .get("p")
            .and_then(Value::as_map)
            .ok_or_else(|| CoreError::invalid_format("record lacks property map"))?;
        for (name, encoded) in properties {
            record
                .properties
                .insert(text_key(name)?, decode_property(encoded, true)?);
        }

        let children = value
            .get("c")
            .and_then(Value::as_map)
            .ok_or_else(|| CoreError::invalid_format("record lacks child map"))?;
        for (name, encoded) in children {
            let id = encoded
                .as_bytes()
                .and_then(RecordId::from_slice)
                .ok_or_else(|| CoreError::invalid_format("child reference is not 20 bytes"))?;
            record.children.insert(text_key(name)?, id);
        }

        Ok(record)
    }
}

fn text_key(key: &Value) -> CoreResult<String> {
    key.as_text()
        .map(str::to_string)
        .ok_or_else(|| CoreError::invalid_format("record key is not text"))
}

fn encode_property(value: &PropertyValue) -> Value {
    let (tag, body) = match value {
        PropertyValue::String(s) => (TYPE_STRING, Value::text(s.as_str())),
        PropertyValue::Long(n) => (TYPE_LONG, Value::Integer(*n)),
        PropertyValue::Boolean(b) => (TYPE_BOOLEAN, Value::Bool(*b)),
        PropertyValue::Binary(Blob::Inline(data)) => (TYPE_INLINE_BINARY, Value::Bytes(data.clone())),
        PropertyValue::Binary(Blob::External(id)) => {
            (TYPE_EXTERNAL_BINARY, Value::text(id.as_str()))
        }
        PropertyValue::Multi(values) => (
            TYPE_MULTI,
            Value::Array(values.iter().map(encode_property).collect()),
        ),
    };
    Value::Array(vec![Value::Integer(tag), body])
}

fn decode_property(value: &Value, allow_multi: bool) -> CoreResult<PropertyValue> {
    let malformed = || CoreError::invalid_format("malformed property value");
    let [tag, body] = value.as_array().ok_or_else(malformed)? else {
        return Err(malformed());
    };

    match tag.as_integer().ok_or_else(malformed)? {
        TYPE_STRING => body
            .as_text()
            .map(|s| PropertyValue::String(s.to_string()))
            .ok_or_else(malformed),
        TYPE_LONG => body.as_integer().map(PropertyValue::Long).ok_or_else(malformed),
        TYPE_BOOLEAN => body.as_bool().map(PropertyValue::Boolean).ok_or_else(malformed),
        TYPE_INLINE_BINARY => body
            .as_bytes()
            .map(|b| PropertyValue::Binary(Blob::Inline(b.to_vec())))
            .ok_or_else(malformed),
        TYPE_EXTERNAL_BINARY => {
            let id = BlobId::parse(body.as_text().ok_or_else(malformed)?)?;
            Ok(PropertyValue::Binary(Blob::External(id)))
        }
        TYPE_MULTI if allow_multi => body
            .as_array()
            .ok_or_else(malformed)?
            .iter()
            .map(|item| decode_property(item, false))
            .collect::<CoreResult<Vec<_>>>()
            .map(PropertyValue::Multi),
        other => Err(CoreError::invalid_format(format!(
            "unknown property type {other}"
        ))),
    }
}
