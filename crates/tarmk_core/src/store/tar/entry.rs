//! Tar entries holding one segment each.
//!
//! ```text
//! | GNU tar header (512) | payload | zero padding to 512 |
//!
//! payload:
//! | reference count (4) | references (16 each) | segment data | crc32 (4) |
//! ```
//!
//! The entry name is `<segment uuid>.<generation as 8 hex digits>`, so the
//! index can be rebuilt from headers alone. The crc covers everything in the
//! payload before it.

use crate::error::{CoreError, CoreResult};
use crate::types::{Generation, SegmentId};
use bytes::Bytes;
use tarmk_storage::StorageBackend;

/// Tar block size.
pub(crate) const BLOCK: u64 = 512;

/// Two zero blocks close a tar archive.
pub(crate) const END_OF_ARCHIVE: [u8; 1024] = [0u8; 1024];

/// An entry found by [`scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScannedEntry {
    pub(crate) id: SegmentId,
    pub(crate) generation: Generation,
    /// Offset of the payload, just past the header.
    pub(crate) offset: u64,
    /// Payload length, without padding.
    pub(crate) length: u64,
}

/// Outcome of a container scan.
#[derive(Debug)]
pub(crate) struct Scan {
    pub(crate) entries: Vec<ScannedEntry>,
    /// Offset just past the last good entry.
    pub(crate) end: u64,
    /// Why the scan stopped early, if it found damaged bytes.
    pub(crate) torn: Option<String>,
    /// Whether the scan stopped at a zero block rather than the end of the
    /// file.
    pub(crate) closed: bool,
}

pub(crate) fn entry_name(id: SegmentId, generation: Generation) -> String {
    format!("{id}.{generation:08x}")
}

fn parse_entry_name(name: &str) -> Option<(SegmentId, Generation)> {
    let (uuid, generation) = name.split_once('.')?;
    if generation.len() != 8 {
        return None;
    }
    Some((
        uuid.parse().ok()?,
        Generation::from_str_radix(generation, 16).ok()?,
    ))
}

fn padded(len: u64) -> u64 {
    len.div_ceil(BLOCK) * BLOCK
}

/// Builds the complete entry (header, payload, padding) for one segment.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_entry(
    id: SegmentId,
    generation: Generation,
    data: &[u8],
    references: &[SegmentId],
) -> CoreResult<Vec<u8>> {
    let payload_len = 4 + references.len() * 16 + data.len() + 4;

    let mut header = tar::Header::new_gnu();
    header.set_path(entry_name(id, generation))?;
    header.set_size(payload_len as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let total = BLOCK as usize + padded(payload_len as u64) as usize;
    let mut entry = Vec::with_capacity(total);
    entry.extend_from_slice(header.as_bytes());

    let payload_start = entry.len();
    entry.extend_from_slice(&(references.len() as u32).to_le_bytes());
    for reference in references {
        entry.extend_from_slice(reference.as_bytes());
    }
    entry.extend_from_slice(data);
    let crc = crc32fast::hash(&entry[payload_start..]);
    entry.extend_from_slice(&crc.to_le_bytes());

    entry.resize(total, 0);
    Ok(entry)
}

/// Splits a payload into segment data and references, verifying its crc.
pub(crate) fn decode_payload(id: SegmentId, payload: &[u8]) -> CoreResult<(Bytes, Vec<SegmentId>)> {
    verify_crc(id, payload)?;
    let body = &payload[..payload.len() - 4];
    let references = parse_references(id, body)?;
    let data_start = 4 + references.len() * 16;
    Ok((Bytes::copy_from_slice(&body[data_start..]), references))
}

/// Reads only the reference list at the head of an entry payload.
pub(crate) fn read_references(
    backend: &dyn StorageBackend,
    id: SegmentId,
    offset: u64,
) -> CoreResult<Vec<SegmentId>> {
    let mut prefix = backend.read_at(offset, 4)?;
    let count = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    prefix.extend_from_slice(&backend.read_at(offset + 4, count * 16)?);
    parse_references(id, &prefix)
}

fn parse_references(id: SegmentId, body: &[u8]) -> CoreResult<Vec<SegmentId>> {
    if body.len() < 4 {
        return Err(CoreError::segment_corruption(format!(
            "entry for {id} too short for a reference count"
        )));
    }
    let count = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
    let end = count
        .checked_mul(16)
        .and_then(|n| n.checked_add(4))
        .filter(|end| *end <= body.len())
        .ok_or_else(|| {
            CoreError::segment_corruption(format!("entry for {id} reference list overruns payload"))
        })?;
    Ok(body[4..end]
        .chunks_exact(16)
        .filter_map(SegmentId::from_slice)
        .collect())
}

fn verify_crc(id: SegmentId, payload: &[u8]) -> CoreResult<()> {
    if payload.len() < 8 {
        return Err(CoreError::segment_corruption(format!(
            "entry for {id} is only {} bytes",
            payload.len()
        )));
    }
    let (body, stored) = payload.split_at(payload.len() - 4);
    let expected = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Walks a container header by header.
///
/// A zero block or the end of the file ends the scan cleanly. A header with
/// a bad checksum or unparsable name, an entry that runs past the end of
/// the file, or a payload whose crc fails stops the scan and is reported in
/// [`Scan::torn`]; `end` then points at the first damaged byte.
pub(crate) fn scan(backend: &dyn StorageBackend) -> CoreResult<Scan> {
    let size = backend.size()?;
    let mut entries = Vec::new();
    let mut offset = 0u64;
    let mut closed = false;

    let torn = loop {
        if offset == size {
            break None;
        }
        if offset + BLOCK > size {
            break Some(format!("partial header at offset {offset}"));
        }
        let block = backend.read_at(offset, BLOCK as usize)?;
        if block.iter().all(|b| *b == 0) {
            closed = true;
            break None;
        }

        let header = tar::Header::from_byte_slice(&block);
        let mut expected = header.clone();
        expected.set_cksum();
        if expected.as_bytes() != header.as_bytes() {
            break Some(format!("bad header checksum at offset {offset}"));
        }

        let parsed = header
            .path()
            .ok()
            .and_then(|path| path.to_str().and_then(parse_entry_name));
        let Some((id, generation)) = parsed else {
            break Some(format!("unrecognized entry name at offset {offset}"));
        };

        let length = header.entry_size()?;
        let payload_offset = offset + BLOCK;
        let next = payload_offset + padded(length);
        if next > size {
            break Some(format!("entry {id} runs past end of container"));
        }

        let payload = backend.read_at(payload_offset, length as usize)?;
        if let Err(e) = verify_crc(id, &payload) {
            break Some(format!("entry {id} failed verification: {e}"));
        }

        entries.push(ScannedEntry {
            id,
            generation,
            offset: payload_offset,
            length,
        });
        offset = next;
    };

    Ok(Scan {
        entries,
        end: offset,
        torn,
        closed,
    })
}
