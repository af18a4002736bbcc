//! Segments: immutable, id-addressed blocks of node records.
//!
//! ## Segment Data Format
//!
//! ```text
//! | magic "TMKS" (4) | version (1) | generation (4) | record count (4) |
//! | record offsets (4 each) | records ... |
//! ```
//!
//! All integers are little endian. Offsets are relative to the start of the
//! record area; record `i` ends where record `i + 1` starts (or at the end
//! of the data). References to other segments travel beside the data, not
//! inside it.

mod format;
mod reader;
mod record;

pub use format::{Segment, SegmentBuilder, SEGMENT_MAGIC, SEGMENT_VERSION};
pub use reader::SegmentReader;
pub(crate) use record::NodeRecord;
