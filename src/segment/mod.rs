//! Segment Module
//!
//! Append-only segment files ("datafiles") and the table that tracks them.
//!
//! ## Responsibilities
//! - One active segment receives every write; all others are sealed
//! - Rotate the active segment before it grows past the size limit
//! - Random-offset reads for the keydir's value pointers
//! - Compaction output segments and deletion of compacted ones
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── segment_000001.data   sealed
//!   ├── segment_000002.data   sealed
//!   ├── segment_000004.data   compaction output (sealed)
//!   └── segment_000006.data   active
//! ```
//!
//! Ids are strictly increasing and never reused. For any single key,
//! replaying segments in ascending id order visits its versions in the order
//! they were committed; the keydir rebuild relies on that and never compares
//! timestamps. Compaction keeps it true by writing its output into ids
//! reserved below the next active segment.

mod store;
mod writer;

pub use store::{AppendOutcome, PinnedSegments, RetireOutcome, SealedSet, SegmentStore};
pub use writer::SegmentWriter;
