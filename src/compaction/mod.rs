//! Compaction Module
//!
//! Reclaims the space held by superseded records.
//!
//! ## Responsibilities
//! - Decide when compaction is worth running
//! - Rewrite the live records of sealed segments into fresh segments
//! - Repoint keydir entries without clobbering concurrent writes
//! - Delete the compacted segments once nothing refers to them
//! - Run all of the above on a dedicated background thread
//!
//! ## Pass Overview
//! ```text
//!  seal active ──► scan inputs ──► live? ──yes──► append to output ──► CAS keydir
//!  (reserve ids)   (ascending)       │                                   │
//!                                    no ─► drop            lost race ◄───┘ (newer write wins)
//!
//!  all inputs done ──► exclusive deletion section ──► delete unreferenced inputs
//! ```

mod merge;
mod policy;
mod worker;

pub use merge::CompactionReport;
pub use policy::should_compact;

pub(crate) use merge::run_pass;
pub(crate) use worker::CompactionWorker;
