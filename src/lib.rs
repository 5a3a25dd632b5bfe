//! # CaskKV
//!
//! A log-structured, Bitcask-style key-value storage engine with:
//! - Append-only segment files with CRC32-checked records
//! - An in-memory keydir pointing at every key's latest value
//! - Crash recovery by replaying segments on startup
//! - Background compaction that runs alongside reads and writes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │             write(key, value) / read(key)                    │
//! └──────────┬──────────────────────┬───────────────────┬───────┘
//!            │                      │                   │ signal
//!            ▼                      ▼                   ▼
//!   ┌─────────────────┐    ┌─────────────────┐  ┌──────────────┐
//!   │     Keydir      │    │  SegmentStore   │  │  Compaction  │
//!   │ key → location  │◄───┤ active + sealed │◄─┤   (thread)   │
//!   │    (RwLock)     │    │    segments     │  │              │
//!   └─────────────────┘    └────────┬────────┘  └──────────────┘
//!                                   │
//!                                   ▼
//!                          ┌─────────────────┐
//!                          │     Record      │
//!                          │ codec + CRC32   │
//!                          └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod segment;
pub mod keydir;
pub mod compaction;
pub mod stats;
pub mod typed;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, Result};
pub use config::Config;
pub use engine::Engine;
pub use compaction::CompactionReport;
pub use stats::EngineStats;
pub use typed::{FromRaw, ToRaw};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CaskKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
