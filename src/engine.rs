//! Engine Module
//!
//! The storage engine facade that coordinates all components.
//!
//! ## Responsibilities
//! - Rebuild the keydir from disk on startup
//! - Append writes and keep the keydir and disk counters current
//! - Serve reads through the keydir
//! - Decide when to compact and own the background compaction thread

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::compaction::{should_compact, CompactionReport, CompactionWorker};
use crate::config::Config;
use crate::error::{CaskError, Result};
use crate::keydir::{Keydir, KeydirEntry};
use crate::record;
use crate::segment::SegmentStore;
use crate::stats::{EngineStats, UsageCounters};
use crate::typed::{FromRaw, ToRaw};

/// State shared between the engine and its compaction thread
pub(crate) struct EngineCore {
    pub(crate) config: Config,

    /// Key → current value location (internal RwLock)
    pub(crate) keydir: Keydir,

    /// Segment files, active segment and deletion lock
    pub(crate) segments: SegmentStore,

    /// Disk accounting that drives the compaction trigger
    pub(crate) usage: UsageCounters,

    /// Serializes writes: append + keydir update happen as one step
    pub(crate) write_lock: Mutex<()>,
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes**: serialized by `write_lock`, so the keydir always reflects
///   the on-disk order of records. A write never waits for compaction
///   except while the compactor seals the active segment.
/// - **Reads**: fully concurrent. A read pins the segment store (shared side
///   of the deletion lock), resolves the key, then reads the file.
/// - **Compaction**: one background thread. It relocates entries with
///   compare-and-update and takes the exclusive side of the deletion lock
///   only to delete compacted files.
pub struct Engine {
    core: Arc<EngineCore>,
    compactor: CompactionWorker,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Discover segments and drop empty sealed ones
    /// 3. Replay every segment to rebuild the keydir
    /// 4. Open a fresh active segment
    /// 5. Start the background compaction thread
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Discover segments
        let segments = SegmentStore::open(&config.data_dir, config.max_segment_size)?;
        let pruned = segments.prune_empty()?;
        if pruned > 0 {
            tracing::debug!("removed {} empty segments", pruned);
        }

        // Step 3: Rebuild the keydir
        let (keydir, recovery) = Keydir::rebuild(&segments)?;
        if recovery.records_recovered > 0 || recovery.records_corrupted > 0 {
            tracing::info!(
                segments = recovery.segments_scanned,
                recovered = recovery.records_recovered,
                corrupted = recovery.records_corrupted,
                abandoned = recovery.segments_abandoned,
                keys = keydir.len(),
                "keydir rebuilt from disk"
            );
        }

        // Step 4: Fresh active segment; earlier ones are now all sealed
        let active = segments.create_active()?;

        let usage = UsageCounters::new(segments.total_size()?, keydir.live_data_size());

        let core = Arc::new(EngineCore {
            config,
            keydir,
            segments,
            usage,
            write_lock: Mutex::new(()),
        });

        // Step 5: Background compaction
        let compactor = CompactionWorker::spawn(Arc::clone(&core))?;

        tracing::info!(
            dir = %core.config.data_dir.display(),
            active,
            segments = core.segments.segment_count(),
            "engine opened"
        );

        let engine = Self { core, compactor };
        engine.maybe_request_compaction();
        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Store a value under a key, replacing any previous value
    ///
    /// The record is flushed to the active segment before this returns.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let encoded = record::encode(record::now_timestamp(), key, value);

        let outcome = {
            let _write_guard = self.core.write_lock.lock();

            let outcome = self.core.segments.append(&encoded)?;
            let entry = KeydirEntry {
                segment_id: outcome.segment_id,
                value_offset: outcome.value_offset,
                value_len: encoded.value_len(),
                timestamp: encoded.timestamp(),
            };

            let previous = self.core.keydir.put(key.to_vec(), entry);
            self.core.usage.record_write(
                outcome.frame_len,
                previous.map(|p| p.frame_len(key.len() as u64)),
            );
            outcome
        };

        if outcome.rotated.is_some() {
            self.maybe_request_compaction();
        }

        Ok(())
    }

    /// Read the current value of a key
    ///
    /// Fails with `KeyNotFound` if the key was never written.
    pub fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
        let pinned = self.core.segments.pin();
        let entry = self.core.keydir.get(key).ok_or(CaskError::KeyNotFound)?;

        if !self.core.config.verify_checksums {
            return pinned.read_at(entry.segment_id, entry.value_offset, entry.value_len);
        }

        // Read the whole record so its checksum and key can be verified.
        let key_len = key.len() as u64;
        let offset = entry.record_offset(key_len);
        let frame = pinned.read_at(entry.segment_id, offset, entry.frame_len(key_len))?;
        let decoded = record::decode_frame(&frame, entry.segment_id, offset)?;

        if decoded.key != key {
            return Err(CaskError::CorruptRecord {
                segment_id: entry.segment_id,
                offset,
                reason: "stored key does not match the requested key".to_string(),
            });
        }

        Ok(decoded.value)
    }

    /// Check whether a key has a value
    pub fn contains(&self, key: &[u8]) -> bool {
        self.core.keydir.contains(key)
    }

    /// Write a typed key/value pair
    pub fn write_as<K, V>(&self, key: &K, value: &V) -> Result<()>
    where
        K: ToRaw + ?Sized,
        V: ToRaw + ?Sized,
    {
        self.write(&key.to_raw(), &value.to_raw())
    }

    /// Read a typed value
    ///
    /// Fails with `Deserialization` if the stored bytes do not have the
    /// width of `V`.
    pub fn read_as<K, V>(&self, key: &K) -> Result<V>
    where
        K: ToRaw + ?Sized,
        V: FromRaw,
    {
        V::from_raw(self.read(&key.to_raw())?)
    }

    /// Run a compaction pass now and wait for it to finish
    ///
    /// Fails with `CaskError::Compaction` if the pass could not finish every
    /// input; the inputs it did finish are reclaimed anyway.
    pub fn compact(&self) -> Result<CompactionReport> {
        self.compactor.force()
    }

    /// Ask the background thread to compact if the trigger holds
    ///
    /// Returns immediately; requests made while one is queued are coalesced.
    pub fn request_compaction(&self) {
        self.compactor.request();
    }

    /// Close the engine gracefully
    ///
    /// Waits for a running compaction pass to finish.
    pub fn close(self) -> Result<()> {
        self.compactor.shutdown();
        tracing::info!(dir = %self.core.config.data_dir.display(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Point-in-time statistics
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            segment_count: self.core.segments.segment_count(),
            active_segment_id: self.core.segments.active_id(),
            key_count: self.core.keydir.len(),
            total_disk_used: self.core.usage.total_disk_used(),
            actual_data_size: self.core.usage.actual_data_size(),
            compactions: self.core.usage.compactions(),
        }
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.core.keydir.len()
    }

    /// Number of segment files, active included
    pub fn segment_count(&self) -> usize {
        self.core.segments.segment_count()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.core.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn maybe_request_compaction(&self) {
        if !self.core.config.auto_compaction {
            return;
        }

        let total = self.core.usage.total_disk_used();
        let actual = self.core.usage.actual_data_size();
        if should_compact(total, actual, &self.core.config) {
            tracing::debug!(total, actual, "compaction threshold reached");
            self.compactor.request();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.compactor.shutdown();
    }
}
