//! Segment Store
//!
//! Owns the directory of segment files: which ids exist, which one is
//! active, and the lock that keeps readers away from files being deleted.
//!
//! ## Responsibilities
//! - Discover existing segments on startup
//! - Append to the active segment, rotating when it is full
//! - Random-offset reads from any segment
//! - Hand out compaction output segments and retire compacted ones

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::error::{CaskError, Result};
use crate::record::{EncodedRecord, SegmentScanner};

use super::SegmentWriter;

/// Sentinel stored in `active_id` before the first active segment exists
const NO_ACTIVE: u64 = 0;

/// Where an appended record ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Segment the record was written to
    pub segment_id: u64,
    /// Offset of the first value byte within that segment
    pub value_offset: u64,
    /// Bytes the record occupies on disk
    pub frame_len: u64,
    /// `(sealed, new_active)` if this append had to rotate first
    pub rotated: Option<(u64, u64)>,
}

/// Segments frozen at the start of a compaction pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSet {
    /// Every segment that existed when the pass started, ascending
    pub inputs: Vec<u64>,
    /// Ids set aside for compaction output, all below `active_id`
    pub reserved: Range<u64>,
    /// The fresh active segment opened above the reserved block
    pub active_id: u64,
}

/// Result of retiring compacted segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetireOutcome {
    pub deleted: Vec<u64>,
    /// Still referenced by the keydir (or active), left in place
    pub kept: Vec<u64>,
    /// Unreferenced, but removing the file failed
    pub failed: Vec<u64>,
    pub bytes_freed: u64,
}

/// Manages the segment files of one data directory
///
/// ## Concurrency:
/// - `segments`: RwLock'd id → path table (the only place ids are resolved)
/// - `active`: Mutex around the one writable segment; append and rotation
///   happen inside the same critical section
/// - `next_id` / `active_id`: atomics, only advanced while `active` is held
/// - `deletion_lock`: reads and appends take the shared side; retiring
///   compacted segments takes the exclusive side
pub struct SegmentStore {
    /// Directory where segments are stored
    dir: PathBuf,

    /// Rotation threshold for the active segment
    max_segment_size: u64,

    /// Every known segment, ordered by id
    segments: RwLock<BTreeMap<u64, PathBuf>>,

    /// The segment currently receiving appends
    active: Mutex<Option<SegmentWriter>>,

    active_id: AtomicU64,

    /// Next id to hand out (ids start at 1 and are never reused)
    next_id: AtomicU64,

    /// Shared for I/O, exclusive while segment files are being removed
    deletion_lock: RwLock<()>,
}

impl SegmentStore {
    /// Open the segment directory, creating it if needed
    ///
    /// Discovers existing segment files but does not open an active segment;
    /// call [`create_active`](Self::create_active) before appending.
    pub fn open(dir: &Path, max_segment_size: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut segments = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() {
                if let Some(id) = Self::parse_segment_id(&path) {
                    segments.insert(id, path);
                }
            }
        }

        let next_id = segments.keys().next_back().map(|&id| id + 1).unwrap_or(1);

        tracing::debug!(
            dir = %dir.display(),
            segments = segments.len(),
            next_id,
            "opened segment store"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            max_segment_size,
            segments: RwLock::new(segments),
            active: Mutex::new(None),
            active_id: AtomicU64::new(NO_ACTIVE),
            next_id: AtomicU64::new(next_id),
            deletion_lock: RwLock::new(()),
        })
    }

    // =========================================================================
    // Active Segment
    // =========================================================================

    /// Open a new, empty active segment
    ///
    /// Any previously active segment becomes sealed.
    pub fn create_active(&self) -> Result<u64> {
        let mut active = self.active.lock();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.install_active(&mut active, id)?;
        Ok(id)
    }

    /// Seal the active segment and open the next one
    ///
    /// Returns `(sealed_id, new_active_id)`.
    pub fn rotate(&self) -> Result<(u64, u64)> {
        let mut active = self.active.lock();
        let old = Self::require_active(&active)?.id();
        let new = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.install_active(&mut active, new)?;

        tracing::debug!(sealed = old, active = new, "rotated active segment");
        Ok((old, new))
    }

    /// Append a record to the active segment, rotating first if it would
    /// grow past the maximum segment size
    pub fn append(&self, record: &EncodedRecord) -> Result<AppendOutcome> {
        let _shared = self.deletion_lock.read();
        let mut active = self.active.lock();

        let frame_len = record.frame_len();
        let mut rotated = None;

        let writer = Self::require_active(&active)?;
        if writer.would_overflow(frame_len, self.max_segment_size) {
            let old = writer.id();
            let new = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.install_active(&mut active, new)?;

            tracing::debug!(sealed = old, active = new, "rotated full segment");
            rotated = Some((old, new));
        }

        let writer = active
            .as_mut()
            .ok_or_else(|| CaskError::Storage("no active segment".to_string()))?;
        let record_offset = writer.append(record)?;

        Ok(AppendOutcome {
            segment_id: writer.id(),
            value_offset: record_offset + record.value_position(),
            frame_len,
            rotated,
        })
    }

    /// Id of the active segment, if one has been created
    pub fn active_id(&self) -> Option<u64> {
        match self.active_id.load(Ordering::SeqCst) {
            NO_ACTIVE => None,
            id => Some(id),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Hold off segment deletion for as long as the guard lives
    ///
    /// Resolve the keydir entry *after* pinning, then read through the guard:
    /// the segment it names cannot disappear in between.
    pub fn pin(&self) -> PinnedSegments<'_> {
        PinnedSegments {
            store: self,
            _shared: self.deletion_lock.read(),
        }
    }

    /// Read exactly `len` bytes at `offset` of a segment
    pub fn read_at(&self, segment_id: u64, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.pin().read_at(segment_id, offset, len)
    }

    /// Current size of a segment file
    pub fn size_of(&self, segment_id: u64) -> Result<u64> {
        let path = self.path_of(segment_id)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CaskError::SegmentNotFound(segment_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Sequentially scan every record of a segment
    pub fn scan(&self, segment_id: u64) -> Result<SegmentScanner> {
        let path = self.path_of(segment_id)?;
        SegmentScanner::open(&path, segment_id)
    }

    /// Ids of all known segments, ascending
    pub fn segment_ids(&self) -> Vec<u64> {
        self.segments.read().keys().copied().collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Sum of the sizes of all segment files
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for id in self.segment_ids() {
            total += self.size_of(id)?;
        }
        Ok(total)
    }

    // =========================================================================
    // Compaction Support
    // =========================================================================

    /// Freeze the current segments for a compaction pass
    ///
    /// Seals the active segment, reserves output ids for the inputs and opens
    /// the new active segment above the reserved block. Replay order stays
    /// chronological: inputs < outputs < anything written afterwards.
    ///
    /// Each input gets `2 * ceil(size / max_segment_size)` ids (at least
    /// one). Next-fit packing of `n` bytes never needs more than
    /// `2 * ceil(n / max)` segments, so the block holds the output even when
    /// the inputs were written under a larger size limit.
    pub fn seal_for_compaction(&self) -> Result<SealedSet> {
        let mut active = self.active.lock();
        Self::require_active(&active)?;

        let inputs = self.segment_ids();
        let mut count = 0u64;
        for &id in &inputs {
            count += Self::output_ids_for(self.size_of(id)?, self.max_segment_size);
        }

        let base = self.next_id.fetch_add(count + 1, Ordering::SeqCst);
        let active_id = base + count;
        self.install_active(&mut active, active_id)?;

        tracing::debug!(
            inputs = inputs.len(),
            reserved = count,
            reserved_from = base,
            active = active_id,
            "sealed segments for compaction"
        );

        Ok(SealedSet {
            inputs,
            reserved: base..active_id,
            active_id,
        })
    }

    /// Create and register a compaction output segment
    pub fn create_output(&self, segment_id: u64) -> Result<SegmentWriter> {
        let path = self.segment_path(segment_id);
        let writer = SegmentWriter::create(&path, segment_id)?;
        self.segments.write().insert(segment_id, path);
        Ok(writer)
    }

    /// Delete the listed segments that nothing refers to any more
    ///
    /// `referenced` is evaluated under the exclusive side of the deletion
    /// lock, after every in-flight read has drained. A file that cannot be
    /// removed is listed in `failed`; `bytes_freed` covers exactly the files
    /// that are gone.
    pub fn retire<F>(&self, segment_ids: &[u64], referenced: F) -> Result<RetireOutcome>
    where
        F: FnOnce() -> BTreeSet<u64>,
    {
        let _exclusive = self.deletion_lock.write();
        let referenced = referenced();
        let active = self.active_id();

        let mut outcome = RetireOutcome::default();
        for &id in segment_ids {
            if Some(id) == active || referenced.contains(&id) {
                tracing::warn!(segment_id = id, "segment still referenced, not deleting");
                outcome.kept.push(id);
                continue;
            }
            match self.remove_locked(id) {
                Ok(bytes) => {
                    outcome.bytes_freed += bytes;
                    outcome.deleted.push(id);
                }
                Err(e) => {
                    // Stays in the table; the next pass picks it up again.
                    tracing::error!(segment_id = id, "failed to delete compacted segment: {}", e);
                    outcome.failed.push(id);
                }
            }
        }

        Ok(outcome)
    }

    /// Delete one sealed segment
    ///
    /// The caller guarantees no keydir entry points into it.
    pub fn delete(&self, segment_id: u64) -> Result<u64> {
        let _exclusive = self.deletion_lock.write();
        if self.active_id() == Some(segment_id) {
            return Err(CaskError::Storage(format!(
                "refusing to delete active segment {}",
                segment_id
            )));
        }
        self.remove_locked(segment_id)
    }

    /// Delete sealed segments that hold no bytes at all
    pub fn prune_empty(&self) -> Result<usize> {
        let mut pruned = 0;
        for id in self.segment_ids() {
            if Some(id) != self.active_id() && self.size_of(id)? == 0 {
                self.delete(id)?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    /// The next id that will be handed out (for testing/debugging)
    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn require_active(active: &Option<SegmentWriter>) -> Result<&SegmentWriter> {
        active
            .as_ref()
            .ok_or_else(|| CaskError::Storage("no active segment".to_string()))
    }

    /// Output ids to reserve for an input of `size` bytes
    fn output_ids_for(size: u64, max_segment_size: u64) -> u64 {
        (2 * size.div_ceil(max_segment_size.max(1))).max(1)
    }

    /// Create segment `id`, register it and make it the active one
    fn install_active(&self, active: &mut Option<SegmentWriter>, id: u64) -> Result<()> {
        let path = self.segment_path(id);
        let writer = SegmentWriter::create(&path, id)?;
        self.segments.write().insert(id, path);
        *active = Some(writer);
        self.active_id.store(id, Ordering::SeqCst);
        Ok(())
    }

    /// Remove a segment from the table and the filesystem
    /// (deletion lock held exclusively by the caller)
    fn remove_locked(&self, segment_id: u64) -> Result<u64> {
        let path = self.path_of(segment_id)?;
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(segment_id, "segment file already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.segments.write().remove(&segment_id);

        tracing::debug!(segment_id, bytes = size, "deleted segment");
        Ok(size)
    }

    fn path_of(&self, segment_id: u64) -> Result<PathBuf> {
        self.segments
            .read()
            .get(&segment_id)
            .cloned()
            .ok_or(CaskError::SegmentNotFound(segment_id))
    }

    /// Generate the file path for a segment with given ID
    fn segment_path(&self, id: u64) -> PathBuf {
        Self::segment_path_with_dir(&self.dir, id)
    }

    /// Generate segment path given a directory and ID
    pub fn segment_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("segment_{:06}.data", id))
    }

    /// Parse segment ID from filename
    /// "segment_000042.data" → Some(42)
    fn parse_segment_id(path: &Path) -> Option<u64> {
        if path.extension()? != "data" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("segment_")?;
        id_str.parse().ok()
    }
}

/// Shared hold on the deletion lock; see [`SegmentStore::pin`]
pub struct PinnedSegments<'a> {
    store: &'a SegmentStore,
    _shared: RwLockReadGuard<'a, ()>,
}

impl PinnedSegments<'_> {
    /// Read exactly `len` bytes at `offset` of a segment
    ///
    /// - `SegmentNotFound` if the id is unknown or its file is missing
    /// - `Truncated` if the segment holds fewer bytes than requested
    pub fn read_at(&self, segment_id: u64, offset: u64, len: u64) -> Result<Vec<u8>> {
        let path = self.store.path_of(segment_id)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CaskError::SegmentNotFound(segment_id))
            }
            Err(e) => return Err(e.into()),
        };

        let file_len = file.metadata()?.len();
        let truncated = || CaskError::Truncated {
            segment_id,
            offset,
            requested: len,
            available: file_len.saturating_sub(offset),
        };

        match offset.checked_add(len) {
            Some(end) if end <= file_len => {}
            _ => return Err(truncated()),
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                truncated()
            } else {
                CaskError::Io(e)
            }
        })?;

        Ok(buf)
    }
}
