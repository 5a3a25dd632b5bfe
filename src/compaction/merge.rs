//! Compaction pass
//!
//! Copies the live records of every sealed segment into new segments and
//! retires the old ones.

use std::ops::Range;
use std::time::Instant;

use crate::engine::EngineCore;
use crate::error::{CaskError, Result};
use crate::keydir::KeydirEntry;
use crate::record::{self, EncodedRecord};
use crate::segment::{SegmentStore, SegmentWriter};

/// What a compaction pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Input segments fully processed
    pub segments_compacted: usize,
    /// Output segments created
    pub segments_written: usize,
    /// Input segments removed from disk
    pub segments_deleted: usize,
    /// Live records copied and successfully repointed
    pub records_copied: u64,
    /// Superseded records left behind
    pub records_dropped: u64,
    /// Records skipped because their checksum did not match
    pub records_corrupt: u64,
    /// Records copied but not repointed because a newer write won the race
    pub relocations_lost: u64,
    /// Bytes appended to output segments
    pub bytes_written: u64,
    /// Bytes released by deleting input segments
    pub bytes_freed: u64,
}

/// Run one full compaction pass
///
/// Writers are held off only while the active segment is sealed; reads are
/// held off only while compacted files are deleted.
///
/// If an input cannot be finished the pass still retires the inputs it did
/// finish, then fails with `CaskError::Compaction`.
pub(crate) fn run_pass(core: &EngineCore) -> Result<CompactionReport> {
    let started = Instant::now();
    let mut report = CompactionReport::default();

    // Step 1: seal everything that exists right now (no write in flight)
    let sealed = {
        let _writers = core.write_lock.lock();
        core.segments.seal_for_compaction()?
    };

    tracing::info!(
        inputs = sealed.inputs.len(),
        active = sealed.active_id,
        "compaction started"
    );

    // Step 2: copy live records, segment by segment
    let mut output = OutputSegments::new(
        &core.segments,
        sealed.reserved.clone(),
        core.config.max_segment_size,
    );
    let mut compacted = Vec::with_capacity(sealed.inputs.len());
    let mut stopped = None;

    for &segment_id in &sealed.inputs {
        match compact_segment(core, segment_id, &mut output, &mut report) {
            Ok(()) => compacted.push(segment_id),
            Err(e) => {
                // Unfinished inputs stay on disk; whatever was relocated so
                // far already points at valid output records.
                tracing::warn!(segment_id, "compaction stopped early: {}", e);
                stopped = Some((segment_id, e));
                break;
            }
        }
    }
    report.segments_compacted = compacted.len();
    report.segments_written = output.finish();

    // Step 3: delete compacted inputs nothing points into any more
    let retired = core
        .segments
        .retire(&compacted, || core.keydir.snapshot())?;
    core.usage.record_freed(retired.bytes_freed);

    report.segments_deleted = retired.deleted.len();
    report.bytes_freed = retired.bytes_freed;

    if let Some((segment_id, e)) = stopped {
        return Err(CaskError::Compaction(format!(
            "pass stopped at segment {} after {} of {} inputs: {}",
            segment_id,
            report.segments_compacted,
            sealed.inputs.len(),
            e
        )));
    }
    core.usage.record_compaction();

    tracing::info!(
        compacted = report.segments_compacted,
        written = report.segments_written,
        deleted = report.segments_deleted,
        copied = report.records_copied,
        dropped = report.records_dropped,
        lost = report.relocations_lost,
        bytes_freed = report.bytes_freed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "compaction finished"
    );

    Ok(report)
}

/// Copy the live records of one sealed segment
fn compact_segment(
    core: &EngineCore,
    segment_id: u64,
    output: &mut OutputSegments<'_>,
    report: &mut CompactionReport,
) -> Result<()> {
    let mut scanner = core.segments.scan(segment_id)?;

    for item in scanner.by_ref() {
        let scanned = match item {
            Ok(scanned) => scanned,
            Err(e @ CaskError::CorruptRecord { .. }) => {
                tracing::warn!("skipping record during compaction: {}", e);
                report.records_corrupt += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        // Live iff the keydir still points at exactly this record.
        let expected = KeydirEntry::for_scanned(segment_id, &scanned);
        if core.keydir.get(&scanned.key) != Some(expected) {
            report.records_dropped += 1;
            continue;
        }

        let encoded = record::encode(scanned.timestamp, &scanned.key, &scanned.value);
        let (new_segment, new_offset) = output.append(&encoded)?;
        core.usage.record_copy(encoded.frame_len());
        report.bytes_written += encoded.frame_len();

        let relocated = core.keydir.compare_and_update(&scanned.key, &expected, |entry| {
            entry.segment_id = new_segment;
            entry.value_offset = new_offset;
        });

        if relocated {
            report.records_copied += 1;
        } else {
            tracing::trace!(segment_id, "relocation lost to a concurrent write");
            report.relocations_lost += 1;
        }
    }

    if scanner.framing_lost() {
        tracing::warn!(
            segment_id,
            offset = scanner.position(),
            "segment framing lost, remainder not compacted"
        );
    }

    tracing::debug!(segment_id, "segment compacted");
    Ok(())
}

/// Compaction output, rolling over to the next reserved id when full
struct OutputSegments<'a> {
    store: &'a SegmentStore,
    reserved: Range<u64>,
    max_segment_size: u64,
    current: Option<SegmentWriter>,
    created: usize,
}

impl<'a> OutputSegments<'a> {
    fn new(store: &'a SegmentStore, reserved: Range<u64>, max_segment_size: u64) -> Self {
        Self {
            store,
            reserved,
            max_segment_size,
            current: None,
            created: 0,
        }
    }

    /// Append a record, returning `(segment_id, value_offset)`
    fn append(&mut self, record: &EncodedRecord) -> Result<(u64, u64)> {
        let needs_new = match &self.current {
            None => true,
            Some(writer) => writer.would_overflow(record.frame_len(), self.max_segment_size),
        };

        if needs_new {
            let id = self.reserved.next().ok_or_else(|| {
                CaskError::Compaction("ran out of reserved output segment ids".to_string())
            })?;
            self.current = Some(self.store.create_output(id)?);
            self.created += 1;
            tracing::debug!(segment_id = id, "opened compaction output segment");
        }

        let writer = self
            .current
            .as_mut()
            .ok_or_else(|| CaskError::Compaction("no output segment".to_string()))?;
        let record_offset = writer.append(record)?;

        Ok((writer.id(), record_offset + record.value_position()))
    }

    /// Close the last output segment; returns how many were created
    fn finish(mut self) -> usize {
        self.current.take();
        self.created
    }
}
