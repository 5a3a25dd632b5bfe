//! Background compaction worker
//!
//! One dedicated thread that sleeps on a command channel and runs
//! compaction passes when asked. No polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::engine::EngineCore;
use crate::error::{CaskError, Result};

use super::{run_pass, should_compact, CompactionReport};

/// Commands understood by the worker thread
enum CompactionCmd {
    /// Re-check the trigger and compact if it still holds
    Maybe,
    /// Compact unconditionally and report back
    Force {
        ack: Sender<Result<CompactionReport>>,
    },
    /// Finish the current command and exit
    Shutdown,
}

/// Handle to the background compaction thread
pub(crate) struct CompactionWorker {
    tx: Sender<CompactionCmd>,
    /// Set while a `Maybe` is queued; further requests are coalesced
    pending: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CompactionWorker {
    /// Start the worker thread
    pub(crate) fn spawn(core: Arc<EngineCore>) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let pending = Arc::new(AtomicBool::new(false));

        let handle = thread::Builder::new()
            .name("caskkv-compaction".to_string())
            .spawn({
                let pending = Arc::clone(&pending);
                move || compaction_loop(rx, core, pending)
            })?;

        Ok(Self {
            tx,
            pending,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Ask for a pass if the trigger still holds (non-blocking)
    pub(crate) fn request(&self) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.tx.send(CompactionCmd::Maybe).is_err() {
            tracing::debug!("compaction worker is gone, request ignored");
        }
    }

    /// Run a pass now and wait for its report
    pub(crate) fn force(&self) -> Result<CompactionReport> {
        let (ack, done) = channel::bounded(1);
        self.tx
            .send(CompactionCmd::Force { ack })
            .map_err(|_| CaskError::Compaction("compaction worker is not running".to_string()))?;

        done.recv().map_err(|_| {
            CaskError::Compaction("compaction worker exited before finishing".to_string())
        })?
    }

    /// Stop the thread, letting a running pass finish first
    pub(crate) fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        let _ = self.tx.send(CompactionCmd::Shutdown);
        if handle.join().is_err() {
            tracing::error!("compaction worker panicked");
        }
    }
}

fn compaction_loop(rx: Receiver<CompactionCmd>, core: Arc<EngineCore>, pending: Arc<AtomicBool>) {
    tracing::debug!("compaction worker started");

    while let Ok(command) = rx.recv() {
        match command {
            CompactionCmd::Maybe => {
                pending.store(false, Ordering::SeqCst);

                let total = core.usage.total_disk_used();
                let actual = core.usage.actual_data_size();
                if !should_compact(total, actual, &core.config) {
                    tracing::trace!(total, actual, "compaction no longer needed");
                    continue;
                }

                if let Err(e) = run_pass(&core) {
                    tracing::error!("compaction pass failed: {}", e);
                }
            }
            CompactionCmd::Force { ack } => {
                let _ = ack.send(run_pass(&core));
            }
            CompactionCmd::Shutdown => break,
        }
    }

    tracing::debug!("compaction worker stopped");
}
