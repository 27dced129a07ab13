//! Runtime Line Tracker
//!
//! Records per-line execution and body entries reported by the interpreter.
//! `track` is the hot path: it never fails and never allocates once a file's
//! counter buffer exists. Line counts are buffered per file and flushed into
//! the [`DataStore`] on `stop()` / `flush()`; body entries go straight to
//! the store.

use super::counters::LineCounters;
use super::ids::FileId;
use super::store::DataStore;
use crate::result::CovResult;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Line tracker for one process
#[derive(Debug, Default)]
pub struct Tracker {
    /// Canonical records
    store: DataStore,
    /// Buffered counts per file
    counters: HashMap<FileId, LineCounters>,
    /// Session active flag
    active: bool,
    /// Line events accepted since start
    events: u64,
}

impl Tracker {
    /// Create an inactive tracker with an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing store
    #[must_use]
    pub fn with_store(store: DataStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    /// Begin tracking; returns false if already active
    pub fn start(&mut self) -> bool {
        if self.active {
            warn!("coverage tracking already active");
            return false;
        }
        self.active = true;
        self.events = 0;
        info!(session = %self.store.session_id(), "coverage tracking started");
        true
    }

    /// Stop tracking and flush buffered counts; returns false if not active
    pub fn stop(&mut self) -> bool {
        if !self.active {
            debug!("coverage tracking already stopped");
            return false;
        }
        self.flush();
        self.active = false;
        info!(events = self.events, files = self.store.file_count(), "coverage tracking stopped");
        true
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drop all files and records; the active flag is kept
    pub fn reset(&mut self) {
        self.counters.clear();
        self.store.clear();
        self.events = 0;
        debug!("coverage data reset");
    }

    /// Register a file with the store
    pub fn register_file(&mut self, id: FileId, path: &str) -> CovResult<()> {
        self.store.register_file(id, path)
    }

    /// Count one execution of `line`
    ///
    /// Ignored when inactive, for line 0 and for unregistered files.
    #[inline]
    pub fn track(&mut self, file: FileId, line: u32) {
        if !self.active || line == 0 {
            return;
        }
        if let Some(counters) = self.counters.get_mut(&file) {
            if counters.increment(line) {
                self.events += 1;
                return;
            }
        }
        self.track_slow(file, line);
    }

    /// First touch of a file, or a line outside its counter buffer
    #[cold]
    fn track_slow(&mut self, file: FileId, line: u32) {
        let Some(source) = self.store.source_file(file) else {
            return;
        };
        let line_count = source.total_line_count;
        if line_count > 0 && line <= line_count && !self.counters.contains_key(&file) {
            let counters = self
                .counters
                .entry(file)
                .or_insert_with(|| LineCounters::new(line_count));
            let _ = counters.increment(line);
            self.events += 1;
        } else if self.store.add_execution(file, line, 1).is_ok() {
            self.events += 1;
        }
    }

    /// Count one entry into body `block`
    ///
    /// Ignored when inactive and for unregistered files, like `track`.
    pub fn enter_block(&mut self, file: FileId, block: u32) {
        if !self.active {
            return;
        }
        let _ = self.store.add_block_entry(file, block, 1);
    }

    /// Mark `line` verified, counting it as executed if it never ran
    ///
    /// Ignored when inactive and for invalid identifiers, like `track`.
    pub fn mark_covered(&mut self, file: FileId, line: u32) {
        if !self.active || line == 0 {
            return;
        }
        self.flush_file(file);
        if let Err(e) = self.store.add_coverage(file, line) {
            debug!(%file, line, error = %e, "ignored coverage mark");
        }
    }

    /// Move every buffered count into the store
    pub fn flush(&mut self) {
        for (file, counters) in &mut self.counters {
            if !counters.has_pending() {
                continue;
            }
            for (line, count) in counters.drain() {
                let _ = self.store.add_execution(*file, line, count);
            }
        }
    }

    fn flush_file(&mut self, file: FileId) {
        if let Some(counters) = self.counters.get_mut(&file) {
            for (line, count) in counters.drain() {
                let _ = self.store.add_execution(file, line, count);
            }
        }
    }

    /// Number of line events accepted since `start()`
    #[must_use]
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Records as of the last flush
    #[must_use]
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Flushed mutable access to the store
    pub fn store_mut(&mut self) -> &mut DataStore {
        self.flush();
        &mut self.store
    }

    /// Flush and hand the store over
    #[must_use]
    pub fn into_store(mut self) -> DataStore {
        self.flush();
        self.store
    }
}
