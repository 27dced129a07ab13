//! Coverage Data Store
//!
//! Owns the file map plus the sparse execution, body-entry and coverage
//! records of one tracking session. Stores produced by separate worker processes are
//! combined with [`DataStore::merge`]; the merge is commutative and
//! associative, so workers can be folded in any order.
//!
//! Every mutating operation validates first and mutates second: an error
//! leaves the store untouched.

use super::analyzer::FileAnalysis;
use super::ids::FileId;
use super::report::{self, FileCoverageSummary, FileReport, GlobalSummary};
use crate::result::{CovError, CovResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Version of the serialized store layout
pub const STORE_FORMAT_VERSION: u32 = 1;

/// A registered source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Stable identifier
    pub id: FileId,
    /// Path as registered
    pub path: String,
    /// Cached source text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Number of lines, 0 while unknown
    pub total_line_count: u32,
}

/// Derived state of one line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    /// Never executed
    NotCovered,
    /// Executed but never verified
    Executed,
    /// Executed and verified
    Covered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FileRecord {
    source: SourceFile,
    /// Sparse `line -> count`; only positive counts are stored
    #[serde(default)]
    executions: BTreeMap<u32, u64>,
    /// Lines marked covered; always a subset of `executions` keys
    #[serde(default)]
    covered: BTreeSet<u32>,
    /// Sparse `body id -> entries`; only positive counts are stored
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    blocks: BTreeMap<u32, u64>,
}

impl FileRecord {
    fn new(id: FileId, path: &str) -> Self {
        Self {
            source: SourceFile {
                id,
                path: path.to_string(),
                content: None,
                total_line_count: 0,
            },
            executions: BTreeMap::new(),
            covered: BTreeSet::new(),
            blocks: BTreeMap::new(),
        }
    }

    fn check_line(&self, line: u32) -> CovResult<()> {
        if line == 0 {
            return Err(CovError::validation(format!(
                "line numbers start at 1 (file {})",
                self.source.path
            )));
        }
        let total = self.source.total_line_count;
        if total > 0 && line > total {
            return Err(CovError::validation(format!(
                "line {line} is past the end of {} ({total} lines)",
                self.source.path
            )));
        }
        Ok(())
    }
}

/// Serialized layout
#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    files: Vec<FileRecord>,
}

/// Execution and coverage records for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoreFile", into = "StoreFile")]
pub struct DataStore {
    session_id: Uuid,
    created_at: DateTime<Utc>,
    files: BTreeMap<FileId, FileRecord>,
    paths: BTreeMap<String, FileId>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Session id and timestamp do not take part in equality
impl PartialEq for DataStore {
    fn eq(&self, other: &Self) -> bool {
        self.files == other.files
    }
}

impl Eq for DataStore {}

impl DataStore {
    /// Create an empty store with a fresh session id
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            files: BTreeMap::new(),
            paths: BTreeMap::new(),
        }
    }

    /// Session this store was created for
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Creation time of the session
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Drop all files and records
    pub fn clear(&mut self) {
        self.files.clear();
        self.paths.clear();
    }

    /// No file is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of registered files
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    // =========================================================================
    // File map
    // =========================================================================

    /// Register `path` under `id`
    ///
    /// Registering the same pair again is a no-op; reusing either side with a
    /// different partner is a validation error.
    pub fn register_file(&mut self, id: FileId, path: &str) -> CovResult<()> {
        if path.is_empty() {
            return Err(CovError::validation("file path must not be empty"));
        }
        if let Some(existing) = self.files.get(&id) {
            if existing.source.path == path {
                return Ok(());
            }
            return Err(CovError::validation(format!(
                "file id {id} is already registered to {}, cannot register {path}",
                existing.source.path
            )));
        }
        if let Some(existing) = self.paths.get(path) {
            return Err(CovError::validation(format!(
                "{path} is already registered as file {existing}, cannot register it as {id}"
            )));
        }

        let _ = self.files.insert(id, FileRecord::new(id, path));
        let _ = self.paths.insert(path.to_string(), id);
        debug!(%id, path, "registered file");
        Ok(())
    }

    /// Id for `path`, registering it under the next free id when unknown
    pub fn register_path(&mut self, path: &str) -> CovResult<FileId> {
        if let Some(id) = self.paths.get(path) {
            return Ok(*id);
        }
        let id = self
            .files
            .keys()
            .next_back()
            .map_or(FileId::new(1), |last| last.next());
        self.register_file(id, path)?;
        Ok(id)
    }

    /// Register `path` if needed and attach its source in one step
    ///
    /// Nothing is registered when the source cannot be attached.
    pub fn register_source(
        &mut self,
        path: &str,
        content: Option<String>,
        line_count: u32,
    ) -> CovResult<FileId> {
        if let Some(id) = self.file_id(path) {
            self.set_source(id, content, line_count)?;
            return Ok(id);
        }
        let id = self
            .files
            .keys()
            .next_back()
            .map_or(FileId::new(1), |last| last.next());
        let mut record = FileRecord::new(id, path);
        record.source.content = content;
        record.source.total_line_count = line_count;
        self.register_file(id, path)?;
        let _ = self.files.insert(id, record);
        Ok(id)
    }

    /// Attach the line count and optionally the text of a registered file
    pub fn set_source(&mut self, id: FileId, content: Option<String>, line_count: u32) -> CovResult<()> {
        let record = self.record_mut(id)?;
        if let Some(max) = record.executions.keys().next_back() {
            if line_count < *max {
                return Err(CovError::validation(format!(
                    "{} already has executions on line {max}, cannot shrink it to {line_count} lines",
                    record.source.path
                )));
            }
        }
        record.source.content = content;
        record.source.total_line_count = line_count;
        Ok(())
    }

    /// Path registered for `id`
    #[must_use]
    pub fn path(&self, id: FileId) -> Option<&str> {
        self.files.get(&id).map(|r| r.source.path.as_str())
    }

    /// Id registered for `path`
    #[must_use]
    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.paths.get(path).copied()
    }

    /// Registration details of `id`
    #[must_use]
    pub fn source_file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(&id).map(|r| &r.source)
    }

    /// Registered files in id order
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values().map(|r| &r.source)
    }

    /// Whether `id` is registered
    #[must_use]
    pub fn contains(&self, id: FileId) -> bool {
        self.files.contains_key(&id)
    }

    fn record_mut(&mut self, id: FileId) -> CovResult<&mut FileRecord> {
        self.files
            .get_mut(&id)
            .ok_or_else(|| CovError::validation(format!("file {id} is not registered")))
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Add `count` executions of `line`
    pub fn add_execution(&mut self, id: FileId, line: u32, count: u64) -> CovResult<()> {
        let record = self.record_mut(id)?;
        record.check_line(line)?;
        if count > 0 {
            *record.executions.entry(line).or_insert(0) += count;
        }
        Ok(())
    }

    /// Mark `line` covered; a line that never ran is counted as executed once
    pub fn add_coverage(&mut self, id: FileId, line: u32) -> CovResult<()> {
        let record = self.record_mut(id)?;
        record.check_line(line)?;
        let count = record.executions.entry(line).or_insert(0);
        if *count == 0 {
            *count = 1;
        }
        let _ = record.covered.insert(line);
        Ok(())
    }

    /// Add `count` entries into body `block`
    pub fn add_block_entry(&mut self, id: FileId, block: u32, count: u64) -> CovResult<()> {
        let record = self.record_mut(id)?;
        if count > 0 {
            *record.blocks.entry(block).or_insert(0) += count;
        }
        Ok(())
    }

    /// Times `line` ran, 0 when unknown
    #[must_use]
    pub fn get_execution_count(&self, id: FileId, line: u32) -> u64 {
        self.files
            .get(&id)
            .and_then(|r| r.executions.get(&line))
            .copied()
            .unwrap_or(0)
    }

    /// Times body `block` was entered, 0 when unknown
    #[must_use]
    pub fn get_block_entries(&self, id: FileId, block: u32) -> u64 {
        self.files
            .get(&id)
            .and_then(|r| r.blocks.get(&block))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `line` was verified by an assertion
    #[must_use]
    pub fn is_covered(&self, id: FileId, line: u32) -> bool {
        self.files
            .get(&id)
            .is_some_and(|r| r.covered.contains(&line))
    }

    /// Derived status of `line`
    #[must_use]
    pub fn get_line_status(&self, id: FileId, line: u32) -> LineStatus {
        if self.is_covered(id, line) {
            LineStatus::Covered
        } else if self.get_execution_count(id, line) > 0 {
            LineStatus::Executed
        } else {
            LineStatus::NotCovered
        }
    }

    /// Executed lines with their counts, ascending
    pub fn executions(&self, id: FileId) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.files
            .get(&id)
            .into_iter()
            .flat_map(|r| r.executions.iter().map(|(l, c)| (*l, *c)))
    }

    /// Entered bodies with their counts, ascending by id
    pub fn block_entries(&self, id: FileId) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.files
            .get(&id)
            .into_iter()
            .flat_map(|r| r.blocks.iter().map(|(b, c)| (*b, *c)))
    }

    /// Covered lines, ascending
    pub fn covered_lines(&self, id: FileId) -> impl Iterator<Item = u32> + '_ {
        self.files
            .get(&id)
            .into_iter()
            .flat_map(|r| r.covered.iter().copied())
    }

    /// Drop every record on lines `keep` rejects; returns how many lines lost signal
    pub(crate) fn retain_lines(&mut self, id: FileId, keep: impl Fn(u32) -> bool) -> usize {
        let Some(record) = self.files.get_mut(&id) else {
            return 0;
        };
        let before = record.executions.len();
        record.executions.retain(|line, _| keep(*line));
        record.covered.retain(|line| keep(*line));
        before - record.executions.len()
    }

    /// Drop entries of bodies `keep` rejects; returns how many were dropped
    pub(crate) fn retain_blocks(&mut self, id: FileId, keep: impl Fn(u32) -> bool) -> usize {
        let Some(record) = self.files.get_mut(&id) else {
            return 0;
        };
        let before = record.blocks.len();
        record.blocks.retain(|block, _| keep(*block));
        before - record.blocks.len()
    }

    /// Per-line detail for one file, using the static classification when given
    #[must_use]
    pub fn get_file_data(&self, id: FileId, analysis: Option<&FileAnalysis>) -> Option<FileReport> {
        self.source_file(id)
            .map(|source| report::file_report(self, source, analysis))
    }

    /// Summary for one file
    #[must_use]
    pub fn calculate_summary(
        &self,
        id: FileId,
        analysis: Option<&FileAnalysis>,
    ) -> Option<FileCoverageSummary> {
        self.get_file_data(id, analysis).map(|f| f.summary)
    }

    /// Summary over every registered file
    #[must_use]
    pub fn calculate_global_summary(&self, analyses: &BTreeMap<FileId, FileAnalysis>) -> GlobalSummary {
        report::build_report(self, analyses).summary
    }

    // =========================================================================
    // Merge
    // =========================================================================

    /// Combine two stores into a new one
    pub fn merge(a: &Self, b: &Self) -> CovResult<Self> {
        let mut merged = a.clone();
        merged.session_id = Uuid::new_v4();
        merged.created_at = Utc::now();
        merged.merge_from(b)?;
        Ok(merged)
    }

    /// Combine any number of stores
    pub fn merge_all<'a, I>(stores: I) -> CovResult<Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut merged = Self::new();
        let mut count = 0usize;
        for store in stores {
            merged.merge_from(store)?;
            count += 1;
        }
        info!(stores = count, files = merged.file_count(), "merged coverage stores");
        Ok(merged)
    }

    /// Fold `other` into this store
    ///
    /// Line and body counts are summed, coverage is OR-ed, line counts take
    /// the maximum and cached content survives only when both sides hold the
    /// same text.
    pub fn merge_from(&mut self, other: &Self) -> CovResult<()> {
        for (id, theirs) in &other.files {
            let path = theirs.source.path.as_str();
            match (self.files.get(id), self.paths.get(path)) {
                (Some(ours), _) if ours.source.path != path => {
                    return Err(CovError::validation(format!(
                        "merge conflict: file {id} is {} in one store and {path} in the other",
                        ours.source.path
                    )));
                }
                (None, Some(other_id)) => {
                    return Err(CovError::validation(format!(
                        "merge conflict: {path} is file {other_id} in one store and {id} in the other"
                    )));
                }
                _ => {}
            }
        }

        for (id, theirs) in &other.files {
            let first_seen = !self.files.contains_key(id);
            let ours = self
                .files
                .entry(*id)
                .or_insert_with(|| theirs.clone());
            if first_seen {
                let _ = self.paths.insert(theirs.source.path.clone(), *id);
                continue;
            }

            for (line, count) in &theirs.executions {
                *ours.executions.entry(*line).or_insert(0) += count;
            }
            for (block, count) in &theirs.blocks {
                *ours.blocks.entry(*block).or_insert(0) += count;
            }
            ours.covered.extend(theirs.covered.iter().copied());
            ours.source.total_line_count = ours
                .source
                .total_line_count
                .max(theirs.source.total_line_count);
            if ours.source.content != theirs.source.content {
                ours.source.content = None;
            }
        }
        debug!(files = other.files.len(), "merged store");
        Ok(())
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Pretty JSON in the versioned store layout
    pub fn to_json(&self) -> CovResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate JSON written by [`DataStore::to_json`]
    pub fn from_json(json: &str) -> CovResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the store to `path` as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> CovResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), files = self.file_count(), "saved coverage store");
        Ok(())
    }

    /// Read a store written by [`DataStore::save`]
    pub fn load(path: impl AsRef<Path>) -> CovResult<Self> {
        let path = path.as_ref();
        let store = Self::from_json(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), files = store.file_count(), "loaded coverage store");
        Ok(store)
    }
}

impl From<DataStore> for StoreFile {
    fn from(store: DataStore) -> Self {
        Self {
            version: STORE_FORMAT_VERSION,
            session_id: store.session_id,
            created_at: store.created_at,
            files: store.files.into_values().collect(),
        }
    }
}

impl TryFrom<StoreFile> for DataStore {
    type Error = CovError;

    fn try_from(file: StoreFile) -> CovResult<Self> {
        if file.version != STORE_FORMAT_VERSION {
            return Err(CovError::validation(format!(
                "unsupported store format version {} (expected {STORE_FORMAT_VERSION})",
                file.version
            )));
        }

        let mut store = Self {
            session_id: file.session_id,
            created_at: file.created_at,
            files: BTreeMap::new(),
            paths: BTreeMap::new(),
        };
        for mut record in file.files {
            let id = record.source.id;
            if store.files.contains_key(&id) {
                return Err(CovError::validation(format!("file {id} appears twice")));
            }
            store.register_file(id, &record.source.path)?;
            for line in record.executions.keys().chain(record.covered.iter()) {
                record.check_line(*line)?;
            }
            record.executions.retain(|_, count| *count > 0);
            record.blocks.retain(|_, count| *count > 0);
            for line in &record.covered {
                let count = record.executions.entry(*line).or_insert(0);
                if *count == 0 {
                    *count = 1;
                }
            }
            let _ = store.files.insert(id, record);
        }
        Ok(store)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn store_with(path: &str, id: u32) -> DataStore {
        let mut s = DataStore::new();
        s.register_file(FileId::new(id), path).unwrap();
        s
    }

    mod registration_tests {
        use super::*;

        #[test]
        fn test_round_trip_lookup() {
            let s = store_with("src/a.lua", 7);
            assert_eq!(s.path(FileId::new(7)), Some("src/a.lua"));
            assert_eq!(s.file_id("src/a.lua"), Some(FileId::new(7)));
        }

        #[test]
        fn test_register_same_pair_is_idempotent() {
            let mut s = store_with("a.lua", 1);
            s.register_file(FileId::new(1), "a.lua").unwrap();
            assert_eq!(s.file_count(), 1);
        }

        #[test]
        fn test_register_conflicts_are_validation_errors() {
            let mut s = store_with("a.lua", 1);
            assert!(s.register_file(FileId::new(1), "b.lua").unwrap_err().is_validation());
            assert!(s.register_file(FileId::new(2), "a.lua").unwrap_err().is_validation());
            assert_eq!(s.file_count(), 1);
        }

        #[test]
        fn test_register_path_assigns_next_id() {
            let mut s = DataStore::new();
            let a = s.register_path("a.lua").unwrap();
            let b = s.register_path("b.lua").unwrap();
            assert_eq!(a, FileId::new(1));
            assert_eq!(b, FileId::new(2));
            assert_eq!(s.register_path("a.lua").unwrap(), a);
        }

        #[test]
        fn test_empty_path_rejected() {
            let mut s = DataStore::new();
            assert!(s.register_file(FileId::new(1), "").is_err());
            assert!(s.register_source("", None, 3).is_err());
            assert!(s.is_empty());
        }

        #[test]
        fn test_register_source_sets_line_count() {
            let mut s = DataStore::new();
            let id = s.register_source("a.lua", Some("x()".into()), 1).unwrap();
            assert_eq!(s.source_file(id).unwrap().total_line_count, 1);
            assert_eq!(s.register_source("a.lua", None, 4).unwrap(), id);
            assert_eq!(s.source_file(id).unwrap().total_line_count, 4);
            assert_eq!(s.source_file(id).unwrap().content, None);
        }

        #[test]
        fn test_register_source_failure_changes_nothing() {
            let mut s = DataStore::new();
            let id = s.register_source("a.lua", Some("a()\nb()\nc()".into()), 3).unwrap();
            s.add_execution(id, 3, 1).unwrap();
            let before = s.clone();
            assert!(s.register_source("a.lua", Some("a()".into()), 1).unwrap_err().is_validation());
            assert_eq!(s, before);
            assert_eq!(s.source_file(id).unwrap().content.as_deref(), Some("a()\nb()\nc()"));
        }
    }

    mod record_tests {
        use super::*;

        #[test]
        fn test_add_execution_accumulates() {
            let mut s = store_with("a.lua", 1);
            let id = FileId::new(1);
            s.add_execution(id, 3, 1).unwrap();
            s.add_execution(id, 3, 4).unwrap();
            assert_eq!(s.get_execution_count(id, 3), 5);
            assert_eq!(s.get_line_status(id, 3), LineStatus::Executed);
            assert_eq!(s.get_line_status(id, 4), LineStatus::NotCovered);
        }

        #[test]
        fn test_add_coverage_implies_execution() {
            let mut s = store_with("a.lua", 1);
            let id = FileId::new(1);
            s.add_coverage(id, 2).unwrap();
            assert_eq!(s.get_execution_count(id, 2), 1);
            assert!(s.is_covered(id, 2));
            assert_eq!(s.get_line_status(id, 2), LineStatus::Covered);

            s.add_execution(id, 5, 3).unwrap();
            s.add_coverage(id, 5).unwrap();
            assert_eq!(s.get_execution_count(id, 5), 3);
        }

        #[test]
        fn test_invalid_input_leaves_store_unchanged() {
            let mut s = store_with("a.lua", 1);
            let before = s.clone();
            assert!(s.add_execution(FileId::new(9), 1, 1).unwrap_err().is_validation());
            assert!(s.add_execution(FileId::new(1), 0, 1).unwrap_err().is_validation());
            assert!(s.add_coverage(FileId::new(1), 0).unwrap_err().is_validation());
            assert_eq!(s, before);
        }

        #[test]
        fn test_lines_past_known_end_rejected() {
            let mut s = store_with("a.lua", 1);
            s.set_source(FileId::new(1), None, 3).unwrap();
            assert!(s.add_execution(FileId::new(1), 4, 1).is_err());
            assert!(s.add_execution(FileId::new(1), 3, 1).is_ok());
            assert!(s.set_source(FileId::new(1), None, 2).is_err());
        }

        #[test]
        fn test_block_entries_accumulate_per_body() {
            let mut s = store_with("a.lua", 1);
            let id = FileId::new(1);
            s.add_block_entry(id, 0, 2).unwrap();
            s.add_block_entry(id, 0, 1).unwrap();
            s.add_block_entry(id, 3, 0).unwrap();
            assert_eq!(s.get_block_entries(id, 0), 3);
            assert_eq!(s.get_block_entries(id, 3), 0);
            assert_eq!(s.block_entries(id).collect::<Vec<_>>(), vec![(0, 3)]);
            assert!(s.add_block_entry(FileId::new(2), 0, 1).unwrap_err().is_validation());
            assert_eq!(s.retain_blocks(id, |b| b != 0), 1);
            assert_eq!(s.get_block_entries(id, 0), 0);
        }

        #[test]
        fn test_retain_lines_strips_both_records() {
            let mut s = store_with("a.lua", 1);
            let id = FileId::new(1);
            s.add_coverage(id, 1).unwrap();
            s.add_coverage(id, 2).unwrap();
            s.add_execution(id, 3, 1).unwrap();
            assert_eq!(s.retain_lines(id, |l| l != 2), 1);
            assert!(!s.is_covered(id, 2));
            assert_eq!(s.get_execution_count(id, 2), 0);
            assert!(s.is_covered(id, 1));
        }
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn test_merge_sums_and_ors() {
            let id = FileId::new(1);
            let mut a = store_with("a.lua", 1);
            a.add_execution(id, 1, 2).unwrap();
            a.add_coverage(id, 2).unwrap();
            let mut b = store_with("a.lua", 1);
            b.add_execution(id, 1, 3).unwrap();
            b.add_execution(id, 4, 1).unwrap();

            a.add_block_entry(id, 0, 1).unwrap();
            b.add_block_entry(id, 0, 2).unwrap();
            b.add_block_entry(id, 1, 1).unwrap();

            let c = DataStore::merge(&a, &b).unwrap();
            assert_eq!(c.get_block_entries(id, 0), 3);
            assert_eq!(c.get_block_entries(id, 1), 1);
            assert_eq!(c.get_execution_count(id, 1), 5);
            assert_eq!(c.get_execution_count(id, 4), 1);
            assert!(c.is_covered(id, 2));
            assert_ne!(c.session_id(), a.session_id());
        }

        #[test]
        fn test_merge_unions_file_maps() {
            let a = store_with("a.lua", 1);
            let b = store_with("b.lua", 2);
            let c = DataStore::merge(&a, &b).unwrap();
            assert_eq!(c.file_count(), 2);
            assert_eq!(c.file_id("b.lua"), Some(FileId::new(2)));
        }

        #[test]
        fn test_merge_conflicts_are_errors() {
            let a = store_with("a.lua", 1);
            let b = store_with("b.lua", 1);
            assert!(DataStore::merge(&a, &b).unwrap_err().is_validation());
            let c = store_with("a.lua", 2);
            assert!(DataStore::merge(&a, &c).unwrap_err().is_validation());
        }

        #[test]
        fn test_merge_conflict_does_not_partially_apply() {
            let mut a = store_with("a.lua", 1);
            let mut b = store_with("a.lua", 1);
            b.add_execution(FileId::new(1), 1, 1).unwrap();
            b.register_file(FileId::new(2), "c.lua").unwrap();
            a.register_file(FileId::new(2), "d.lua").unwrap();
            let before = a.clone();
            assert!(a.merge_from(&b).is_err());
            assert_eq!(a, before);
        }

        #[test]
        fn test_merge_content_and_line_counts() {
            let id = FileId::new(1);
            let mut a = store_with("a.lua", 1);
            a.set_source(id, Some("x = 1".into()), 1).unwrap();
            let mut b = store_with("a.lua", 1);
            b.set_source(id, Some("x = 1\ny = 2".into()), 2).unwrap();
            let c = DataStore::merge(&a, &b).unwrap();
            let source = c.source_file(id).unwrap();
            assert_eq!(source.total_line_count, 2);
            assert_eq!(source.content, None);

            let same = DataStore::merge(&a, &a).unwrap();
            assert_eq!(same.source_file(id).unwrap().content.as_deref(), Some("x = 1"));
        }

        #[test]
        fn test_merge_all_of_nothing_is_empty() {
            let merged = DataStore::merge_all(std::iter::empty()).unwrap();
            assert!(merged.is_empty());
        }
    }

    mod serialization_tests {
        use super::*;

        #[test]
        fn test_json_preserves_records_and_session() {
            let id = FileId::new(3);
            let mut s = store_with("lib/x.lua", 3);
            s.set_source(id, Some("a()\nb()".into()), 2).unwrap();
            s.add_execution(id, 1, 4).unwrap();
            s.add_coverage(id, 2).unwrap();
            s.add_block_entry(id, 0, 2).unwrap();

            let json = s.to_json().unwrap();
            assert!(json.contains("\"version\": 1"));
            let back = DataStore::from_json(&json).unwrap();
            assert_eq!(back, s);
            assert_eq!(back.session_id(), s.session_id());
            assert_eq!(back.file_id("lib/x.lua"), Some(id));
            assert_eq!(back.get_block_entries(id, 0), 2);
        }

        #[test]
        fn test_stores_without_block_records_load() {
            let mut s = store_with("a.lua", 1);
            s.add_execution(FileId::new(1), 1, 1).unwrap();
            let json = s.to_json().unwrap();
            assert!(!json.contains("\"blocks\""));
            let back = DataStore::from_json(&json).unwrap();
            assert_eq!(back.block_entries(FileId::new(1)).count(), 0);
        }

        #[test]
        fn test_unknown_version_rejected() {
            let s = store_with("a.lua", 1);
            let json = s.to_json().unwrap().replace("\"version\": 1", "\"version\": 99");
            assert!(DataStore::from_json(&json).is_err());
        }

        #[test]
        fn test_duplicate_paths_rejected_on_load() {
            let mut s = store_with("a.lua", 1);
            s.register_file(FileId::new(2), "b.lua").unwrap();
            let json = s.to_json().unwrap().replace("b.lua", "a.lua");
            assert!(DataStore::from_json(&json).is_err());
        }

        #[test]
        fn test_save_and_load() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            let mut s = store_with("a.lua", 1);
            s.add_execution(FileId::new(1), 2, 2).unwrap();
            s.save(&path).unwrap();
            assert_eq!(DataStore::load(&path).unwrap(), s);
        }
    }
}
