//! Coverage engine facade
//!
//! Ties the pieces together for a test runner: load and analyze sources,
//! run them under the configured strategy, and produce the patched-up
//! report. One failing file never stops the others.
//!
//! Scripts run on a scoped thread whose stack is sized for the configured
//! call depth, so deep recursion ends in a runtime error instead of a
//! native stack overflow.

use super::analyzer::{FileAnalysis, StaticAnalyzer};
use super::config::{CoverageConfig, StrategyKind};
use super::ids::FileId;
use super::instrument::Instrumenter;
use super::report::{build_report, patch_up, CoverageReport};
use super::store::DataStore;
use super::strategy::{
    select_strategy, CollectionStrategy, InstrumentStrategy, NativeHookStrategy, Prepared,
    TrackerHost,
};
use super::tracker::Tracker;
use crate::result::{CovError, CovResult, InstrumentError};
use crate::script::{line_count, parse, stack_size, Chunk, Interpreter, InterpreterOptions};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// A source file known to the engine
#[derive(Debug)]
struct LoadedFile {
    source: String,
    /// Parse of `source`, or the parse failure
    chunk: CovResult<Chunk>,
}

/// Result of running one file
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// File that ran
    pub id: FileId,
    /// Strategy that actually collected execution
    pub strategy: StrategyKind,
    /// Why instrumentation was abandoned, when it was
    pub fallback: Option<InstrumentError>,
    /// Lines written by `print`
    pub output: Vec<String>,
}

/// Result of one entry of [`CoverageEngine::run_files`]
#[derive(Debug)]
pub struct FileRun {
    /// Path as given
    pub path: String,
    /// Outcome or the error that stopped this file
    pub result: CovResult<RunOutcome>,
}

/// Coverage engine for one process
#[derive(Debug)]
pub struct CoverageEngine {
    config: CoverageConfig,
    tracker: Tracker,
    native: NativeHookStrategy,
    instrument: InstrumentStrategy,
    files: BTreeMap<FileId, LoadedFile>,
    analyses: BTreeMap<FileId, FileAnalysis>,
    /// Analyses keyed by SHA-256 of the source text
    analysis_cache: HashMap<[u8; 32], FileAnalysis>,
}

impl Default for CoverageEngine {
    fn default() -> Self {
        Self::new(CoverageConfig::default())
    }
}

impl CoverageEngine {
    /// Create an engine with the given configuration
    #[must_use]
    pub fn new(config: CoverageConfig) -> Self {
        let mut instrumenter = Instrumenter::new(config.max_instrument_bytes);
        instrumenter.set_cache_enabled(config.cache_instrumented);
        Self {
            config,
            tracker: Tracker::new(),
            native: NativeHookStrategy,
            instrument: InstrumentStrategy::new(instrumenter),
            files: BTreeMap::new(),
            analyses: BTreeMap::new(),
            analysis_cache: HashMap::new(),
        }
    }

    /// Configuration the engine was built with
    #[must_use]
    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Begin collecting; returns false if already collecting
    pub fn start(&mut self) -> bool {
        self.tracker.start()
    }

    /// Stop collecting and flush; returns false if not collecting
    pub fn stop(&mut self) -> bool {
        self.tracker.stop()
    }

    /// Whether collection is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tracker.is_active()
    }

    /// Forget all files, analyses and records
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.files.clear();
        self.analyses.clear();
    }

    /// Drop cached instrumentation output
    pub fn clear_instrumentation_cache(&mut self) {
        self.instrument.instrumenter_mut().clear_cache();
    }

    /// Read, register and analyze a file from disk
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> CovResult<FileId> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        self.register_source(&path.to_string_lossy(), source)
    }

    /// Register and analyze source text under `path`
    ///
    /// A parse failure is not an error here: the file stays registered and
    /// is reported in degraded mode. A store error leaves the engine as it
    /// was.
    pub fn register_source(&mut self, path: &str, source: String) -> CovResult<FileId> {
        let content = self.config.cache_content.then(|| source.clone());
        let id = self
            .tracker
            .store_mut()
            .register_source(path, content, line_count(&source))?;

        let chunk = parse(&source);
        match &chunk {
            Ok(chunk) => {
                let analysis = self.analyze_cached(&source, chunk);
                let _ = self.analyses.insert(id, analysis);
            }
            Err(e) => {
                warn!(path, error = %e, "static analysis failed, reporting without classification");
                let _ = self.analyses.remove(&id);
            }
        }
        let _ = self.files.insert(id, LoadedFile { source, chunk });
        debug!(path, %id, "registered source");
        Ok(id)
    }

    fn analyze_cached(&mut self, source: &str, chunk: &Chunk) -> FileAnalysis {
        let key: [u8; 32] = Sha256::digest(source.as_bytes()).into();
        self.analysis_cache
            .entry(key)
            .or_insert_with(|| StaticAnalyzer::analyze(chunk))
            .clone()
    }

    /// Run a registered file under the configured strategy
    pub fn run_file(&mut self, id: FileId) -> CovResult<RunOutcome> {
        let file = self
            .files
            .get(&id)
            .ok_or_else(|| CovError::validation(format!("file {id} is not loaded")))?;
        let original = match &file.chunk {
            Ok(chunk) => chunk,
            Err(CovError::Parse { line, message }) => {
                return Err(CovError::parse(*line, message.clone()));
            }
            Err(e) => return Err(CovError::invalid_state(e.to_string())),
        };

        let wanted = select_strategy(&self.config, file.source.len());
        let mut fallback = None;
        let prepared = if wanted == StrategyKind::Instrument {
            match self.instrument.prepare(id, &file.source, original) {
                Ok(prepared) => Some(prepared),
                Err(e) => {
                    warn!(%id, error = %e, "instrumentation failed, falling back to native tracking");
                    fallback = Some(e);
                    None
                }
            }
        } else {
            None
        };

        let (chunk, strategy): (&Chunk, &dyn CollectionStrategy) = match &prepared {
            Some(Prepared::Rewritten { chunk, .. }) => (chunk, &self.instrument),
            Some(Prepared::Original) | None => (original, &self.native),
        };
        let kind = strategy.kind();
        debug!(%id, strategy = ?kind, "running file");

        let options = InterpreterOptions {
            line_events: strategy.emits_line_events(),
            max_call_depth: self.config.max_call_depth,
        };
        let mark_assertions = self.config.mark_assertions;
        let tracker = &mut self.tracker;
        let (result, output) = std::thread::scope(|scope| {
            std::thread::Builder::new()
                .name(format!("covtrack-run-{id}"))
                .stack_size(stack_size(options.max_call_depth))
                .spawn_scoped(scope, move || {
                    let mut host = TrackerHost::new(tracker, id, mark_assertions);
                    let mut interpreter = Interpreter::new(&mut host, options);
                    let result = interpreter.run(chunk).map(|_| ());
                    (result, interpreter.take_output())
                })?
                .join()
                .map_err(|_| CovError::invalid_state(format!("interpreter thread for file {id} panicked")))
        })?;
        result?;

        Ok(RunOutcome {
            id,
            strategy: kind,
            fallback,
            output,
        })
    }

    /// Load and run each path in order; failures are collected, not raised
    pub fn run_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Vec<FileRun> {
        let mut runs = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let result = self.load_file(path).and_then(|id| self.run_file(id));
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "coverage run failed for file");
            }
            runs.push(FileRun {
                path: path.to_string_lossy().into_owned(),
                result,
            });
        }
        let failed = runs.iter().filter(|r| r.result.is_err()).count();
        info!(files = runs.len(), failed, "coverage run finished");
        runs
    }

    /// Mark a line verified
    pub fn mark_covered(&mut self, id: FileId, line: u32) {
        self.tracker.mark_covered(id, line);
    }

    /// Static analysis of a registered file, if it parsed
    #[must_use]
    pub fn analysis(&self, id: FileId) -> Option<&FileAnalysis> {
        self.analyses.get(&id)
    }

    /// Analyses of every registered file that parsed
    #[must_use]
    pub fn analyses(&self) -> &BTreeMap<FileId, FileAnalysis> {
        &self.analyses
    }

    /// Fold a store from another worker into this one
    pub fn merge_store(&mut self, other: &DataStore) -> CovResult<()> {
        self.tracker.store_mut().merge_from(other)
    }

    /// Flush, patch up and build the report
    pub fn report(&mut self) -> CoverageReport {
        let store = self.tracker.store_mut();
        let _ = patch_up(store, &self.analyses);
        build_report(store, &self.analyses)
    }

    /// Flushed view of the records
    pub fn store(&mut self) -> &DataStore {
        self.tracker.store_mut()
    }

    /// Flush, patch up and hand the store over
    #[must_use]
    pub fn into_store(mut self) -> DataStore {
        let _ = patch_up(self.tracker.store_mut(), &self.analyses);
        self.tracker.into_store()
    }
}
