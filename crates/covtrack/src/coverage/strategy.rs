//! Collection strategies
//!
//! A strategy decides what the interpreter runs for a file and whether the
//! interpreter's own line events are counted. Either way the events land in
//! the same [`Tracker`] through [`TrackerHost`], so the rest of the engine
//! does not know which strategy produced a count.

use super::config::{CoverageConfig, StrategyKind};
use super::ids::FileId;
use super::instrument::Instrumenter;
use super::tracker::Tracker;
use crate::result::InstrumentError;
use crate::script::{parse, Chunk, ExecutionHook};

/// What to execute for a file
#[derive(Debug)]
pub enum Prepared {
    /// Run the parsed original
    Original,
    /// Run rewritten source
    Rewritten {
        /// Instrumented text
        source: String,
        /// Its parse
        chunk: Chunk,
    },
}

/// A way of collecting line execution
pub trait CollectionStrategy {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Whether the interpreter's native line hook should be counted
    fn emits_line_events(&self) -> bool;

    /// Produce what to run for `file`
    fn prepare(
        &mut self,
        file: FileId,
        source: &str,
        chunk: &Chunk,
    ) -> Result<Prepared, InstrumentError>;
}

/// Counts the interpreter's per-line callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHookStrategy;

impl CollectionStrategy for NativeHookStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Native
    }

    fn emits_line_events(&self) -> bool {
        true
    }

    fn prepare(&mut self, _: FileId, _: &str, _: &Chunk) -> Result<Prepared, InstrumentError> {
        Ok(Prepared::Original)
    }
}

/// Runs source rewritten to call `__cov_track` and `__cov_block`
#[derive(Debug, Default)]
pub struct InstrumentStrategy {
    instrumenter: Instrumenter,
}

impl InstrumentStrategy {
    /// Strategy rewriting with `instrumenter`
    #[must_use]
    pub fn new(instrumenter: Instrumenter) -> Self {
        Self { instrumenter }
    }

    /// The rewriter and its cache
    #[must_use]
    pub fn instrumenter(&self) -> &Instrumenter {
        &self.instrumenter
    }

    /// Mutable access to the rewriter
    pub fn instrumenter_mut(&mut self) -> &mut Instrumenter {
        &mut self.instrumenter
    }
}

impl CollectionStrategy for InstrumentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Instrument
    }

    fn emits_line_events(&self) -> bool {
        false
    }

    fn prepare(
        &mut self,
        file: FileId,
        source: &str,
        chunk: &Chunk,
    ) -> Result<Prepared, InstrumentError> {
        let rewritten = self.instrumenter.instrument(file, source, chunk)?;
        let chunk = parse(&rewritten).map_err(|e| InstrumentError::Reparse {
            message: e.to_string(),
        })?;
        Ok(Prepared::Rewritten {
            source: rewritten,
            chunk,
        })
    }
}

/// Resolve `Auto` for a source of `size` bytes
#[must_use]
pub fn select_strategy(config: &CoverageConfig, size: usize) -> StrategyKind {
    match config.strategy {
        StrategyKind::Auto if size > config.instrument_threshold_bytes => StrategyKind::Instrument,
        StrategyKind::Auto => StrategyKind::Native,
        fixed => fixed,
    }
}

/// Routes interpreter events for one running file into the tracker
#[derive(Debug)]
pub struct TrackerHost<'a> {
    tracker: &'a mut Tracker,
    file: FileId,
    mark_assertions: bool,
}

impl<'a> TrackerHost<'a> {
    /// Host recording native events of `file` into `tracker`
    #[must_use]
    pub fn new(tracker: &'a mut Tracker, file: FileId, mark_assertions: bool) -> Self {
        Self {
            tracker,
            file,
            mark_assertions,
        }
    }
}

impl ExecutionHook for TrackerHost<'_> {
    fn on_line(&mut self, line: u32) {
        self.tracker.track(self.file, line);
    }

    fn on_block(&mut self, block: u32) {
        self.tracker.enter_block(self.file, block);
    }

    fn on_track(&mut self, file: u32, line: u32) {
        self.tracker.track(FileId::new(file), line);
    }

    fn on_track_block(&mut self, file: u32, block: u32) {
        self.tracker.enter_block(FileId::new(file), block);
    }

    fn on_assertion(&mut self, line: u32) {
        if self.mark_assertions {
            self.tracker.mark_covered(self.file, line);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::script::{Interpreter, InterpreterOptions};

    const SRC: &str = "local n = 0\nfor i = 1, 3 do\n  n = n + i\nend\nassert(n == 6)";

    fn run_with(strategy: &mut dyn CollectionStrategy) -> Tracker {
        let mut tracker = Tracker::new();
        let id = FileId::new(1);
        tracker.register_file(id, "s.lua").unwrap();
        tracker.store_mut().set_source(id, None, 5).unwrap();
        let _ = tracker.start();

        let original = parse(SRC).unwrap();
        let prepared = strategy.prepare(id, SRC, &original).unwrap();
        let chunk = match &prepared {
            Prepared::Original => &original,
            Prepared::Rewritten { chunk, .. } => chunk,
        };
        let options = InterpreterOptions {
            line_events: strategy.emits_line_events(),
            ..InterpreterOptions::default()
        };
        {
            let mut host = TrackerHost::new(&mut tracker, id, true);
            Interpreter::new(&mut host, options).run(chunk).unwrap();
        }
        let _ = tracker.stop();
        tracker
    }

    #[test]
    fn test_strategies_agree() {
        let native = run_with(&mut NativeHookStrategy);
        let instrumented = run_with(&mut InstrumentStrategy::default());
        assert_eq!(native.store(), instrumented.store());
        assert_eq!(native.store().get_execution_count(FileId::new(1), 3), 3);
        assert_eq!(native.store().get_block_entries(FileId::new(1), 0), 3);
        assert!(native.store().is_covered(FileId::new(1), 5));
    }

    #[test]
    fn test_auto_selection() {
        let config = CoverageConfig::builder()
            .strategy(StrategyKind::Auto)
            .instrument_threshold_bytes(100)
            .build();
        assert_eq!(select_strategy(&config, 100), StrategyKind::Native);
        assert_eq!(select_strategy(&config, 101), StrategyKind::Instrument);

        let fixed = CoverageConfig::default();
        assert_eq!(select_strategy(&fixed, usize::MAX), StrategyKind::Native);
    }

    #[test]
    fn test_assertions_not_marked_when_disabled() {
        let mut tracker = Tracker::new();
        let id = FileId::new(1);
        tracker.register_file(id, "s.lua").unwrap();
        let _ = tracker.start();
        {
            let mut host = TrackerHost::new(&mut tracker, id, false);
            host.on_line(1);
            host.on_assertion(1);
        }
        let store = tracker.into_store();
        assert_eq!(store.get_execution_count(id, 1), 1);
        assert!(!store.is_covered(id, 1));
    }
}
