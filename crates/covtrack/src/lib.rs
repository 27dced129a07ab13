//! Covtrack: line, function and block coverage for a scripting test runner
//!
//! Scripts are analyzed statically, executed under a collection strategy
//! (the interpreter's line hook or source rewritten to call a tracking
//! function), recorded per line, merged across worker processes and
//! summarized.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    COVTRACK Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Script     │    │ Coverage   │    │ DataStore  │            │
//! │   │ (lexer,    │───►│ Engine     │───►│ (merge,    │            │
//! │   │  interp)   │    │ (strategy) │    │  report)   │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use covtrack::{CoverageEngine, LineStatus};
//!
//! let mut engine = CoverageEngine::default();
//! let id = engine
//!     .register_source("sum.lua", "local function sum(a, b)\n  return a + b\nend\nprint(sum(1, 2))\n".into())
//!     .unwrap();
//! engine.start();
//! engine.run_file(id).unwrap();
//! engine.stop();
//!
//! assert_eq!(engine.store().get_line_status(id, 2), LineStatus::Executed);
//! let report = engine.report();
//! assert_eq!(report.summary.execution_coverage_percent, 100);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod coverage;
mod result;

#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn
)]
pub mod script;
mod shard;

pub use coverage::{
    build_report, patch_up, percent, select_strategy, BlockInfo, BlockKind, BlockReport,
    CollectionStrategy, CoverageConfig, CoverageConfigBuilder, CoverageEngine, CoverageReport,
    DataStore, FileAnalysis, FileCoverageSummary, FileId, FileReport, FileRun, FunctionInfo,
    FunctionReport, GlobalSummary, InstrumentStrategy, Instrumenter, LineClassification,
    LineCounters, LineKind, LineReport, LineStatus, NativeHookStrategy, Prepared, RunOutcome,
    SourceFile, StaticAnalyzer, StrategyKind, Tracker, TrackerHost,
    DEFAULT_INSTRUMENT_THRESHOLD_BYTES, DEFAULT_MAX_INSTRUMENT_BYTES, STORE_FORMAT_VERSION,
};
pub use result::{CovError, CovResult, InstrumentError};
pub use shard::{ShardConfig, ShardParseError};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::coverage::*;
    pub use super::result::*;
    pub use super::shard::*;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod prelude_tests {
        use crate::prelude::*;

        #[test]
        fn test_prelude_covers_common_flow() {
            let mut engine = CoverageEngine::new(CoverageConfig::default());
            let id = engine.register_source("p.lua", "local a = 1".to_string()).unwrap();
            let _ = engine.start();
            let _ = engine.run_file(id).unwrap();
            let shard = ShardConfig::default();
            assert!(shard.is_whole());
            let err: CovResult<()> = Err(CovError::validation("x"));
            assert!(err.is_err());
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_instrument_error_converts() {
            let err: CovError = InstrumentError::FileTooLarge { size: 10, limit: 5 }.into();
            assert!(err.to_string().contains("10"));
        }
    }
}
