//! Line, function and block coverage for scripts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  COVTRACK COVERAGE ARCHITECTURE                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Source → Static Analyzer ─────────────────────┐                │
//! │    │                                           ▼                │
//! │    ├─► Native hook ──┐                   Patch-up / Report      │
//! │    │                 ├─► Tracker → DataStore ──▲                │
//! │    └─► Instrumenter ─┘                  │      │                │
//! │                              workers ──► merge ┘                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Analyzer**: classification is static and authoritative
//! - **Tracker**: dense per-file counters, flushed into the store
//! - **Store**: sparse records, merge is commutative and associative
//! - **Report**: integer-floor percentages, reported per metric

mod analyzer;
mod config;
mod counters;
mod engine;
mod ids;
mod instrument;
mod report;
mod store;
mod strategy;
mod tracker;

pub use analyzer::{
    BlockInfo, BlockKind, FileAnalysis, FunctionInfo, LineClassification, LineKind, StaticAnalyzer,
};
pub use config::{CoverageConfig, CoverageConfigBuilder, StrategyKind, DEFAULT_INSTRUMENT_THRESHOLD_BYTES};
pub use counters::LineCounters;
pub use engine::{CoverageEngine, FileRun, RunOutcome};
pub use ids::FileId;
pub use instrument::{Instrumenter, DEFAULT_MAX_INSTRUMENT_BYTES};
pub use report::{
    build_report, patch_up, percent, BlockReport, CoverageReport, FileCoverageSummary, FileReport,
    FunctionReport, GlobalSummary, LineReport,
};
pub use store::{DataStore, LineStatus, SourceFile, STORE_FORMAT_VERSION};
pub use strategy::{
    select_strategy, CollectionStrategy, InstrumentStrategy, NativeHookStrategy, Prepared,
    TrackerHost,
};
pub use tracker::Tracker;
