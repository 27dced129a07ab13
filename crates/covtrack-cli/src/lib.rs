//! Covtrack CLI Library
//!
//! Command-line interface for the Covtrack coverage engine.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
mod runner;

pub use commands::{
    AnalyzeArgs, Cli, ColorArg, Commands, MergeArgs, ReportArgs, ReportFormat, RunArgs,
    StrategyArg,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_analysis, render_report, ReportLine, Reporter};
pub use runner::{analyses_for, coverage_config, discover_scripts, CoverageRunner, RunOutput};
