//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use covtrack::{ShardConfig, StrategyKind};
use std::path::PathBuf;

/// Covtrack: line, function and block coverage for scripts
#[derive(Parser, Debug)]
#[command(name = "covtrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run scripts under coverage
    Run(RunArgs),

    /// Merge serialized coverage stores
    Merge(MergeArgs),

    /// Print the coverage report of a serialized store
    Report(ReportArgs),

    /// Show the static line classification of a script
    Analyze(AnalyzeArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Script files or directories (searched for `.lua` files)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Collection strategy (overrides the config file)
    #[arg(short, long)]
    pub strategy: Option<StrategyArg>,

    /// YAML coverage configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run only this shard of the files, as N/M
    #[arg(long, conflicts_with = "jobs")]
    pub shard: Option<ShardConfig>,

    /// Worker processes to split the files across (0 = one per CPU)
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,

    /// Write the coverage store as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: ReportFormat,
}

/// Arguments for the merge command
#[derive(Parser, Debug, Clone)]
pub struct MergeArgs {
    /// Stores to merge
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Merged store output path
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Arguments for the report command
#[derive(Parser, Debug, Clone)]
pub struct ReportArgs {
    /// Serialized store
    pub store: PathBuf,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: ReportFormat,

    /// List line numbers that never ran
    #[arg(long)]
    pub uncovered: bool,
}

/// Arguments for the analyze command
#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Script to classify
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: ReportFormat,
}

/// Report output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Human-readable table
    #[default]
    Text,
    /// JSON document
    Json,
}

/// Collection strategy argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    /// Interpreter line hook
    Native,
    /// Rewritten source
    Instrument,
    /// Instrument large files, hook the rest
    Auto,
}

impl StrategyArg {
    /// Spelling on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Instrument => "instrument",
            Self::Auto => "auto",
        }
    }
}

impl From<StrategyArg> for StrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Native => Self::Native,
            StrategyArg::Instrument => Self::Instrument,
            StrategyArg::Auto => Self::Auto,
        }
    }
}

/// Color argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
