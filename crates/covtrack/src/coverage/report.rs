//! Patch-up and Coverage Report Generation
//!
//! The static classification is the authority on which lines count.
//! [`patch_up`] strips any runtime signal that landed on lines the analyzer
//! marked non-executable, or on bodies it does not know; [`build_report`]
//! produces the read-only snapshot handed to reporting:
//! - per-line status table
//! - function and block roll-ups from body-entry counts
//! - file and global summaries with integer-floor percentages
//!
//! Files without an analysis (degraded mode) treat every executed line as
//! provisionally executable.

use super::analyzer::{BlockKind, FileAnalysis, LineKind};
use super::ids::FileId;
use super::store::{DataStore, LineStatus, SourceFile};
use crate::result::CovResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// `numerator * 100 / denominator`, floored; 0 when there is nothing to count
#[must_use]
pub fn percent(numerator: usize, denominator: usize) -> u32 {
    if denominator == 0 {
        return 0;
    }
    (numerator.saturating_mul(100) / denominator) as u32
}

/// Coverage summary statistics for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoverageSummary {
    /// Lines in the file
    pub total_lines: u32,
    /// Lines the analyzer marked executable
    pub executable_lines: usize,
    /// Executable lines run at least once
    pub executed_lines: usize,
    /// Executable lines run and verified
    pub covered_lines: usize,
    /// `covered / executable`
    pub line_coverage_percent: u32,
    /// `executed / executable`
    pub execution_coverage_percent: u32,
    /// Functions declared in the file
    pub functions_total: usize,
    /// Functions whose body was entered
    pub functions_executed: usize,
    /// `functions_executed / functions_total`
    pub function_coverage_percent: u32,
    /// Blocks in the file
    pub blocks_total: usize,
    /// Blocks whose body was entered
    pub blocks_executed: usize,
    /// `blocks_executed / blocks_total`
    pub block_coverage_percent: u32,
}

impl FileCoverageSummary {
    fn with_percentages(mut self) -> Self {
        self.line_coverage_percent = percent(self.covered_lines, self.executable_lines);
        self.execution_coverage_percent = percent(self.executed_lines, self.executable_lines);
        self.function_coverage_percent = percent(self.functions_executed, self.functions_total);
        self.block_coverage_percent = percent(self.blocks_executed, self.blocks_total);
        self
    }
}

/// Summary over all files of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSummary {
    /// Files in the report
    pub files: usize,
    /// Files reported without a static analysis
    pub degraded_files: usize,
    /// Lines over all files
    pub total_lines: u64,
    /// Executable lines over all files
    pub executable_lines: usize,
    /// Executable lines run at least once
    pub executed_lines: usize,
    /// Executable lines run and verified
    pub covered_lines: usize,
    /// `covered / executable`
    pub line_coverage_percent: u32,
    /// `executed / executable`
    pub execution_coverage_percent: u32,
    /// Functions over all analyzed files
    pub functions_total: usize,
    /// Functions whose body was entered
    pub functions_executed: usize,
    /// `functions_executed / functions_total`
    pub function_coverage_percent: u32,
    /// Blocks over all analyzed files
    pub blocks_total: usize,
    /// Blocks whose body was entered
    pub blocks_executed: usize,
    /// `blocks_executed / blocks_total`
    pub block_coverage_percent: u32,
}

impl GlobalSummary {
    fn add(&mut self, file: &FileReport) {
        let s = &file.summary;
        self.files += 1;
        if file.degraded {
            self.degraded_files += 1;
        }
        self.total_lines += u64::from(s.total_lines);
        self.executable_lines += s.executable_lines;
        self.executed_lines += s.executed_lines;
        self.covered_lines += s.covered_lines;
        self.functions_total += s.functions_total;
        self.functions_executed += s.functions_executed;
        self.blocks_total += s.blocks_total;
        self.blocks_executed += s.blocks_executed;
    }

    fn with_percentages(mut self) -> Self {
        self.line_coverage_percent = percent(self.covered_lines, self.executable_lines);
        self.execution_coverage_percent = percent(self.executed_lines, self.executable_lines);
        self.function_coverage_percent = percent(self.functions_executed, self.functions_total);
        self.block_coverage_percent = percent(self.blocks_executed, self.blocks_total);
        self
    }
}

/// One row of the per-line table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReport {
    /// 1-indexed line number
    pub line: u32,
    /// `None` in degraded mode
    pub kind: Option<LineKind>,
    /// Line reports execution
    pub executable: bool,
    /// Times the line ran; 0 for non-executable lines
    pub count: u64,
    /// Verified by an assertion
    pub covered: bool,
    /// Only executable lines carry a status
    pub status: Option<LineStatus>,
}

/// Roll-up of one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReport {
    /// Name as in [`FunctionInfo`](super::analyzer::FunctionInfo)
    pub name: String,
    /// Line of the `function` keyword
    pub start_line: u32,
    /// Line of the closing `end`
    pub end_line: u32,
    /// Times the body was entered
    pub hits: u64,
    /// Body entered at least once
    pub executed: bool,
}

/// Roll-up of one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    /// Block kind
    pub kind: BlockKind,
    /// Header line
    pub start_line: u32,
    /// Last line of the region
    pub end_line: u32,
    /// Index of the enclosing block
    pub parent: Option<usize>,
    /// Times the body was entered
    pub hits: u64,
    /// Body entered at least once
    pub executed: bool,
}

/// Read-only coverage snapshot of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// File id in the store
    pub id: FileId,
    /// Registered path
    pub path: String,
    /// No static analysis was available
    pub degraded: bool,
    /// One row per line
    pub lines: Vec<LineReport>,
    /// Functions in source order; empty in degraded mode
    pub functions: Vec<FunctionReport>,
    /// Blocks by body id; empty in degraded mode
    pub blocks: Vec<BlockReport>,
    /// Totals and percentages
    pub summary: FileCoverageSummary,
}

impl FileReport {
    /// Status of an executable line
    #[must_use]
    pub fn status(&self, line: u32) -> Option<LineStatus> {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i as usize))
            .and_then(|l| l.status)
    }

    /// Executable lines that never ran
    pub fn uncovered_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines
            .iter()
            .filter(|l| l.status == Some(LineStatus::NotCovered))
            .map(|l| l.line)
    }
}

/// Coverage report containing every file plus the global summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Per-file snapshots in file id order
    pub files: Vec<FileReport>,
    /// Totals over `files`
    pub summary: GlobalSummary,
}

impl CoverageReport {
    /// Report for a file by path
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Pretty JSON of the whole report
    pub fn to_json(&self) -> CovResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Strip signal from lines the analyzer classified non-executable
///
/// Entries into body ids the analysis does not have are dropped too.
/// Returns, per analyzed file, how many lines lost their records.
pub fn patch_up(
    store: &mut DataStore,
    analyses: &BTreeMap<FileId, FileAnalysis>,
) -> BTreeMap<FileId, usize> {
    let mut stripped = BTreeMap::new();
    for (id, analysis) in analyses {
        let count = store.retain_lines(*id, |line| analysis.is_executable(line));
        if count > 0 {
            warn!(file = %id, lines = count, "stripped signal from non-executable lines");
        }
        let known = analysis.blocks.len();
        let blocks = store.retain_blocks(*id, |block| (block as usize) < known);
        if blocks > 0 {
            warn!(file = %id, blocks, "stripped entries into unknown blocks");
        }
        let _ = stripped.insert(*id, count);
    }
    stripped
}

/// Build the report for every registered file
#[must_use]
pub fn build_report(store: &DataStore, analyses: &BTreeMap<FileId, FileAnalysis>) -> CoverageReport {
    let files: Vec<FileReport> = store
        .files()
        .map(|source| file_report(store, source, analyses.get(&source.id)))
        .collect();

    let mut summary = GlobalSummary::default();
    for file in &files {
        summary.add(file);
    }
    CoverageReport {
        files,
        summary: summary.with_percentages(),
    }
}

/// Report for one file; lines outside the executable set never count
pub(crate) fn file_report(
    store: &DataStore,
    source: &SourceFile,
    analysis: Option<&FileAnalysis>,
) -> FileReport {
    let id = source.id;
    let row = |line: u32, kind: Option<LineKind>, executable: bool| {
        let (count, covered) = if executable {
            (store.get_execution_count(id, line), store.is_covered(id, line))
        } else {
            (0, false)
        };
        LineReport {
            line,
            kind,
            executable,
            count,
            covered,
            status: executable.then(|| store.get_line_status(id, line)),
        }
    };

    let Some(analysis) = analysis else {
        debug!(file = %id, path = %source.path, "reporting without analysis");
        let last = store
            .executions(id)
            .map(|(line, _)| line)
            .max()
            .unwrap_or(0)
            .max(source.total_line_count);
        let lines: Vec<LineReport> = (1..=last)
            .map(|line| row(line, None, store.get_execution_count(id, line) > 0))
            .collect();
        let summary = line_summary(last, &lines);
        return FileReport {
            id,
            path: source.path.clone(),
            degraded: true,
            lines,
            functions: Vec::new(),
            blocks: Vec::new(),
            summary: summary.with_percentages(),
        };
    };

    let lines: Vec<LineReport> = analysis
        .lines
        .iter()
        .zip(1u32..)
        .map(|(class, line)| row(line, Some(class.kind), class.executable))
        .collect();

    let hits = |block: usize| u32::try_from(block).map_or(0, |b| store.get_block_entries(id, b));
    let functions: Vec<FunctionReport> = analysis
        .functions
        .iter()
        .map(|f| {
            let hits = hits(f.body_block);
            FunctionReport {
                name: f.name.clone(),
                start_line: f.start_line,
                end_line: f.end_line,
                hits,
                executed: hits > 0,
            }
        })
        .collect();
    let blocks: Vec<BlockReport> = analysis
        .blocks
        .iter()
        .enumerate()
        .map(|(index, b)| {
            let hits = hits(index);
            BlockReport {
                kind: b.kind,
                start_line: b.start_line,
                end_line: b.end_line,
                parent: b.parent,
                hits,
                executed: hits > 0,
            }
        })
        .collect();

    let mut summary = line_summary(analysis.line_count.max(source.total_line_count), &lines);
    summary.functions_total = functions.len();
    summary.functions_executed = functions.iter().filter(|f| f.executed).count();
    summary.blocks_total = blocks.len();
    summary.blocks_executed = blocks.iter().filter(|b| b.executed).count();

    FileReport {
        id,
        path: source.path.clone(),
        degraded: false,
        lines,
        functions,
        blocks,
        summary: summary.with_percentages(),
    }
}

fn line_summary(total_lines: u32, lines: &[LineReport]) -> FileCoverageSummary {
    FileCoverageSummary {
        total_lines,
        executable_lines: lines.iter().filter(|l| l.executable).count(),
        executed_lines: lines.iter().filter(|l| l.count > 0).count(),
        covered_lines: lines.iter().filter(|l| l.covered).count(),
        ..FileCoverageSummary::default()
    }
}
