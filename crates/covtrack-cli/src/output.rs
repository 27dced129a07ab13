//! Output formatting

use console::{style, Style, Term};
use covtrack::{CoverageReport, FileAnalysis, FileReport, LineKind};

/// Execution percentage at or above which a row is green
const GOOD_PERCENT: u32 = 80;
/// Execution percentage at or above which a row is yellow
const FAIR_PERCENT: u32 = 50;

/// Writes status messages to stderr and reports to stdout
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    out: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            out: Term::stdout(),
            use_color,
            quiet,
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a document to stdout regardless of quiet mode
    pub fn emit(&self, text: &str) {
        let _ = self.out.write_line(text);
    }

    /// Print the coverage table
    pub fn report(&self, report: &CoverageReport, list_uncovered: bool) {
        if self.quiet {
            return;
        }
        for line in render_report(report, list_uncovered) {
            let _ = self.out.write_line(&self.paint(line));
        }
    }

    fn paint(&self, line: ReportLine) -> String {
        match line {
            ReportLine::Plain(text) => text,
            ReportLine::Header(text) if self.use_color => style(text).bold().underlined().to_string(),
            ReportLine::Header(text) => text,
            ReportLine::Row { text, percent } if self.use_color => {
                let color = if percent >= GOOD_PERCENT {
                    Style::new().green()
                } else if percent >= FAIR_PERCENT {
                    Style::new().yellow()
                } else {
                    Style::new().red()
                };
                color.apply_to(text).to_string()
            }
            ReportLine::Row { text, .. } => text,
        }
    }
}

/// One line of the rendered report before styling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    /// Column headings
    Header(String),
    /// A file or total row, colored by its execution percentage
    Row {
        /// Row text
        text: String,
        /// Execution coverage
        percent: u32,
    },
    /// Unstyled text
    Plain(String),
}

impl ReportLine {
    /// Text without styling
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Header(text) | Self::Plain(text) | Self::Row { text, .. } => text,
        }
    }
}

fn row(name: &str, covered: u32, executed: u32, functions: u32, blocks: u32) -> String {
    format!(
        "{name:<40} {:>8} {:>9} {:>10} {:>7}",
        format!("{covered}%"),
        format!("{executed}%"),
        format!("{functions}%"),
        format!("{blocks}%")
    )
}

/// Render the per-file table and totals
#[must_use]
pub fn render_report(report: &CoverageReport, list_uncovered: bool) -> Vec<ReportLine> {
    let mut lines = vec![ReportLine::Header(format!(
        "{:<40} {:>8} {:>9} {:>10} {:>7}",
        "File", "Covered", "Executed", "Functions", "Blocks"
    ))];
    for file in &report.files {
        lines.push(file_row(file));
        if list_uncovered {
            let missing: Vec<String> = file.uncovered_lines().map(|l| l.to_string()).collect();
            if !missing.is_empty() {
                lines.push(ReportLine::Plain(format!("    not run: {}", missing.join(", "))));
            }
        }
    }
    let s = &report.summary;
    lines.push(ReportLine::Row {
        text: row(
            "Total",
            s.line_coverage_percent,
            s.execution_coverage_percent,
            s.function_coverage_percent,
            s.block_coverage_percent,
        ),
        percent: s.execution_coverage_percent,
    });
    lines.push(ReportLine::Plain(format!(
        "{} files, {} executable lines, {} executed, {} covered",
        s.files, s.executable_lines, s.executed_lines, s.covered_lines
    )));
    if s.degraded_files > 0 {
        lines.push(ReportLine::Plain(format!(
            "{} files reported without static analysis",
            s.degraded_files
        )));
    }
    lines
}

fn file_row(file: &FileReport) -> ReportLine {
    let s = &file.summary;
    let name = if file.degraded {
        format!("{} (degraded)", file.path)
    } else {
        file.path.clone()
    };
    ReportLine::Row {
        text: row(
            &name,
            s.line_coverage_percent,
            s.execution_coverage_percent,
            s.function_coverage_percent,
            s.block_coverage_percent,
        ),
        percent: s.execution_coverage_percent,
    }
}

fn kind_name(kind: LineKind) -> &'static str {
    match kind {
        LineKind::Code => "code",
        LineKind::Comment => "comment",
        LineKind::MultilineComment => "multiline_comment",
        LineKind::Blank => "blank",
        LineKind::StringLiteral => "string_literal",
    }
}

/// Render a static analysis as one row per line plus the function table
#[must_use]
pub fn render_analysis(analysis: &FileAnalysis) -> Vec<String> {
    let mut out: Vec<String> = analysis
        .lines
        .iter()
        .zip(1u32..)
        .map(|(class, line)| {
            let marker = if class.executable { "*" } else { " " };
            format!("{line:>5} {marker} {}", kind_name(class.kind))
        })
        .collect();
    out.push(format!(
        "{} lines, {} executable",
        analysis.line_count,
        analysis.executable_count()
    ));
    for f in &analysis.functions {
        let variadic = if f.is_variadic { ", ..." } else { "" };
        out.push(format!(
            "function {}({}{variadic}) lines {}-{}",
            f.name,
            f.params.join(", "),
            f.start_line,
            f.end_line
        ));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use covtrack::{CoverageEngine, StaticAnalyzer};

    fn sample_report() -> CoverageReport {
        let mut engine = CoverageEngine::default();
        let id = engine
            .register_source(
                "sum.lua",
                "local function sum(a, b)\n  return a + b\nend\nlocal unused = 1\nif unused > 5 then\n  print('x')\nend\n"
                    .to_string(),
            )
            .unwrap();
        let _ = engine.start();
        let _ = engine.run_file(id).unwrap();
        let _ = engine.register_source("bad.lua", "local = 1".to_string()).unwrap();
        engine.report()
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_table_has_header_rows_and_total() {
            let lines = render_report(&sample_report(), false);
            assert!(matches!(lines[0], ReportLine::Header(_)));
            assert!(lines[1].text().starts_with("sum.lua"));
            assert!(lines[2].text().contains("bad.lua (degraded)"));
            assert!(lines.iter().any(|l| l.text().starts_with("Total")));
            assert!(lines.iter().any(|l| l.text().contains("without static analysis")));
        }

        #[test]
        fn test_uncovered_listing() {
            let lines = render_report(&sample_report(), true);
            assert!(lines.iter().any(|l| l.text() == "    not run: 2, 6"));
        }

        #[test]
        fn test_analysis_rows() {
            let analysis =
                StaticAnalyzer::analyze_source("-- note\nlocal function f(x, ...)\n  return x\nend\n")
                    .unwrap();
            let rows = render_analysis(&analysis);
            assert_eq!(rows[0], "    1   comment");
            assert_eq!(rows[1], "    2 * code");
            assert!(rows.iter().any(|r| r == "function f(x, ...) lines 2-4"));
        }
    }

    mod reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = Reporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
        }

        #[test]
        fn test_paint_without_color_is_plain() {
            let reporter = Reporter::new(false, false);
            let line = ReportLine::Row {
                text: "x".to_string(),
                percent: 10,
            };
            assert_eq!(reporter.paint(line), "x");
        }

        #[test]
        fn test_messages_do_not_panic() {
            let reporter = Reporter::new(false, true);
            reporter.success("hidden");
            reporter.warning("hidden");
            reporter.info("hidden");
            reporter.failure("shown");
            reporter.report(&sample_report(), true);
        }
    }
}
