//! Coverage runner: in-process runs, worker processes and store handling

use crate::commands::{AnalyzeArgs, MergeArgs, ReportArgs, ReportFormat, RunArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{render_analysis, Reporter};
use covtrack::{
    build_report, patch_up, CovError, CoverageConfig, CoverageEngine, CoverageReport, DataStore,
    FileAnalysis, FileId, ShardConfig, StaticAnalyzer,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, info, warn};

/// Script file extension picked up from directories
const SCRIPT_EXTENSION: &str = "lua";

/// Find scripts: directories are searched recursively, files are kept as given
#[must_use]
pub fn discover_scripts(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut scripts = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = Vec::new();
            scan_files_recursive(path, SCRIPT_EXTENSION, &mut found);
            found.sort();
            scripts.extend(found);
        } else {
            scripts.push(path.clone());
        }
    }
    scripts
}

fn scan_files_recursive(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if !name.starts_with('.') && name != "target" {
                    scan_files_recursive(&path, extension, files);
                }
            } else if path.extension().is_some_and(|ext| ext == extension) {
                files.push(path);
            }
        }
    }
}

/// Coverage configuration from `--config`, with `--strategy` on top
pub fn coverage_config(args: &RunArgs) -> CliResult<CoverageConfig> {
    let mut config = match &args.config {
        Some(path) => CoverageConfig::from_yaml_file(path)?,
        None => CoverageConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }
    config.validate()?;
    Ok(config)
}

/// Static analyses for every file of a loaded store
///
/// Uses the cached content when the store has it, otherwise the file on
/// disk. A file that cannot be read, does not parse, or changed length since
/// the run is left out and reported degraded.
#[must_use]
pub fn analyses_for(store: &DataStore) -> BTreeMap<FileId, FileAnalysis> {
    let mut analyses = BTreeMap::new();
    for file in store.files() {
        let source = match &file.content {
            Some(content) => content.clone(),
            None => match std::fs::read_to_string(&file.path) {
                Ok(source) => source,
                Err(e) => {
                    warn!(path = %file.path, error = %e, "source unavailable, reporting degraded");
                    continue;
                }
            },
        };
        match StaticAnalyzer::analyze_source(&source) {
            Ok(analysis)
                if file.total_line_count != 0 && analysis.line_count != file.total_line_count =>
            {
                warn!(
                    path = %file.path,
                    recorded = file.total_line_count,
                    current = analysis.line_count,
                    "source changed since the run, reporting degraded"
                );
            }
            Ok(analysis) => {
                let _ = analyses.insert(file.id, analysis);
            }
            Err(e) => warn!(path = %file.path, error = %e, "source does not parse, reporting degraded"),
        }
    }
    analyses
}

/// Engine after a run plus the scripts that failed in it
#[derive(Debug)]
pub struct RunOutput {
    /// Engine holding the collected records
    pub engine: CoverageEngine,
    /// `(path, error)` for each script that failed to load or run
    pub failures: Vec<(String, String)>,
    /// Scripts this process was responsible for
    pub attempted: usize,
    /// Worker processes that did not exit cleanly
    pub failed_workers: usize,
}

/// Drives coverage runs for the CLI
#[derive(Debug)]
pub struct CoverageRunner {
    config: CliConfig,
    reporter: Reporter,
}

impl CoverageRunner {
    /// Create a runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let reporter =
            Reporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self { config, reporter }
    }

    /// `covtrack run`
    pub fn run(&self, args: &RunArgs) -> CliResult<()> {
        let coverage = coverage_config(args)?;
        let scripts = discover_scripts(&args.paths);
        if scripts.is_empty() {
            return Err(CliError::invalid_argument("no .lua scripts found"));
        }

        let jobs = self.config.effective_jobs().min(scripts.len());
        let mut output = match args.shard {
            None if jobs > 1 => self.run_workers(args, &coverage, &scripts, jobs)?,
            shard => self.run_local(&coverage, &scripts, shard.unwrap_or_default()),
        };

        let report = output.engine.report();
        if let Some(path) = &args.output {
            output.engine.store().save(path)?;
            info!(path = %path.display(), "wrote coverage store");
        }
        self.emit(&report, args.format, false)?;

        if output.failed_workers > 0 {
            return Err(CliError::worker(format!(
                "{} of {jobs} workers did not finish cleanly",
                output.failed_workers
            )));
        }
        if !output.failures.is_empty() {
            return Err(CliError::ScriptFailures {
                failed: output.failures.len(),
                total: output.attempted,
            });
        }
        Ok(())
    }

    /// Run this shard of `scripts` in the current process
    ///
    /// Every script is registered, in order, so file ids agree with other
    /// workers given the same list.
    pub fn run_local(
        &self,
        coverage: &CoverageConfig,
        scripts: &[PathBuf],
        shard: ShardConfig,
    ) -> RunOutput {
        let mut engine = CoverageEngine::new(coverage.clone());
        let mut failures = Vec::new();
        let mut ids = Vec::with_capacity(scripts.len());
        for (idx, path) in scripts.iter().enumerate() {
            match engine.load_file(path) {
                Ok(id) => ids.push(Some(id)),
                Err(e) => {
                    if shard.should_run_index(idx) {
                        self.reporter.failure(&format!("{}: {e}", path.display()));
                        failures.push((path.display().to_string(), e.to_string()));
                    }
                    ids.push(None);
                }
            }
        }

        let _ = engine.start();
        let mut attempted = 0;
        for (idx, (path, id)) in scripts.iter().zip(ids).enumerate() {
            if !shard.should_run_index(idx) {
                continue;
            }
            attempted += 1;
            let Some(id) = id else { continue };
            match engine.run_file(id) {
                Ok(outcome) => {
                    if let Some(reason) = &outcome.fallback {
                        self.reporter
                            .warning(&format!("{}: instrumentation skipped ({reason})", path.display()));
                    }
                    if self.config.verbosity.is_verbose() {
                        for line in &outcome.output {
                            self.reporter.info(&format!("{}: {line}", path.display()));
                        }
                    }
                    self.reporter.success(&path.display().to_string());
                }
                Err(e) => {
                    self.reporter.failure(&format!("{}: {e}", path.display()));
                    failures.push((path.display().to_string(), e.to_string()));
                }
            }
        }
        let _ = engine.stop();
        debug!(%shard, attempted, failed = failures.len(), "local run finished");

        RunOutput {
            engine,
            failures,
            attempted,
            failed_workers: 0,
        }
    }

    /// Split `scripts` across `jobs` child processes and merge their stores
    fn run_workers(
        &self,
        args: &RunArgs,
        coverage: &CoverageConfig,
        scripts: &[PathBuf],
        jobs: usize,
    ) -> CliResult<RunOutput> {
        let exe = std::env::current_exe()?;
        let total = u32::try_from(jobs).map_err(|_| CliError::invalid_argument("too many jobs"))?;
        let mut workers = WorkerSet::create(
            std::env::temp_dir().join(format!("covtrack-{}", std::process::id())),
        )?;
        for shard in ShardConfig::all(total) {
            let out = workers.store_path(&shard);
            let mut cmd = Command::new(&exe);
            let _ = cmd
                .arg("run")
                .args(scripts)
                .arg("--shard")
                .arg(shard.to_string())
                .arg("--output")
                .arg(&out)
                .args(["--quiet", "--color", "never"])
                .stdout(Stdio::null());
            if let Some(strategy) = args.strategy {
                let _ = cmd.args(["--strategy", strategy.as_str()]);
            }
            if let Some(config) = &args.config {
                let _ = cmd.arg("--config").arg(config);
            }
            debug!(%shard, "starting worker");
            let child = cmd
                .spawn()
                .map_err(|e| CliError::worker(format!("could not start shard {shard}: {e}")))?;
            workers.push(shard, out, child);
        }

        let mut stores = Vec::with_capacity(jobs);
        let mut failed_workers = 0;
        for (shard, out, status) in workers.wait_all()? {
            if !status.success() {
                failed_workers += 1;
                self.reporter
                    .warning(&format!("worker {shard} exited with {status}"));
            }
            match DataStore::load(&out) {
                Ok(store) => stores.push(store),
                Err(e) => {
                    if status.success() {
                        failed_workers += 1;
                    }
                    self.reporter
                        .failure(&format!("worker {shard} left no coverage store: {e}"));
                }
            }
        }
        drop(workers);
        info!(workers = jobs, stores = stores.len(), "merging worker stores");
        let merged = DataStore::merge_all(stores.iter())?;

        // same registration order as the workers, so ids line up
        let mut engine = CoverageEngine::new(coverage.clone());
        let mut failures = Vec::new();
        for path in scripts {
            if let Err(e) = engine.load_file(path) {
                failures.push((path.display().to_string(), e.to_string()));
            }
        }
        engine.merge_store(&merged)?;

        Ok(RunOutput {
            engine,
            failures,
            attempted: scripts.len(),
            failed_workers,
        })
    }

    /// `covtrack merge`
    pub fn merge(&self, args: &MergeArgs) -> CliResult<()> {
        let stores = args
            .inputs
            .iter()
            .map(|path| {
                DataStore::load(path).map_err(|e| match e {
                    CovError::Io(io) => CliError::invalid_argument(format!(
                        "cannot read {}: {io}",
                        path.display()
                    )),
                    other => other.into(),
                })
            })
            .collect::<CliResult<Vec<_>>>()?;
        let merged = DataStore::merge_all(stores.iter())?;
        merged.save(&args.output)?;
        self.reporter.success(&format!(
            "merged {} stores ({} files) into {}",
            stores.len(),
            merged.file_count(),
            args.output.display()
        ));
        Ok(())
    }

    /// `covtrack report`
    pub fn report(&self, args: &ReportArgs) -> CliResult<()> {
        let mut store = DataStore::load(&args.store)?;
        let analyses = analyses_for(&store);
        let _ = patch_up(&mut store, &analyses);
        let report = build_report(&store, &analyses);
        self.emit(&report, args.format, args.uncovered)
    }

    /// `covtrack analyze`
    pub fn analyze(&self, args: &AnalyzeArgs) -> CliResult<()> {
        let source = std::fs::read_to_string(&args.file)?;
        let analysis = StaticAnalyzer::analyze_source(&source)?;
        match args.format {
            ReportFormat::Json => {
                let json = serde_json::to_string_pretty(&analysis).map_err(CovError::from)?;
                self.reporter.emit(&json);
            }
            ReportFormat::Text => {
                for line in render_analysis(&analysis) {
                    self.reporter.emit(&line);
                }
            }
        }
        Ok(())
    }

    fn emit(&self, report: &CoverageReport, format: ReportFormat, uncovered: bool) -> CliResult<()> {
        match format {
            ReportFormat::Json => self.reporter.emit(&report.to_json()?),
            ReportFormat::Text => self.reporter.report(report, uncovered),
        }
        Ok(())
    }

    /// Get the reporter (for testing)
    #[must_use]
    pub const fn reporter(&self) -> &Reporter {
        &self.reporter
    }
}

/// Worker processes of one sharded run plus their scratch directory
///
/// Dropping the set kills and reaps every worker still running and removes
/// the scratch directory, on success and on every early return.
#[derive(Debug)]
struct WorkerSet {
    scratch: PathBuf,
    children: Vec<(ShardConfig, PathBuf, Child)>,
}

impl WorkerSet {
    fn create(scratch: PathBuf) -> CliResult<Self> {
        std::fs::create_dir_all(&scratch)?;
        Ok(Self {
            scratch,
            children: Vec::new(),
        })
    }

    /// Where the worker for `shard` writes its store
    fn store_path(&self, shard: &ShardConfig) -> PathBuf {
        self.scratch
            .join(format!("shard-{}-of-{}.json", shard.current, shard.total))
    }

    fn push(&mut self, shard: ShardConfig, out: PathBuf, child: Child) {
        self.children.push((shard, out, child));
    }

    /// Wait for every worker in start order
    fn wait_all(&mut self) -> CliResult<Vec<(ShardConfig, PathBuf, ExitStatus)>> {
        let mut done = Vec::with_capacity(self.children.len());
        for (shard, out, child) in &mut self.children {
            let status = child.wait()?;
            done.push((*shard, out.clone(), status));
        }
        Ok(done)
    }
}

impl Drop for WorkerSet {
    fn drop(&mut self) {
        for (shard, _, child) in &mut self.children {
            if matches!(child.try_wait(), Ok(None)) {
                warn!(%shard, "stopping unfinished worker");
                let _ = child.kill();
            }
            let _ = child.wait();
        }
        if let Err(e) = std::fs::remove_dir_all(&self.scratch) {
            debug!(path = %self.scratch.display(), error = %e, "could not remove scratch directory");
        }
    }
}
