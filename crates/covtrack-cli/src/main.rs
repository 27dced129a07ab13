//! Covtrack CLI: run scripts under coverage and merge worker results
//!
//! ## Usage
//!
//! ```bash
//! covtrack run tests/                      # Run every .lua file under tests/
//! covtrack run tests/ -j 4 -o cov.json     # Four worker processes, save the store
//! covtrack run tests/ --shard 2/4 -o s2.json
//! covtrack merge s1.json s2.json -o all.json
//! covtrack report all.json --uncovered
//! covtrack analyze script.lua
//! ```

use clap::Parser;
use covtrack_cli::{logging, Cli, CliConfig, CliResult, ColorChoice, Commands, CoverageRunner, Verbosity};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    logging::init(config.verbosity, config.color.should_color());
    let runner = CoverageRunner::new(config);

    match &cli.command {
        Commands::Run(args) => runner.run(args),
        Commands::Merge(args) => runner.merge(args),
        Commands::Report(args) => runner.report(args),
        Commands::Analyze(args) => runner.analyze(args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    let color: ColorChoice = cli.color.into();
    let jobs = match &cli.command {
        Commands::Run(args) => args.jobs,
        _ => 1,
    };

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_parallel_jobs(jobs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_from_flags() {
        let cli = Cli::try_parse_from(["covtrack", "-q", "--color", "never", "run", "a.lua", "-j", "3"]).unwrap();
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Quiet);
        assert_eq!(config.color, ColorChoice::Never);
        assert_eq!(config.parallel_jobs, 3);
    }

    #[test]
    fn test_non_run_commands_stay_in_process() {
        let cli = Cli::try_parse_from(["covtrack", "-v", "report", "s.json"]).unwrap();
        let config = build_config(&cli);
        assert_eq!(config.verbosity, Verbosity::Verbose);
        assert_eq!(config.effective_jobs(), 1);
    }
}
