//! Coverage Operations Benchmarks
//!
//! Benchmarks for the tracker hot path, static analysis, instrumentation
//! and store merging.
//!
//! Run with: `cargo bench --bench coverage_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use covtrack::{
    CoverageConfig, CoverageEngine, DataStore, FileId, Instrumenter, StaticAnalyzer, StrategyKind,
    Tracker, DEFAULT_MAX_INSTRUMENT_BYTES,
};

/// A script of roughly `functions * 8` lines with loops, branches and comments
fn synthetic_script(functions: usize) -> String {
    let mut src = String::from("-- generated\nlocal acc = 0\n");
    for i in 0..functions {
        src.push_str(&format!(
            "local function f{i}(n)\n  --[[ body\n  ]]\n  if n % 2 == 0 then\n    acc = acc + n\n  else\n    acc = acc - 1\n  end\nend\n"
        ));
    }
    for i in 0..functions {
        src.push_str(&format!("for k = 1, 10 do f{i}(k) end\n"));
    }
    src
}

fn bench_tracker_track(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_track");

    for events in [1_000u32, 10_000, 100_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{events}_events")),
            &events,
            |bench, &n| {
                bench.iter(|| {
                    let mut tracker = Tracker::new();
                    let id = FileId::new(1);
                    let _ = tracker.register_file(id, "bench.lua");
                    let _ = tracker.store_mut().set_source(id, None, 500);
                    let _ = tracker.start();
                    for i in 0..n {
                        tracker.track(black_box(id), black_box(i % 500 + 1));
                    }
                    let _ = tracker.stop();
                    black_box(tracker);
                });
            },
        );
    }

    group.finish();
}

fn bench_static_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_analysis");

    for functions in [10usize, 100, 500] {
        let src = synthetic_script(functions);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{functions}_functions")),
            &src,
            |bench, src| {
                bench.iter(|| black_box(StaticAnalyzer::analyze_source(black_box(src))));
            },
        );
    }

    group.finish();
}

fn bench_instrumentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("instrumentation");

    for functions in [10usize, 100] {
        let src = synthetic_script(functions);
        let chunk = covtrack::script::parse(&src).ok();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{functions}_functions")),
            &(src, chunk),
            |bench, (src, chunk)| {
                bench.iter(|| {
                    let mut instrumenter = Instrumenter::new(DEFAULT_MAX_INSTRUMENT_BYTES);
                    instrumenter.set_cache_enabled(false);
                    if let Some(chunk) = chunk {
                        black_box(instrumenter.instrument(FileId::new(1), src, chunk).ok());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_run_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_strategies");
    let src = synthetic_script(50);

    for strategy in [StrategyKind::Native, StrategyKind::Instrument] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{strategy:?}")),
            &strategy,
            |bench, &strategy| {
                bench.iter(|| {
                    let config = CoverageConfig::builder().strategy(strategy).build();
                    let mut engine = CoverageEngine::new(config);
                    if let Ok(id) = engine.register_source("bench.lua", src.clone()) {
                        let _ = engine.start();
                        black_box(engine.run_file(id).ok());
                        let _ = engine.stop();
                    }
                    black_box(engine);
                });
            },
        );
    }

    group.finish();
}

fn bench_store_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_merge");

    for stores in [2usize, 8, 32] {
        let parts: Vec<DataStore> = (0..stores)
            .map(|s| {
                let mut store = DataStore::new();
                for file in 1..=20u32 {
                    let id = FileId::new(file);
                    let _ = store.register_file(id, &format!("f{file}.lua"));
                    for line in 1..=200u32 {
                        if (line as usize + s) % 3 != 0 {
                            let _ = store.add_execution(id, line, u64::from(line));
                        }
                    }
                }
                store
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{stores}_stores")),
            &parts,
            |bench, parts| {
                bench.iter(|| black_box(DataStore::merge_all(parts.iter()).ok()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tracker_track,
    bench_static_analysis,
    bench_instrumentation,
    bench_run_strategies,
    bench_store_merge,
);

criterion_main!(benches);
