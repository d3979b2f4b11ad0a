use std::path::PathBuf;
use std::process;

use voxcache_bench::report;
use voxcache_bench::runner::StressRunner;
use voxcache_bench::scenes;
use voxcache_core::CacheConfig;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut baseline_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut regression_threshold = 10.0f64;
    let mut threads = std::thread::available_parallelism().map_or(4, |n| n.get());
    let mut ops_per_thread = 200_000u64;
    let mut seed = 42u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(&args[i]));
            }
            "--baseline" => {
                i += 1;
                baseline_path = Some(PathBuf::from(&args[i]));
            }
            "--output" => {
                i += 1;
                output_path = Some(PathBuf::from(&args[i]));
            }
            "--regression-threshold" => {
                i += 1;
                regression_threshold = args[i]
                    .parse()
                    .expect("invalid --regression-threshold value");
            }
            "--threads" => {
                i += 1;
                threads = args[i].parse().expect("invalid --threads value");
            }
            "--ops" => {
                i += 1;
                ops_per_thread = args[i].parse().expect("invalid --ops value");
            }
            "--seed" => {
                i += 1;
                seed = args[i].parse().expect("invalid --seed value");
            }
            "--help" | "-h" => {
                eprintln!("Usage: cache-stress [OPTIONS]");
                eprintln!("  --config <path>                Cache configuration (RON)");
                eprintln!("  --threads <n>                  Foreground threads (default: all cores)");
                eprintln!("  --ops <n>                      Operations per thread (default: 200000)");
                eprintln!("  --seed <n>                     RNG seed (default: 42)");
                eprintln!("  --baseline <path>              Load baseline JSON for comparison");
                eprintln!("  --output <path>                Save current results as JSON baseline");
                eprintln!(
                    "  --regression-threshold <pct>   Regression threshold percentage (default: 10)"
                );
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let config = match config_path {
        Some(ref path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("cannot read {}: {}", path.display(), e);
                process::exit(1);
            });
            CacheConfig::from_ron_str(&text).unwrap_or_else(|e| {
                eprintln!("{}: {}", path.display(), e);
                process::exit(1);
            })
        }
        None => CacheConfig::with_size(1024, 1024),
    };

    let runner = StressRunner::new(config, threads, seed);
    let mut results = Vec::new();

    for workload in &scenes::standard_workloads(ops_per_thread) {
        match runner.run_workload(workload) {
            Ok(result) => results.push(result),
            Err(e) => {
                log::error!("Workload '{}' failed: {}", workload.name, e);
                process::exit(1);
            }
        }
    }

    // Print markdown summary
    println!("\n## Cache Stress Results\n");
    println!("{}", report::format_markdown(&results));

    if let Some(ref path) = output_path {
        let baseline = report::Baseline {
            timestamp: format!("cache-stress-{}", process::id()),
            results: results.clone(),
        };
        report::save_baseline(path, &baseline).expect("failed to save baseline");
        log::info!("Saved baseline to {}", path.display());
    }

    let mismatches: usize = results.iter().map(|r| r.mismatches).sum();
    if mismatches > 0 {
        eprintln!("ERROR: {} voxels lost writes, exiting with code 1", mismatches);
        process::exit(1);
    }

    if let Some(ref path) = baseline_path {
        if let Some(baseline) = report::load_baseline(path) {
            let regressions = report::compare(&results, &baseline, regression_threshold);
            println!(
                "{}",
                report::format_comparison(&regressions, regression_threshold)
            );
            if !regressions.is_empty() {
                eprintln!(
                    "ERROR: {} regressions detected, exiting with code 1",
                    regressions.len()
                );
                process::exit(1);
            }
        } else {
            log::warn!("Baseline file not found: {}", path.display());
        }
    }

    log::info!("Stress run complete.");
}
