use std::collections::HashMap;
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voxcache_codec::{FillCodec, Lz4Codec, SystemAllocator};
use voxcache_core::{CacheConfig, CacheError, GridCoord};
use voxcache_grid::{Grid, SweepTally, Sweeper};

use crate::scenes::{seed_voxel, BenchVoxel, Workload};

type BenchGrid = Grid<BenchVoxel, FillCodec<Lz4Codec>, SystemAllocator>;

/// Only every `LATENCY_SAMPLE_EVERY`-th operation is timed.
const LATENCY_SAMPLE_EVERY: u64 = 16;

/// Latency distribution of sampled operations, in microseconds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimingSeries {
    pub mean_us: f64,
    pub median_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub min_us: f64,
    pub max_us: f64,
}

/// Result of one workload run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StressResult {
    pub workload: String,
    pub threads: usize,
    pub total_ops: u64,
    pub elapsed_ms: f64,
    pub ops_per_sec: f64,
    pub sweeps: u64,
    pub chunks_closed: usize,
    pub contended_closes: usize,
    pub codec_failures: usize,
    pub peak_resident_bytes: usize,
    pub final_compressed_bytes: usize,
    /// Written voxels that read back differently after the run. Must be 0.
    pub mismatches: usize,
    pub latency: TimingSeries,
}

/// What one foreground thread hands back.
struct WorkerOutcome {
    written: HashMap<(u32, u32), BenchVoxel>,
    latencies_us: Vec<f64>,
    ops: u64,
}

/// Drives foreground threads against a grid while a sweeper thread runs.
pub struct StressRunner {
    config: CacheConfig,
    threads: usize,
    seed: u64,
}

impl StressRunner {
    pub fn new(config: CacheConfig, threads: usize, seed: u64) -> Self {
        let threads = threads.clamp(1, config.width.max(1) as usize);
        Self {
            config,
            threads,
            seed,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run one workload on a freshly built and seeded grid.
    pub fn run_workload(&self, workload: &Workload) -> Result<StressResult, CacheError> {
        log::info!(
            "Running workload '{}' ({} threads x {} ops)...",
            workload.name,
            self.threads,
            workload.ops_per_thread
        );

        let grid: BenchGrid = Grid::new(
            self.config.clone(),
            FillCodec::new(Lz4Codec::new(), size_of::<BenchVoxel>()),
            SystemAllocator::new(),
        )?;
        let hot_rows = workload.hot_rows(grid.height());
        self.populate(&grid, hot_rows);

        let stop = AtomicBool::new(false);
        let start = Instant::now();
        let (outcomes, sweep) = std::thread::scope(|s| {
            let sweeper = s.spawn(|| sweep_until(&grid, &stop));
            let workers: Vec<_> = (0..self.threads)
                .map(|t| {
                    let grid = &grid;
                    s.spawn(move || self.drive(grid, workload, hot_rows, t))
                })
                .collect();
            let outcomes: Vec<_> = workers
                .into_iter()
                .filter_map(|w| match w.join() {
                    Ok(outcome) => Some(outcome),
                    Err(_) => {
                        log::error!("foreground thread panicked");
                        None
                    }
                })
                .collect();
            stop.store(true, Ordering::Relaxed);
            let sweep = sweeper.join().unwrap_or_else(|_| {
                log::error!("sweeper thread panicked");
                SweepSummary::default()
            });
            (outcomes, sweep)
        });
        let elapsed = start.elapsed();

        let mut mismatches = 0;
        let mut acc = grid.accessor();
        for outcome in &outcomes {
            for (&(x, y), value) in &outcome.written {
                if acc.get(GridCoord::new(x, y)) != *value {
                    mismatches += 1;
                }
            }
        }
        if mismatches > 0 {
            log::error!("  {} voxels read back wrong", mismatches);
        }
        drop(acc);

        grid.flush();
        let stats = grid.stats();

        let total_ops: u64 = outcomes.iter().map(|o| o.ops).sum();
        let latencies: Vec<f64> = outcomes
            .iter()
            .flat_map(|o| o.latencies_us.iter().copied())
            .collect();
        let latency = compute_timings(&latencies);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let ops_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            total_ops as f64 / elapsed.as_secs_f64()
        };

        log::info!(
            "  Done: {:.0} ops/s, p95={:.2}us, {} sweeps closed {} chunks, peak resident {} KiB",
            ops_per_sec,
            latency.p95_us,
            sweep.sweeps,
            sweep.tally.closed,
            sweep.peak_resident_bytes / 1024
        );

        Ok(StressResult {
            workload: workload.name.to_string(),
            threads: self.threads,
            total_ops,
            elapsed_ms,
            ops_per_sec,
            sweeps: sweep.sweeps,
            chunks_closed: sweep.tally.closed,
            contended_closes: sweep.tally.contended,
            codec_failures: sweep.tally.codec_failures,
            peak_resident_bytes: sweep.peak_resident_bytes,
            final_compressed_bytes: stats.compressed_bytes,
            mismatches,
            latency,
        })
    }

    /// Write seed content into the hot rows and compress it.
    fn populate(&self, grid: &BenchGrid, hot_rows: u32) {
        let mut acc = grid.accessor();
        for y in 0..hot_rows {
            for x in 0..grid.width() {
                let coord = GridCoord::new(x, y);
                acc.set(coord, seed_voxel(coord, grid.height()));
            }
        }
        let report = grid.flush();
        log::info!(
            "  Populated {} rows into {} chunks ({} compressed bytes)",
            hot_rows,
            report.tally.closed,
            report.tally.compressed_bytes
        );
    }

    /// Foreground loop for thread `t`. Writes only to columns congruent to
    /// `t` so every thread can verify its own writes afterwards.
    fn drive(&self, grid: &BenchGrid, workload: &Workload, hot_rows: u32, t: usize) -> WorkerOutcome {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
        let mut acc = grid.accessor();
        let mut written = HashMap::new();
        let mut latencies_us =
            Vec::with_capacity((workload.ops_per_thread / LATENCY_SAMPLE_EVERY) as usize + 1);
        let threads = self.threads as u32;
        let own_columns = grid.width() / threads;

        for op in 0..workload.ops_per_thread {
            let y = rng.gen_range(0..hot_rows);
            let sampled = op % LATENCY_SAMPLE_EVERY == 0;
            let began = sampled.then(Instant::now);

            if rng.gen_range(0..100) < workload.write_pct {
                let x = t as u32 + threads * rng.gen_range(0..own_columns);
                let value = [rng.gen_range(0..16), rng.gen_range(0..4096)];
                acc.set(GridCoord::new(x, y), value);
                written.insert((x, y), value);
            } else {
                let x = rng.gen_range(0..grid.width());
                std::hint::black_box(acc.get(GridCoord::new(x, y)));
            }

            if let Some(began) = began {
                latencies_us.push(began.elapsed().as_secs_f64() * 1e6);
            }
        }

        WorkerOutcome {
            written,
            latencies_us,
            ops: workload.ops_per_thread,
        }
    }
}

#[derive(Debug, Default)]
struct SweepSummary {
    sweeps: u64,
    tally: SweepTally,
    peak_resident_bytes: usize,
}

/// Advance a sweeper in real time until `stop` is raised.
fn sweep_until(grid: &BenchGrid, stop: &AtomicBool) -> SweepSummary {
    let mut sweeper = Sweeper::new(grid.config());
    let tick = (sweeper.interval() / 4).max(Duration::from_millis(1));
    let mut summary = SweepSummary::default();
    let mut last = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(tick);
        let now = Instant::now();
        if let Some(report) = sweeper.advance(grid, now - last) {
            summary.sweeps += 1;
            summary.tally = summary.tally + report.tally;
            let resident = grid.stats().resident_raw_bytes;
            summary.peak_resident_bytes = summary.peak_resident_bytes.max(resident);
        }
        last = now;
    }
    summary
}

/// Compute timing statistics from a list of samples in microseconds.
fn compute_timings(samples: &[f64]) -> TimingSeries {
    if samples.is_empty() {
        return TimingSeries {
            mean_us: 0.0,
            median_us: 0.0,
            p95_us: 0.0,
            p99_us: 0.0,
            min_us: 0.0,
            max_us: 0.0,
        };
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };
    let p95_idx = ((n as f64) * 0.95).ceil() as usize;
    let p99_idx = ((n as f64) * 0.99).ceil() as usize;

    TimingSeries {
        mean_us: mean,
        median_us: median,
        p95_us: sorted[p95_idx.min(n - 1)],
        p99_us: sorted[p99_idx.min(n - 1)],
        min_us: sorted[0],
        max_us: sorted[n - 1],
    }
}
