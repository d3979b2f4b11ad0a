//! Whole-cache scenarios: foreground traffic interleaved with sweeps,
//! flushes and concurrent threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voxcache_codec::{FillCodec, Lz4Codec, SystemAllocator};
use voxcache_core::{CacheConfig, GridCoord, ManualClock};

use crate::grid::Grid;
use crate::state::Phase;
use crate::sweeper::Sweeper;
use crate::test_harness::{small_config, CountingCodec};

#[test]
fn test_four_sweeps_close_every_chunk_and_reads_reopen() {
    let grid: Grid<u32, _, _> = Grid::new(
        small_config(4, 0),
        CountingCodec::new(Lz4Codec::new()),
        SystemAllocator::new(),
    )
    .expect("grid");
    let mut acc = grid.accessor();
    for y in 0..4 {
        for x in 0..64 {
            acc.set(GridCoord::new(x, y), y * 64 + x);
        }
    }
    assert!(grid.chunks().iter().all(|c| c.is_open()));

    let mut sweeper = Sweeper::new(grid.config());
    for _ in 0..4 {
        let report = sweeper.sweep(&grid);
        assert_eq!(report.tally.closed, 1);
    }
    assert!(grid.chunks().iter().all(|c| c.phase() == Phase::Closed));
    assert_eq!(grid.stats().resident_raw_bytes, 0);

    for y in 0..4 {
        for x in 0..64 {
            assert_eq!(acc.get(GridCoord::new(x, y)), y * 64 + x);
        }
    }
    assert!(grid.chunks().iter().all(|c| c.is_open()));
    assert_eq!(grid.codec().decompressions(), 4);
}

#[test]
fn test_random_content_survives_compression() {
    let config = CacheConfig {
        chunk_voxels: 256,
        scratch_capacity: 8192,
        ..CacheConfig::with_size(64, 64)
    };
    let grid: Grid<u16> = Grid::with_defaults(config).expect("grid");
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut expected = vec![0u16; 64 * 64];
    let mut acc = grid.accessor();

    for round in 0..3 {
        for (i, slot) in expected.iter_mut().enumerate() {
            // Left half noisy, right half runs of a few values.
            let x = (i % 64) as u32;
            let value = if x < 32 { rng.gen() } else { rng.gen_range(0..3) };
            *slot = value;
            acc.set(GridCoord::new(x, (i / 64) as u32), value);
        }
        let report = grid.flush();
        assert_eq!(report.tally.codec_failures, 0, "round {}", round);
        for (i, value) in expected.iter().enumerate() {
            let coord = GridCoord::new((i % 64) as u32, (i / 64) as u32);
            assert_eq!(acc.get(coord), *value, "round {} at {}", round, coord);
        }
    }
}

#[test]
fn test_uniform_chunks_collapse_under_fill_codec() {
    let stride = std::mem::size_of::<u32>();
    let grid: Grid<u32, _, _> = Grid::new(
        small_config(4, 0),
        FillCodec::new(Lz4Codec::new(), stride),
        SystemAllocator::new(),
    )
    .expect("grid");
    let mut acc = grid.accessor();
    for x in 0..64 {
        acc.set(GridCoord::new(x, 0), 0xDEAD_BEEF);
        acc.set(GridCoord::new(x, 1), x);
    }
    grid.flush();

    let filled = grid.chunk(0).compressed_size().expect("closed");
    let varied = grid.chunk(1).compressed_size().expect("closed");
    assert!(filled < varied);
    assert_eq!(acc.get(GridCoord::new(40, 0)), 0xDEAD_BEEF);
    assert_eq!(acc.get(GridCoord::new(40, 1)), 40);
}

#[test]
fn test_flush_leaves_nothing_resident() {
    let grid: Grid<[u8; 4]> = Grid::with_defaults(small_config(16, 3_600_000)).expect("grid");
    let mut acc = grid.accessor();
    for y in (0..16).step_by(3) {
        acc.set(GridCoord::new(y, y), [y as u8; 4]);
    }
    let before = grid.stats();
    assert_eq!(before.open, 6);

    grid.flush();
    let after = grid.stats();
    assert_eq!(after.open, 0);
    assert_eq!(after.busy, 0);
    assert_eq!(after.resident_raw_bytes, 0);
    assert_eq!(after.closed, 6);
    assert_eq!(after.vacant, 10);
}

#[test]
fn test_idle_chunks_close_while_hot_ones_stay_open() {
    let clock = Arc::new(ManualClock::new());
    let grid: Grid<u32> = Grid::with_clock(
        small_config(4, 500),
        Lz4Codec::new(),
        SystemAllocator::new(),
        Arc::clone(&clock),
    )
    .expect("grid");
    let mut sweeper = Sweeper::new(grid.config());
    let mut acc = grid.accessor();
    for y in 0..4 {
        acc.set(GridCoord::new(1, y), y);
    }

    // Keep chunk 2 hot while time passes in gc-interval steps.
    for _ in 0..20 {
        clock.advance(Duration::from_millis(50));
        acc.get(GridCoord::new(1, 2));
        sweeper.advance(&grid, Duration::from_millis(50));
    }
    assert_eq!(grid.chunk(0).phase(), Phase::Closed);
    assert_eq!(grid.chunk(1).phase(), Phase::Closed);
    assert!(grid.chunk(2).is_open());
    assert_eq!(grid.chunk(3).phase(), Phase::Closed);
}

#[test]
fn test_concurrent_access_and_sweeps_lose_no_updates() {
    const WRITERS: u32 = 4;
    const SWEEPERS: usize = 2;
    const ROUNDS: u32 = 50;

    let grid: Grid<u64> = Grid::with_defaults(small_config(16, 0)).expect("grid");
    let stop = AtomicBool::new(false);

    std::thread::scope(|s| {
        for i in 0..SWEEPERS {
            let grid = &grid;
            let stop = &stop;
            s.spawn(move || {
                let mut sweeper = Sweeper::new(grid.config());
                let mut n = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    if i == 0 && n % 16 == 15 {
                        sweeper.force(grid);
                    } else {
                        sweeper.sweep(grid);
                    }
                    n += 1;
                }
            });
        }

        let writers: Vec<_> = (0..WRITERS)
            .map(|t| {
                let grid = &grid;
                s.spawn(move || {
                    let mut acc = grid.accessor();
                    for round in 0..ROUNDS {
                        for y in 0..16 {
                            for x in (t..64).step_by(WRITERS as usize) {
                                let coord = GridCoord::new(x, y);
                                let value = (u64::from(round) << 32) | u64::from(y * 64 + x);
                                acc.set(coord, value);
                                assert_eq!(acc.get(coord), value);
                            }
                        }
                    }
                })
            })
            .collect();
        let results: Vec<_> = writers.into_iter().map(|w| w.join()).collect();
        stop.store(true, Ordering::Relaxed);
        for result in results {
            result.expect("writer panicked");
        }
    });

    let last = u64::from(ROUNDS - 1) << 32;
    let mut acc = grid.accessor();
    for y in 0..16 {
        for x in 0..64 {
            assert_eq!(acc.get(GridCoord::new(x, y)), last | u64::from(y * 64 + x));
        }
    }
    let report = grid.flush();
    assert_eq!(report.tally.codec_failures, 0);
    assert_eq!(grid.stats().open, 0);
}
