use std::ops::{Add, Range};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use voxcache_codec::{Allocator, Codec};
use voxcache_core::constants::QUADRANT_COUNT;
use voxcache_core::math::square_batch_len;
use voxcache_core::{CacheConfig, Timestamp, Voxel};

use crate::chunk::CloseOutcome;
use crate::grid::Grid;

/// One quarter of a grid's chunk index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Quadrant(u8);

impl Quadrant {
    pub const ALL: [Quadrant; QUADRANT_COUNT] = [Quadrant(0), Quadrant(1), Quadrant(2), Quadrant(3)];

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The quadrant swept after this one.
    pub fn next(self) -> Self {
        Quadrant((self.0 + 1) % QUADRANT_COUNT as u8)
    }

    /// Chunk indices covered by this quadrant. The four ranges partition
    /// `0..chunk_count` exactly; the last absorbs any remainder.
    pub fn range(self, chunk_count: usize) -> Range<usize> {
        let q = self.index();
        let start = q * chunk_count / QUADRANT_COUNT;
        let end = (q + 1) * chunk_count / QUADRANT_COUNT;
        start..end
    }
}

/// What a sweep does with each chunk it visits.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ClosePolicy {
    /// Close chunks idle for at least `ttl` as of `now`.
    Idle { now: Timestamp, ttl: Duration },
    /// Close every chunk, waiting out accessors.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Regular(Quadrant),
    Forced,
}

/// Per-outcome counts for one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepTally {
    pub visited: usize,
    pub closed: usize,
    pub fresh: usize,
    pub already_closed: usize,
    pub contended: usize,
    pub codec_failures: usize,
    /// Total compressed size of the chunks closed by this sweep.
    pub compressed_bytes: usize,
}

impl SweepTally {
    fn record(&mut self, outcome: CloseOutcome) {
        self.visited += 1;
        match outcome {
            CloseOutcome::Closed { compressed } => {
                self.closed += 1;
                self.compressed_bytes += compressed;
            }
            CloseOutcome::Fresh => self.fresh += 1,
            CloseOutcome::AlreadyClosed => self.already_closed += 1,
            CloseOutcome::Contended => self.contended += 1,
            CloseOutcome::CodecFailed => self.codec_failures += 1,
        }
    }
}

impl Add for SweepTally {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            visited: self.visited + other.visited,
            closed: self.closed + other.closed,
            fresh: self.fresh + other.fresh,
            already_closed: self.already_closed + other.already_closed,
            contended: self.contended + other.contended,
            codec_failures: self.codec_failures + other.codec_failures,
            compressed_bytes: self.compressed_bytes + other.compressed_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub kind: SweepKind,
    pub tally: SweepTally,
    pub elapsed: Duration,
}

/// Close chunks in `range` on the rayon pool, one scratch pair per task.
pub(crate) fn run<V, C, A>(
    grid: &Grid<V, C, A>,
    range: Range<usize>,
    policy: ClosePolicy,
    kind: SweepKind,
) -> SweepReport
where
    V: Voxel,
    C: Codec,
    A: Allocator,
{
    let start = Instant::now();
    let chunks = &grid.chunks()[range];
    let backing = grid.backing();

    let tally = chunks
        .par_chunks(square_batch_len(chunks.len()))
        .map_init(
            || grid.scratch(),
            |scratch, batch| {
                let mut tally = SweepTally::default();
                for chunk in batch {
                    let outcome = match policy {
                        ClosePolicy::Idle { now, ttl } => {
                            chunk.close_if_idle(backing, scratch, now, ttl)
                        }
                        ClosePolicy::Force => chunk.close_blocking(backing, scratch),
                    };
                    tally.record(outcome);
                }
                tally
            },
        )
        .reduce(SweepTally::default, |a, b| a + b);

    let report = SweepReport {
        kind,
        tally,
        elapsed: start.elapsed(),
    };
    log::debug!(
        "sweep {:?}: visited {}, closed {} ({} bytes), fresh {}, contended {}, codec failures {} in {:?}",
        report.kind,
        tally.visited,
        tally.closed,
        tally.compressed_bytes,
        tally.fresh,
        tally.contended,
        tally.codec_failures,
        report.elapsed
    );
    report
}

/// Time-driven garbage collector for a grid.
///
/// Each regular sweep visits one quadrant, rotating round-robin, so the full
/// grid is scanned once every four intervals. Forced sweeps visit everything
/// and leave the rotation alone.
#[derive(Debug, Clone)]
pub struct Sweeper {
    interval: Duration,
    accumulated: Duration,
    next: Quadrant,
    completed: u64,
}

impl Sweeper {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_interval(config.gc_interval())
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
            next: Quadrant::default(),
            completed: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The quadrant the next regular sweep will visit.
    pub fn next_quadrant(&self) -> Quadrant {
        self.next
    }

    /// Regular sweeps run so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Account for `dt` of elapsed time and sweep once the interval is reached.
    pub fn advance<V, C, A>(&mut self, grid: &Grid<V, C, A>, dt: Duration) -> Option<SweepReport>
    where
        V: Voxel,
        C: Codec,
        A: Allocator,
    {
        self.accumulated += dt;
        if self.accumulated < self.interval {
            return None;
        }
        self.accumulated = Duration::ZERO;
        Some(self.sweep(grid))
    }

    /// Run one regular sweep over the current quadrant now, then rotate.
    pub fn sweep<V, C, A>(&mut self, grid: &Grid<V, C, A>) -> SweepReport
    where
        V: Voxel,
        C: Codec,
        A: Allocator,
    {
        let quadrant = self.next;
        let report = grid.close_idle_in(
            quadrant.range(grid.chunk_count()),
            SweepKind::Regular(quadrant),
        );
        self.next = quadrant.next();
        self.completed += 1;
        report
    }

    /// Flush the whole grid immediately and restart the interval.
    pub fn force<V, C, A>(&mut self, grid: &Grid<V, C, A>) -> SweepReport
    where
        V: Voxel,
        C: Codec,
        A: Allocator,
    {
        self.accumulated = Duration::ZERO;
        grid.flush()
    }
}
