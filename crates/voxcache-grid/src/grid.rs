use std::marker::PhantomData;
use std::mem::size_of;

use voxcache_codec::{
    AllocStats, Allocator, Codec, Lz4Codec, Scratch, ScratchLayout, SystemAllocator,
};
use voxcache_core::math::{
    chunk_shift, join_linear, linear_index, linear_to_coord, split_linear,
};
use voxcache_core::{
    CacheConfig, CacheError, ChunkAddress, Clock, GridCoord, MonotonicClock, Timestamp, Voxel,
};

use crate::chunk::{Backing, Chunk};
use crate::state::Phase;
use crate::sweeper::{self, ClosePolicy, SweepKind, SweepReport};

/// A fixed-size 2-D voxel grid stored as independently compressible chunks.
///
/// The chunk array is built once and never resized, so the grid itself needs
/// no lock; each chunk guards its own buffer with an atomic state word.
/// Share it by reference (or `Arc`) between foreground threads and sweepers.
pub struct Grid<V, C = Lz4Codec, A = SystemAllocator>
where
    A: Allocator,
{
    config: CacheConfig,
    shift: u32,
    chunks: Box<[Chunk]>,
    backing: Backing<C, A>,
    layout: ScratchLayout,
    _voxel: PhantomData<fn() -> V>,
}

impl<V: Voxel> Grid<V> {
    /// Grid with LZ4 compression and the global allocator.
    pub fn with_defaults(config: CacheConfig) -> Result<Self, CacheError> {
        Self::new(config, Lz4Codec::new(), SystemAllocator::new())
    }
}

impl<V, C, A> Grid<V, C, A>
where
    V: Voxel,
    C: Codec,
    A: Allocator,
{
    /// Build a grid timed by a [`MonotonicClock`].
    pub fn new(config: CacheConfig, codec: C, allocator: A) -> Result<Self, CacheError> {
        Self::with_clock(config, codec, allocator, MonotonicClock::new())
    }

    /// Build a grid, validating the configuration and the codec's scratch needs.
    pub fn with_clock(
        config: CacheConfig,
        codec: C,
        allocator: A,
        clock: impl Clock + 'static,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        if size_of::<V>() == 0 {
            return Err(CacheError::InvalidConfig(
                "voxel type must have a nonzero size".to_string(),
            ));
        }
        let shift = chunk_shift(config.chunk_voxels).ok_or_else(|| {
            CacheError::InvalidConfig(format!(
                "chunk_voxels must be a power of two (got {})",
                config.chunk_voxels
            ))
        })?;

        let raw_len = config.chunk_voxels as usize * size_of::<V>();
        let layout = ScratchLayout::for_codec(&codec, raw_len, config.scratch_capacity)?;
        let chunks: Box<[Chunk]> = (0..config.chunk_count()).map(Chunk::new).collect();

        log::info!(
            "voxel grid {}x{}: {} chunks of {} bytes, scratch {}+{} bytes",
            config.width,
            config.height,
            chunks.len(),
            raw_len,
            layout.compress_len,
            layout.decompress_len
        );

        Ok(Self {
            config,
            shift,
            chunks,
            backing: Backing {
                codec,
                allocator,
                clock: Box::new(clock),
                raw_len,
            },
            layout,
            _voxel: PhantomData,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Raw bytes held by one open chunk.
    pub fn chunk_raw_len(&self) -> usize {
        self.backing.raw_len
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> &Chunk {
        &self.chunks[index]
    }

    pub fn codec(&self) -> &C {
        &self.backing.codec
    }

    pub fn allocator(&self) -> &A {
        &self.backing.allocator
    }

    pub fn alloc_stats(&self) -> AllocStats {
        self.backing.allocator.stats()
    }

    pub fn now(&self) -> Timestamp {
        self.backing.clock.now()
    }

    pub fn scratch_layout(&self) -> ScratchLayout {
        self.layout
    }

    /// A fresh scratch pair sized for this grid. One per worker.
    pub fn scratch(&self) -> Scratch {
        Scratch::new(self.layout)
    }

    /// A per-thread handle bundling this grid with its own scratch.
    pub fn accessor(&self) -> Accessor<'_, V, C, A> {
        Accessor {
            grid: self,
            scratch: self.scratch(),
        }
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        coord.x < self.config.width && coord.y < self.config.height
    }

    /// Chunk index and intra-chunk offset of a coordinate.
    ///
    /// # Panics
    /// Panics if `coord` lies outside the grid.
    pub fn locate(&self, coord: GridCoord) -> ChunkAddress {
        assert!(
            self.contains(coord),
            "coordinate {} outside {}x{} grid",
            coord,
            self.config.width,
            self.config.height
        );
        split_linear(linear_index(coord, self.config.width), self.shift)
    }

    /// Coordinate of the voxel at `address`. Inverse of [`Grid::locate`].
    ///
    /// # Panics
    /// Panics if `address` lies outside the grid.
    pub fn coord_of(&self, address: ChunkAddress) -> GridCoord {
        assert!(
            address.chunk < self.chunks.len()
                && address.offset < self.config.chunk_voxels as usize,
            "chunk address {:?} outside grid",
            address
        );
        linear_to_coord(join_linear(address, self.shift), self.config.width)
    }

    /// Read one voxel, decompressing its chunk if it is closed.
    ///
    /// # Panics
    /// Panics if `coord` lies outside the grid, or if the codec cannot
    /// restore a payload it produced.
    pub fn get(&self, scratch: &mut Scratch, coord: GridCoord) -> V {
        let address = self.locate(coord);
        self.chunks[address.chunk].read(&self.backing, scratch, address.offset)
    }

    /// Write one voxel, decompressing its chunk if it is closed.
    ///
    /// # Panics
    /// Same conditions as [`Grid::get`].
    pub fn set(&self, scratch: &mut Scratch, coord: GridCoord, value: V) {
        let address = self.locate(coord);
        self.chunks[address.chunk].write(&self.backing, scratch, address.offset, value);
    }

    /// Close every chunk regardless of TTL and wait for all of them.
    ///
    /// Afterwards no chunk is open (unless the codec refused it), so the grid
    /// is compact and its compressed payloads can be read for persistence.
    pub fn flush(&self) -> SweepReport {
        let report = sweeper::run(
            self,
            0..self.chunks.len(),
            ClosePolicy::Force,
            SweepKind::Forced,
        );
        if self.config.compact_on_flush {
            self.backing.allocator.collect(true);
        }
        report
    }

    /// Close chunks in `range` idle for at least the TTL. Used by [`crate::Sweeper`].
    pub(crate) fn close_idle_in(
        &self,
        range: std::ops::Range<usize>,
        kind: SweepKind,
    ) -> SweepReport {
        sweeper::run(
            self,
            range,
            ClosePolicy::Idle {
                now: self.now(),
                ttl: self.config.ttl(),
            },
            kind,
        )
    }

    pub(crate) fn backing(&self) -> &Backing<C, A> {
        &self.backing
    }

    pub(crate) fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Point-in-time residency counters. Lock-free; approximate while other
    /// threads are active.
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            chunk_count: self.chunks.len(),
            ..CacheStats::default()
        };
        for chunk in self.chunks.iter() {
            match chunk.phase() {
                Phase::Vacant => stats.vacant += 1,
                Phase::Open => stats.open += 1,
                Phase::Busy => stats.busy += 1,
                Phase::Closed => {
                    stats.closed += 1;
                    stats.compressed_bytes += chunk.compressed_size().unwrap_or(0);
                }
            }
        }
        stats.resident_raw_bytes = stats.open * self.backing.raw_len;
        stats
    }
}

impl<V, C, A: Allocator> Drop for Grid<V, C, A> {
    fn drop(&mut self) {
        for chunk in self.chunks.iter_mut() {
            if let Some(buf) = chunk.take_buffer() {
                self.backing.allocator.free(buf);
            }
        }
    }
}

/// Residency counters for a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub chunk_count: usize,
    pub vacant: usize,
    pub open: usize,
    pub closed: usize,
    pub busy: usize,
    /// Bytes held by open chunks.
    pub resident_raw_bytes: usize,
    /// Bytes held by closed chunks.
    pub compressed_bytes: usize,
}

/// One worker's handle onto a grid: the grid reference plus owned scratch.
pub struct Accessor<'g, V, C = Lz4Codec, A = SystemAllocator>
where
    A: Allocator,
{
    grid: &'g Grid<V, C, A>,
    scratch: Scratch,
}

impl<'g, V, C, A> Accessor<'g, V, C, A>
where
    V: Voxel,
    C: Codec,
    A: Allocator,
{
    pub fn grid(&self) -> &'g Grid<V, C, A> {
        self.grid
    }

    pub fn get(&mut self, coord: GridCoord) -> V {
        self.grid.get(&mut self.scratch, coord)
    }

    pub fn set(&mut self, coord: GridCoord, value: V) {
        self.grid.set(&mut self.scratch, coord, value)
    }
}
