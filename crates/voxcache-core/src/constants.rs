//! Single source of truth for cache-wide constants and configuration defaults.

/// Default number of voxels per chunk. Must be a power of two.
pub const DEFAULT_CHUNK_VOXELS: u32 = 1024;

/// Default grid width in voxels.
pub const DEFAULT_WIDTH: u32 = 4096;

/// Default grid height in voxels.
pub const DEFAULT_HEIGHT: u32 = 4096;

/// Default time between regular sweeps, in milliseconds.
pub const DEFAULT_GC_INTERVAL_MS: u64 = 250;

/// Default idle time after which an open chunk may be closed, in milliseconds.
pub const DEFAULT_TTL_MS: u64 = 2_000;

/// Fixed capacity (bytes) that each scratch buffer may not exceed.
/// Checked against the codec's worst-case sizes when a grid is built.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 64 * 1024;

/// Number of quadrants the chunk index space is split into for regular sweeps.
pub const QUADRANT_COUNT: usize = 4;

/// Alignment of a chunk header, one cache line.
pub const CACHE_LINE_BYTES: usize = 64;
