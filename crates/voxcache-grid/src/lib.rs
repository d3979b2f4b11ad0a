//! Compressed chunk cache for a fixed-size 2-D voxel grid.
//!
//! Voxels live in power-of-two sized chunks. A chunk is opened (decompressed)
//! on first access and closed (compressed) again by a [`Sweeper`] once it has
//! been idle for the configured TTL, or all at once by [`Grid::flush`].

pub mod chunk;
pub mod grid;
pub mod snapshot;
pub mod state;
pub mod sweeper;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod test_harness;

pub use chunk::{Chunk, CloseOutcome};
pub use grid::{Accessor, CacheStats, Grid};
pub use snapshot::GridSnapshot;
pub use state::Phase;
pub use sweeper::{Quadrant, SweepKind, SweepReport, SweepTally, Sweeper};
