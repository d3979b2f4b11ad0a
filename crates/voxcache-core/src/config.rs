use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::CacheError;
use crate::math::chunk_shift;

/// Tunables for one voxel cache, loadable from RON.
///
/// Every field is optional in RON; missing fields take the defaults in
/// [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Grid width in voxels.
    pub width: u32,
    /// Grid height in voxels.
    pub height: u32,
    /// Voxels per chunk. Power of two.
    pub chunk_voxels: u32,
    /// Time between regular sweeps.
    pub gc_interval_ms: u64,
    /// Idle time after which an open chunk is eligible for closing.
    pub ttl_ms: u64,
    /// Upper bound on each per-worker scratch buffer, in bytes.
    pub scratch_capacity: usize,
    /// Ask the allocator to compact after a forced sweep.
    pub compact_on_flush: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            chunk_voxels: DEFAULT_CHUNK_VOXELS,
            gc_interval_ms: DEFAULT_GC_INTERVAL_MS,
            ttl_ms: DEFAULT_TTL_MS,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            compact_on_flush: true,
        }
    }
}

impl CacheConfig {
    /// Default configuration for a grid of the given size.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Parse a configuration from a RON string and validate it.
    pub fn from_ron_str(ron_str: &str) -> Result<Self, CacheError> {
        let options = ron::Options::default();
        let config: CacheConfig = options
            .from_str(ron_str)
            .map_err(|e| CacheError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, CacheError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| CacheError::ConfigParse(e.to_string()))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Total voxels in the grid.
    pub fn voxel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of chunks the grid is split into. Only meaningful after `validate`.
    pub fn chunk_count(&self) -> usize {
        self.voxel_count() / self.chunk_voxels.max(1) as usize
    }

    /// Check structural constraints on the grid shape.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.width == 0 || self.height == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "grid must be non-empty (got {}x{})",
                self.width, self.height
            )));
        }
        if chunk_shift(self.chunk_voxels).is_none() {
            return Err(CacheError::InvalidConfig(format!(
                "chunk_voxels must be a power of two (got {})",
                self.chunk_voxels
            )));
        }
        if self.voxel_count() % self.chunk_voxels as usize != 0 {
            return Err(CacheError::InvalidConfig(format!(
                "{}x{} voxels do not divide into chunks of {}",
                self.width, self.height, self.chunk_voxels
            )));
        }
        if self.scratch_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "scratch_capacity must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
