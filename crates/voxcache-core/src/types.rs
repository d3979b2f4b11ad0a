use glam::UVec2;
use std::time::Duration;

/// Voxel coordinate in grid-space. `x` runs along the width, `y` along the height.
pub type GridCoord = UVec2;

/// Opaque fixed-size cell value.
///
/// The cache never interprets a voxel. It is stored as raw bytes and copied
/// in and out by value, so any `bytemuck::Pod` type qualifies.
pub trait Voxel: bytemuck::Pod {}

impl<T: bytemuck::Pod> Voxel for T {}

/// Location of a voxel inside the chunk array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkAddress {
    /// Index into the grid's chunk array.
    pub chunk: usize,
    /// Voxel offset inside that chunk (not a byte offset).
    pub offset: usize,
}

/// Microseconds since a clock's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_since() {
        let a = Timestamp::from_micros(1_500);
        let b = Timestamp::from_micros(500);
        assert_eq!(a.saturating_since(b), Duration::from_millis(1));
        assert_eq!(b.saturating_since(a), Duration::ZERO);
    }

    #[test]
    fn test_pod_types_are_voxels() {
        fn assert_voxel<V: Voxel>() {}
        assert_voxel::<u8>();
        assert_voxel::<[u32; 2]>();
    }
}
