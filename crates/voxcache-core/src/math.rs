use crate::types::{ChunkAddress, GridCoord};

/// `log2(chunk_voxels)` if `chunk_voxels` is a nonzero power of two.
pub fn chunk_shift(chunk_voxels: u32) -> Option<u32> {
    chunk_voxels
        .is_power_of_two()
        .then(|| chunk_voxels.trailing_zeros())
}

/// Row-major linear offset of a voxel coordinate.
pub fn linear_index(coord: GridCoord, width: u32) -> usize {
    coord.y as usize * width as usize + coord.x as usize
}

/// Split a linear offset into chunk index and intra-chunk offset.
///
/// `chunk = linear >> shift`, `offset = linear & (2^shift - 1)`.
pub fn split_linear(linear: usize, shift: u32) -> ChunkAddress {
    let mask = (1usize << shift) - 1;
    ChunkAddress {
        chunk: linear >> shift,
        offset: linear & mask,
    }
}

/// Convert a chunk address back to a row-major linear offset.
pub fn join_linear(address: ChunkAddress, shift: u32) -> usize {
    (address.chunk << shift) | address.offset
}

/// Convert a row-major linear offset back to a voxel coordinate.
pub fn linear_to_coord(linear: usize, width: u32) -> GridCoord {
    let w = width as usize;
    GridCoord::new((linear % w) as u32, (linear / w) as u32)
}

/// Batch length used to split `len` items into roughly square parallel work units.
pub fn square_batch_len(len: usize) -> usize {
    (len as f64).sqrt() as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_shift_power_of_two() {
        assert_eq!(chunk_shift(1), Some(0));
        assert_eq!(chunk_shift(64), Some(6));
        assert_eq!(chunk_shift(1024), Some(10));
        assert_eq!(chunk_shift(0), None);
        assert_eq!(chunk_shift(96), None);
    }

    #[test]
    fn test_split_and_join_linear() {
        let shift = chunk_shift(64).expect("power of two");
        let address = split_linear(64 * 3 + 17, shift);
        assert_eq!(address, ChunkAddress { chunk: 3, offset: 17 });
        assert_eq!(join_linear(address, shift), 64 * 3 + 17);
    }

    #[test]
    fn test_linear_index_row_major() {
        let width = 16;
        assert_eq!(linear_index(GridCoord::new(0, 0), width), 0);
        assert_eq!(linear_index(GridCoord::new(15, 0), width), 15);
        assert_eq!(linear_index(GridCoord::new(0, 1), width), 16);
        assert_eq!(linear_index(GridCoord::new(3, 2), width), 35);
        assert_eq!(linear_to_coord(35, width), GridCoord::new(3, 2));
    }

    #[test]
    fn test_square_batch_len() {
        assert_eq!(square_batch_len(0), 1);
        assert_eq!(square_batch_len(1), 2);
        assert_eq!(square_batch_len(16), 5);
        assert_eq!(square_batch_len(1000), 32);
    }
}
