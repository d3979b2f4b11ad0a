use voxcache_core::CacheError;

use crate::codec::Codec;

/// Sizes of the per-worker scratch buffers for one chunk's raw size.
///
/// Computed once when a grid is built and checked against a fixed capacity,
/// so the compress/decompress hot path never allocates or overruns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchLayout {
    pub compress_len: usize,
    pub decompress_len: usize,
}

impl ScratchLayout {
    /// Query `codec` for its worst-case sizes and validate them against `capacity`.
    pub fn for_codec<C: Codec + ?Sized>(
        codec: &C,
        raw_len: usize,
        capacity: usize,
    ) -> Result<Self, CacheError> {
        let compress_len = codec.safe_compressed_size(raw_len);
        if compress_len > capacity {
            return Err(CacheError::SizeBudgetExceeded {
                buffer: "compression",
                required: compress_len,
                capacity,
            });
        }

        let decompress_len = codec.safe_decompressed_size(raw_len);
        if decompress_len > capacity {
            return Err(CacheError::SizeBudgetExceeded {
                buffer: "decompression",
                required: decompress_len,
                capacity,
            });
        }
        if decompress_len < raw_len {
            return Err(CacheError::InvalidConfig(format!(
                "codec reports {} decompressed bytes for a {}-byte chunk",
                decompress_len, raw_len
            )));
        }

        Ok(Self {
            compress_len,
            decompress_len,
        })
    }
}

/// One worker's compression and decompression destinations.
///
/// Owned by exactly one worker at a time and passed by `&mut` into every
/// chunk transition; never shared, so it needs no synchronization.
#[derive(Debug)]
pub struct Scratch {
    compress: Box<[u8]>,
    decompress: Box<[u8]>,
}

impl Scratch {
    pub fn new(layout: ScratchLayout) -> Self {
        Self {
            compress: vec![0u8; layout.compress_len].into_boxed_slice(),
            decompress: vec![0u8; layout.decompress_len].into_boxed_slice(),
        }
    }

    pub fn layout(&self) -> ScratchLayout {
        ScratchLayout {
            compress_len: self.compress.len(),
            decompress_len: self.decompress.len(),
        }
    }

    pub fn compress_buf(&mut self) -> &mut [u8] {
        &mut self.compress
    }

    pub fn decompress_buf(&mut self) -> &mut [u8] {
        &mut self.decompress
    }
}
