use crate::codec::Codec;
use crate::error::CodecError;

/// LZ4 block compression. Stateless, so a single value is safely shared.
///
/// Blocks carry no size prefix; the cache always knows a chunk's raw size.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Lz4Codec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for Lz4Codec {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        let needed = lz4_flex::block::get_maximum_output_size(src.len());
        if dst.len() < needed {
            return Err(CodecError::OutputTooSmall {
                needed,
                available: dst.len(),
            });
        }
        lz4_flex::block::compress_into(src, dst).map_err(|e| CodecError::Compress(e.to_string()))
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        lz4_flex::block::decompress_into(src, dst)
            .map_err(|e| CodecError::Decompress(e.to_string()))
    }

    fn safe_compressed_size(&self, raw_len: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(raw_len)
    }

    fn safe_decompressed_size(&self, raw_len: usize) -> usize {
        raw_len
    }
}
