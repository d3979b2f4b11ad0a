use crate::error::CodecError;

/// A pluggable chunk compressor.
///
/// One codec value is shared by every worker, so implementations must be
/// reentrant: `compress` and `decompress` take `&self` and may run
/// concurrently from any thread. Per-call state lives in the caller's
/// scratch buffers, never in the codec.
pub trait Codec: Send + Sync {
    /// Compress `src` into `dst`, returning the number of bytes written.
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError>;

    /// Decompress `src` into `dst`, returning the number of bytes written.
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError>;

    /// Worst-case output size of `compress` for `raw_len` input bytes.
    fn safe_compressed_size(&self, raw_len: usize) -> usize;

    /// Worst-case output size of `decompress` for a payload that was produced
    /// from `raw_len` raw bytes.
    fn safe_decompressed_size(&self, raw_len: usize) -> usize;
}

impl<C: Codec + ?Sized> Codec for std::sync::Arc<C> {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        (**self).compress(src, dst)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        (**self).decompress(src, dst)
    }

    fn safe_compressed_size(&self, raw_len: usize) -> usize {
        (**self).safe_compressed_size(raw_len)
    }

    fn safe_decompressed_size(&self, raw_len: usize) -> usize {
        (**self).safe_decompressed_size(raw_len)
    }
}
