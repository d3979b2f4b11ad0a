use crate::codec::Codec;
use crate::error::CodecError;

/// Tag byte for a chunk stored as one repeated voxel.
const FILL_TAG: u8 = 0xF1;

/// Tag byte for a chunk delegated to the inner codec.
const BLOCK_TAG: u8 = 0xB1;

/// Bytes of the fill header: tag + little-endian u32 raw length.
const FILL_HEADER_LEN: usize = 5;

/// Wraps a codec and stores single-voxel fills (e.g. untouched, all-air
/// chunks) as one voxel plus a short header instead of running the inner codec.
///
/// Payload layout:
///   `[FILL_TAG, raw_len: u32 LE, voxel bytes; stride]`
///   `[BLOCK_TAG, inner payload..]`
#[derive(Debug, Clone, Copy)]
pub struct FillCodec<C> {
    inner: C,
    stride: usize,
}

impl<C: Codec> FillCodec<C> {
    /// `stride` is the voxel size in bytes.
    ///
    /// # Panics
    /// Panics if `stride` is zero.
    pub fn new(inner: C, stride: usize) -> Self {
        assert!(stride > 0, "fill stride must be at least one byte");
        Self { inner, stride }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The repeated voxel if every `stride`-sized block of `data` is identical.
    pub fn detect_fill<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        if data.is_empty() || data.len() % self.stride != 0 {
            return None;
        }
        let first = &data[..self.stride];
        data.chunks_exact(self.stride)
            .all(|voxel| voxel == first)
            .then_some(first)
    }

    fn expand_fill(&self, body: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        if body.len() != FILL_HEADER_LEN - 1 + self.stride {
            return Err(CodecError::Malformed(format!(
                "fill payload of {} bytes, expected {}",
                body.len() + 1,
                FILL_HEADER_LEN + self.stride
            )));
        }
        let raw_len = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        if raw_len % self.stride != 0 {
            return Err(CodecError::Malformed(format!(
                "fill length {} is not a multiple of stride {}",
                raw_len, self.stride
            )));
        }
        if dst.len() < raw_len {
            return Err(CodecError::OutputTooSmall {
                needed: raw_len,
                available: dst.len(),
            });
        }
        let voxel = &body[4..];
        for out in dst[..raw_len].chunks_exact_mut(self.stride) {
            out.copy_from_slice(voxel);
        }
        Ok(raw_len)
    }
}

impl<C: Codec> Codec for FillCodec<C> {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        if let Some(voxel) = self.detect_fill(src) {
            let needed = FILL_HEADER_LEN + self.stride;
            if dst.len() < needed {
                return Err(CodecError::OutputTooSmall {
                    needed,
                    available: dst.len(),
                });
            }
            let raw_len = u32::try_from(src.len())
                .map_err(|_| CodecError::Compress(format!("{} bytes exceed u32", src.len())))?;
            dst[0] = FILL_TAG;
            dst[1..FILL_HEADER_LEN].copy_from_slice(&raw_len.to_le_bytes());
            dst[FILL_HEADER_LEN..needed].copy_from_slice(voxel);
            return Ok(needed);
        }

        let (tag, body) = dst
            .split_first_mut()
            .ok_or(CodecError::OutputTooSmall {
                needed: 1,
                available: 0,
            })?;
        *tag = BLOCK_TAG;
        Ok(1 + self.inner.compress(src, body)?)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        match src.split_first() {
            Some((&FILL_TAG, body)) => self.expand_fill(body, dst),
            Some((&BLOCK_TAG, body)) => self.inner.decompress(body, dst),
            Some((tag, _)) => Err(CodecError::Malformed(format!("unknown tag {:#04x}", tag))),
            None => Err(CodecError::Malformed("empty payload".to_string())),
        }
    }

    fn safe_compressed_size(&self, raw_len: usize) -> usize {
        (1 + self.inner.safe_compressed_size(raw_len)).max(FILL_HEADER_LEN + self.stride)
    }

    fn safe_decompressed_size(&self, raw_len: usize) -> usize {
        self.inner.safe_decompressed_size(raw_len).max(raw_len)
    }
}
