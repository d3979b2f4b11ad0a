/// Errors reported by a [`crate::Codec`].
///
/// The cache treats every one of these as recoverable on close: the chunk
/// simply stays open until a later sweep.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compress(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("output buffer too small: need {needed} bytes, have {available}")]
    OutputTooSmall { needed: usize, available: usize },

    #[error("malformed compressed payload: {0}")]
    Malformed(String),
}
