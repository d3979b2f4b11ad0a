//! Codec wrappers and fixtures shared by the unit tests in this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use voxcache_codec::{Codec, CodecError};
use voxcache_core::CacheConfig;

/// Counts calls into an inner codec.
pub(crate) struct CountingCodec<C> {
    inner: C,
    compressions: AtomicUsize,
    decompressions: AtomicUsize,
}

impl<C: Codec> CountingCodec<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            compressions: AtomicUsize::new(0),
            decompressions: AtomicUsize::new(0),
        }
    }

    pub fn compressions(&self) -> usize {
        self.compressions.load(Ordering::SeqCst)
    }

    pub fn decompressions(&self) -> usize {
        self.decompressions.load(Ordering::SeqCst)
    }
}

impl<C: Codec> Codec for CountingCodec<C> {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        self.compressions.fetch_add(1, Ordering::SeqCst);
        self.inner.compress(src, dst)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        self.decompressions.fetch_add(1, Ordering::SeqCst);
        self.inner.decompress(src, dst)
    }

    fn safe_compressed_size(&self, raw_len: usize) -> usize {
        self.inner.safe_compressed_size(raw_len)
    }

    fn safe_decompressed_size(&self, raw_len: usize) -> usize {
        self.inner.safe_decompressed_size(raw_len)
    }
}

/// Fails every compression while its switch is on.
pub(crate) struct FlakyCodec<C> {
    inner: C,
    failing: AtomicBool,
}

impl<C: Codec> FlakyCodec<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl<C: Codec> Codec for FlakyCodec<C> {
    fn compress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CodecError::Compress("switched off".to_string()));
        }
        self.inner.compress(src, dst)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        self.inner.decompress(src, dst)
    }

    fn safe_compressed_size(&self, raw_len: usize) -> usize {
        self.inner.safe_compressed_size(raw_len)
    }

    fn safe_decompressed_size(&self, raw_len: usize) -> usize {
        self.inner.safe_decompressed_size(raw_len)
    }
}

/// A grid of `chunks` chunks of 64 voxels, 64 voxels wide.
pub(crate) fn small_config(chunks: u32, ttl_ms: u64) -> CacheConfig {
    CacheConfig {
        width: 64,
        height: chunks,
        chunk_voxels: 64,
        gc_interval_ms: 10,
        ttl_ms,
        scratch_capacity: 4096,
        compact_on_flush: true,
    }
}
