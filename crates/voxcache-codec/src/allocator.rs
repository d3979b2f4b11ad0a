use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Backing-store allocator for chunk buffers.
///
/// Shared by every worker; implementations must be internally synchronized.
/// Allocation failure is not reported: like the global allocator, running
/// out of memory aborts.
pub trait Allocator: Send + Sync {
    /// Allocate a zero-filled buffer of exactly `len` bytes.
    fn alloc_zeroed(&self, len: usize) -> Vec<u8>;

    /// Resize `buf` to `new_len` bytes, preserving the common prefix and
    /// releasing any capacity beyond `new_len`. Grown bytes are zeroed.
    fn realloc(&self, buf: &mut Vec<u8>, new_len: usize);

    /// Release a buffer previously returned by this allocator.
    fn free(&self, buf: Vec<u8>);

    /// Compact internal state. `force` requests a full, possibly slow pass.
    fn collect(&self, _force: bool) {}

    fn stats(&self) -> AllocStats;
}

/// Counters describing an allocator's live state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocStats {
    /// Bytes currently handed out.
    pub live_bytes: usize,
    /// Buffers currently handed out.
    pub live_buffers: usize,
    pub reallocs: u64,
    pub collections: u64,
}

/// Global-allocator backed implementation with live-byte accounting.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    live_bytes: AtomicUsize,
    live_buffers: AtomicUsize,
    reallocs: AtomicU64,
    collections: AtomicU64,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for SystemAllocator {
    fn alloc_zeroed(&self, len: usize) -> Vec<u8> {
        self.live_bytes.fetch_add(len, Ordering::Relaxed);
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        vec![0u8; len]
    }

    fn realloc(&self, buf: &mut Vec<u8>, new_len: usize) {
        let old_len = buf.len();
        if new_len < old_len {
            buf.truncate(new_len);
            buf.shrink_to_fit();
            self.live_bytes.fetch_sub(old_len - new_len, Ordering::Relaxed);
        } else if new_len > old_len {
            buf.reserve_exact(new_len - old_len);
            buf.resize(new_len, 0);
            self.live_bytes.fetch_add(new_len - old_len, Ordering::Relaxed);
        }
        self.reallocs.fetch_add(1, Ordering::Relaxed);
    }

    fn free(&self, buf: Vec<u8>) {
        self.live_bytes.fetch_sub(buf.len(), Ordering::Relaxed);
        self.live_buffers.fetch_sub(1, Ordering::Relaxed);
        drop(buf);
    }

    fn collect(&self, force: bool) {
        // The global allocator has no compaction hook; record the request.
        self.collections.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "allocator collect (force={}): {} live bytes in {} buffers",
            force,
            self.live_bytes.load(Ordering::Relaxed),
            self.live_buffers.load(Ordering::Relaxed)
        );
    }

    fn stats(&self) -> AllocStats {
        AllocStats {
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            live_buffers: self.live_buffers.load(Ordering::Relaxed),
            reallocs: self.reallocs.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
        }
    }
}

impl<A: Allocator + ?Sized> Allocator for std::sync::Arc<A> {
    fn alloc_zeroed(&self, len: usize) -> Vec<u8> {
        (**self).alloc_zeroed(len)
    }

    fn realloc(&self, buf: &mut Vec<u8>, new_len: usize) {
        (**self).realloc(buf, new_len)
    }

    fn free(&self, buf: Vec<u8>) {
        (**self).free(buf)
    }

    fn collect(&self, force: bool) {
        (**self).collect(force)
    }

    fn stats(&self) -> AllocStats {
        (**self).stats()
    }
}
