use std::cell::UnsafeCell;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_utils::Backoff;
use voxcache_codec::{Allocator, Codec, Scratch};
use voxcache_core::{Clock, Timestamp, Voxel};

use crate::state::{Access, CloseBlocked, Entry, Phase, Pin, StateWord, Transition};

/// Everything a chunk transition needs besides the chunk itself.
pub(crate) struct Backing<C, A> {
    pub codec: C,
    pub allocator: A,
    pub clock: Box<dyn Clock>,
    /// Raw size of one open chunk in bytes.
    pub raw_len: usize,
}

/// Result of one close attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Compressed down to this many bytes.
    Closed { compressed: usize },
    /// Accessed within the TTL; left open.
    Fresh,
    /// Already closed or never opened.
    AlreadyClosed,
    /// Pinned by an accessor or mid-transition; retried on a later sweep.
    Contended,
    /// The codec refused; the chunk stays open and unmodified.
    CodecFailed,
}

/// A granule of voxels that is either resident (open) or compressed (closed).
///
/// The buffer is only touched by the holder of a pin or of the `Busy`
/// transition, both granted by the chunk's state word.
#[repr(align(64))]
pub struct Chunk {
    state: StateWord,
    last_access: AtomicU64,
    compressed_size: AtomicUsize,
    index: usize,
    data: UnsafeCell<Vec<u8>>,
}

// SAFETY: `data` is only dereferenced under a shared pin (read-only), an
// exclusive pin or the `Busy` phase (read-write), or through `&mut self`.
// The state word makes those mutually exclusive across threads.
unsafe impl Sync for Chunk {}

impl Chunk {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            state: StateWord::new(),
            last_access: AtomicU64::new(0),
            compressed_size: AtomicUsize::new(0),
            index,
            data: UnsafeCell::new(Vec::new()),
        }
    }

    /// Position of this chunk in the grid's chunk array.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn is_open(&self) -> bool {
        self.phase() == Phase::Open
    }

    /// Time of the most recent read or write. Only meaningful while open.
    pub fn last_access(&self) -> Timestamp {
        Timestamp(self.last_access.load(Ordering::Relaxed))
    }

    /// Size of the compressed payload, if the chunk is closed.
    pub fn compressed_size(&self) -> Option<usize> {
        (self.phase() == Phase::Closed).then(|| self.compressed_size.load(Ordering::Relaxed))
    }

    /// Copy out the voxel at `offset`, opening the chunk first if needed.
    pub(crate) fn read<V, C, A>(
        &self,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
        offset: usize,
    ) -> V
    where
        V: Voxel,
        C: Codec,
        A: Allocator,
    {
        let _pin = self.pin(backing, scratch, Access::Shared);
        // SAFETY: a shared pin excludes writers and transitions.
        let data = unsafe { &*self.data.get() };
        let start = offset * size_of::<V>();
        bytemuck::pod_read_unaligned(&data[start..start + size_of::<V>()])
    }

    /// Store `value` at `offset`, opening the chunk first if needed.
    pub(crate) fn write<V, C, A>(
        &self,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
        offset: usize,
        value: V,
    ) where
        V: Voxel,
        C: Codec,
        A: Allocator,
    {
        let _pin = self.pin(backing, scratch, Access::Exclusive);
        // SAFETY: an exclusive pin excludes every other accessor and transition.
        let data = unsafe { &mut *self.data.get() };
        let start = offset * size_of::<V>();
        data[start..start + size_of::<V>()].copy_from_slice(bytemuck::bytes_of(&value));
    }

    fn pin<C: Codec, A: Allocator>(
        &self,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
        access: Access,
    ) -> Pin<'_> {
        if let Entry::Opening(from) = self.state.enter(access) {
            let transition = Transition::new(&self.state, from);
            // SAFETY: `Busy` grants exclusive access to the buffer.
            let data = unsafe { &mut *self.data.get() };
            self.load_raw(from, data, backing, scratch);
            self.compressed_size.store(0, Ordering::Relaxed);
            transition.publish_open(access);
            log::trace!("chunk {} opened from {:?}", self.index, from);
        }
        self.last_access
            .store(backing.clock.now().as_micros(), Ordering::Relaxed);
        Pin::new(&self.state, access)
    }

    /// Turn `data` into a raw voxel buffer of `backing.raw_len` bytes.
    fn load_raw<C: Codec, A: Allocator>(
        &self,
        from: Phase,
        data: &mut Vec<u8>,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
    ) {
        let raw_len = backing.raw_len;
        match from {
            Phase::Vacant => {
                *data = backing.allocator.alloc_zeroed(raw_len);
            }
            Phase::Closed => {
                let out = scratch.decompress_buf();
                match backing.codec.decompress(data, out) {
                    Ok(n) if n == raw_len => {}
                    Ok(n) => {
                        log::error!(
                            "chunk {} decompressed to {} bytes, expected {}",
                            self.index,
                            n,
                            raw_len
                        );
                        panic!("chunk {} decompressed to the wrong size", self.index);
                    }
                    Err(err) => {
                        log::error!("chunk {} failed to decompress: {}", self.index, err);
                        panic!("chunk {} failed to decompress: {}", self.index, err);
                    }
                }
                backing.allocator.realloc(data, raw_len);
                data.copy_from_slice(&out[..raw_len]);
            }
            Phase::Open | Phase::Busy => {
                unreachable!("chunk {} opened from {:?}", self.index, from)
            }
        }
    }

    /// Compress an open, unpinned chunk. No-op on closed or vacant chunks.
    pub(crate) fn close<C: Codec, A: Allocator>(
        &self,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
    ) -> CloseOutcome {
        match self.state.try_begin_close() {
            Ok(()) => {}
            Err(CloseBlocked::AlreadyClosed) => return CloseOutcome::AlreadyClosed,
            Err(CloseBlocked::Contended) => return CloseOutcome::Contended,
        }

        let transition = Transition::new(&self.state, Phase::Open);
        // SAFETY: `Busy` grants exclusive access to the buffer.
        let data = unsafe { &mut *self.data.get() };
        let out = scratch.compress_buf();
        match backing.codec.compress(data, out) {
            Ok(n) if n <= out.len() => {
                backing.allocator.realloc(data, n);
                data.copy_from_slice(&out[..n]);
                self.compressed_size.store(n, Ordering::Relaxed);
                transition.finish(Phase::Closed);
                log::trace!("chunk {} closed to {} bytes", self.index, n);
                CloseOutcome::Closed { compressed: n }
            }
            Ok(n) => {
                log::warn!(
                    "chunk {} stays open: codec reported {} bytes into a {}-byte buffer",
                    self.index,
                    n,
                    out.len()
                );
                transition.finish(Phase::Open);
                CloseOutcome::CodecFailed
            }
            Err(err) => {
                log::warn!("chunk {} stays open: {}", self.index, err);
                transition.finish(Phase::Open);
                CloseOutcome::CodecFailed
            }
        }
    }

    /// Close the chunk if it has been idle for at least `ttl` as of `now`.
    pub(crate) fn close_if_idle<C: Codec, A: Allocator>(
        &self,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
        now: Timestamp,
        ttl: Duration,
    ) -> CloseOutcome {
        match self.phase() {
            Phase::Vacant | Phase::Closed => return CloseOutcome::AlreadyClosed,
            Phase::Busy => return CloseOutcome::Contended,
            Phase::Open => {}
        }
        if now.saturating_since(self.last_access()) < ttl {
            return CloseOutcome::Fresh;
        }
        self.close(backing, scratch)
    }

    /// Close the chunk, waiting out accessors that currently hold it.
    pub(crate) fn close_blocking<C: Codec, A: Allocator>(
        &self,
        backing: &Backing<C, A>,
        scratch: &mut Scratch,
    ) -> CloseOutcome {
        let backoff = Backoff::new();
        loop {
            match self.close(backing, scratch) {
                CloseOutcome::Contended => backoff.snooze(),
                outcome => return outcome,
            }
        }
    }

    /// Compressed payload of a closed chunk, read through exclusive access.
    pub(crate) fn compressed_bytes(&mut self) -> Option<&[u8]> {
        match self.state.phase() {
            Phase::Closed => Some(self.data.get_mut().as_slice()),
            _ => None,
        }
    }

    /// Replace the chunk's contents with a compressed payload (or make it
    /// vacant), returning the previous buffer if it had one.
    pub(crate) fn replace(&mut self, compressed: Option<Vec<u8>>) -> Option<Vec<u8>> {
        let (phase, buf) = match compressed {
            Some(buf) => (Phase::Closed, buf),
            None => (Phase::Vacant, Vec::new()),
        };
        let previous = self.state.phase();
        *self.compressed_size.get_mut() = buf.len();
        *self.last_access.get_mut() = 0;
        self.state.set(phase);
        let old = std::mem::replace(self.data.get_mut(), buf);
        (previous != Phase::Vacant).then_some(old)
    }

    /// Give up the buffer at teardown. `None` if the chunk was never opened.
    pub(crate) fn take_buffer(&mut self) -> Option<Vec<u8>> {
        self.replace(None)
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("index", &self.index)
            .field("phase", &self.phase())
            .field("last_access", &self.last_access())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::{CountingCodec, FlakyCodec};
    use voxcache_codec::{Lz4Codec, ScratchLayout, SystemAllocator};
    use voxcache_core::ManualClock;

    const RAW_LEN: usize = 64 * 4;

    fn backing<C: Codec>(codec: C) -> Backing<C, SystemAllocator> {
        Backing {
            codec,
            allocator: SystemAllocator::new(),
            clock: Box::new(ManualClock::new()),
            raw_len: RAW_LEN,
        }
    }

    fn scratch<C: Codec>(backing: &Backing<C, SystemAllocator>) -> Scratch {
        let layout = ScratchLayout::for_codec(&backing.codec, RAW_LEN, 4096).expect("layout");
        Scratch::new(layout)
    }

    #[test]
    fn test_chunk_header_is_cache_line_aligned() {
        use voxcache_core::constants::CACHE_LINE_BYTES;
        assert_eq!(std::mem::align_of::<Chunk>(), CACHE_LINE_BYTES);
    }

    #[test]
    fn test_first_access_allocates_zeroed() {
        let backing = backing(Lz4Codec::new());
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(0);
        assert_eq!(chunk.phase(), Phase::Vacant);

        let v: u32 = chunk.read(&backing, &mut scratch, 5);
        assert_eq!(v, 0);
        assert!(chunk.is_open());
        assert_eq!(backing.allocator.stats().live_bytes, RAW_LEN);
    }

    #[test]
    fn test_close_then_reopen_preserves_contents() {
        let backing = backing(Lz4Codec::new());
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(3);
        for i in 0..64 {
            chunk.write(&backing, &mut scratch, i, (i as u32) * 31 + 7);
        }

        let outcome = chunk.close(&backing, &mut scratch);
        let compressed = match outcome {
            CloseOutcome::Closed { compressed } => compressed,
            other => panic!("expected Closed, got {:?}", other),
        };
        assert_eq!(chunk.phase(), Phase::Closed);
        assert_eq!(chunk.compressed_size(), Some(compressed));
        assert_eq!(backing.allocator.stats().live_bytes, compressed);

        for i in 0..64 {
            let v: u32 = chunk.read(&backing, &mut scratch, i);
            assert_eq!(v, (i as u32) * 31 + 7);
        }
        assert!(chunk.is_open());
        assert_eq!(chunk.compressed_size(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let backing = backing(Lz4Codec::new());
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(0);
        chunk.write(&backing, &mut scratch, 1, 0xABCDu32);

        assert!(matches!(
            chunk.close(&backing, &mut scratch),
            CloseOutcome::Closed { .. }
        ));
        let size = chunk.compressed_size();
        let live = backing.allocator.stats().live_bytes;

        assert_eq!(chunk.close(&backing, &mut scratch), CloseOutcome::AlreadyClosed);
        assert_eq!(chunk.compressed_size(), size);
        assert_eq!(backing.allocator.stats().live_bytes, live);
    }

    #[test]
    fn test_close_vacant_is_noop() {
        let backing = backing(Lz4Codec::new());
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(0);
        assert_eq!(chunk.close(&backing, &mut scratch), CloseOutcome::AlreadyClosed);
        assert_eq!(chunk.phase(), Phase::Vacant);
    }

    #[test]
    fn test_open_chunk_is_not_decompressed_again() {
        let backing = backing(CountingCodec::new(Lz4Codec::new()));
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(0);
        chunk.write(&backing, &mut scratch, 0, 11u32);
        chunk.close(&backing, &mut scratch);

        let v: u32 = chunk.read(&backing, &mut scratch, 0);
        assert_eq!(v, 11);
        assert_eq!(backing.codec.decompressions(), 1);

        for _ in 0..10 {
            let v: u32 = chunk.read(&backing, &mut scratch, 0);
            assert_eq!(v, 11);
        }
        chunk.write(&backing, &mut scratch, 0, 12u32);
        assert_eq!(backing.codec.decompressions(), 1);
    }

    #[test]
    fn test_codec_failure_leaves_chunk_open() {
        let backing = backing(FlakyCodec::new(Lz4Codec::new()));
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(0);
        chunk.write(&backing, &mut scratch, 2, 99u32);
        backing.codec.set_failing(true);

        assert_eq!(chunk.close(&backing, &mut scratch), CloseOutcome::CodecFailed);
        assert!(chunk.is_open());
        assert_eq!(backing.allocator.stats().live_bytes, RAW_LEN);
        let v: u32 = chunk.read(&backing, &mut scratch, 2);
        assert_eq!(v, 99);

        // A later attempt succeeds once the codec recovers.
        backing.codec.set_failing(false);
        assert!(matches!(
            chunk.close(&backing, &mut scratch),
            CloseOutcome::Closed { .. }
        ));
    }

    #[test]
    fn test_close_if_idle_respects_ttl() {
        let clock = std::sync::Arc::new(ManualClock::new());
        let backing = Backing {
            codec: Lz4Codec::new(),
            allocator: SystemAllocator::new(),
            clock: Box::new(std::sync::Arc::clone(&clock)),
            raw_len: RAW_LEN,
        };
        let mut scratch = scratch(&backing);
        let chunk = Chunk::new(0);
        let ttl = Duration::from_millis(100);
        chunk.write(&backing, &mut scratch, 0, 1u32);

        clock.advance(Duration::from_millis(99));
        assert_eq!(
            chunk.close_if_idle(&backing, &mut scratch, backing.clock.now(), ttl),
            CloseOutcome::Fresh
        );

        clock.advance(Duration::from_millis(1));
        assert!(matches!(
            chunk.close_if_idle(&backing, &mut scratch, backing.clock.now(), ttl),
            CloseOutcome::Closed { .. }
        ));
    }

    #[test]
    fn test_replace_and_take_buffer() {
        let backing = backing(Lz4Codec::new());
        let mut scratch = scratch(&backing);
        let mut chunk = Chunk::new(0);
        chunk.write(&backing, &mut scratch, 0, 5u32);
        chunk.close(&backing, &mut scratch);
        let payload = chunk.compressed_bytes().expect("closed").to_vec();

        let mut other = Chunk::new(1);
        assert!(other.replace(Some(payload)).is_none());
        assert_eq!(other.phase(), Phase::Closed);
        let v: u32 = other.read(&backing, &mut scratch, 0);
        assert_eq!(v, 5);

        let buf = other.take_buffer().expect("opened chunk owns a buffer");
        assert_eq!(buf.len(), RAW_LEN);
        assert_eq!(other.phase(), Phase::Vacant);
    }
}
