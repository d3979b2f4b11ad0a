use std::mem::size_of;

use serde::{Deserialize, Serialize};
use voxcache_codec::{Allocator, Codec};
use voxcache_core::{CacheError, Voxel};

use crate::grid::Grid;
use crate::state::Phase;

/// Compressed contents of a whole grid, chunk by chunk.
///
/// `chunks[i]` is `None` for a chunk that was never touched. Payloads are the
/// codec's own output, so a snapshot can only be restored into a grid using
/// the same codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: u32,
    pub height: u32,
    pub chunk_voxels: u32,
    pub voxel_bytes: u32,
    pub chunks: Vec<Option<Vec<u8>>>,
}

impl GridSnapshot {
    /// Total payload bytes across all chunks.
    pub fn compressed_bytes(&self) -> usize {
        self.chunks.iter().flatten().map(Vec::len).sum()
    }
}

impl<V, C, A> Grid<V, C, A>
where
    V: Voxel,
    C: Codec,
    A: Allocator,
{
    /// Close every chunk and copy out the compressed payloads.
    ///
    /// A chunk the codec refuses during the flush is retried once; if it is
    /// still open the snapshot fails rather than recording it as untouched.
    pub fn snapshot(&mut self) -> Result<GridSnapshot, CacheError> {
        let report = self.flush();
        if report.tally.codec_failures > 0 {
            let mut scratch = self.scratch();
            for chunk in self.chunks().iter().filter(|c| c.is_open()) {
                chunk.close_blocking(self.backing(), &mut scratch);
            }
        }

        let config = self.config().clone();
        let mut chunks = Vec::with_capacity(self.chunk_count());
        for chunk in self.chunks_mut().iter_mut() {
            let index = chunk.index();
            if chunk.phase() == Phase::Vacant {
                chunks.push(None);
                continue;
            }
            match chunk.compressed_bytes() {
                Some(bytes) => chunks.push(Some(bytes.to_vec())),
                None => {
                    log::warn!("snapshot aborted: chunk {} is still open", index);
                    return Err(CacheError::SnapshotIncomplete { index });
                }
            }
        }

        let snapshot = GridSnapshot {
            width: config.width,
            height: config.height,
            chunk_voxels: config.chunk_voxels,
            voxel_bytes: size_of::<V>() as u32,
            chunks,
        };
        log::debug!(
            "snapshot of {} chunks, {} compressed bytes",
            snapshot.chunks.len(),
            snapshot.compressed_bytes()
        );
        Ok(snapshot)
    }

    /// Replace the grid's contents with `snapshot`, leaving every restored
    /// chunk closed.
    ///
    /// Every payload is decompressed once up front; on any error the grid is
    /// left untouched.
    pub fn restore(&mut self, snapshot: &GridSnapshot) -> Result<(), CacheError> {
        if snapshot.chunks.len() != self.chunk_count() {
            return Err(CacheError::SnapshotMismatch {
                expected: self.chunk_count(),
                actual: snapshot.chunks.len(),
            });
        }
        if snapshot.width != self.width() || snapshot.height != self.height() {
            return Err(CacheError::InvalidConfig(format!(
                "snapshot is of a {}x{} grid, grid is {}x{}",
                snapshot.width,
                snapshot.height,
                self.width(),
                self.height()
            )));
        }
        if snapshot.chunk_voxels != self.config().chunk_voxels
            || snapshot.voxel_bytes as usize != size_of::<V>()
        {
            return Err(CacheError::InvalidConfig(format!(
                "snapshot chunks hold {} voxels of {} bytes, grid expects {} of {}",
                snapshot.chunk_voxels,
                snapshot.voxel_bytes,
                self.config().chunk_voxels,
                size_of::<V>()
            )));
        }

        let raw_len = self.chunk_raw_len();
        let mut scratch = self.scratch();
        for (index, payload) in snapshot.chunks.iter().enumerate() {
            let Some(payload) = payload else { continue };
            match self.codec().decompress(payload, scratch.decompress_buf()) {
                Ok(n) if n == raw_len => {}
                Ok(n) => {
                    return Err(CacheError::CorruptChunk {
                        index,
                        reason: format!("decompressed to {} bytes, expected {}", n, raw_len),
                    })
                }
                Err(err) => {
                    return Err(CacheError::CorruptChunk {
                        index,
                        reason: err.to_string(),
                    })
                }
            }
        }

        let buffers = snapshot
            .chunks
            .iter()
            .map(|payload| {
                payload.as_ref().map(|bytes| {
                    let mut buf = self.allocator().alloc_zeroed(bytes.len());
                    buf.copy_from_slice(bytes);
                    buf
                })
            })
            .collect::<Vec<_>>();

        let mut released = Vec::new();
        for (chunk, buf) in self.chunks_mut().iter_mut().zip(buffers) {
            released.extend(chunk.replace(buf));
        }
        for buf in released {
            self.allocator().free(buf);
        }
        self.allocator().collect(true);

        log::debug!(
            "restored {} chunks ({} compressed bytes)",
            snapshot.chunks.iter().flatten().count(),
            snapshot.compressed_bytes()
        );
        Ok(())
    }
}
