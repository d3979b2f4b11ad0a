use thiserror::Error;

/// Errors raised while building, configuring or restoring a voxel cache.
///
/// Foreground `get`/`set` never produce these; they are total.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse cache configuration RON: {0}")]
    ConfigParse(String),

    #[error("{buffer} scratch buffer needs {required} bytes but capacity is {capacity}")]
    SizeBudgetExceeded {
        buffer: &'static str,
        required: usize,
        capacity: usize,
    },

    #[error("chunk {index} is corrupt: {reason}")]
    CorruptChunk { index: usize, reason: String },

    #[error("snapshot holds {actual} chunks, grid has {expected}")]
    SnapshotMismatch { expected: usize, actual: usize },

    #[error("chunk {index} could not be compressed for a snapshot")]
    SnapshotIncomplete { index: usize },
}
