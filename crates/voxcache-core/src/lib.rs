pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod math;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::CacheConfig;
pub use error::CacheError;
pub use types::{ChunkAddress, GridCoord, Timestamp, Voxel};
