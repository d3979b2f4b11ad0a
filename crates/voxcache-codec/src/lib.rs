pub mod allocator;
pub mod codec;
pub mod error;
pub mod fill;
pub mod lz4;
pub mod scratch;

pub use allocator::{AllocStats, Allocator, SystemAllocator};
pub use codec::Codec;
pub use error::CodecError;
pub use fill::FillCodec;
pub use lz4::Lz4Codec;
pub use scratch::{Scratch, ScratchLayout};
