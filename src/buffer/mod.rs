//! The two-tier message buffer: in-memory ring fronting a durable on-disk file log (§4).

pub mod codec;
pub mod combined;
pub mod compression;
pub mod file;
pub mod ring;

pub use combined::CombinedBuffer;
pub use compression::Compression;
pub use file::{FileBuffer, FileBufferError};
pub use ring::{Ring, RingProduceOutcome};
