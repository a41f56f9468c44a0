//! Sink implementations
//!
//! Contains LogSink, FileSink, and MemorySink.

mod file;
mod log;
pub(crate) mod memory;

pub use self::file::FileSink;
pub use self::log::LogSink;
pub use self::memory::{MemoryHandle, MemorySink};
