//! pipewriter
//!
//! Non-blocking writes to an overlapped pipe. See [`PipeWriter`]


pub mod common;
pub mod event;
pub mod io;
pub mod notify;
pub mod wait;
pub mod writer;

pub use writer::{PipeWriter, PipeWriterOptions};

/// A writer on an in-process [`io::MemoryPipe`]
pub type MemoryPipeWriter = PipeWriter<io::MemoryPipe>;

/// A writer on a windows pipe handle opened for overlapped I/O
#[cfg(windows)]
pub type NamedPipeWriter = PipeWriter<io::RawPipeHandle>;
