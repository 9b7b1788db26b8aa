//! io
//!
//! Overlapped writes. A [`WriteOverlapped`] handle either finishes a write synchronously or leaves
//! it outstanding and later signals the waitable object of its request state, which a
//! [`crate::wait::WaitPool`] turns into a worker callback.
//!
//! https://learn.microsoft.com/en-us/windows/win32/fileio/synchronous-and-asynchronous-i-o

mod buffer;
mod error;
#[cfg(windows)]
mod handle;
pub mod memory;
mod overlapped;

#[cfg(test)]
mod tests;

pub use buffer::WriteBuffer;
pub use error::*;
#[cfg(windows)]
pub use handle::{Overlapped, PipeOverlapped, RawPipeHandle};
pub use memory::{MemoryPipe, Outcome};
pub use overlapped::{OverlappedError, WriteOverlapped};
