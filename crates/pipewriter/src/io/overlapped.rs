//! overlapped

use super::error::{WriteFailure, ERROR_GEN_FAILURE, ERROR_IO_PENDING};
use crate::wait::{WaitPool, WaitWork};
use std::{error, fmt, io};

/// When performing OverlappedIo, the I/O operation may occasionally finish synchronously. An
/// overlapped error distinguishes this special case as seperate from a normal I/O error
#[derive(Debug)]
pub enum OverlappedError {
    /// A true I/O kernel error
    Os(u32),
    /// Some hacky error type, should not be used, however, this exists because the std::io::Error
    /// can potentially barf this up at us sometimes
    CustomIo(io::Error),
    /// an ERROR_IO_PENDING, which is normal behavior in most circumstances
    Pending,
}

impl OverlappedError {
    /// The os error code of this error
    pub fn code(&self) -> u32 {
        match self {
            Self::Os(raw) => *raw,
            Self::CustomIo(e) => e.raw_os_error().map_or(ERROR_GEN_FAILURE, |raw| raw as _),
            Self::Pending => ERROR_IO_PENDING,
        }
    }
}

impl error::Error for OverlappedError {}
impl fmt::Display for OverlappedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Os(raw) => write!(f, "{}", WriteFailure::new(*raw)),
            Self::CustomIo(e) => write!(f, "{e}"),
            Self::Pending => write!(f, "I/O pending"),
        }
    }
}

impl From<io::Error> for OverlappedError {
    fn from(value: io::Error) -> Self {
        match value.raw_os_error() {
            Some(raw) if raw == ERROR_IO_PENDING as i32 => Self::Pending,
            Some(raw) => Self::Os(raw as _),
            None => Self::CustomIo(value),
        }
    }
}

impl From<OverlappedError> for WriteFailure {
    fn from(value: OverlappedError) -> Self {
        WriteFailure::new(value.code())
    }
}

/// Pipe handles implement WriteOverlapped. It might be like AsyncWrite except more appropriate for
/// completion based IO: a write either finishes synchronously, fails, or is left outstanding and
/// completes later by signaling the waitable object owned by the [`Self::Overlapped`] state.
pub trait WriteOverlapped: Send + Sync + 'static {
    /// Per request kernel state. The kernel may hold a pointer into it while a write is
    /// outstanding, so it must stay put and must not be touched until the write resolves
    type Overlapped: Send + Sync + 'static;

    /// The pool which waits on the waitable object of [`Self::Overlapped`]
    type Pool: WaitPool;

    /// Create the request state, including the auto-reset event signaled on completion
    fn overlapped() -> io::Result<Self::Overlapped>;

    /// The object signaled when an outstanding write completes
    fn waitable(overlapped: &Self::Overlapped) -> &<Self::Pool as WaitWork>::Waitable;

    /// Perform an overlapped write, IE WriteFile. Returns the bytes written if the write finished
    /// synchronously, [`OverlappedError::Pending`] if it was accepted and is still outstanding.
    /// The bytes must remain valid and unmodified until an outstanding write resolves.
    fn write_overlapped(
        &self,
        overlapped: &mut Self::Overlapped,
        bytes: &[u8],
    ) -> Result<usize, OverlappedError>;

    /// Retrieve the result of the last write. If `wait` is true, block until it is no longer
    /// outstanding
    fn overlapped_result(
        &self,
        overlapped: &Self::Overlapped,
        wait: bool,
    ) -> Result<usize, OverlappedError>;

    /// Request cancellation of an outstanding write. A write that already completed yields an
    /// ERROR_NOT_FOUND
    fn cancel_overlapped(&self, overlapped: &Self::Overlapped) -> Result<(), OverlappedError>;
}
