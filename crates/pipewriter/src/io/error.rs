//! error

use std::{error, fmt, io};

#[cfg(windows)]
pub use windows_sys::Win32::Foundation::{
    ERROR_BROKEN_PIPE, ERROR_GEN_FAILURE, ERROR_IO_INCOMPLETE, ERROR_IO_PENDING, ERROR_NOT_FOUND,
    ERROR_NO_DATA, ERROR_OPERATION_ABORTED, ERROR_PIPE_NOT_CONNECTED, ERROR_SUCCESS,
};

#[cfg(not(windows))]
mod codes {
    pub const ERROR_SUCCESS: u32 = 0;
    pub const ERROR_GEN_FAILURE: u32 = 31;
    pub const ERROR_BROKEN_PIPE: u32 = 109;
    pub const ERROR_NO_DATA: u32 = 232;
    pub const ERROR_PIPE_NOT_CONNECTED: u32 = 233;
    pub const ERROR_OPERATION_ABORTED: u32 = 995;
    pub const ERROR_IO_INCOMPLETE: u32 = 996;
    pub const ERROR_IO_PENDING: u32 = 997;
    pub const ERROR_NOT_FOUND: u32 = 1168;
}

#[cfg(not(windows))]
pub use codes::*;

/// A write request the OS rejected, identified by its os error code. Once recorded the writer is
/// poisoned and discards all further writes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WriteFailure(u32);

impl WriteFailure {
    pub fn new(code: u32) -> Self {
        WriteFailure(code)
    }

    pub fn code(&self) -> u32 {
        self.0
    }

    /// The pipe is closing, the far end is gone, or the operation was canceled. These are part of
    /// a normal shutdown and are not reported as errors.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.0,
            ERROR_PIPE_NOT_CONNECTED | ERROR_OPERATION_ABORTED | ERROR_NO_DATA
        )
    }

    #[cfg(windows)]
    pub fn to_io_error(&self) -> io::Error {
        io::Error::from_raw_os_error(self.0 as _)
    }

    #[cfg(not(windows))]
    pub fn to_io_error(&self) -> io::Error {
        let kind = match self.0 {
            ERROR_BROKEN_PIPE | ERROR_NO_DATA => io::ErrorKind::BrokenPipe,
            ERROR_PIPE_NOT_CONNECTED => io::ErrorKind::NotConnected,
            ERROR_OPERATION_ABORTED => io::ErrorKind::Interrupted,
            ERROR_NOT_FOUND => io::ErrorKind::NotFound,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self.to_string())
    }
}

impl fmt::Display for WriteFailure {
    #[cfg(windows)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0 as _))
    }

    #[cfg(not(windows))]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self.0 {
            ERROR_SUCCESS => "The operation completed successfully.",
            ERROR_GEN_FAILURE => "A device attached to the system is not functioning.",
            ERROR_BROKEN_PIPE => "The pipe has been ended.",
            ERROR_NO_DATA => "The pipe is being closed.",
            ERROR_PIPE_NOT_CONNECTED => "No process is on the other end of the pipe.",
            ERROR_OPERATION_ABORTED => {
                "The I/O operation has been aborted because of either a thread exit or an application request."
            }
            ERROR_IO_INCOMPLETE => "Overlapped I/O event is not in a signaled state.",
            ERROR_IO_PENDING => "Overlapped I/O operation is in progress.",
            ERROR_NOT_FOUND => "Element not found.",
            code => return write!(f, "os error {code}"),
        };
        write!(f, "{message} (os error {})", self.0)
    }
}

impl error::Error for WriteFailure {}

impl From<WriteFailure> for io::Error {
    fn from(value: WriteFailure) -> Self {
        value.to_io_error()
    }
}

#[derive(Debug)]
pub enum PipeError {
    /// The writer was stopped and cannot be reused
    Stopped,
    /// A handle may only be assigned once
    HandleAlreadySet,
    Io(io::Error),
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "pipe writer stopped"),
            Self::HandleAlreadySet => write!(f, "pipe handle already set"),
            Self::Io(e) => write!(f, "Io error => {e}"),
        }
    }
}

impl error::Error for PipeError {}

impl From<io::Error> for PipeError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
