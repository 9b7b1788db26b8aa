//! Overlapped writes on windows pipe handles
//!
//! https://learn.microsoft.com/en-us/windows/win32/api/fileapi/nf-fileapi-writefile
//! https://learn.microsoft.com/en-us/windows/win32/api/ioapiset/nf-ioapiset-getoverlappedresult
//! https://learn.microsoft.com/en-us/windows/win32/fileio/cancelioex-func

use super::{error::ERROR_IO_PENDING, OverlappedError, WriteOverlapped};
use crate::{
    event::{anonymous, EventInitialState, EventReset, OwnedEventHandle},
    wait::ThreadpoolWait,
};
use std::{
    io,
    os::windows::io::{AsRawHandle, BorrowedHandle, FromRawHandle, RawHandle},
};
use windows_sys::Win32::{
    Foundation::{GetLastError, FALSE, HANDLE, TRUE},
    Storage::FileSystem::WriteFile,
    System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED},
};

/// Mirror of the kernel OVERLAPPED structure. Pipes have no file offset so the offset fields stay
/// zero
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Overlapped {
    pub internal: usize,
    pub internal_high: usize,
    pub offset: u32,
    pub offset_high: u32,
    pub hevent: HANDLE,
}

impl Overlapped {
    pub fn new(hevent: HANDLE) -> Self {
        Overlapped {
            internal: 0,
            internal_high: 0,
            offset: 0,
            offset_high: 0,
            hevent,
        }
    }

    pub fn as_ptr(&self) -> *const OVERLAPPED {
        self as *const Self as *const _
    }

    pub fn as_mut_ptr(&mut self) -> *mut OVERLAPPED {
        self.as_ptr() as _
    }
}

/// An [`Overlapped`] and the auto-reset event the kernel signals when the write completes
#[derive(Debug)]
pub struct PipeOverlapped {
    overlapped: Overlapped,
    event: OwnedEventHandle,
}

// The kernel owns the structure while a write is outstanding, the writer serializes access
unsafe impl Send for PipeOverlapped {}
unsafe impl Sync for PipeOverlapped {}

impl PipeOverlapped {
    pub fn new() -> io::Result<Self> {
        let event = anonymous(EventReset::Automatic, EventInitialState::Unset)?;
        Ok(PipeOverlapped {
            overlapped: Overlapped::new(event.as_raw_handle() as _),
            event,
        })
    }

    pub fn event(&self) -> &OwnedEventHandle {
        &self.event
    }
}

/// The write end of a pipe opened with FILE_FLAG_OVERLAPPED. The writer borrows the handle and
/// never closes it, the caller must keep it open until the writer has been stopped
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawPipeHandle(RawHandle);

// Windows handles can be shared across threads
unsafe impl Send for RawPipeHandle {}
unsafe impl Sync for RawPipeHandle {}

impl RawPipeHandle {
    pub fn borrowed(handle: BorrowedHandle<'_>) -> Self {
        RawPipeHandle(handle.as_raw_handle())
    }
}

impl FromRawHandle for RawPipeHandle {
    unsafe fn from_raw_handle(handle: RawHandle) -> Self {
        RawPipeHandle(handle)
    }
}

impl AsRawHandle for RawPipeHandle {
    fn as_raw_handle(&self) -> RawHandle {
        self.0
    }
}

impl WriteOverlapped for RawPipeHandle {
    type Overlapped = PipeOverlapped;
    type Pool = ThreadpoolWait;

    fn overlapped() -> io::Result<PipeOverlapped> {
        PipeOverlapped::new()
    }

    fn waitable(overlapped: &PipeOverlapped) -> &OwnedEventHandle {
        overlapped.event()
    }

    fn write_overlapped(
        &self,
        overlapped: &mut PipeOverlapped,
        bytes: &[u8],
    ) -> Result<usize, OverlappedError> {
        // WriteFile resets the event when the request begins
        overlapped.overlapped = Overlapped::new(overlapped.overlapped.hevent);
        let mut bytes_written = 0u32;
        let result = unsafe {
            WriteFile(
                self.0 as _,
                bytes.as_ptr(),
                bytes.len() as _,
                &mut bytes_written,
                overlapped.overlapped.as_mut_ptr(),
            )
        };
        match result {
            FALSE => match unsafe { GetLastError() } {
                ERROR_IO_PENDING => Err(OverlappedError::Pending),
                raw => Err(OverlappedError::Os(raw)),
            },
            _ => Ok(bytes_written as _),
        }
    }

    fn overlapped_result(
        &self,
        overlapped: &PipeOverlapped,
        wait: bool,
    ) -> Result<usize, OverlappedError> {
        let mut bytes_written = 0u32;
        let wait = if wait { TRUE } else { FALSE };
        let result = unsafe {
            GetOverlappedResult(
                self.0 as _,
                overlapped.overlapped.as_ptr(),
                &mut bytes_written,
                wait,
            )
        };
        match result {
            FALSE => Err(OverlappedError::Os(unsafe { GetLastError() })),
            _ => Ok(bytes_written as _),
        }
    }

    fn cancel_overlapped(&self, overlapped: &PipeOverlapped) -> Result<(), OverlappedError> {
        match unsafe { CancelIoEx(self.0 as _, overlapped.overlapped.as_ptr()) } {
            FALSE => Err(OverlappedError::Os(unsafe { GetLastError() })),
            _ => Ok(()),
        }
    }
}
