//! windows kernel events

use super::{Event, EventError, EventInitialState, EventReset};
use std::{
    io,
    os::windows::io::{AsRawHandle, FromRawHandle, HandleOrNull, OwnedHandle, RawHandle},
    time::Duration,
};
use windows_sys::Win32::{
    Foundation::{FALSE, HANDLE, TRUE, WAIT_ABANDONED, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT},
    System::Threading::{CreateEventW, ResetEvent, SetEvent, WaitForSingleObject, INFINITE},
};

/// See [`OwnedEventHandle::anonymous`]
pub fn anonymous(reset: EventReset, state: EventInitialState) -> io::Result<OwnedEventHandle> {
    OwnedEventHandle::anonymous(reset, state)
}

/// Like [`OwnedHandle`] except extended with Event api
#[derive(Debug)]
pub struct OwnedEventHandle(OwnedHandle);

impl OwnedEventHandle {
    /// Create a system event with out a name
    ///
    /// [CreateEventW](https://learn.microsoft.com/en-us/windows/win32/api/synchapi/nf-synchapi-createeventw)
    pub fn anonymous(reset: EventReset, state: EventInitialState) -> io::Result<OwnedEventHandle> {
        let manual = match reset {
            EventReset::Manual => TRUE,
            EventReset::Automatic => FALSE,
        };
        let initial = match state {
            EventInitialState::Set => TRUE,
            EventInitialState::Unset => FALSE,
        };
        unsafe {
            let raw = CreateEventW(std::ptr::null(), manual, initial, std::ptr::null());
            let handle = HandleOrNull::from_raw_handle(raw as _);
            OwnedHandle::try_from(handle).map_err(|_| io::Error::last_os_error())
        }
        .map(Self)
    }
}

impl AsRawHandle for OwnedEventHandle {
    fn as_raw_handle(&self) -> RawHandle {
        self.0.as_raw_handle()
    }
}

macro_rules! impl_event {
    ($handle:ty) => {
        impl Event for $handle {
            fn set(&self) -> io::Result<()> {
                self::set(self.as_raw_handle() as _)
            }

            fn reset(&self) -> io::Result<()> {
                self::reset(self.as_raw_handle() as _)
            }

            fn wait(&self, duration: Option<Duration>) -> Result<(), EventError> {
                self::wait(self.as_raw_handle() as _, duration)
            }
        }
    };
}

impl_event!(OwnedEventHandle);

#[inline(always)]
fn set(handle: HANDLE) -> io::Result<()> {
    match unsafe { SetEvent(handle) } {
        FALSE => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

#[inline(always)]
fn reset(handle: HANDLE) -> io::Result<()> {
    match unsafe { ResetEvent(handle) } {
        FALSE => Err(io::Error::last_os_error()),
        _ => Ok(()),
    }
}

#[inline(always)]
fn wait(handle: HANDLE, duration: Option<Duration>) -> Result<(), EventError> {
    let dur: u32 = duration.map(|d| d.as_millis() as _).unwrap_or(INFINITE);
    match unsafe { WaitForSingleObject(handle, dur as _) } {
        WAIT_OBJECT_0 => Ok(()),
        WAIT_ABANDONED => Err(EventError::Abandoned),
        WAIT_FAILED => Err(EventError::Failed),
        WAIT_TIMEOUT => Err(EventError::Timeout),
        _ => Err(EventError::Io(io::Error::last_os_error())),
    }
}
