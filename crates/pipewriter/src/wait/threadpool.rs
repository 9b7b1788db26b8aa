//! Kernel threadpool waits

use super::{WaitCallback, WaitPool, WaitWork};
use crate::{common::WaitPending, event::OwnedEventHandle};
use std::{any::Any, ffi::c_void, io, os::windows::io::AsRawHandle, sync::Arc};
use windows_sys::Win32::System::Threading::{
    CloseThreadpoolWait, CreateThreadpoolWait, SetThreadpoolWait, WaitForThreadpoolWaitCallbacks,
    PTP_CALLBACK_INSTANCE, PTP_WAIT,
};

/// A threadpool wait object. The context is shared weakly with the kernel. The weak reference
/// used by the kernel is guarenteed to be valid because the wait object waits for all kernel
/// callbacks to resolve prior to dropping the context.
///
/// This is guarenteed because RFC 1857 specifying drop order. The handle is dropped first and
/// waits for callbacks to finish executing. Then the context is dropped.
///
/// Safety: DO NOT CHANGE ORDER IN STRUCT (RFC 1857)
pub struct ThreadpoolWait {
    handle: OwnedWaitHandle,
    _cx: Arc<dyn Any + Send + Sync>,
}

impl WaitPool for ThreadpoolWait {
    type Worker = RawThreadpoolWait;

    fn with_callback<C>(cx: Arc<C>) -> io::Result<Self>
    where
        C: WaitCallback<Self::Worker> + 'static,
    {
        OwnedWaitHandle::new::<C>(Arc::as_ptr(&cx) as _).map(|handle| ThreadpoolWait {
            handle,
            _cx: cx,
        })
    }
}

impl WaitWork for ThreadpoolWait {
    type Waitable = OwnedEventHandle;

    fn start(&self, event: &OwnedEventHandle) -> &Self {
        self.handle.arm(event);
        self
    }

    fn stop(&self) -> &Self {
        self.handle.disarm();
        self
    }

    fn wait(&self, pending: WaitPending) -> &Self {
        self.handle.wait_callbacks(pending);
        self
    }
}

/// The wait object as seen from inside a callback. Does not own the kernel object
#[derive(Copy, Clone, Debug)]
pub struct RawThreadpoolWait(PTP_WAIT);

unsafe impl Send for RawThreadpoolWait {}
unsafe impl Sync for RawThreadpoolWait {}

struct OwnedWaitHandle(PTP_WAIT);

unsafe impl Send for OwnedWaitHandle {}
unsafe impl Sync for OwnedWaitHandle {}

impl Drop for OwnedWaitHandle {
    fn drop(&mut self) {
        self.disarm();
        self.wait_callbacks(WaitPending::Cancel);
        unsafe { CloseThreadpoolWait(self.0) }
    }
}

impl OwnedWaitHandle {
    /// https://learn.microsoft.com/en-us/windows/win32/api/threadpoolapiset/nf-threadpoolapiset-createthreadpoolwait
    fn new<C>(cx: *mut c_void) -> io::Result<Self>
    where
        C: WaitCallback<RawThreadpoolWait>,
    {
        let result = unsafe { CreateThreadpoolWait(Some(wait_callback::<C>), cx, std::ptr::null()) };
        match result {
            0 => Err(io::Error::last_os_error()),
            handle => Ok(OwnedWaitHandle(handle)),
        }
    }
}

macro_rules! impl_wait_work {
    ($handle:ty) => {
        impl $handle {
            fn arm(&self, event: &OwnedEventHandle) {
                unsafe { SetThreadpoolWait(self.0, event.as_raw_handle() as _, std::ptr::null()) };
            }

            // Handle == 0 pool will cease to queue new callbacks. existing callbacks still occur
            fn disarm(&self) {
                unsafe { SetThreadpoolWait(self.0, 0, std::ptr::null()) };
            }

            fn wait_callbacks(&self, pending: WaitPending) {
                unsafe { WaitForThreadpoolWaitCallbacks(self.0, pending as _) };
            }
        }
    };
}

impl_wait_work!(OwnedWaitHandle);
impl_wait_work!(RawThreadpoolWait);

impl WaitWork for RawThreadpoolWait {
    type Waitable = OwnedEventHandle;

    fn start(&self, event: &OwnedEventHandle) -> &Self {
        self.arm(event);
        self
    }

    fn stop(&self) -> &Self {
        self.disarm();
        self
    }

    fn wait(&self, pending: WaitPending) -> &Self {
        self.wait_callbacks(pending);
        self
    }
}

unsafe extern "system" fn wait_callback<C>(
    _instance: PTP_CALLBACK_INSTANCE,
    context: *mut c_void,
    wait: PTP_WAIT,
    _waitresult: u32,
) where
    C: WaitCallback<RawThreadpoolWait>,
{
    let cx = &*(context as *const C);
    cx.on_wait(&RawThreadpoolWait(wait));
}
