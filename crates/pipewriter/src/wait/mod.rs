//! Wait pools invoke a callback on a worker thread once a waitable object is signaled
//!
//! ThreadpoolWait Create, Close, Set, Wait
//!
//! https://learn.microsoft.com/en-us/windows/win32/api/threadpoolapiset/nf-threadpoolapiset-createthreadpoolwait
//! https://learn.microsoft.com/en-us/windows/win32/api/threadpoolapiset/nf-threadpoolapiset-setthreadpoolwait
//! https://learn.microsoft.com/en-us/windows/win32/api/threadpoolapiset/nf-threadpoolapiset-waitforthreadpoolwaitcallbacks

mod thread;
#[cfg(windows)]
mod threadpool;

pub use thread::{ThreadWaitPool, ThreadWaitWorker};
#[cfg(windows)]
pub use threadpool::{RawThreadpoolWait, ThreadpoolWait};

use crate::common::WaitPending;
use std::{io, sync::Arc};

/// The operations shared by a wait pool and the worker handle passed to its callbacks
pub trait WaitWork {
    /// The object a pool waits on, IE a kernel event
    type Waitable: ?Sized;

    /// Arm the pool on a waitable object. The callback is queued once, the next time the object
    /// is signaled. Arm again to receive another callback.
    ///
    /// https://learn.microsoft.com/en-us/windows/win32/api/threadpoolapiset/nf-threadpoolapiset-setthreadpoolwait
    fn start(&self, waitable: &Self::Waitable) -> &Self;

    /// The pool will cease to queue new callbacks. Callbacks already queued will still fire
    fn stop(&self) -> &Self;

    /// Waits for outstanding callbacks to complete and optionally cancels queued callbacks that
    /// have not yet started to execute. Must not be called from inside a callback.
    ///
    /// https://learn.microsoft.com/en-us/windows/win32/api/threadpoolapiset/nf-threadpoolapiset-waitforthreadpoolwaitcallbacks
    fn wait(&self, pending: WaitPending) -> &Self;
}

/// The context of a wait pool. Called on a worker thread with a handle to the pool so that the
/// callback may arm the pool again
pub trait WaitCallback<W: ?Sized>: Send + Sync {
    fn on_wait(&self, worker: &W);
}

/// A pool of workers waiting on waitable objects.
///
/// The pool keeps its callback context alive and will not release it until every callback has
/// returned.
pub trait WaitPool: WaitWork + Send + Sync + Sized {
    /// Handle passed to callbacks
    type Worker: WaitWork<Waitable = Self::Waitable>;

    fn with_callback<C>(cx: Arc<C>) -> io::Result<Self>
    where
        C: WaitCallback<Self::Worker> + 'static;
}
