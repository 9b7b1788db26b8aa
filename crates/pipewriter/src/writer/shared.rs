//! State shared by the owner of a [`super::PipeWriter`] and the worker callbacks

use super::PipeWriterOptions;
use crate::{
    common::WaitPending,
    event::{Event, EventHandle},
    io::{OverlappedError, PipeError, WriteBuffer, WriteFailure, WriteOverlapped, ERROR_NOT_FOUND},
    notify::Post,
    wait::{WaitCallback, WaitPool, WaitWork},
};
use parking_lot::{Mutex, MutexGuard};
use std::{cell::UnsafeCell, io, sync::OnceLock};
use tracing::{debug, error, trace, warn};

/// The object the pool of `H` waits on
pub(super) type Waitable<H> = <<H as WriteOverlapped>::Pool as WaitWork>::Waitable;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Lifecycle {
    /// Nothing written yet
    Idle,
    Running,
    /// Permanently halted
    Stopped,
}

pub(super) struct WriteState {
    pub(super) buffer: WriteBuffer,
    /// Length of the outstanding write request
    pub(super) outstanding: Option<usize>,
    /// Bytes were confirmed since the last delivery
    pub(super) pending: bool,
    pub(super) pending_bytes: u64,
    pub(super) error: Option<WriteFailure>,
    pub(super) lifecycle: Lifecycle,
    /// A notification is queued on the owner
    pub(super) posted: bool,
}

impl WriteState {
    /// Account for a resolved write request of `requested` bytes. Returns false if the writer is
    /// now poisoned
    fn record_completion(
        &mut self,
        requested: usize,
        result: Result<usize, OverlappedError>,
    ) -> bool {
        match result {
            Ok(written) => {
                // Byte mode pipes never complete a write partially
                debug_assert_eq!(requested, written, "partial pipe write");
                self.pending = true;
                self.pending_bytes += written as u64;
                self.buffer.free(written);
                true
            }
            Err(e) => {
                let failure = WriteFailure::from(e);
                self.error = Some(failure);
                self.buffer.clear();
                if failure.is_expected() {
                    debug!(code = failure.code(), "pipe closed, write abandoned");
                } else {
                    error!(code = failure.code(), error = %failure, "pipe write failed");
                }
                false
            }
        }
    }
}

/// The request state is only touched while the state lock is held, and exclusively only when no
/// write is outstanding. Once outstanding it belongs to the kernel until the write resolves.
pub(super) struct Shared<H: WriteOverlapped> {
    pub(super) handle: OnceLock<H>,
    overlapped: UnsafeCell<H::Overlapped>,
    pub(super) state: Mutex<WriteState>,
    /// Manual reset, signaled whenever a drain point is reached
    pub(super) sync: EventHandle,
    notify: Box<dyn Post>,
    max_write_size: usize,
}

// Safety: see the access rules of the request state above
unsafe impl<H: WriteOverlapped> Sync for Shared<H> {}

impl<H: WriteOverlapped> Shared<H> {
    pub(super) fn new(
        handle: Option<H>,
        notify: Box<dyn Post>,
        options: &PipeWriterOptions,
    ) -> io::Result<Self> {
        let cell = OnceLock::new();
        if let Some(handle) = handle {
            let _ = cell.set(handle);
        }
        Ok(Shared {
            handle: cell,
            overlapped: UnsafeCell::new(H::overlapped()?),
            state: Mutex::new(WriteState {
                buffer: WriteBuffer::new(options.chunk_capacity),
                outstanding: None,
                pending: false,
                pending_bytes: 0,
                error: None,
                lifecycle: Lifecycle::Idle,
                posted: false,
            }),
            sync: EventHandle::manual(),
            notify,
            // A single request is limited to a u32 length
            max_write_size: options.max_write_size.clamp(1, u32::MAX as usize),
        })
    }

    /// Buffer bytes and start writing if nothing is outstanding
    pub(super) fn write<W, F>(&self, pool: &W, len: usize, append: F)
    where
        W: WaitWork<Waitable = Waitable<H>>,
        F: FnOnce(&mut WriteBuffer),
    {
        let mut state = self.state.lock();
        if state.lifecycle == Lifecycle::Stopped || state.error.is_some() {
            trace!(len, "write discarded");
            return;
        }
        append(&mut state.buffer);
        state.lifecycle = Lifecycle::Running;
        if state.outstanding.is_some() || self.handle.get().is_none() {
            return;
        }
        self.pump(state, pool);
    }

    pub(super) fn set_handle<W>(&self, pool: &W, handle: H) -> Result<(), PipeError>
    where
        W: WaitWork<Waitable = Waitable<H>>,
    {
        let state = self.state.lock();
        if state.lifecycle == Lifecycle::Stopped {
            return Err(PipeError::Stopped);
        }
        self.handle
            .set(handle)
            .map_err(|_| PipeError::HandleAlreadySet)?;
        debug!(buffered = state.buffer.len(), "pipe handle assigned");
        self.pump(state, pool);
        Ok(())
    }

    /// Issue writes until the buffer is empty, a write is left outstanding, or a write fails.
    /// Consumes the state lock
    fn pump<W>(&self, mut state: MutexGuard<'_, WriteState>, pool: &W)
    where
        W: WaitWork<Waitable = Waitable<H>>,
    {
        if let Some(handle) = self.handle.get() {
            while !state.buffer.is_empty() {
                let block = state.buffer.next_block(self.max_write_size);
                let len = block.len();
                // Safety: nothing is outstanding and we hold the state lock
                let overlapped = unsafe { &mut *self.overlapped.get() };
                let result = handle.write_overlapped(overlapped, block);
                match result {
                    Err(OverlappedError::Pending) => {
                        trace!(len, "write pending");
                        state.outstanding = Some(len);
                        // Safety: shared access under the state lock
                        pool.start(H::waitable(unsafe { &*self.overlapped.get() }));
                        break;
                    }
                    result => {
                        if !state.record_completion(len, result) {
                            break;
                        }
                    }
                }
            }
        }
        self.release(state);
    }

    /// Queue a notification on the owner if confirmed bytes await delivery and none is queued.
    /// The lock is released before anyone is signaled
    fn release(&self, mut state: MutexGuard<'_, WriteState>) {
        let post = state.pending && !state.posted;
        if post {
            state.posted = true;
        }
        let wake = state.pending || state.outstanding.is_none();
        drop(state);
        if post && !self.notify.post() {
            debug!("owner went away, notification dropped");
        }
        if wake {
            let _ = self.sync.set();
        }
    }

    /// The outstanding write resolved
    fn complete<W>(&self, worker: &W)
    where
        W: WaitWork<Waitable = Waitable<H>>,
    {
        let Some(handle) = self.handle.get() else {
            return;
        };
        let mut state = self.state.lock();
        // A cancellation finishing after stop must not touch anything
        if state.lifecycle == Lifecycle::Stopped {
            return;
        }
        let Some(len) = state.outstanding.take() else {
            return;
        };
        // Safety: the write resolved and we hold the state lock
        let result = handle.overlapped_result(unsafe { &*self.overlapped.get() }, false);
        trace!(len, ?result, "write completed");
        if state.record_completion(len, result) {
            self.pump(state, worker);
        } else {
            drop(state);
            let _ = self.sync.set();
        }
    }

    /// Snapshot and clear the confirmed byte count. None if there is nothing to deliver, or if the
    /// writer was stopped. A batch confirmed before [`Self::stop`] is discarded, never delivered
    pub(super) fn take_pending(&self, from_posted: bool) -> Option<u64> {
        let mut state = self.state.lock();
        if from_posted {
            state.posted = false;
        }
        if !state.pending {
            return None;
        }
        state.pending = false;
        let written = std::mem::take(&mut state.pending_bytes);
        match state.lifecycle {
            Lifecycle::Stopped => None,
            _ => Some(written),
        }
    }

    /// Queue another notification if bytes were confirmed while a delivery was suppressed
    pub(super) fn repost(&self) {
        let state = self.state.lock();
        if state.pending {
            self.release(state);
        }
    }

    pub(super) fn stop(&self, pool: &H::Pool) {
        let mut state = self.state.lock();
        if state.lifecycle == Lifecycle::Stopped {
            return;
        }
        state.lifecycle = Lifecycle::Stopped;
        state.pending = false;
        state.pending_bytes = 0;
        let cancelled = match (state.outstanding.take(), self.handle.get()) {
            (Some(len), Some(handle)) => {
                debug!(len, "cancelling outstanding write");
                pool.stop();
                // Safety: shared access under the state lock
                match handle.cancel_overlapped(unsafe { &*self.overlapped.get() }) {
                    Ok(()) => Some(handle),
                    // Completed concurrently
                    Err(e) if e.code() == ERROR_NOT_FOUND => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "failed to cancel pipe write");
                        None
                    }
                }
            }
            _ => None,
        };
        drop(state);
        pool.wait(WaitPending::Cancel);
        if let Some(handle) = cancelled {
            // Safety: stopped, the pump never runs again. The kernel is done with the request
            // state once this returns
            let _ = handle.overlapped_result(unsafe { &*self.overlapped.get() }, true);
        }
        let _ = self.sync.set();
        debug!("pipe writer stopped");
    }
}

impl<H> WaitCallback<<H::Pool as WaitPool>::Worker> for Shared<H>
where
    H: WriteOverlapped,
{
    fn on_wait(&self, worker: &<H::Pool as WaitPool>::Worker) {
        self.complete(worker);
    }
}
