//! writer
//!
//! A non-blocking pipe writer. [`PipeWriter::write`] appends to an internal buffer and returns
//! immediately; the buffer is drained by overlapped writes with at most one write outstanding.
//! Completions are confirmed on a worker thread and reported back to the thread that owns the
//! writer through a [`crate::notify::FlushPending`] token, coalesced so the owner sees one
//! bytes written notification per drained batch.

mod shared;

use crate::{
    event::{Event, EventHandle},
    io::{PipeError, WriteFailure, WriteOverlapped},
    notify::{FlushPending, Post},
    wait::WaitPool,
};
use bytes::Bytes;
use crossbeam::channel::Receiver;
use parking_lot::ReentrantMutex;
use shared::Shared;
use std::{
    cell::RefCell,
    io,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::warn;

#[derive(Copy, Clone, Debug)]
pub struct PipeWriterOptions {
    /// Largest single write request handed to the OS
    pub max_write_size: usize,
    /// Small writes are coalesced into chunks of this size
    pub chunk_capacity: usize,
}

impl Default for PipeWriterOptions {
    fn default() -> Self {
        PipeWriterOptions {
            max_write_size: 64 * 1024,
            chunk_capacity: 16 * 1024,
        }
    }
}

type BytesWritten<H> = Box<dyn FnMut(&PipeWriter<H>, u64) + Send>;

/// A handle to an overlapped pipe writer. The worker pool holds a reference to the shared state
/// which it hands to its callbacks.
///
/// NOTE the order is important RFC 1857 specifies drop order. The pool is dropped first and
/// waits for worker callbacks to return. We then free the shared state
pub struct PipeWriter<H: WriteOverlapped> {
    pool: H::Pool,
    shared: Arc<Shared<H>>,
    /// The bytes written handler. Reentrant so the handler may write to the writer
    handler: ReentrantMutex<RefCell<Option<BytesWritten<H>>>>,
}

impl<H: WriteOverlapped> PipeWriter<H> {
    /// Create a writer. Without a handle, writes are buffered until [`Self::set_handle`]
    pub fn new<N>(handle: Option<H>, notify: N) -> io::Result<Self>
    where
        N: Post + 'static,
    {
        Self::with_options(handle, notify, PipeWriterOptions::default())
    }

    pub fn with_options<N>(
        handle: Option<H>,
        notify: N,
        options: PipeWriterOptions,
    ) -> io::Result<Self>
    where
        N: Post + 'static,
    {
        let shared = Arc::new(Shared::new(handle, Box::new(notify), &options)?);
        let pool = H::Pool::with_callback(Arc::clone(&shared))?;
        Ok(PipeWriter {
            pool,
            shared,
            handler: ReentrantMutex::new(RefCell::new(None)),
        })
    }

    /// Queue bytes for writing. Never blocks on I/O. Writes to a stopped or failed writer are
    /// silently discarded
    pub fn write(&self, bytes: &[u8]) {
        self.shared
            .write(&self.pool, bytes.len(), |buffer| buffer.append(bytes));
    }

    /// Same as [`Self::write`] without copying
    pub fn write_bytes(&self, bytes: Bytes) {
        let len = bytes.len();
        self.shared
            .write(&self.pool, len, move |buffer| buffer.append_bytes(bytes));
    }

    /// Bytes buffered or confirmed but not yet reported by a bytes written notification
    pub fn bytes_to_write(&self) -> u64 {
        let state = self.shared.state.lock();
        state.buffer.len() as u64 + state.pending_bytes
    }

    /// Assign the pipe handle and start writing anything buffered so far. A handle may only be
    /// assigned once, and not after [`Self::stop`]
    pub fn set_handle(&self, handle: H) -> Result<(), PipeError> {
        self.shared.set_handle(&self.pool, handle)
    }

    pub fn handle(&self) -> Option<&H> {
        self.shared.handle.get()
    }

    /// Cancel any outstanding write and halt the writer for good. Returns once no worker callback
    /// is running. The handle may be closed afterwards
    pub fn stop(&self) {
        self.shared.stop(&self.pool);
    }

    /// Register the handler called on the owner thread with the count of confirmed bytes
    pub fn on_bytes_written<F>(&self, f: F)
    where
        F: FnMut(&PipeWriter<H>, u64) + Send + 'static,
    {
        let handler = self.handler.lock();
        match handler.try_borrow_mut() {
            Ok(mut slot) => *slot = Some(Box::new(f)),
            Err(_) => warn!("cannot replace the bytes written handler from inside itself"),
        };
    }

    /// Answer a [`FlushPending`] token. Returns true if the bytes written handler was called
    pub fn process_notification(&self) -> bool {
        self.deliver_pending(true)
    }

    /// Answer every [`FlushPending`] token queued on `rx` without blocking. Returns the number of
    /// notifications delivered
    pub fn drain_notifications(&self, rx: &Receiver<FlushPending>) -> usize {
        rx.try_iter()
            .filter(|_| self.process_notification())
            .count()
    }

    /// Deliver confirmed bytes now instead of waiting for the queued notification
    pub fn check_for_write(&self) -> bool {
        self.deliver_pending(false)
    }

    /// Block until the next drain point and deliver it. Returns true if the bytes written handler
    /// was called. Returns false on failure or timeout, if nothing is in flight, or when called
    /// from inside the handler
    pub fn wait_for_write(&self, timeout: Option<Duration>) -> bool {
        // Nothing can be delivered from inside the handler, and waiting here would never end
        if self.in_handler() {
            return false;
        }
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            {
                let state = self.shared.state.lock();
                if !state.pending && state.outstanding.is_none() {
                    return false;
                }
            }
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if self.shared.sync.wait(remaining).is_err() {
                return false;
            }
            if self.deliver_pending(false) {
                return true;
            }
        }
    }

    pub fn is_write_operation_active(&self) -> bool {
        self.shared.state.lock().outstanding.is_some()
    }

    /// The failure that poisoned the writer
    pub fn last_error(&self) -> Option<WriteFailure> {
        self.shared.state.lock().error
    }

    /// Signaled whenever a drain point is reached, IE a write was confirmed or failed
    pub fn sync_event(&self) -> &EventHandle {
        &self.shared.sync
    }

    /// The bytes written handler is running on this thread
    fn in_handler(&self) -> bool {
        self.handler.lock().try_borrow_mut().is_err()
    }

    fn deliver_pending(&self, from_posted: bool) -> bool {
        let _ = self.shared.sync.reset();
        let handler = self.handler.lock();
        let Ok(mut handler) = handler.try_borrow_mut() else {
            // Delivery requested from inside the handler. Leave the batch for later
            if from_posted {
                self.shared.state.lock().posted = false;
            }
            return false;
        };
        let Some(written) = self.shared.take_pending(from_posted) else {
            return false;
        };
        if let Some(f) = handler.as_mut() {
            f(self, written);
        }
        drop(handler);
        self.shared.repost();
        true
    }
}

impl<H: WriteOverlapped> Drop for PipeWriter<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<H: WriteOverlapped> std::fmt::Debug for PipeWriter<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PipeWriter")
            .field("buffered", &state.buffer.len())
            .field("pending_bytes", &state.pending_bytes)
            .field("outstanding", &state.outstanding)
            .field("lifecycle", &state.lifecycle)
            .field("error", &state.error)
            .finish()
    }
}
