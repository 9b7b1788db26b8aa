//! An in-process pipe endpoint.
//!
//! [`MemoryPipe`] implements [`WriteOverlapped`] on top of in-process events so the writer can run
//! on any platform. Each write request follows a scripted [`Outcome`]; writes left outstanding are
//! resolved by the owner of the pipe with [`MemoryPipe::complete_pending`] or
//! [`MemoryPipe::fail_pending`], which signals the request event exactly like the kernel would.

use super::{
    error::{ERROR_IO_INCOMPLETE, ERROR_NOT_FOUND, ERROR_OPERATION_ABORTED},
    OverlappedError, WriteOverlapped,
};
use crate::{
    event::{Event, EventHandle},
    wait::ThreadWaitPool,
};
use bytes::{Bytes, BytesMut};
use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, io, sync::Arc};
use tracing::trace;

/// What the next write request does
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Finish synchronously with every requested byte
    Complete,
    /// Accept the request and leave it outstanding
    Pend,
    /// Fail synchronously with an os error code
    Fail(u32),
    /// Finish synchronously with at most this many bytes
    Short(usize),
}

#[derive(Clone)]
pub struct MemoryPipe {
    shared: Arc<Mutex<PipeState>>,
}

struct PipeState {
    script: VecDeque<Outcome>,
    fallback: Outcome,
    closed: Option<u32>,
    pending: VecDeque<PendingWrite>,
    max_outstanding: usize,
    issued: Vec<Bytes>,
    written: BytesMut,
}

struct PendingWrite {
    op: Arc<OpSlot>,
    bytes: Bytes,
}

/// Request state of a [`MemoryPipe`] write
pub struct MemoryOverlapped {
    op: Arc<OpSlot>,
}

struct OpSlot {
    event: EventHandle,
    result: Mutex<Option<Result<usize, u32>>>,
    cond: Condvar,
}

impl OpSlot {
    fn finish(&self, result: Result<usize, u32>) {
        *self.result.lock() = Some(result);
        self.cond.notify_all();
        let _ = self.event.set();
    }
}

impl Default for MemoryPipe {
    fn default() -> Self {
        MemoryPipe::new()
    }
}

impl MemoryPipe {
    /// A pipe whose writes all complete synchronously until told otherwise
    pub fn new() -> Self {
        MemoryPipe::with_fallback(Outcome::Complete)
    }

    /// A pipe whose unscripted writes follow `fallback`
    pub fn with_fallback(fallback: Outcome) -> Self {
        MemoryPipe {
            shared: Arc::new(Mutex::new(PipeState {
                script: VecDeque::new(),
                fallback,
                closed: None,
                pending: VecDeque::new(),
                max_outstanding: 0,
                issued: Vec::new(),
                written: BytesMut::new(),
            })),
        }
    }

    /// Queue outcomes for the next write requests
    pub fn script<I>(&self, outcomes: I) -> &Self
    where
        I: IntoIterator<Item = Outcome>,
    {
        self.shared.lock().script.extend(outcomes);
        self
    }

    /// Every following write fails with `code`, IE the reader went away
    pub fn close(&self, code: u32) -> &Self {
        self.shared.lock().closed = Some(code);
        self
    }

    /// Complete the oldest outstanding write with every requested byte. Returns false if nothing
    /// is outstanding
    pub fn complete_pending(&self) -> bool {
        let pending = {
            let mut state = self.shared.lock();
            let Some(pending) = state.pending.pop_front() else {
                return false;
            };
            state.written.extend_from_slice(&pending.bytes);
            pending
        };
        trace!(len = pending.bytes.len(), "memory pipe write completed");
        pending.op.finish(Ok(pending.bytes.len()));
        true
    }

    /// Fail the oldest outstanding write with `code`. Returns false if nothing is outstanding
    pub fn fail_pending(&self, code: u32) -> bool {
        let pending = self.shared.lock().pending.pop_front();
        match pending {
            Some(pending) => {
                trace!(code, "memory pipe write failed");
                pending.op.finish(Err(code));
                true
            }
            None => false,
        }
    }

    /// Bytes accepted by the reader, in order
    pub fn written(&self) -> Bytes {
        Bytes::copy_from_slice(&self.shared.lock().written)
    }

    /// Every segment passed to a write request, in order
    pub fn issued(&self) -> Vec<Bytes> {
        self.shared.lock().issued.clone()
    }

    /// Writes that are currently outstanding
    pub fn outstanding(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// The most writes that were ever outstanding at the same time
    pub fn max_outstanding(&self) -> usize {
        self.shared.lock().max_outstanding
    }
}

impl WriteOverlapped for MemoryPipe {
    type Overlapped = MemoryOverlapped;
    type Pool = ThreadWaitPool;

    fn overlapped() -> io::Result<MemoryOverlapped> {
        Ok(MemoryOverlapped {
            op: Arc::new(OpSlot {
                event: EventHandle::automatic(),
                result: Mutex::new(None),
                cond: Condvar::new(),
            }),
        })
    }

    fn waitable(overlapped: &MemoryOverlapped) -> &EventHandle {
        &overlapped.op.event
    }

    fn write_overlapped(
        &self,
        overlapped: &mut MemoryOverlapped,
        bytes: &[u8],
    ) -> Result<usize, OverlappedError> {
        let _ = overlapped.op.event.reset();
        *overlapped.op.result.lock() = None;
        let mut state = self.shared.lock();
        let outcome = match state.closed {
            Some(code) => Outcome::Fail(code),
            None => state.script.pop_front().unwrap_or(state.fallback),
        };
        let bytes = Bytes::copy_from_slice(bytes);
        state.issued.push(bytes.clone());
        match outcome {
            Outcome::Complete => {
                state.written.extend_from_slice(&bytes);
                *overlapped.op.result.lock() = Some(Ok(bytes.len()));
                Ok(bytes.len())
            }
            Outcome::Short(limit) => {
                let n = limit.min(bytes.len());
                state.written.extend_from_slice(&bytes[..n]);
                *overlapped.op.result.lock() = Some(Ok(n));
                Ok(n)
            }
            Outcome::Fail(code) => {
                *overlapped.op.result.lock() = Some(Err(code));
                Err(OverlappedError::Os(code))
            }
            Outcome::Pend => {
                state.pending.push_back(PendingWrite {
                    op: Arc::clone(&overlapped.op),
                    bytes,
                });
                state.max_outstanding = state.max_outstanding.max(state.pending.len());
                Err(OverlappedError::Pending)
            }
        }
    }

    fn overlapped_result(
        &self,
        overlapped: &MemoryOverlapped,
        wait: bool,
    ) -> Result<usize, OverlappedError> {
        let mut result = overlapped.op.result.lock();
        loop {
            match *result {
                Some(Ok(n)) => return Ok(n),
                Some(Err(code)) => return Err(OverlappedError::Os(code)),
                None if !wait => return Err(OverlappedError::Os(ERROR_IO_INCOMPLETE)),
                None => overlapped.op.cond.wait(&mut result),
            }
        }
    }

    fn cancel_overlapped(&self, overlapped: &MemoryOverlapped) -> Result<(), OverlappedError> {
        let cancelled = {
            let mut state = self.shared.lock();
            state
                .pending
                .iter()
                .position(|pending| Arc::ptr_eq(&pending.op, &overlapped.op))
                .and_then(|index| state.pending.remove(index))
        };
        match cancelled {
            Some(pending) => {
                pending.op.finish(Err(ERROR_OPERATION_ABORTED));
                Ok(())
            }
            None => Err(OverlappedError::Os(ERROR_NOT_FOUND)),
        }
    }
}
