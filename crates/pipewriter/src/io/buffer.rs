//! buffer

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// Append-only byte queue consumed from the front.
///
/// Small appends are coalesced into a staging chunk. A chunk is frozen before any of its bytes are
/// handed to the OS, so bytes under an outstanding write are never moved or modified by later
/// appends.
#[derive(Debug)]
pub struct WriteBuffer {
    /// Frozen chunks in write order
    chunks: VecDeque<Bytes>,
    /// Bytes logically after every frozen chunk
    staging: BytesMut,
    chunk_capacity: usize,
    len: usize,
}

impl WriteBuffer {
    pub fn new(chunk_capacity: usize) -> Self {
        WriteBuffer {
            chunks: VecDeque::new(),
            staging: BytesMut::new(),
            chunk_capacity: chunk_capacity.max(1),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if bytes.len() >= self.chunk_capacity {
            self.seal();
            self.chunks.push_back(Bytes::copy_from_slice(bytes));
        } else {
            if self.staging.len() + bytes.len() > self.chunk_capacity {
                self.seal();
            }
            if self.staging.capacity() == 0 {
                self.staging.reserve(self.chunk_capacity);
            }
            self.staging.extend_from_slice(bytes);
        }
        self.len += bytes.len();
    }

    /// Append without copying
    pub fn append_bytes(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.seal();
        self.len += bytes.len();
        self.chunks.push_back(bytes);
    }

    /// The next contiguous block at the front of the queue, at most `max` bytes long. The block
    /// stays valid and unmodified until it is released with [`Self::free`]
    pub fn next_block(&mut self, max: usize) -> &[u8] {
        if self.chunks.is_empty() {
            self.seal();
        }
        match self.chunks.front() {
            Some(chunk) => &chunk[..chunk.len().min(max)],
            None => &[],
        }
    }

    /// Drop `n` bytes from the front of the queue
    pub fn free(&mut self, n: usize) {
        let mut n = n.min(self.len);
        self.len -= n;
        while n > 0 {
            if self.chunks.is_empty() {
                self.seal();
            }
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= n {
                n -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(n);
                n = 0;
            }
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.staging.clear();
        self.len = 0;
    }

    /// Move the staging bytes to the back of the frozen chunks
    fn seal(&mut self) {
        if !self.staging.is_empty() {
            self.chunks.push_back(self.staging.split().freeze());
        }
    }
}
