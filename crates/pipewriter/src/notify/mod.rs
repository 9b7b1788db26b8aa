//! notify
//!
//! Completions are confirmed on worker threads, but [`crate::PipeWriter::on_bytes_written`]
//! handlers run on the thread that owns the writer. Workers [`Post`] a [`FlushPending`] token to
//! the owner, who answers by calling [`crate::PipeWriter::process_notification`].

use crossbeam::channel::{self, Receiver, Sender};

/// Zero argument token asking the owner to deliver pending bytes written notifications
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushPending;

/// Queue notifications on the owner thread
pub trait Post: Send + Sync {
    /// Queue one [`FlushPending`]. Returns false if the owner has gone away
    fn post(&self) -> bool;
}

impl Post for Sender<FlushPending> {
    fn post(&self) -> bool {
        self.send(FlushPending).is_ok()
    }
}

impl Post for futures::channel::mpsc::UnboundedSender<FlushPending> {
    fn post(&self) -> bool {
        self.unbounded_send(FlushPending).is_ok()
    }
}

impl Post for tokio::sync::mpsc::UnboundedSender<FlushPending> {
    fn post(&self) -> bool {
        self.send(FlushPending).is_ok()
    }
}

/// An unbounded channel for a writer owned by a plain thread
pub fn channel() -> (Sender<FlushPending>, Receiver<FlushPending>) {
    channel::unbounded()
}
