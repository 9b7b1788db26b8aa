//! A wait pool backed by a single dedicated worker thread. Waits on in-process
//! [`EventHandle`]s and mirrors the semantics of a kernel threadpool wait: one arm, one callback.

use super::{WaitCallback, WaitPool, WaitWork};
use crate::{
    common::WaitPending,
    event::{EventHandle, Waiter},
};
use parking_lot::{Condvar, Mutex};
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, error};

/// Owns the worker thread. Dropping the pool cancels queued callbacks, waits for a running
/// callback to return, and joins the worker. The callback context is released by the worker.
pub struct ThreadWaitPool {
    worker: ThreadWaitWorker,
    thread: Option<JoinHandle<()>>,
}

/// Handle to the pool passed to callbacks
#[derive(Clone)]
pub struct ThreadWaitWorker {
    shared: Arc<WaitShared>,
}

struct WaitShared {
    state: Mutex<WaitState>,
    cond: Condvar,
}

#[derive(Default)]
struct WaitState {
    /// The event we are armed on
    armed: Option<EventHandle>,
    /// A callback is queued and has not started
    queued: bool,
    /// A callback is executing
    running: bool,
    shutdown: bool,
}

impl Waiter for WaitShared {
    fn fire(&self) -> bool {
        let mut state = self.state.lock();
        match state.armed.take() {
            Some(_) if !state.shutdown => {
                state.queued = true;
                self.cond.notify_all();
                true
            }
            _ => false,
        }
    }
}

impl WaitPool for ThreadWaitPool {
    type Worker = ThreadWaitWorker;

    fn with_callback<C>(cx: Arc<C>) -> io::Result<Self>
    where
        C: WaitCallback<Self::Worker> + 'static,
    {
        let worker = ThreadWaitWorker {
            shared: Arc::new(WaitShared {
                state: Mutex::new(WaitState::default()),
                cond: Condvar::new(),
            }),
        };
        let thread = thread::Builder::new()
            .name("pipewriter-wait".into())
            .spawn({
                let worker = worker.clone();
                move || run(worker, cx)
            })?;
        Ok(ThreadWaitPool {
            worker,
            thread: Some(thread),
        })
    }
}

impl WaitWork for ThreadWaitPool {
    type Waitable = EventHandle;

    fn start(&self, event: &EventHandle) -> &Self {
        self.worker.start(event);
        self
    }

    fn stop(&self) -> &Self {
        self.worker.stop();
        self
    }

    fn wait(&self, pending: WaitPending) -> &Self {
        self.worker.wait(pending);
        self
    }
}

impl WaitWork for ThreadWaitWorker {
    type Waitable = EventHandle;

    fn start(&self, event: &EventHandle) -> &Self {
        // Lock order is event then pool. Release the pool lock before arming
        let previous = self.shared.state.lock().armed.replace(event.clone());
        if let Some(previous) = previous {
            previous.disarm(&self.waiter());
        }
        event.arm(self.waiter());
        self
    }

    fn stop(&self) -> &Self {
        let armed = self.shared.state.lock().armed.take();
        if let Some(event) = armed {
            event.disarm(&self.waiter());
        }
        self
    }

    fn wait(&self, pending: WaitPending) -> &Self {
        let mut state = self.shared.state.lock();
        if pending == WaitPending::Cancel {
            state.queued = false;
        }
        while state.running || state.queued {
            self.shared.cond.wait(&mut state);
        }
        self
    }
}

impl ThreadWaitWorker {
    fn waiter(&self) -> Arc<dyn Waiter> {
        Arc::clone(&self.shared) as Arc<dyn Waiter>
    }
}

/// Clears the running flag even if the callback panics
struct Running<'a>(&'a WaitShared);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.state.lock().running = false;
        self.0.cond.notify_all();
    }
}

fn run<C>(worker: ThreadWaitWorker, cx: Arc<C>)
where
    C: WaitCallback<ThreadWaitWorker>,
{
    debug!("wait worker started");
    loop {
        {
            let mut state = worker.shared.state.lock();
            while !state.queued && !state.shutdown {
                worker.shared.cond.wait(&mut state);
            }
            if state.shutdown {
                break;
            }
            state.queued = false;
            state.running = true;
        }
        let _running = Running(&worker.shared);
        cx.on_wait(&worker);
    }
    debug!("wait worker exiting");
}

impl Drop for ThreadWaitPool {
    fn drop(&mut self) {
        // A callback which drops the last owner of the pool cannot wait on or join itself
        let on_worker = self
            .thread
            .as_ref()
            .map_or(false, |thread| thread.thread().id() == thread::current().id());
        self.worker.stop();
        if !on_worker {
            self.worker.wait(WaitPending::Cancel);
        }
        {
            let mut state = self.worker.shared.state.lock();
            state.shutdown = true;
            self.worker.shared.cond.notify_all();
        }
        match self.thread.take() {
            Some(thread) if !on_worker => {
                if thread.join().is_err() {
                    error!("wait worker panicked");
                }
            }
            _ => {}
        }
    }
}
