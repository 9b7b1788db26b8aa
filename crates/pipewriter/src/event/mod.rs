//! event.rs
//!
//! Manual and auto reset events. [`EventHandle`] is an in-process event that threads may block on
//! and that a [`crate::wait::ThreadWaitPool`] may be armed on, much like a kernel event handed to
//! a threadpool wait. On windows the kernel flavour lives in [`OwnedEventHandle`].

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::{anonymous, OwnedEventHandle};

use parking_lot::{Condvar, Mutex};
use std::{
    error, fmt, io,
    sync::Arc,
    time::{Duration, Instant},
};

/// The event api shared by the in-process [`EventHandle`] and the windows kernel events
pub trait Event {
    /// Sets the event object to the signaled state.
    ///
    /// [See
    /// also](https://learn.microsoft.com/en-us/windows/win32/api/synchapi/nf-synchapi-setevent)
    fn set(&self) -> io::Result<()>;

    /// Sets the event object to the nonsignaled state.
    ///
    /// [See
    /// also](https://learn.microsoft.com/en-us/windows/win32/api/synchapi/nf-synchapi-resetevent)
    fn reset(&self) -> io::Result<()>;

    /// Wait for event with optional timeout
    ///
    /// [see also]
    /// (https://learn.microsoft.com/en-us/windows/win32/api/synchapi/nf-synchapi-waitforsingleobject)
    fn wait(&self, duration: Option<Duration>) -> Result<(), EventError>;
}

#[derive(Debug)]
pub enum EventError {
    Abandoned,
    Failed,
    Timeout,
    Io(io::Error),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Abandoned => write!(f, "Event abandoned"),
            EventError::Failed => write!(f, "Event failed"),
            EventError::Timeout => write!(f, "Event timeout"),
            EventError::Io(e) => write!(f, "Event io error => {e}"),
        }
    }
}

impl error::Error for EventError {}

/// A manual-reset event stays signaled until [`Event::reset`] is called. An auto-reset event is
/// reset as soon as a single waiter (a blocked thread or an armed wait pool) has been released.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventReset {
    Manual,
    Automatic,
}

/// Initial state of a newly created event
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventInitialState {
    Set,
    Unset,
}

/// Something that can be armed on an [`EventHandle`]. An armed waiter is released (at most once)
/// the next time the event becomes signaled, and is then forgotten by the event.
pub(crate) trait Waiter: Send + Sync {
    /// Returns true if the waiter accepted the signal. An accepted signal consumes an auto-reset
    /// event.
    fn fire(&self) -> bool;
}

/// An in-process event. Cloning the handle shares the same event.
#[derive(Clone)]
pub struct EventHandle {
    inner: Arc<EventInner>,
}

struct EventInner {
    reset: EventReset,
    state: Mutex<EventState>,
    cond: Condvar,
}

struct EventState {
    signaled: bool,
    waiters: Vec<Arc<dyn Waiter>>,
}

impl EventHandle {
    pub fn new(reset: EventReset, state: EventInitialState) -> Self {
        EventHandle {
            inner: Arc::new(EventInner {
                reset,
                state: Mutex::new(EventState {
                    signaled: state == EventInitialState::Set,
                    waiters: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// An unset manual-reset event
    pub fn manual() -> Self {
        Self::new(EventReset::Manual, EventInitialState::Unset)
    }

    /// An unset auto-reset event
    pub fn automatic() -> Self {
        Self::new(EventReset::Automatic, EventInitialState::Unset)
    }

    pub fn reset_kind(&self) -> EventReset {
        self.inner.reset
    }

    /// Peek at the signaled state without consuming it
    pub fn is_set(&self) -> bool {
        self.inner.state.lock().signaled
    }

    /// Returns true if both handles refer to the same event
    pub fn ptr_eq(&self, other: &EventHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Arm a waiter. If the event is already signaled the waiter fires immediately.
    pub(crate) fn arm(&self, waiter: Arc<dyn Waiter>) {
        let mut state = self.inner.state.lock();
        if state.signaled {
            if waiter.fire() && self.inner.reset == EventReset::Automatic {
                state.signaled = false;
            }
        } else {
            state.waiters.push(waiter);
        }
    }

    /// Forget a waiter that has not fired yet
    pub(crate) fn disarm(&self, waiter: &Arc<dyn Waiter>) {
        let target = Arc::as_ptr(waiter) as *const ();
        self.inner
            .state
            .lock()
            .waiters
            .retain(|armed| Arc::as_ptr(armed) as *const () != target);
    }
}

impl Event for EventHandle {
    fn set(&self) -> io::Result<()> {
        let mut state = self.inner.state.lock();
        let mut consumed = false;
        for waiter in std::mem::take(&mut state.waiters) {
            consumed |= waiter.fire();
        }
        if !(consumed && self.inner.reset == EventReset::Automatic) {
            state.signaled = true;
            match self.inner.reset {
                EventReset::Manual => {
                    self.inner.cond.notify_all();
                }
                EventReset::Automatic => {
                    self.inner.cond.notify_one();
                }
            }
        }
        Ok(())
    }

    fn reset(&self) -> io::Result<()> {
        self.inner.state.lock().signaled = false;
        Ok(())
    }

    fn wait(&self, duration: Option<Duration>) -> Result<(), EventError> {
        let deadline = duration.and_then(|d| Instant::now().checked_add(d));
        let mut state = self.inner.state.lock();
        while !state.signaled {
            match deadline {
                None => self.inner.cond.wait(&mut state),
                Some(deadline) => {
                    if self.inner.cond.wait_until(&mut state, deadline).timed_out()
                        && !state.signaled
                    {
                        return Err(EventError::Timeout);
                    }
                }
            }
        }
        if self.inner.reset == EventReset::Automatic {
            state.signaled = false;
        }
        Ok(())
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("EventHandle")
            .field("reset", &self.inner.reset)
            .field("signaled", &state.signaled)
            .field("armed", &state.waiters.len())
            .finish()
    }
}
