//! common

/// Wait for pending worker callbacks, or cancel worker callbacks that have been queued but have
/// not started to execute yet
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitPending {
    /// Wait for pending callbacks
    Wait = 0,
    /// Cancel pending callbacks
    Cancel = 1,
}
