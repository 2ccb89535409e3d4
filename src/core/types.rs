//! Core type definitions shared across the kernel.

/// Task priority (0 = highest urgency)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Stack element type
pub type OsStkElement = u32;

/// Task entry point. A task that returns lands in the port's exit
/// trampoline, which masks interrupts and spins.
pub type OsTaskFn = fn(*mut ());

/// Task state, kept in lockstep with the state list the TCB is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskState {
    /// On a per-priority ready list
    Ready = 0,
    /// On the delay list, waiting for a wake-up tick
    Delayed,
    /// On the suspend list
    Suspended,
    /// On an event waiter list with no timeout
    Blocked,
    /// On an event waiter list and the timeout-blocked list
    BlockedTimeout,
    /// On no list (transient, during a state transition)
    Unknown,
}

/// Why a blocked task was woken up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PendStatus {
    /// The event fired before the timeout
    Ok = 0,
    /// The tick scanner timed the wait out
    Timeout,
}

/// Whether a blocking operation carries a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    /// Wait forever
    Endless = 0,
    /// Wait until `wake_up_time`
    Timeout,
}

/// Ordering discipline for an event waiter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitOrder {
    /// First in, first out
    Fifo = 0,
    /// Highest priority first, FIFO among equals
    Prio,
}
