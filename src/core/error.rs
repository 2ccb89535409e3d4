//! Kernel error codes.
//!
//! Every fallible API returns `OsResult<T>`; success is the `Ok` arm.

/// Flat error enumeration shared by all kernel APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OsError {
    /// Generic failure; also reported by non-blocking calls that would block
    Failed = 1,
    /// Operation not allowed in the current state
    InvalidState,
    /// Feature not supported
    NotSupported,
    /// Invalid parameter
    InvalidParam,
    /// Handle does not refer to a live object
    InvalidHandle,
    /// Parameter value out of range
    OutOfRange,
    /// Heap exhausted
    NoMemory,
    /// Object pool exhausted
    ResourceUnavailable,
    /// Wait timed out
    Timeout,
    /// Task state or parameter invalid
    TaskInvalid,
    /// Task not found
    TaskNotFound,
    /// Task priority conflict
    PrioConflict,
    /// Synchronization object state invalid (e.g. count overflow)
    SyncInvalid,
    /// Caller does not own the object
    NotOwner,
    /// Deadlock detected (reserved)
    Deadlock,
    /// Message larger than the queue element size
    QueueSizeMismatch,
    /// Memory corruption detected
    MemCorruption,
    /// Disallowed call from interrupt context
    InIsr,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;
