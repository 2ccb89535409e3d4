//! Inter-task synchronization objects.
//!
//! All objects live in fixed-size pools and are addressed through
//! copyable index handles; a slot flips between used and unused over
//! its lifetime.

#[cfg(feature = "mutex")]
pub mod mutex;
#[cfg(feature = "queue")]
pub mod queue;
#[cfg(feature = "sem")]
pub mod sem;
