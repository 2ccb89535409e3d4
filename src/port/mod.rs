//! Port layer: everything the kernel asks of the hardware.
//!
//! The contract is small: a periodic tick interrupt, a deferred
//! lowest-priority switch interrupt that saves and restores callee
//! registers, initial stack frame construction, and the first-task
//! handoff. Non-ARM builds get inert stubs so the core logic compiles
//! and tests on the host.

#[cfg(target_arch = "arm")]
pub mod cortex_m3;

#[cfg(target_arch = "arm")]
pub use cortex_m3::*;

#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::types::{OsStkElement, OsTaskFn};

    pub fn systick_init(_reload: u32) {}

    pub fn trigger_context_switch() {}

    /// # Safety
    /// Never returns meaningfully off-target.
    pub unsafe fn start_first_task() {
        unimplemented!("multitasking requires the Cortex-M port");
    }

    /// # Safety
    /// `stk_base` must point at a writable region of `stk_size` bytes.
    pub unsafe fn stack_init(
        stk_base: *mut u8,
        stk_size: usize,
        _entry: OsTaskFn,
        _arg: *mut (),
    ) -> *mut OsStkElement {
        let top = stk_base as usize + stk_size;
        (top & !7) as *mut OsStkElement
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
