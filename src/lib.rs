//! A small preemptive real-time kernel for Cortex-M class targets.
//!
//! - Priority-preemptive scheduling over a CLZ-driven priority bitmap,
//!   with round-robin time slicing among equal priorities
//! - First-fit heap with address-ordered coalescing and statistics
//! - Counting semaphores, recursive mutexes with chained priority
//!   inheritance, bounded message queues
//! - Software timers whose callbacks run outside critical sections
//! - Optional user hooks (idle, tick, task switch, stack overflow,
//!   allocation failure) and a `putc`-backed console
//!
//! The scheduler core is hardware-independent and tests on the host;
//! context switching, the tick interrupt and stack frames live behind
//! the [`port`] layer.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod mem;
pub mod port;
pub mod print;
pub mod sync;
#[cfg(feature = "timer")]
pub mod timer;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
#[cfg(feature = "hook")]
pub use crate::core::hook;
#[cfg(feature = "hook")]
pub use crate::core::hook::{
    os_hook_set_idle, os_hook_set_malloc_failed, os_hook_set_stack_overflow,
    os_hook_set_task_switch, os_hook_set_tick,
};
pub use crate::core::kernel;
pub use crate::core::kernel::{os_init, os_start};
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::sched::{os_sched_resume, os_sched_suspend, os_tick_handler};
pub use crate::core::task;
pub use crate::core::task::{
    os_task_cpu_usage, os_task_create, os_task_current, os_task_resume, os_task_runtime,
    os_task_stack_check, os_task_stack_usage, os_task_suspend, OsTcb, TaskHandle, TaskInit,
};
pub use crate::core::time;
pub use crate::core::time::{
    os_time_dly, os_time_dly_hmsm, os_time_get, os_total_run_time, TIMEOUT_MAX,
};
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::mem::{
    os_mem_alloc, os_mem_fragmentation, os_mem_free, os_mem_stats, MemStats,
};
pub use crate::print::os_console_set_putc;

#[cfg(feature = "mutex")]
pub use crate::sync::mutex::{os_mutex_create, os_mutex_owner_prio, MutexHandle};
#[cfg(feature = "queue")]
pub use crate::sync::queue::{os_queue_create, QueueHandle};
#[cfg(feature = "sem")]
pub use crate::sync::sem::{os_sem_create, SemHandle};
#[cfg(feature = "timer")]
pub use crate::timer::{os_timer_create, TimerHandle, TimerFn, TimerMode};
