//! Task control block.

use core::ptr::NonNull;

use crate::config::CFG_TASK_NAME_LEN;
use crate::core::list::WaitList;
use crate::types::{OsPrio, OsStkElement, OsTick, PendStatus, TaskState};

#[cfg(feature = "mutex")]
use crate::sync::mutex::OsMutex;

/// Task control block. One per task, allocated from the kernel heap at
/// task creation and never reclaimed.
///
/// A TCB can be on at most one *state* list (ready/delay/suspend/
/// timeout-blocked, via `state_next`/`state_prev`) and at most one
/// *event* waiter list (via `event_next`/`event_prev`) at the same
/// time. `state` always names the state list the TCB is on.
#[repr(C)]
pub struct OsTcb {
    /// Saved stack pointer, updated by the context switch handler
    pub(crate) stk_ptr: *mut OsStkElement,

    /// Stack base (lowest address) and size in bytes
    pub(crate) stk_base: *mut u8,
    pub(crate) stk_size: usize,

    /// Fixed-length, NUL-padded task name
    pub(crate) name: [u8; CFG_TASK_NAME_LEN],

    /// Effective priority (may be raised by inheritance)
    pub(crate) prio: OsPrio,
    /// Priority assigned at creation
    pub(crate) base_prio: OsPrio,

    pub(crate) state: TaskState,
    /// Why the last blocking wait ended
    pub(crate) pend_status: PendStatus,
    /// Absolute tick at which a delay or timed wait expires
    pub(crate) wake_up_time: OsTick,

    // State list linkage (ready/delay/suspend/timeout-blocked)
    pub(crate) state_next: Option<NonNull<OsTcb>>,
    pub(crate) state_prev: Option<NonNull<OsTcb>>,

    // Event waiter list linkage, plus a back-reference to the list the
    // task is currently enqueued on so the tick scanner can unlink it.
    pub(crate) event_next: Option<NonNull<OsTcb>>,
    pub(crate) event_prev: Option<NonNull<OsTcb>>,
    pub(crate) wait_list: *mut WaitList,

    /// Accumulated run time in ticks
    pub(crate) run_time_ticks: OsTick,
    /// Timestamp of the last switch-in
    pub(crate) last_switch_in: OsTick,

    /// Head of the singly-linked list of mutexes this task holds
    /// (chained through `OsMutex::next_mutex`); while the task is
    /// blocked on a mutex it points at that mutex instead, for
    /// inheritance chain walking.
    #[cfg(feature = "mutex")]
    pub(crate) holding_mutex: Option<NonNull<OsMutex>>,
}

impl OsTcb {
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,

            name: [0; CFG_TASK_NAME_LEN],

            prio: 0,
            base_prio: 0,

            state: TaskState::Unknown,
            pend_status: PendStatus::Ok,
            wake_up_time: OsTick::MAX,

            state_next: None,
            state_prev: None,

            event_next: None,
            event_prev: None,
            wait_list: core::ptr::null_mut(),

            run_time_ticks: 0,
            last_switch_in: 0,

            #[cfg(feature = "mutex")]
            holding_mutex: None,
        }
    }

    /// Copy a task name, truncating to the configured length. The last
    /// byte is always NUL so `name()` stays bounded.
    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = [0; CFG_TASK_NAME_LEN];
        let n = name.len().min(CFG_TASK_NAME_LEN - 1);
        self.name[..n].copy_from_slice(&name.as_bytes()[..n]);
    }

    /// Task name as a string slice.
    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Effective priority.
    #[inline]
    pub fn priority(&self) -> OsPrio {
        self.prio
    }

    /// Priority assigned at creation.
    #[inline]
    pub fn base_priority(&self) -> OsPrio {
        self.base_prio
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: TCBs are only mutated inside the kernel critical section.
unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
