//! Priority-preemptive scheduler with equal-priority round-robin.
//!
//! All state lives in [`SchedState`] behind the critical section: the
//! per-priority ready lists with their active bitmap, the delay list,
//! the suspend list and the timeout-blocked list (the latter two
//! sorted ascending by wake-up time), plus the scheduler-suspension
//! nesting counter and the round-robin slice.
//!
//! [`schedule`] is the single entry point for requesting a context
//! switch from task code and IPC operations; the tick handler makes
//! its own preemption and rotation decision and raises the deferred
//! switch directly.

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_NUM, CFG_TIME_SLICE};
use crate::core::list::{TaskList, WaitList};
use crate::core::time;
use crate::critical::{critical_section, is_isr_context, CriticalSection, CsCell};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::task::OsTcb;
use crate::types::{BlockKind, OsPrio, PendStatus, TaskState, WaitOrder};

/// Scheduler state, one instance per kernel.
pub(crate) struct SchedState {
    pub(crate) prio_tbl: crate::prio::PrioTable,
    pub(crate) ready: [TaskList; CFG_PRIO_NUM],
    pub(crate) delay: TaskList,
    pub(crate) suspend: TaskList,
    pub(crate) timeout: TaskList,
    /// Scheduler-suspension nesting; no switch happens while non-zero
    pub(crate) suspend_nesting: u32,
    /// A reschedule was requested while suspended
    pub(crate) resched_pending: bool,
    /// Remaining ticks of the current round-robin slice
    pub(crate) time_slice: u32,
}

impl SchedState {
    const fn new() -> Self {
        SchedState {
            prio_tbl: crate::prio::PrioTable::new(),
            ready: [TaskList::new(); CFG_PRIO_NUM],
            delay: TaskList::new(),
            suspend: TaskList::new(),
            timeout: TaskList::new(),
            suspend_nesting: 0,
            resched_pending: false,
            time_slice: CFG_TIME_SLICE,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// Head of the highest-priority non-empty ready list.
fn highest_ready(sched: &mut SchedState) -> Option<NonNull<OsTcb>> {
    let prio = sched.prio_tbl.highest();
    sched.ready[prio as usize].head()
}

/// True while the scheduler-suspension nesting counter is non-zero.
pub(crate) fn is_suspended() -> bool {
    unsafe { SCHED.get_unchecked().suspend_nesting > 0 }
}

// ============ Reschedule ============

/// Request a context switch.
///
/// Picks the highest-priority ready task and, if it differs from the
/// running one, publishes it as the switch target and raises the
/// deferred switch interrupt. When the running task still shares the
/// top priority, equal-priority peers are rotated instead (no switch
/// when the running task is alone on its list). While the scheduler
/// is suspended only the pending flag is set.
pub(crate) fn schedule() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    let _cs = CriticalSection::enter();
    let sched = unsafe { SCHED.get_unchecked() };

    if sched.suspend_nesting > 0 {
        sched.resched_pending = true;
        return;
    }

    let Some(next) = highest_ready(sched) else {
        return;
    };
    let Some(cur) = kernel::tcb_cur_ptr() else {
        kernel::set_tcb_next(Some(next));
        crate::port::trigger_context_switch();
        return;
    };

    let cur_ref = unsafe { cur.as_ref() };
    let next_prio = unsafe { next.as_ref().prio };

    if cur_ref.state != TaskState::Ready || next_prio != cur_ref.prio {
        if next != cur {
            kernel::set_tcb_next(Some(next));
            crate::port::trigger_context_switch();
        }
        return;
    }

    // Equal priority and the current task is still runnable.
    let list = &mut sched.ready[cur_ref.prio as usize];
    if list.head() == Some(cur) && list.tail() == Some(cur) {
        return;
    }
    list.move_to_tail(cur);
    if let Some(new_head) = list.head() {
        kernel::set_tcb_next(Some(new_head));
        crate::port::trigger_context_switch();
    }
}

// ============ Tick ============

/// Kernel tick entry point, called from the periodic tick ISR.
///
/// Under the critical section, and only while the scheduler is not
/// suspended: advance the time base, wake expired delayed and
/// timeout-blocked tasks, then preempt or rotate. The software timer
/// service and the tick hook run after the critical section has been
/// released.
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    let now = time::os_time_get();

    {
        let _cs = CriticalSection::enter();
        let sched = unsafe { SCHED.get_unchecked() };

        if sched.suspend_nesting == 0 {
            time::advance();
            wake_delayed(sched, now);
            wake_timed_out(sched, now);
            tick_decide(sched);
        }
    }

    #[cfg(feature = "timer")]
    crate::timer::service(now);

    #[cfg(feature = "hook")]
    crate::hook::call_tick();
}

/// Wake delayed tasks whose wake-up time has been reached. The delay
/// list is sorted, so only the head needs to be examined.
fn wake_delayed(sched: &mut SchedState, now: u32) {
    while let Some(head) = sched.delay.head() {
        let head_ref = unsafe { &mut *head.as_ptr() };
        if !time::reached(now, head_ref.wake_up_time) {
            break;
        }
        sched.delay.remove(head);
        insert_ready(sched, head);
    }
}

/// Wake timed-out event waiters: unlink from the timeout list and from
/// the event waiter list, and mark the wakeup as a timeout so the
/// suspended IPC call reports `OsError::Timeout` on return.
fn wake_timed_out(sched: &mut SchedState, now: u32) {
    while let Some(head) = sched.timeout.head() {
        let head_ref = unsafe { &mut *head.as_ptr() };
        if !time::reached(now, head_ref.wake_up_time) {
            break;
        }
        sched.timeout.remove(head);
        head_ref.pend_status = PendStatus::Timeout;
        if !head_ref.wait_list.is_null() {
            unsafe { (*head_ref.wait_list).remove(head) };
        }
        insert_ready(sched, head);
    }
}

/// Preemption and round-robin decision for the tick. Mirrors
/// [`schedule`] but gates rotation on the time slice.
fn tick_decide(sched: &mut SchedState) {
    let Some(next) = highest_ready(sched) else {
        return;
    };
    let Some(cur) = kernel::tcb_cur_ptr() else {
        return;
    };

    let cur_ref = unsafe { cur.as_ref() };
    let next_prio = unsafe { next.as_ref().prio };

    if cur_ref.state != TaskState::Ready || next_prio < cur_ref.prio {
        if next != cur {
            kernel::set_tcb_next(Some(next));
            crate::port::trigger_context_switch();
        }
        return;
    }

    if next_prio == cur_ref.prio {
        let list = &mut sched.ready[cur_ref.prio as usize];
        if list.head() != list.tail() {
            sched.time_slice -= 1;
            if sched.time_slice == 0 {
                sched.time_slice = CFG_TIME_SLICE;
                list.move_to_tail(cur);
                if let Some(new_head) = list.head() {
                    kernel::set_tcb_next(Some(new_head));
                    crate::port::trigger_context_switch();
                }
            }
        } else {
            sched.time_slice = CFG_TIME_SLICE;
        }
    }
}

// ============ Scheduler suspension ============

/// Suspend the scheduler. Nests; context switches are deferred until
/// the matching number of [`os_sched_resume`] calls.
pub fn os_sched_suspend() -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if !kernel::KERNEL.is_running() {
        return Err(OsError::InvalidState);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);
        sched.suspend_nesting = sched
            .suspend_nesting
            .checked_add(1)
            .ok_or(OsError::OutOfRange)?;
        Ok(())
    })
}

/// Resume the scheduler. When the nesting drops to zero and a
/// reschedule was requested in the meantime, it is carried out now.
pub fn os_sched_resume() -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if !kernel::KERNEL.is_running() {
        return Err(OsError::InvalidState);
    }

    let resched = critical_section(|cs| {
        let sched = SCHED.get(cs);
        if sched.suspend_nesting == 0 {
            return Err(OsError::InvalidState);
        }
        sched.suspend_nesting -= 1;
        if sched.suspend_nesting == 0 && sched.resched_pending {
            sched.resched_pending = false;
            return Ok(true);
        }
        Ok(false)
    })?;

    if resched {
        schedule();
    }
    Ok(())
}

// ============ State transitions ============
//
// Each transition keeps the TCB's `state` field in agreement with the
// list it is on. Callers hold the critical section.

fn insert_ready(sched: &mut SchedState, tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    sched.ready[tcb_ref.prio as usize].insert_tail(tcb);
    sched.prio_tbl.set(tcb_ref.prio);
    tcb_ref.state = TaskState::Ready;
}

fn remove_ready(sched: &mut SchedState, tcb: NonNull<OsTcb>) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    let prio = tcb_ref.prio;
    sched.ready[prio as usize].remove(tcb);
    if sched.ready[prio as usize].is_empty() {
        sched.prio_tbl.clear(prio);
    }
    tcb_ref.state = TaskState::Unknown;
}

/// Put a task on its priority's ready list.
///
/// # Safety
/// `tcb` must be valid and on no state list; the caller holds the
/// critical section.
pub(crate) unsafe fn ready_insert(tcb: NonNull<OsTcb>) {
    let sched = unsafe { SCHED.get_unchecked() };
    insert_ready(sched, tcb);
}

/// Take a task off its ready list.
///
/// # Safety
/// `tcb` must be on its priority's ready list; the caller holds the
/// critical section.
pub(crate) unsafe fn ready_remove(tcb: NonNull<OsTcb>) {
    let sched = unsafe { SCHED.get_unchecked() };
    remove_ready(sched, tcb);
}

/// Ready → delayed, sorted into the delay list by wake-up time.
///
/// # Safety
/// As [`ready_remove`]; `wake_up_time` must already be set.
pub(crate) unsafe fn ready_to_delay(tcb: NonNull<OsTcb>) {
    let sched = unsafe { SCHED.get_unchecked() };
    remove_ready(sched, tcb);
    sched.delay.insert_by_wake_time(tcb);
    unsafe { (*tcb.as_ptr()).state = TaskState::Delayed };
}

/// Ready → suspended.
///
/// # Safety
/// As [`ready_remove`].
pub(crate) unsafe fn ready_to_suspend(tcb: NonNull<OsTcb>) {
    let sched = unsafe { SCHED.get_unchecked() };
    remove_ready(sched, tcb);
    sched.suspend.insert_tail(tcb);
    unsafe { (*tcb.as_ptr()).state = TaskState::Suspended };
}

/// Suspended → ready.
///
/// # Safety
/// `tcb` must be on the suspend list; the caller holds the critical
/// section.
pub(crate) unsafe fn suspend_to_ready(tcb: NonNull<OsTcb>) {
    let sched = unsafe { SCHED.get_unchecked() };
    sched.suspend.remove(tcb);
    insert_ready(sched, tcb);
}

/// Ready → blocked on an event waiter list; a timed wait additionally
/// joins the timeout-blocked list through the TCB's state node.
///
/// # Safety
/// As [`ready_remove`]; `wait` must outlive the blocking (waiter lists
/// live in the static object pools).
pub(crate) unsafe fn ready_to_block(
    tcb: NonNull<OsTcb>,
    wait: &mut WaitList,
    kind: BlockKind,
    order: WaitOrder,
) {
    let sched = unsafe { SCHED.get_unchecked() };
    remove_ready(sched, tcb);

    match order {
        WaitOrder::Prio => wait.insert_by_prio(tcb),
        WaitOrder::Fifo => wait.insert_tail(tcb),
    }

    let tcb_ref = unsafe { &mut *tcb.as_ptr() };
    match kind {
        BlockKind::Endless => tcb_ref.state = TaskState::Blocked,
        BlockKind::Timeout => {
            sched.timeout.insert_by_wake_time(tcb);
            tcb_ref.state = TaskState::BlockedTimeout;
        }
    }
}

/// Blocked → ready: unlink from the event waiter list (via the TCB's
/// back-reference) and, for a timed wait, from the timeout list.
///
/// # Safety
/// `tcb` must be blocked; the caller holds the critical section.
pub(crate) unsafe fn block_to_ready(tcb: NonNull<OsTcb>) {
    let sched = unsafe { SCHED.get_unchecked() };
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    if tcb_ref.state == TaskState::BlockedTimeout {
        sched.timeout.remove(tcb);
    }
    if !tcb_ref.wait_list.is_null() {
        unsafe { (*tcb_ref.wait_list).remove(tcb) };
    }
    insert_ready(sched, tcb);
}

/// Temporarily change a task's effective priority (priority
/// inheritance). A ready task is re-filed under the new priority; a
/// waiting task keeps its position on whatever list it is on.
///
/// # Safety
/// The caller holds the critical section.
pub(crate) unsafe fn change_prio(tcb: NonNull<OsTcb>, new_prio: OsPrio) {
    let sched = unsafe { SCHED.get_unchecked() };
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    if tcb_ref.prio == new_prio {
        return;
    }

    if tcb_ref.state == TaskState::Ready {
        let old = tcb_ref.prio;
        sched.ready[old as usize].remove(tcb);
        if sched.ready[old as usize].is_empty() {
            sched.prio_tbl.clear(old);
        }
        tcb_ref.prio = new_prio;
        sched.ready[new_prio as usize].insert_tail(tcb);
        sched.prio_tbl.set(new_prio);
    } else {
        tcb_ref.prio = new_prio;
    }
}

/// Drop an inheritance boost, restoring the base priority.
///
/// # Safety
/// The caller holds the critical section.
pub(crate) unsafe fn restore_base_prio(tcb: NonNull<OsTcb>) {
    let base = unsafe { tcb.as_ref().base_prio };
    unsafe { change_prio(tcb, base) };
}
