//! Task management: creation, suspension, stack hygiene and run-time
//! statistics.

mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_NUM, CFG_STACK_MAGIC, CFG_STACK_SIZE_MIN};
use crate::core::time;
use crate::critical::{critical_section, is_isr_context, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::types::{OsPrio, OsTaskFn, OsTick, TaskState};

/// Parameter bundle for task creation.
pub struct TaskInit<'a> {
    /// Entry function; receives `arg` as its only input
    pub entry: OsTaskFn,
    /// Base priority, 0 is highest; the lowest level is reserved for
    /// the idle task
    pub priority: OsPrio,
    /// Task name, truncated to the configured length
    pub name: &'a str,
    /// Stack size in bytes
    pub stack_size: usize,
    /// Private argument handed to the entry function
    pub arg: *mut (),
}

/// Stable handle to a created task.
///
/// TCBs are heap-allocated and never reclaimed, so a handle stays
/// valid for the lifetime of the kernel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TaskHandle(pub(crate) NonNull<OsTcb>);

// SAFETY: the TCB behind a handle is only mutated inside the kernel
// critical section.
unsafe impl Send for TaskHandle {}
unsafe impl Sync for TaskHandle {}

impl TaskHandle {
    /// Task name.
    pub fn name(&self) -> &str {
        unsafe { (*self.0.as_ptr()).name() }
    }

    /// Effective priority.
    pub fn priority(&self) -> OsPrio {
        unsafe { self.0.as_ref().prio }
    }

    pub fn state(&self) -> TaskState {
        unsafe { self.0.as_ref().state }
    }
}

/// Create a task and make it ready.
///
/// The TCB and the stack are taken from the kernel heap; the stack is
/// seeded with the magic byte for overflow and usage tracking, and the
/// port builds an initial exception frame so that the first switch-in
/// starts executing `entry(arg)` with the task-exit trampoline as
/// return address. If the kernel is already running and the new task
/// outranks the current one, it is scheduled immediately.
pub fn os_task_create(init: &TaskInit) -> OsResult<TaskHandle> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }
    if init.priority as usize >= CFG_PRIO_NUM {
        return Err(OsError::InvalidParam);
    }
    if init.stack_size < CFG_STACK_SIZE_MIN {
        return Err(OsError::InvalidParam);
    }

    let tcb_mem = crate::mem::os_mem_alloc(core::mem::size_of::<OsTcb>()) as *mut OsTcb;
    if tcb_mem.is_null() {
        return Err(OsError::NoMemory);
    }
    let stack = crate::mem::os_mem_alloc(init.stack_size);
    if stack.is_null() {
        crate::mem::os_mem_free(tcb_mem as *mut u8);
        return Err(OsError::NoMemory);
    }

    unsafe {
        core::ptr::write_bytes(stack, CFG_STACK_MAGIC, init.stack_size);
        tcb_mem.write(OsTcb::new());
    }

    let tcb = unsafe { &mut *tcb_mem };
    tcb.set_name(init.name);
    tcb.prio = init.priority;
    tcb.base_prio = init.priority;
    tcb.stk_base = stack;
    tcb.stk_size = init.stack_size;
    tcb.stk_ptr = unsafe { crate::port::stack_init(stack, init.stack_size, init.entry, init.arg) };

    let handle = unsafe { NonNull::new_unchecked(tcb_mem) };

    critical_section(|_cs| unsafe {
        sched::ready_insert(handle);
    });

    if kernel::KERNEL.is_running() {
        sched::schedule();
    }

    Ok(TaskHandle(handle))
}

/// Handle of the currently running task.
pub fn os_task_current() -> Option<TaskHandle> {
    kernel::tcb_cur_ptr().map(TaskHandle)
}

/// Suspend a ready task (`None` suspends the caller). The idle task
/// cannot be suspended.
pub fn os_task_suspend(handle: Option<TaskHandle>) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }

    let cs = CriticalSection::enter();

    let tcb = match handle {
        Some(h) => h.0,
        None => kernel::tcb_cur_ptr().ok_or(OsError::TaskInvalid)?,
    };
    let tcb_ref = unsafe { tcb.as_ref() };

    if tcb_ref.prio == crate::config::CFG_PRIO_IDLE {
        return Err(OsError::TaskInvalid);
    }
    if tcb_ref.state != TaskState::Ready {
        return Err(OsError::InvalidState);
    }

    unsafe { sched::ready_to_suspend(tcb) };

    if kernel::tcb_cur_ptr() == Some(tcb) {
        sched::schedule();
    }

    drop(cs);
    Ok(())
}

/// Resume a suspended task.
pub fn os_task_resume(handle: TaskHandle) -> OsResult<()> {
    if is_isr_context() {
        return Err(OsError::InIsr);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { handle.0.as_ref() };
        if tcb_ref.state != TaskState::Suspended {
            return Err(OsError::InvalidState);
        }
        unsafe { sched::suspend_to_ready(handle.0) };
        Ok(())
    })?;

    sched::schedule();
    Ok(())
}

// ============ Stack hygiene ============

/// Check the low end of a task's stack for overwritten magic bytes.
/// Returns `true` (and fires the stack-overflow hook) when the stack
/// has been driven into its guard region.
pub fn os_task_stack_check(handle: TaskHandle) -> bool {
    let tcb = unsafe { handle.0.as_ref() };
    let check = tcb.stk_size.min(16);

    for i in 0..check {
        if unsafe { *tcb.stk_base.add(i) } != CFG_STACK_MAGIC {
            crate::error!("stack overflow, prio {}", tcb.prio);
            #[cfg(feature = "hook")]
            crate::hook::call_stack_overflow(handle.0.as_ptr());
            return true;
        }
    }
    false
}

/// High-water stack usage in bytes, derived from the surviving magic
/// prefix.
pub fn os_task_stack_usage(handle: TaskHandle) -> usize {
    let tcb = unsafe { handle.0.as_ref() };

    let mut unused = 0;
    for i in 0..tcb.stk_size {
        if unsafe { *tcb.stk_base.add(i) } == CFG_STACK_MAGIC {
            unused += 1;
        } else {
            break;
        }
    }
    tcb.stk_size - unused
}

// ============ Run-time statistics ============

/// Accumulated run time of a task in ticks.
pub fn os_task_runtime(handle: TaskHandle) -> OsTick {
    critical_section(|_cs| unsafe { handle.0.as_ref().run_time_ticks })
}

/// CPU usage of a task in hundredths of a percent.
pub fn os_task_cpu_usage(handle: TaskHandle) -> u32 {
    critical_section(|_cs| {
        let total = time::os_total_run_time();
        if total == 0 {
            return 0;
        }
        let ticks = unsafe { handle.0.as_ref().run_time_ticks };
        (ticks as u64 * 10_000 / total as u64) as u32
    })
}

/// Book run time onto the outgoing task and stamp the incoming one.
/// Runs inside the context switch handler, followed by the
/// task-switch hook.
pub(crate) fn update_runtime_stats(old: *mut OsTcb, new: *mut OsTcb) {
    let now = time::os_total_run_time();

    unsafe {
        if !old.is_null() && (*old).last_switch_in > 0 {
            let delta = now.wrapping_sub((*old).last_switch_in);
            (*old).run_time_ticks = (*old).run_time_ticks.wrapping_add(delta);
        }
        if !new.is_null() {
            (*new).last_switch_in = now;
        }
    }

    #[cfg(feature = "hook")]
    crate::hook::call_task_switch(old, new);
}
