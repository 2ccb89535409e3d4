//! Kernel state, initialization and startup.
//!
//! The kernel is a process-wide singleton: one flag block, one pair of
//! context-switch pointers shared with the port's switch handler, and
//! the subsystem init/start sequence.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{CFG_CPU_CLOCK_HZ, CFG_IDLE_STACK_SIZE, CFG_PRIO_IDLE, CFG_TICK_RATE_HZ};
use crate::core::sched::SCHED;
use crate::core::time;
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::task::{OsTcb, TaskInit};

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether multitasking has started
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether [`os_init`] has completed
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

/// Global kernel flags instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

// ============ Context switch protocol ============

/// The two TCB pointers shared with the deferred-switch handler.
///
/// Every callsite that may cause a switch writes `tcb_next` first and
/// then raises the deferred interrupt; the handler still sees
/// `tcb_cur` as the outgoing task and sets `tcb_cur = tcb_next` on its
/// way out.
#[repr(C)]
pub struct CpuState {
    /// Currently running task
    pub tcb_cur: *mut OsTcb,
    /// Task selected to run next
    pub tcb_next: *mut OsTcb,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_next: core::ptr::null_mut(),
        }
    }
}

/// Shared with the port's context switch handler.
#[no_mangle]
pub static mut CPU_STATE: CpuState = CpuState::new();

/// Currently running task, if any.
#[inline]
pub(crate) fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    NonNull::new(unsafe { (*(&raw const CPU_STATE)).tcb_cur })
}

#[inline]
pub(crate) fn set_tcb_cur(tcb: Option<NonNull<OsTcb>>) {
    unsafe {
        (*(&raw mut CPU_STATE)).tcb_cur = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
    }
}

#[inline]
pub(crate) fn set_tcb_next(tcb: Option<NonNull<OsTcb>>) {
    unsafe {
        (*(&raw mut CPU_STATE)).tcb_next = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
    }
}

// ============ Idle task ============

fn idle_entry(_arg: *mut ()) {
    loop {
        #[cfg(feature = "hook")]
        crate::hook::call_idle();

        #[cfg(target_arch = "arm")]
        cortex_m::asm::nop();
    }
}

// ============ Public API ============

/// Initialize the kernel.
///
/// Brings the subsystems up in order: time base, heap, scheduler,
/// mutex pool, queue pool, semaphore pool, timer manager. Must be
/// called before any other kernel function.
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::InvalidState);
    }

    KERNEL.reset();
    set_tcb_cur(None);
    set_tcb_next(None);

    critical_section(|cs| {
        time::init();
        crate::mem::init();
        SCHED.get(cs).reset();

        #[cfg(feature = "mutex")]
        crate::sync::mutex::init();
        #[cfg(feature = "queue")]
        crate::sync::queue::init();
        #[cfg(feature = "sem")]
        crate::sync::sem::init();
        #[cfg(feature = "timer")]
        crate::timer::init();

        KERNEL.set_initialized(true);
    });

    crate::info!("kernel initialized");
    Ok(())
}

/// Start multitasking. Creates the idle task, selects the highest
/// priority ready task and hands control to it.
///
/// On target this function does not return; every error path is taken
/// before the handoff.
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::InvalidState);
    }
    if KERNEL.is_running() {
        return Err(OsError::InvalidState);
    }

    crate::task::os_task_create(&TaskInit {
        entry: idle_entry,
        priority: CFG_PRIO_IDLE,
        name: "idle",
        stack_size: CFG_IDLE_STACK_SIZE,
        arg: core::ptr::null_mut(),
    })?;

    critical_section(|cs| {
        let sched = SCHED.get(cs);
        let prio = sched.prio_tbl.highest();
        let first = sched.ready[prio as usize].head().ok_or(OsError::TaskNotFound)?;

        unsafe {
            (*first.as_ptr()).last_switch_in = time::os_total_run_time();
        }
        set_tcb_cur(Some(first));
        set_tcb_next(Some(first));

        KERNEL.set_running(true);
        Ok(())
    })?;

    crate::info!("starting scheduler");
    crate::port::systick_init(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

    unsafe { crate::port::start_first_task() };

    Ok(())
}
